use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// A user account identity. Ordering is byte-wise over the underlying UUID,
// which is what the storage engine's sorted indexes rely on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LevelId(pub Uuid);

impl LevelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for LevelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LevelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Per-device identity, distinct from a user account: progress tracking is
// keyed by the reporting device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HardwareId(pub Uuid);

impl HardwareId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for HardwareId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HardwareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Secret issued at registration and checked on every login.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationToken(pub [u8; 16]);

impl RegistrationToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Which ranking a leaderboard maintains for a level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LeaderboardKind {
    /// More collected gems rank higher.
    MostGems,
    /// A shorter completion time ranks higher.
    LeastTime,
    /// Fewer steps rank higher.
    LeastSteps,
}

impl LeaderboardKind {
    pub const ALL: [LeaderboardKind; 3] = [
        LeaderboardKind::MostGems,
        LeaderboardKind::LeastTime,
        LeaderboardKind::LeastSteps,
    ];
}

/// Per-(device, level) completion state. The derived ordering is the
/// progression order: a write may only move a level forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum LevelProgress {
    Unknown,
    Seen,
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hex_round_trip() {
        let token = RegistrationToken::generate();
        let hex = token.to_hex();
        assert_eq!(RegistrationToken::from_hex(&hex).unwrap(), token);
    }

    #[test]
    fn token_rejects_short_hex() {
        assert!(RegistrationToken::from_hex("abcd").is_err());
    }

    #[test]
    fn progress_order_is_monotonic() {
        assert!(LevelProgress::Unknown < LevelProgress::Seen);
        assert!(LevelProgress::Seen < LevelProgress::Finished);
    }

    #[test]
    fn ids_order_bytewise() {
        let a = UserId(Uuid::from_bytes([1; 16]));
        let b = UserId(Uuid::from_bytes([2; 16]));
        assert!(a < b);
    }
}

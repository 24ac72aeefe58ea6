use thiserror::Error;

/// Errors produced by the storage engine.
///
/// Every facade operation returns one of these instead of panicking or
/// throwing; the network layer maps them onto wire-protocol error codes.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying file I/O failed. Treated as a transient infrastructure
    /// fault; the current mutation is aborted without leaving the
    /// in-memory indexes inconsistent.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),

    /// A persisted record could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// The supplied user identifier is malformed (nil UUID).
    #[error("Invalid user UUID")]
    InvalidUserUuid,

    /// No user with the given identifier/token pair exists.
    #[error("User not found")]
    UserNotFound,

    /// A user with this identifier is already registered.
    #[error("User already registered")]
    UserAlreadyRegistered,

    /// No level with the given identifier exists.
    #[error("Level not found")]
    LevelNotFound,

    /// A level with this identifier already exists.
    #[error("Level already exists")]
    LevelAlreadyExists,

    /// The calling user did not upload the level they try to remove.
    #[error("Not the level author")]
    NotLevelAuthor,

    /// Rating value outside the accepted range.
    #[error("Invalid rating: {0}")]
    InvalidRating(u8),

    /// A text field exceeds its maximum length.
    #[error("Field too long: {0}")]
    FieldTooLong(&'static str),

    /// The two hardware records are not associated.
    #[error("Hardware not associated")]
    HardwareNotAssociated,

    /// The two hardware records are already associated.
    #[error("Hardware already associated")]
    HardwareAlreadyAssociated,

    /// No statistics record exists for the level yet.
    #[error("Statistics not found")]
    StatsNotFound,

    /// No leaderboard of the requested kind exists for the level.
    #[error("Leaderboard not found")]
    LeaderboardNotFound,

    /// The requested demo number does not exist for the level.
    #[error("Demo not found")]
    DemoNotFound,

    /// A progress write reported state the engine already holds. Benign:
    /// no counter increment, no listener notification.
    #[error("Progress unchanged")]
    ProgressUnchanged,

    /// A query index or window lies outside the stored range.
    #[error("Out of bounds")]
    OutOfBounds,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

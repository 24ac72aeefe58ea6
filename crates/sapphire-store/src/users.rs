//! User account operations.

use chrono::Utc;
use tracing::info;

use sapphire_shared::constants::MAX_USER_NAME_LEN;
use sapphire_shared::{RegistrationToken, UserId};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::models::User;
use crate::storage::{lock, DataStorage};

impl DataStorage {
    /// Register a new user and issue their registration token.
    ///
    /// Errors: `InvalidUserUuid`, `UserAlreadyRegistered`, `FieldTooLong`,
    /// `StorageUnavailable`.
    pub fn register_user(
        &self,
        id: UserId,
        name: &str,
        difficulty_color: u32,
    ) -> Result<RegistrationToken> {
        validate_user_id(id)?;
        validate_name(name)?;

        let _guard = self.user_locks.guard(&id.0);
        if lock(&self.users).contains(id) {
            return Err(StoreError::UserAlreadyRegistered);
        }

        let user = User {
            id,
            token: RegistrationToken::generate(),
            name: name.to_string(),
            difficulty_color,
            created_at: Utc::now(),
            uploaded_levels: Vec::new(),
            level_ratings: Vec::new(),
        };
        let token = user.token;

        codec::write_record(&self.user_path(id), &user)?;
        lock(&self.users).insert(user);

        info!(%id, "user registered");
        Ok(token)
    }

    /// Authenticate a user by identifier and registration token.
    ///
    /// An unknown identifier and a wrong token both report
    /// `UserNotFound`, so probing cannot tell them apart.
    pub fn login_user(&self, id: UserId, token: RegistrationToken) -> Result<User> {
        validate_user_id(id)?;

        let users = lock(&self.users);
        let user = users.get(id).ok_or(StoreError::UserNotFound)?;
        if user.token != token {
            return Err(StoreError::UserNotFound);
        }
        Ok(user.clone())
    }

    /// Update a user's display name and difficulty color.
    ///
    /// Errors: `InvalidUserUuid`, `UserNotFound`, `FieldTooLong`,
    /// `StorageUnavailable`.
    pub fn update_user_info(&self, id: UserId, name: &str, difficulty_color: u32) -> Result<()> {
        validate_user_id(id)?;
        validate_name(name)?;

        let _guard = self.user_locks.guard(&id.0);
        let mut user = lock(&self.users)
            .get(id)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;

        user.name = name.to_string();
        user.difficulty_color = difficulty_color;

        codec::write_record(&self.user_path(id), &user)?;
        lock(&self.users).upsert(user);
        Ok(())
    }
}

fn validate_user_id(id: UserId) -> Result<()> {
    if id.0.is_nil() {
        return Err(StoreError::InvalidUserUuid);
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.chars().count() > MAX_USER_NAME_LEN {
        return Err(StoreError::FieldTooLong("user name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use uuid::Uuid;

    fn open() -> (DataStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DataStorage::open(StoreConfig::new(dir.path())).unwrap();
        (storage, dir)
    }

    fn uid(b: u8) -> UserId {
        UserId(Uuid::from_bytes([b; 16]))
    }

    #[test]
    fn register_then_login() {
        let (storage, _dir) = open();
        let id = uid(1);

        let token = storage.register_user(id, "alice", 3).unwrap();
        let user = storage.login_user(id, token).unwrap();
        assert_eq!(user.name, "alice");
        assert_eq!(user.difficulty_color, 3);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (storage, _dir) = open();
        let id = uid(1);

        storage.register_user(id, "alice", 0).unwrap();
        assert!(matches!(
            storage.register_user(id, "mallory", 0),
            Err(StoreError::UserAlreadyRegistered)
        ));
    }

    #[test]
    fn wrong_token_reports_user_not_found() {
        let (storage, _dir) = open();
        let id = uid(1);
        storage.register_user(id, "alice", 0).unwrap();

        let wrong = RegistrationToken([0xFF; 16]);
        assert!(matches!(
            storage.login_user(id, wrong),
            Err(StoreError::UserNotFound)
        ));
    }

    #[test]
    fn nil_uuid_is_invalid() {
        let (storage, _dir) = open();
        let nil = UserId(Uuid::nil());
        assert!(matches!(
            storage.register_user(nil, "x", 0),
            Err(StoreError::InvalidUserUuid)
        ));
    }

    #[test]
    fn over_long_name_is_rejected() {
        let (storage, _dir) = open();
        let long = "x".repeat(MAX_USER_NAME_LEN + 1);
        assert!(matches!(
            storage.register_user(uid(1), &long, 0),
            Err(StoreError::FieldTooLong(_))
        ));
    }

    #[test]
    fn update_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = uid(2);
        let token = {
            let storage = DataStorage::open(StoreConfig::new(dir.path())).unwrap();
            let token = storage.register_user(id, "bob", 1).unwrap();
            storage.update_user_info(id, "bobby", 7).unwrap();
            storage.close().unwrap();
            token
        };

        let storage = DataStorage::open(StoreConfig::new(dir.path())).unwrap();
        let user = storage.login_user(id, token).unwrap();
        assert_eq!(user.name, "bobby");
        assert_eq!(user.difficulty_color, 7);
    }
}

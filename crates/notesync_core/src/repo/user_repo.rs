//! User registration and login over the `users` collection.
//!
//! # Invariants
//! - Username uniqueness is best-effort only: `register_user_unique` checks
//!   then writes, so two concurrent registrations can both succeed.
//! - Passwords are compared exactly and case-sensitively.
//! - A login that matches nobody, an empty username included, is `None`.

use super::{decode, decode_all, encode, Keyed, RepoResult, StoreRepository, USERS_COLLECTION};
use crate::model::user::User;
use crate::repo::RepoError;
use crate::store::Query;
use log::{info, warn};

const USERNAME_FIELD: &str = "username";

impl Keyed for User {
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

/// Account use cases.
pub trait UserRepository {
    /// Assigns a fresh id and stores the user. No duplicate check.
    fn register_user(&self, user: &User) -> RepoResult<User>;
    /// Like `register_user`, but refuses a username that already exists.
    fn register_user_unique(&self, user: &User) -> RepoResult<User>;
    /// First stored user with this username and exactly this password.
    fn login(&self, username: &str, password: &str) -> RepoResult<Option<User>>;
    /// First stored user with this username, ignoring the password.
    fn check_username(&self, username: &str) -> RepoResult<Option<User>>;
}

impl StoreRepository {
    fn users_named(&self, username: &str) -> RepoResult<Vec<User>> {
        let records = self
            .store()
            .read_once(USERS_COLLECTION, &Query::equals(USERNAME_FIELD, username))?;
        Ok(decode_all(USERS_COLLECTION, &records))
    }
}

impl UserRepository for StoreRepository {
    fn register_user(&self, user: &User) -> RepoResult<User> {
        user.validate()?;
        let id = self.store().generate_id(USERS_COLLECTION)?;
        let stored = user.with_id(id);
        self.store()
            .write(USERS_COLLECTION, &stored.id, encode(&stored)?)?;
        info!("event=user_register module=repo status=ok user_id={}", stored.id);
        Ok(stored)
    }

    fn register_user_unique(&self, user: &User) -> RepoResult<User> {
        user.validate()?;
        if self.check_username(&user.username)?.is_some() {
            warn!("event=user_register module=repo status=rejected reason=username_taken");
            return Err(RepoError::UsernameTaken(user.username.clone()));
        }
        self.register_user(user)
    }

    fn login(&self, username: &str, password: &str) -> RepoResult<Option<User>> {
        if username.is_empty() {
            info!("event=user_login module=repo status=rejected reason=empty_username");
            return Ok(None);
        }
        let matched = self
            .users_named(username)?
            .into_iter()
            .find(|candidate| candidate.password_matches(password));
        info!(
            "event=user_login module=repo status={}",
            if matched.is_some() { "ok" } else { "rejected" }
        );
        Ok(matched)
    }

    fn check_username(&self, username: &str) -> RepoResult<Option<User>> {
        let records = self
            .store()
            .read_once(USERS_COLLECTION, &Query::equals(USERNAME_FIELD, username))?;
        match records.first() {
            Some(record) => decode(record).map(Some),
            None => Ok(None),
        }
    }
}

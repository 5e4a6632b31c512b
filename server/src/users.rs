//! Registered users, their login state and the flat `login:password` store.
//!
//! Only salted Argon2 hashes are kept, in memory and on disk. Store lines
//! whose credential is not a PHC hash string are treated as plaintext
//! passwords from older databases and get hashed on load.

use crate::error::{Result, ServerError};
use crate::session::SessionId;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use log::info;
use rand::rngs::OsRng;
use shared::Status;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// State kept per registered login. Flags are never persisted.
#[derive(Debug, Clone)]
pub struct UserRecord {
    credential: String,
    pub is_logged: bool,
    /// Session the user plays in, if any.
    pub active_session: Option<SessionId>,
}

impl UserRecord {
    fn new(credential: String) -> Self {
        Self {
            credential,
            is_logged: false,
            active_session: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active_session.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Ok,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Ok,
    NotFound,
    WrongPassword,
    AlreadyLoggedIn,
}

impl From<RegisterOutcome> for Status {
    fn from(outcome: RegisterOutcome) -> Self {
        match outcome {
            RegisterOutcome::Ok => Status::Ok,
            RegisterOutcome::AlreadyExists => Status::AlreadyExists,
        }
    }
}

impl From<LoginOutcome> for Status {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Ok => Status::Ok,
            LoginOutcome::NotFound => Status::NotFound,
            LoginOutcome::WrongPassword => Status::WrongPassword,
            LoginOutcome::AlreadyLoggedIn => Status::AlreadyLoggedIn,
        }
    }
}

/// In-memory user table keyed by login (case-sensitive).
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: BTreeMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every `login:credential` line of `path`.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Start loading the database from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ServerError::DatabaseIo {
            path: path.to_path_buf(),
            source,
        })?;

        let mut directory = Self::new();
        let mut upgraded = 0;
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (login, credential) = split_line(line)
                .filter(|(login, _)| !login.is_empty())
                .ok_or_else(|| ServerError::DatabaseFormat {
                    path: path.to_path_buf(),
                    line: number + 1,
                })?;
            let credential = match credential {
                Credential::Hashed(hash) => hash.to_string(),
                Credential::Plaintext(password) => {
                    upgraded += 1;
                    hash_password(password)?
                }
            };
            directory
                .users
                .insert(login.to_string(), UserRecord::new(credential));
        }

        if upgraded > 0 {
            info!("Hashed {} plaintext password(s)", upgraded);
        }
        info!("Database loaded: {} user(s)", directory.len());
        Ok(directory)
    }

    /// Rewrites `path` with one line per user.
    pub fn flush(&self, path: &Path) -> Result<()> {
        info!("Start saving the database to {}", path.display());
        let mut contents = String::new();
        for (login, record) in &self.users {
            let _ = writeln!(contents, "{}:{}", login, record.credential);
        }
        fs::write(path, contents).map_err(|source| ServerError::DatabaseIo {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Database saved: {} user(s)", self.len());
        Ok(())
    }

    pub fn contains(&self, login: &str) -> bool {
        self.users.contains_key(login)
    }

    /// Stored Argon2 hash for `login`, for verification off the event loop.
    pub fn credential(&self, login: &str) -> Option<&str> {
        self.users.get(login).map(|record| record.credential.as_str())
    }

    /// Hashes `password` in place and registers the user. Blocks for the
    /// duration of the hash.
    pub fn register(&mut self, login: &str, password: &str) -> Result<RegisterOutcome> {
        if self.contains(login) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        let credential = hash_password(password)?;
        Ok(self.insert_hashed(login, credential))
    }

    /// Adds a user whose password was already hashed with [`hash_password`].
    pub fn insert_hashed(&mut self, login: &str, credential: String) -> RegisterOutcome {
        if self.contains(login) {
            return RegisterOutcome::AlreadyExists;
        }
        self.users
            .insert(login.to_string(), UserRecord::new(credential));
        info!("Registered user {}", login);
        RegisterOutcome::Ok
    }

    /// Checks credentials and marks the user as logged in on success.
    /// Blocks for the duration of the verification.
    pub fn login(&mut self, login: &str, password: &str) -> LoginOutcome {
        let Some(credential) = self.credential(login) else {
            return LoginOutcome::NotFound;
        };
        let verified = verify_password(password, credential);
        self.finish_login(login, verified)
    }

    /// Second half of a login once the password check has run.
    pub fn finish_login(&mut self, login: &str, verified: bool) -> LoginOutcome {
        let Some(record) = self.users.get_mut(login) else {
            return LoginOutcome::NotFound;
        };
        if !verified {
            return LoginOutcome::WrongPassword;
        }
        if record.is_logged {
            return LoginOutcome::AlreadyLoggedIn;
        }
        record.is_logged = true;
        LoginOutcome::Ok
    }

    pub fn mark_playing(&mut self, login: &str, session: SessionId) {
        if let Some(record) = self.users.get_mut(login) {
            record.active_session = Some(session);
        }
    }

    pub fn clear_playing(&mut self, login: &str) {
        if let Some(record) = self.users.get_mut(login) {
            record.active_session = None;
        }
    }

    /// Clears both the logged-in and the playing state.
    pub fn logout(&mut self, login: &str) {
        if let Some(record) = self.users.get_mut(login) {
            record.is_logged = false;
            record.active_session = None;
        }
    }

    pub fn get(&self, login: &str) -> Option<&UserRecord> {
        self.users.get(login)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserRecord)> {
        self.users.iter().map(|(login, record)| (login.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

enum Credential<'a> {
    Hashed(&'a str),
    Plaintext(&'a str),
}

/// Hashes never contain `:`, so a hashed line splits on its last colon.
/// Plaintext lines split on the first one, as passwords may contain `:`.
fn split_line(line: &str) -> Option<(&str, Credential<'_>)> {
    if let Some((login, stored)) = line.rsplit_once(':') {
        if PasswordHash::new(stored).is_ok() {
            return Some((login, Credential::Hashed(stored)));
        }
    }
    line.split_once(':')
        .map(|(login, password)| (login, Credential::Plaintext(password)))
}

/// Salted Argon2 hash in PHC string form.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, credential: &str) -> bool {
    PasswordHash::new(credential)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn directory_with(users: &[(&str, &str)]) -> UserDirectory {
        let mut directory = UserDirectory::new();
        for (login, password) in users {
            assert_eq!(directory.register(login, password).unwrap(), RegisterOutcome::Ok);
        }
        directory
    }

    #[test]
    fn test_register_twice() {
        let mut directory = UserDirectory::new();
        assert_eq!(directory.register("alice", "secret").unwrap(), RegisterOutcome::Ok);
        assert_eq!(
            directory.register("alice", "secret2").unwrap(),
            RegisterOutcome::AlreadyExists
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_logins_are_case_sensitive() {
        let mut directory = directory_with(&[("alice", "pw")]);
        assert_eq!(directory.register("Alice", "pw").unwrap(), RegisterOutcome::Ok);
        assert_eq!(directory.login("ALICE", "pw"), LoginOutcome::NotFound);
        assert_eq!(directory.login("Alice", "pw"), LoginOutcome::Ok);
        assert!(!directory.get("alice").unwrap().is_logged);
    }

    #[test]
    fn test_login_outcomes() {
        let mut directory = directory_with(&[("u1", "p1")]);
        assert_eq!(directory.login("nobody", "p1"), LoginOutcome::NotFound);
        assert_eq!(directory.login("u1", "wrong"), LoginOutcome::WrongPassword);
        assert_eq!(directory.login("u1", "p1"), LoginOutcome::Ok);
        assert!(directory.get("u1").unwrap().is_logged);
        assert_eq!(directory.login("u1", "p1"), LoginOutcome::AlreadyLoggedIn);
    }

    #[test]
    fn test_logout_allows_login_again() {
        let mut directory = directory_with(&[("u1", "p1")]);
        assert_eq!(directory.login("u1", "p1"), LoginOutcome::Ok);
        directory.mark_playing("u1", 2);
        directory.logout("u1");

        let record = directory.get("u1").unwrap();
        assert!(!record.is_logged);
        assert!(!record.is_playing());
        assert_eq!(directory.login("u1", "p1"), LoginOutcome::Ok);
    }

    #[test]
    fn test_playing_state() {
        let mut directory = directory_with(&[("u1", "p1")]);
        directory.mark_playing("u1", 3);
        assert_eq!(directory.get("u1").unwrap().active_session, Some(3));
        assert!(directory.get("u1").unwrap().is_playing());
        directory.clear_playing("u1");
        assert!(!directory.get("u1").unwrap().is_playing());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Status::from(RegisterOutcome::AlreadyExists).code(), 400);
        assert_eq!(Status::from(LoginOutcome::WrongPassword).code(), 401);
        assert_eq!(Status::from(LoginOutcome::NotFound).code(), 404);
        assert_eq!(Status::from(LoginOutcome::AlreadyLoggedIn).code(), 405);
        assert_eq!(Status::from(LoginOutcome::Ok).code(), 200);
    }

    #[test]
    fn test_flush_and_load_keep_hashes_only() {
        let file = NamedTempFile::new().unwrap();
        let mut directory = directory_with(&[("alice", "secret"), ("bob", "hunter2")]);
        directory.login("alice", "secret");
        directory.mark_playing("alice", 0);
        directory.flush(file.path()).unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().all(|line| line.contains(":$argon2")));
        assert!(!contents.contains("secret"));
        assert!(!contents.contains("hunter2"));

        let mut loaded = UserDirectory::load(file.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        let alice = loaded.get("alice").unwrap();
        assert!(!alice.is_logged);
        assert!(!alice.is_playing());
        assert_eq!(loaded.login("alice", "secret"), LoginOutcome::Ok);
        assert_eq!(loaded.login("bob", "secret"), LoginOutcome::WrongPassword);
    }

    #[test]
    fn test_load_upgrades_plaintext_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "u1:p1").unwrap();
        writeln!(file, "u2:pass:with:colons").unwrap();
        writeln!(file).unwrap();

        let mut directory = UserDirectory::load(file.path()).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.login("u1", "p1"), LoginOutcome::Ok);
        // Plaintext passwords keep everything after the first colon.
        assert!(!directory.contains("u2:pass:with"));
        assert_eq!(directory.login("u2", "pass:with:colons"), LoginOutcome::Ok);
    }

    #[test]
    fn test_colon_password_survives_flush_and_load() {
        let file = NamedTempFile::new().unwrap();
        let directory = directory_with(&[("u2", "pass:with:colons")]);
        directory.flush(file.path()).unwrap();

        let mut loaded = UserDirectory::load(file.path()).unwrap();
        assert_eq!(loaded.login("u2", "pass:with:colons"), LoginOutcome::Ok);
    }

    #[test]
    fn test_split_register_and_login() {
        let mut directory = UserDirectory::new();
        let credential = hash_password("secret").unwrap();
        assert_eq!(directory.insert_hashed("alice", credential.clone()), RegisterOutcome::Ok);
        assert_eq!(
            directory.insert_hashed("alice", credential),
            RegisterOutcome::AlreadyExists
        );

        let stored = directory.credential("alice").unwrap().to_string();
        assert!(verify_password("secret", &stored));
        assert!(!verify_password("wrong", &stored));
        assert_eq!(directory.finish_login("alice", false), LoginOutcome::WrongPassword);
        assert_eq!(directory.finish_login("alice", true), LoginOutcome::Ok);
        assert_eq!(directory.finish_login("alice", true), LoginOutcome::AlreadyLoggedIn);
        assert_eq!(directory.finish_login("ghost", true), LoginOutcome::NotFound);
    }

    #[test]
    fn test_load_rejects_malformed_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "u1:p1").unwrap();
        writeln!(file, "no-separator").unwrap();

        match UserDirectory::load(file.path()) {
            Err(ServerError::DatabaseFormat { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = UserDirectory::load(&dir.path().join("missing.db"));
        assert!(matches!(result, Err(ServerError::DatabaseIo { .. })));
    }
}

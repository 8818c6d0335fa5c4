use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_TRIAL_HOURS: u32 = 2;
const EXPIRING_SOON_SECS: i64 = 5 * 60;
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Account has expired. Please contact support.")]
    Expired,
    #[error("Username already exists")]
    DuplicateUser,
    #[error("User not found")]
    UnknownUser,
    #[error("Account has no expiration (permanent account)")]
    Permanent,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("duration must be at least one hour and end within the calendar")]
    InvalidDuration,
    #[error("failed to read credential store {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write credential store {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential store {} is malformed", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Stored record. `expiry` is local wall-clock time in ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub password: String,
    pub expiry: Option<NaiveDateTime>,
}

/// On-disk record before the expiry is checked. Older stores mapped
/// usernames straight to a hash.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current {
        password: String,
        #[serde(default)]
        expiry: Option<String>,
    },
    Legacy(String),
}

/// Accepts the serialized form plus a space-separated variant.
fn parse_expiry(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok())
}

fn add_hours(from: NaiveDateTime, hours: u32) -> Result<NaiveDateTime, AuthError> {
    Duration::try_hours(hours.into())
        .and_then(|delta| from.checked_add_signed(delta))
        .ok_or(AuthError::InvalidDuration)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub username: String,
    pub expiry: Option<NaiveDateTime>,
    pub is_expired: bool,
    /// Zero once expired; `None` for permanent accounts.
    pub remaining: Option<Duration>,
    pub expiring_soon: bool,
}

impl AccountInfo {
    pub fn expiry_display(&self) -> String {
        match self.expiry {
            Some(at) => at.format(DISPLAY_FORMAT).to_string(),
            None => "Never (Permanent)".to_string(),
        }
    }

    pub fn time_remaining(&self) -> String {
        match self.remaining {
            None => "Unlimited".to_string(),
            Some(_) if self.is_expired => "Expired".to_string(),
            Some(left) => format_remaining(left.num_seconds()),
        }
    }
}

/// `"{h}h {m}m {s}s"`, dropping the hours when there are none.
pub fn format_remaining(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Username → credential map persisted as pretty JSON.
#[derive(Debug)]
pub struct AuthStore {
    path: PathBuf,
    users: BTreeMap<String, Credential>,
}

impl AuthStore {
    /// Reads the store at `path`. A missing file is an empty store; legacy
    /// records are upgraded and written back.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                users: BTreeMap::new(),
            });
        }
        let text = fs::read_to_string(&path).map_err(|source| AuthError::Read {
            path: path.clone(),
            source,
        })?;
        let stored: BTreeMap<String, StoredRecord> = if text.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&text).map_err(|source| AuthError::Parse {
                path: path.clone(),
                source,
            })?
        };

        let mut migrated = 0;
        let users = stored
            .into_iter()
            .map(|(name, record)| {
                let credential = match record {
                    StoredRecord::Current { password, expiry } => {
                        let expiry = expiry.map(|raw| {
                            parse_expiry(&raw).unwrap_or_else(|| {
                                // an unreadable expiry counts as long past
                                warn!(
                                    username = %name,
                                    expiry = %raw,
                                    "unreadable expiry, treating account as expired"
                                );
                                NaiveDateTime::default()
                            })
                        });
                        Credential { password, expiry }
                    }
                    StoredRecord::Legacy(password) => {
                        migrated += 1;
                        Credential {
                            password,
                            expiry: None,
                        }
                    }
                };
                (name, credential)
            })
            .collect();

        let store = Self { path, users };
        if migrated > 0 {
            info!(migrated, path = %store.path.display(), "upgraded legacy credential records");
            store.save()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.verify_at(username, password, now())
    }

    /// Unknown users and wrong passwords share one error. Expiry is only
    /// reported to callers holding the right password.
    pub fn verify_at(
        &self,
        username: &str,
        password: &str,
        now: NaiveDateTime,
    ) -> Result<(), AuthError> {
        let credential = self
            .users
            .get(username)
            .ok_or(AuthError::InvalidCredentials)?;
        if credential.password != hash_password(password) {
            return Err(AuthError::InvalidCredentials);
        }
        match credential.expiry {
            Some(expiry) if now > expiry => Err(AuthError::Expired),
            _ => Ok(()),
        }
    }

    /// Returns the expiry time, if any.
    pub fn add_user(
        &mut self,
        username: &str,
        password: &str,
        expiry_hours: Option<u32>,
    ) -> Result<Option<NaiveDateTime>, AuthError> {
        self.add_user_at(username, password, expiry_hours, now())
    }

    pub fn add_user_at(
        &mut self,
        username: &str,
        password: &str,
        expiry_hours: Option<u32>,
        now: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::EmptyUsername);
        }
        if self.users.contains_key(username) {
            return Err(AuthError::DuplicateUser);
        }
        let expiry = match expiry_hours {
            Some(0) => return Err(AuthError::InvalidDuration),
            Some(hours) => Some(add_hours(now, hours)?),
            None => None,
        };
        self.users.insert(
            username.to_string(),
            Credential {
                password: hash_password(password),
                expiry,
            },
        );
        self.save()?;
        info!(username, ?expiry, "added user");
        Ok(expiry)
    }

    pub fn add_trial_user(
        &mut self,
        username: &str,
        password: &str,
        trial_hours: u32,
    ) -> Result<NaiveDateTime, AuthError> {
        self.add_user(username, password, Some(trial_hours))?
            .ok_or(AuthError::InvalidDuration)
    }

    pub fn account_info(&self, username: &str) -> Option<AccountInfo> {
        self.account_info_at(username, now())
    }

    pub fn account_info_at(&self, username: &str, now: NaiveDateTime) -> Option<AccountInfo> {
        let credential = self.users.get(username)?;
        let (is_expired, remaining) = match credential.expiry {
            None => (false, None),
            Some(expiry) if now > expiry => (true, Some(Duration::zero())),
            Some(expiry) => (false, Some(expiry - now)),
        };
        let expiring_soon = !is_expired
            && remaining.is_some_and(|left| left.num_seconds() <= EXPIRING_SOON_SECS);
        Some(AccountInfo {
            username: username.to_string(),
            expiry: credential.expiry,
            is_expired,
            remaining,
            expiring_soon,
        })
    }

    /// Pushes an existing expiry further out. Permanent accounts are refused.
    pub fn extend_account(
        &mut self,
        username: &str,
        additional_hours: u32,
    ) -> Result<NaiveDateTime, AuthError> {
        if additional_hours == 0 {
            return Err(AuthError::InvalidDuration);
        }
        let credential = self
            .users
            .get_mut(username)
            .ok_or(AuthError::UnknownUser)?;
        let current = credential.expiry.ok_or(AuthError::Permanent)?;
        let extended = add_hours(current, additional_hours)?;
        credential.expiry = Some(extended);
        self.save()?;
        info!(username, %extended, "extended account");
        Ok(extended)
    }

    pub fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.verify(username, old_password)?;
        if let Some(credential) = self.users.get_mut(username) {
            credential.password = hash_password(new_password);
        }
        self.save()?;
        info!(username, "changed password");
        Ok(())
    }

    fn save(&self) -> Result<(), AuthError> {
        let write_err = |source| AuthError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let text = serde_json::to_string_pretty(&self.users).map_err(|e| write_err(e.into()))?;
        fs::write(&self.path, text).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn store() -> (tempfile::TempDir, AuthStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::open(dir.path().join("users.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file_is_empty_store() {
        let (_dir, store) = store();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn add_then_verify_round_trips_through_disk() {
        let (_dir, mut store) = store();
        assert_eq!(store.add_user("ana", "pw", None).unwrap(), None);
        let reopened = AuthStore::open(store.path()).unwrap();
        assert!(reopened.verify("ana", "pw").is_ok());
        assert!(matches!(
            reopened.verify("ana", "nope"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            reopened.verify("nobody", "pw"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_and_empty_usernames_are_rejected() {
        let (_dir, mut store) = store();
        store.add_user("ana", "pw", None).unwrap();
        assert!(matches!(store.add_user("ana", "x", None), Err(AuthError::DuplicateUser)));
        assert!(matches!(store.add_user("  ", "x", None), Err(AuthError::EmptyUsername)));
    }

    #[test]
    fn expiry_boundary() {
        let (_dir, mut store) = store();
        let expiry = store.add_user_at("trial", "pw", Some(2), at(10, 0, 0)).unwrap();
        assert_eq!(expiry, Some(at(12, 0, 0)));

        assert!(store.verify_at("trial", "pw", at(11, 59, 59)).is_ok());
        assert!(store.verify_at("trial", "pw", at(12, 0, 0)).is_ok());
        let err = store.verify_at("trial", "pw", at(12, 0, 1)).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert_eq!(err.to_string(), "Account has expired. Please contact support.");
        // no hint about expiry without the password
        assert!(matches!(
            store.verify_at("trial", "wrong", at(13, 0, 0)),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn permanent_account_never_expires() {
        let (_dir, mut store) = store();
        store.add_user("perm", "pw", None).unwrap();
        let far = NaiveDate::from_ymd_opt(2999, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!(store.verify_at("perm", "pw", far).is_ok());
        let info = store.account_info_at("perm", far).unwrap();
        assert_eq!(info.time_remaining(), "Unlimited");
        assert_eq!(info.expiry_display(), "Never (Permanent)");
    }

    #[test]
    fn account_info_reports_remaining_time() {
        let (_dir, mut store) = store();
        store.add_user_at("t", "pw", Some(2), at(10, 0, 0)).unwrap();

        let info = store.account_info_at("t", at(10, 30, 15)).unwrap();
        assert!(!info.is_expired);
        assert!(!info.expiring_soon);
        assert_eq!(info.time_remaining(), "1h 29m 45s");
        assert_eq!(info.expiry_display(), "2025-03-01 12:00:00");

        let soon = store.account_info_at("t", at(11, 56, 0)).unwrap();
        assert!(soon.expiring_soon);
        assert_eq!(soon.time_remaining(), "4m 0s");

        let gone = store.account_info_at("t", at(12, 0, 1)).unwrap();
        assert!(gone.is_expired);
        assert!(!gone.expiring_soon);
        assert_eq!(gone.time_remaining(), "Expired");

        assert!(store.account_info("nobody").is_none());
    }

    #[test]
    fn extend_pushes_expiry_from_current_value() {
        let (_dir, mut store) = store();
        store.add_user_at("t", "pw", Some(2), at(10, 0, 0)).unwrap();
        assert_eq!(store.extend_account("t", 3).unwrap(), at(15, 0, 0));

        store.add_user("perm", "pw", None).unwrap();
        assert!(matches!(store.extend_account("perm", 1), Err(AuthError::Permanent)));
        assert!(matches!(store.extend_account("ghost", 1), Err(AuthError::UnknownUser)));
    }

    #[test]
    fn oversized_durations_are_rejected_without_changes() {
        let (_dir, mut store) = store();
        assert!(matches!(
            store.add_user("big", "pw", Some(u32::MAX)),
            Err(AuthError::InvalidDuration)
        ));
        assert!(!store.contains("big"));
        assert!(matches!(
            store.add_trial_user("big", "pw", u32::MAX),
            Err(AuthError::InvalidDuration)
        ));

        store.add_user_at("t", "pw", Some(2), at(10, 0, 0)).unwrap();
        assert!(matches!(
            store.extend_account("t", u32::MAX),
            Err(AuthError::InvalidDuration)
        ));
        assert_eq!(store.account_info("t").unwrap().expiry, Some(at(12, 0, 0)));
        let reopened = AuthStore::open(store.path()).unwrap();
        assert_eq!(reopened.account_info("t").unwrap().expiry, Some(at(12, 0, 0)));
    }

    #[test]
    fn change_password_requires_old_one() {
        let (_dir, mut store) = store();
        store.add_user("ana", "old", None).unwrap();
        assert!(matches!(
            store.change_password("ana", "wrong", "new"),
            Err(AuthError::InvalidCredentials)
        ));
        store.change_password("ana", "old", "new").unwrap();
        let reopened = AuthStore::open(store.path()).unwrap();
        assert!(reopened.verify("ana", "new").is_ok());
        assert!(reopened.verify("ana", "old").is_err());
    }

    #[test]
    fn legacy_records_are_migrated_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let legacy = format!(
            r#"{{"old": "{}", "new": {{"password": "{}", "expiry": "2025-03-01T12:00:00"}}}}"#,
            hash_password("a"),
            hash_password("b")
        );
        fs::write(&path, legacy).unwrap();

        let store = AuthStore::open(&path).unwrap();
        assert!(store.verify("old", "a").is_ok());
        assert_eq!(store.account_info("old").unwrap().expiry, None);
        assert_eq!(
            store.account_info("new").unwrap().expiry,
            Some(at(12, 0, 0))
        );

        let rewritten: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["old"]["expiry"], serde_json::Value::Null);
        assert_eq!(rewritten["old"]["password"], hash_password("a"));
    }

    #[test]
    fn unreadable_expiry_only_locks_that_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let text = format!(
            r#"{{"ok": {{"password": "{}", "expiry": "2025-03-01 12:00:00.250"}},
                "bad": {{"password": "{}", "expiry": "next tuesday"}}}}"#,
            hash_password("a"),
            hash_password("b")
        );
        fs::write(&path, text).unwrap();

        let store = AuthStore::open(&path).unwrap();
        assert!(store.verify_at("ok", "a", at(11, 0, 0)).is_ok());
        assert!(matches!(
            store.verify_at("bad", "b", at(11, 0, 0)),
            Err(AuthError::Expired)
        ));
        let info = store.account_info_at("bad", at(11, 0, 0)).unwrap();
        assert!(info.is_expired);
        assert_eq!(info.time_remaining(), "Expired");
    }

    #[test]
    fn malformed_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(AuthStore::open(&path), Err(AuthError::Parse { .. })));
    }
}

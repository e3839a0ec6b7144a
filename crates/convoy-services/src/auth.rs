//! Client authentication — login state, lockout, and emergency blocking.
//!
//! A keyed state machine per client: stored password hash, login flag,
//! consecutive failure counter, and two independent block flags (lockout
//! after repeated failures, emergency block ordered by the server).

use std::sync::Arc;

use dashmap::DashMap;

/// Per-client authentication state.
#[derive(Debug)]
struct AuthRecord {
    hashed_password: String,
    logged_in: bool,
    failed_attempts: u32,
    blocked: bool,
    emergency_blocked: bool,
}

#[derive(Clone)]
pub struct Authentication {
    records: Arc<DashMap<i64, AuthRecord>>,
    max_failed_attempts: u32,
    emergency_secret_phrase: Arc<str>,
}

impl Authentication {
    pub fn new(max_failed_attempts: u32, emergency_secret_phrase: &str) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            max_failed_attempts,
            emergency_secret_phrase: Arc::from(emergency_secret_phrase),
        }
    }

    /// Verify a password for a client.
    ///
    /// A wrong password bumps the failure counter; reaching the configured
    /// limit blocks the client. Blocked and emergency-blocked clients fail
    /// regardless of the password.
    pub fn authenticate(&self, client_id: i64, password: &str) -> bool {
        let mut record = match self.records.get_mut(&client_id) {
            Some(r) => r,
            None => {
                tracing::debug!(client_id, "login attempt for unknown client");
                return false;
            }
        };

        if record.blocked || record.emergency_blocked {
            tracing::warn!(client_id, "login attempt while blocked");
            return false;
        }

        if record.hashed_password == hash_password(password) {
            record.failed_attempts = 0;
            record.logged_in = true;
            tracing::info!(client_id, "client logged in");
            return true;
        }

        record.failed_attempts += 1;
        tracing::warn!(
            client_id,
            attempts = record.failed_attempts,
            "failed login attempt"
        );
        if record.failed_attempts >= self.max_failed_attempts {
            record.blocked = true;
            tracing::warn!(client_id, "client blocked after repeated failures");
        }
        false
    }

    /// A client is authorized when logged in and not blocked in any way.
    pub fn is_authorized(&self, client_id: i64) -> bool {
        self.records
            .get(&client_id)
            .map(|r| r.logged_in && !r.blocked && !r.emergency_blocked)
            .unwrap_or(false)
    }

    /// Mark a client logged out. Only ever flips the flag to false.
    pub fn set_logged_out(&self, client_id: i64) {
        if let Some(mut record) = self.records.get_mut(&client_id) {
            record.logged_in = false;
            tracing::info!(client_id, "client logged out");
        }
    }

    /// Register credentials for a new client. Existing records are left
    /// untouched.
    pub fn add_credentials(&self, client_id: i64, password: &str) {
        if self.records.contains_key(&client_id) {
            return;
        }
        self.records.insert(
            client_id,
            AuthRecord {
                hashed_password: hash_password(password),
                logged_in: false,
                failed_attempts: 0,
                blocked: false,
                emergency_blocked: false,
            },
        );
        tracing::info!(client_id, "credentials added");
    }

    pub fn remove_credentials(&self, client_id: i64) {
        if self.records.remove(&client_id).is_some() {
            tracing::info!(client_id, "credentials removed");
        }
    }

    /// Lift a failed-attempts block after an out-of-band fingerprint check.
    /// Returns false when the client is unknown or not blocked.
    pub fn unblock_with_fingerprint(&self, client_id: i64) -> bool {
        let mut record = match self.records.get_mut(&client_id) {
            Some(r) => r,
            None => return false,
        };
        if !record.blocked {
            return false;
        }
        record.blocked = false;
        record.failed_attempts = 0;
        record.logged_in = true;
        tracing::info!(client_id, "client unblocked via fingerprint");
        true
    }

    /// Block a client while an emergency alert is active.
    pub fn block_due_to_emergency(&self, client_id: i64) {
        if let Some(mut record) = self.records.get_mut(&client_id) {
            record.emergency_blocked = true;
            tracing::warn!(client_id, "client emergency-blocked");
        }
    }

    /// Lift an emergency block with the configured secret phrase.
    pub fn unlock_with_secret_phrase(&self, client_id: i64, phrase: &str) -> bool {
        let mut record = match self.records.get_mut(&client_id) {
            Some(r) => r,
            None => return false,
        };
        if record.emergency_blocked && phrase == &*self.emergency_secret_phrase {
            record.emergency_blocked = false;
            tracing::info!(client_id, "emergency block lifted");
            return true;
        }
        false
    }
}

fn hash_password(password: &str) -> String {
    hex::encode(blake3::hash(password.as_bytes()).as_bytes())
}

//! One-time login codes for roles that require a second factor.
//!
//! Codes live in process memory only. A restart invalidates every pending
//! code, which simply forces the user to request a new one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MfaError {
    #[error("no pending MFA code for this user")]
    NoPendingCode,

    #[error("MFA code has expired")]
    Expired,

    #[error("invalid MFA code ({attempts_left} attempts left)")]
    Invalid { attempts_left: u32 },

    #[error("MFA code delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaSettings {
    pub enabled: bool,
    pub code_length: usize,
    pub expiry: Duration,
    pub max_attempts: u32,
}

impl Default for MfaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            code_length: 6,
            expiry: Duration::minutes(5),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCode {
    code: String,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

/// A code that was just issued and still has to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MfaService {
    settings: MfaSettings,
    pending: Mutex<HashMap<String, PendingCode>>,
}

impl MfaService {
    pub fn new(settings: MfaSettings) -> Self {
        Self {
            settings,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &MfaSettings {
        &self.settings
    }

    pub fn is_required(&self, role: crate::Role) -> bool {
        self.settings.enabled && role.requires_mfa()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingCode>> {
        // The map holds no cross-entry invariants, so a poisoned lock is still usable.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a fresh code for `username`, replacing any pending one.
    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> IssuedCode {
        let mut rng = rand::thread_rng();
        let code: String = (0..self.settings.code_length)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect();
        let expires_at = now + self.settings.expiry;

        self.pending().insert(
            username.to_string(),
            PendingCode {
                code: code.clone(),
                expires_at,
                attempts: 0,
            },
        );
        IssuedCode { code, expires_at }
    }

    /// Check `code` for `username`. Successful, expired and exhausted codes are removed.
    pub fn verify(&self, username: &str, code: &str, now: DateTime<Utc>) -> Result<(), MfaError> {
        let mut pending = self.pending();
        let Some(entry) = pending.get_mut(username) else {
            return Err(MfaError::NoPendingCode);
        };

        if now > entry.expires_at {
            pending.remove(username);
            return Err(MfaError::Expired);
        }

        let candidate = code.trim().to_ascii_uppercase();
        if constant_time_eq(entry.code.as_bytes(), candidate.as_bytes()) {
            pending.remove(username);
            return Ok(());
        }

        entry.attempts += 1;
        let attempts_left = self.settings.max_attempts.saturating_sub(entry.attempts);
        if attempts_left == 0 {
            pending.remove(username);
        }
        Err(MfaError::Invalid { attempts_left })
    }

    pub fn has_pending(&self, username: &str) -> bool {
        self.pending().contains_key(username)
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Transport for one-time codes (e-mail in production deployments).
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(
        &self,
        username: &str,
        email: Option<&str>,
        code: &IssuedCode,
    ) -> Result<(), MfaError>;
}

/// Delivery that only writes to the log. The code itself is logged at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(
        &self,
        username: &str,
        email: Option<&str>,
        code: &IssuedCode,
    ) -> Result<(), MfaError> {
        tracing::info!(
            username = %username,
            email = email.unwrap_or("-"),
            expires_at = %code.expires_at,
            "mfa code issued"
        );
        tracing::debug!(username = %username, code = %code.code, "mfa code (dev delivery)");
        Ok(())
    }
}

/// Records every delivered code; used by tests to complete the login flow.
#[derive(Debug, Default)]
pub struct MemoryDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_code_for(&self, username: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(user, _)| user == username)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl CodeDelivery for MemoryDelivery {
    async fn deliver(
        &self,
        username: &str,
        _email: Option<&str>,
        code: &IssuedCode,
    ) -> Result<(), MfaError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((username.to_string(), code.code.clone()));
        Ok(())
    }
}

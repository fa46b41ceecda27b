//! Session and key records.
//!
//! The coordinator (in [`coordinator`]) owns every record defined here;
//! everything else sees clones.

pub mod coordinator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::backend::BackendKind;
use crate::core::errors::SessionError;

/// Smallest key a session may request, in bits.
pub const MIN_KEY_LENGTH: usize = 128;
/// Largest key a session may request, in bits.
pub const MAX_KEY_LENGTH: usize = 4096;

/// Session TTL bounds and default, in minutes.
pub const MIN_TTL_MINUTES: i64 = 1;
pub const MAX_TTL_MINUTES: i64 = 10_080;
pub const DEFAULT_TTL_MINUTES: i64 = 1_440;

/// Generated keys expire this many hours after creation.
pub const KEY_TTL_HOURS: i64 = 24;

/// Lifecycle state of a session.
///
/// Legal transitions: `waiting_for_bob → active` (join) or `aborted`
/// (expiry); `active → initiating` (execute); `initiating → completed |
/// aborted | failed`; any non-terminal state may fail on internal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    WaitingForBob,
    Active,
    Initiating,
    Completed,
    Aborted,
    Failed,
}

impl SessionStatus {
    /// True once the session can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Aborted | SessionStatus::Failed
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SessionStatus::WaitingForBob => "waiting_for_bob",
            SessionStatus::Active => "active",
            SessionStatus::Initiating => "initiating",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{tag}")
    }
}

/// One QKD session between Alice and Bob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub alice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bob_id: Option<String>,
    pub status: SessionStatus,
    pub backend: BackendKind,
    /// Target final key length in bits.
    pub key_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qber: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_key_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_key_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// True when `now` lies past the session's TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A generated quantum key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: Uuid,
    pub session_id: Uuid,
    /// Raw key material. Never serialized.
    #[serde(skip)]
    pub material: Vec<u8>,
    pub key_length_bits: usize,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Request to open a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateRequest {
    pub alice_id: String,
    /// Target final key length in bits.
    pub key_length: usize,
    #[serde(default)]
    pub backend: BackendKind,
    /// Session TTL in minutes; `None` selects the one-day default.
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

impl SessionCreateRequest {
    /// Validates ranges and resolves the TTL default.
    ///
    /// # Errors
    ///
    /// `InvalidAliceId`, `InvalidKeyLength` or `InvalidTtl`.
    pub fn validate(&self) -> Result<i64, SessionError> {
        if self.alice_id.is_empty() {
            return Err(SessionError::InvalidAliceId);
        }

        if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&self.key_length) {
            return Err(SessionError::InvalidKeyLength);
        }

        let ttl = self.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES);
        if !(MIN_TTL_MINUTES..=MAX_TTL_MINUTES).contains(&ttl) {
            return Err(SessionError::InvalidTtl);
        }

        Ok(ttl)
    }
}

/// Request from Bob to join an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionJoinRequest {
    pub session_id: Uuid,
    pub bob_id: String,
}

impl SessionJoinRequest {
    /// # Errors
    ///
    /// `InvalidBobId` when the identity is empty.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.bob_id.is_empty() {
            return Err(SessionError::InvalidBobId);
        }
        Ok(())
    }
}

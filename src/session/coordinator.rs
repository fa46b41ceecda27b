//! Session coordination.
//!
//! The coordinator owns the session and key tables behind a single
//! reader/writer lock and drives exchanges end to end. Within one session,
//! status transitions are totally ordered; the key record is inserted in
//! the same critical section that marks the session `completed`, so a
//! reader observing that status always finds the key.

use chrono::{Duration, Utc};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::QuantumBackend;
use crate::core::errors::{AmplifyError, SessionError};
use crate::postprocessing::amplification::{
    calculate_secure_key_length, AmplificationMethod, PrivacyAmplifier,
    DEFAULT_SECURITY_PARAMETER,
};
use crate::postprocessing::cascade::{
    calculate_information_leakage, verify_key_correctness, CascadeCorrector,
};
use crate::protocols::bb84::{Bb84Protocol, KeyExchangeResult};
use crate::session::{
    KeyRecord, SessionCreateRequest, SessionJoinRequest, SessionRecord, SessionStatus,
    KEY_TTL_HOURS,
};

/// Extra oversampling applied when reconciliation and amplification will
/// consume key material on top of sifting and sampling.
const POST_PROCESSING_OVERSAMPLE: usize = 4;

/// Terminal outcome of driving one session's exchange.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// The exchange completed; the key has been stored.
    Completed(KeyRecord),
    /// The observed error rate forced a clean abort; nothing was stored.
    Aborted { qber: f64, message: String },
}

struct Tables {
    sessions: HashMap<Uuid, SessionRecord>,
    keys: HashMap<Uuid, KeyRecord>,
}

/// Coordinates sessions, drives exchanges and stores the resulting keys.
pub struct SessionCoordinator {
    tables: RwLock<Tables>,
    backend: Arc<dyn QuantumBackend>,
}

impl SessionCoordinator {
    pub fn new(backend: Arc<dyn QuantumBackend>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                sessions: HashMap::new(),
                keys: HashMap::new(),
            }),
            backend,
        }
    }

    /// Opens a session on Alice's behalf.
    ///
    /// # Errors
    ///
    /// Validation errors from [`SessionCreateRequest::validate`].
    pub fn create_session(
        &self,
        request: &SessionCreateRequest,
    ) -> Result<SessionRecord, SessionError> {
        let ttl_minutes = request.validate()?;
        let now = Utc::now();

        let session = SessionRecord {
            id: Uuid::new_v4(),
            alice_id: request.alice_id.clone(),
            bob_id: None,
            status: SessionStatus::WaitingForBob,
            backend: request.backend,
            key_length: request.key_length,
            qber: None,
            raw_key_length: None,
            final_key_length: None,
            is_secure: None,
            message: None,
            created_at: now,
            completed_at: None,
            expires_at: now + Duration::minutes(ttl_minutes),
        };

        self.tables
            .write()
            .sessions
            .insert(session.id, session.clone());

        info!(session_id = %session.id, alice = %session.alice_id, "session created");

        Ok(session)
    }

    /// Joins Bob to a waiting session.
    ///
    /// # Errors
    ///
    /// Validation errors from [`SessionJoinRequest::validate`];
    /// `SessionNotFound`, `SessionExpired` (the session transitions to
    /// `aborted`) or `InProgress` when the session already left
    /// `waiting_for_bob`.
    pub fn join_session(
        &self,
        request: &SessionJoinRequest,
    ) -> Result<SessionRecord, SessionError> {
        request.validate()?;

        let mut tables = self.tables.write();
        let session = tables
            .sessions
            .get_mut(&request.session_id)
            .ok_or(SessionError::SessionNotFound)?;

        if session.is_expired_at(Utc::now()) {
            session.status = SessionStatus::Aborted;
            return Err(SessionError::SessionExpired);
        }

        if session.status != SessionStatus::WaitingForBob {
            return Err(SessionError::InProgress);
        }

        session.bob_id = Some(request.bob_id.clone());
        session.status = SessionStatus::Active;

        Ok(session.clone())
    }

    /// Runs the plain BB84 exchange for an active session.
    ///
    /// A high error rate yields [`ExchangeOutcome::Aborted`] and the
    /// session ends `aborted` with no key stored; pipeline failures yield
    /// an error and the session ends `failed`.
    pub fn execute_key_exchange(
        &self,
        session_id: Uuid,
    ) -> Result<ExchangeOutcome, SessionError> {
        let session = self.begin_exchange(session_id)?;

        let protocol = Bb84Protocol::new(Arc::clone(&self.backend), session.key_length);
        let result = match protocol.perform_key_exchange() {
            Ok(result) => result,
            Err(err) => {
                self.record_failure(session_id, &err.to_string());
                return Err(err.into());
            }
        };

        if !result.secure {
            warn!(session_id = %session_id, qber = result.qber, "exchange aborted");
            self.record_result(session_id, SessionStatus::Aborted, &result);
            return Ok(ExchangeOutcome::Aborted {
                qber: result.qber,
                message: result.message,
            });
        }

        let key = self.complete_with_key(
            session_id,
            &result,
            result.key.clone(),
            result.final_key_length,
        );

        Ok(ExchangeOutcome::Completed(key))
    }

    /// Runs BB84 followed by Cascade reconciliation and privacy
    /// amplification.
    ///
    /// The internal BB84 target is oversampled so enough sifted material
    /// survives the post-processing losses. A post-correction key mismatch
    /// is an error (the reconciliation failed to converge), unlike a high
    /// QBER which aborts cleanly.
    pub fn execute_with_post_processing(
        &self,
        session_id: Uuid,
    ) -> Result<ExchangeOutcome, SessionError> {
        let session = self.begin_exchange(session_id)?;

        let protocol = Bb84Protocol::new(
            Arc::clone(&self.backend),
            session.key_length * POST_PROCESSING_OVERSAMPLE,
        );

        match self.run_post_processing(&session, &protocol) {
            Ok(PostProcessed::Completed {
                material,
                qber,
                raw_key_length,
                disclosed_bits,
            }) => {
                let final_key_length = material.len() * 8;
                let result = KeyExchangeResult {
                    key: Vec::new(),
                    raw_key_length,
                    final_key_length,
                    qber,
                    secure: true,
                    message: format!(
                        "Secure key generated! QBER: {:.2}%, Disclosed bits: {disclosed_bits}",
                        qber * 100.0
                    ),
                };
                let key = self.complete_with_key(session_id, &result, material, final_key_length);
                Ok(ExchangeOutcome::Completed(key))
            }
            Ok(PostProcessed::Aborted {
                qber,
                raw_key_length,
                message,
            }) => {
                warn!(session_id = %session_id, qber, "exchange aborted");
                let result = KeyExchangeResult {
                    key: Vec::new(),
                    raw_key_length,
                    final_key_length: 0,
                    qber,
                    secure: false,
                    message: message.clone(),
                };
                self.record_result(session_id, SessionStatus::Aborted, &result);
                Ok(ExchangeOutcome::Aborted { qber, message })
            }
            Err(err) => {
                self.record_failure(session_id, &err.to_string());
                Err(err)
            }
        }
    }

    /// Returns a snapshot of a session.
    pub fn get_session(&self, session_id: Uuid) -> Result<SessionRecord, SessionError> {
        self.tables
            .read()
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::SessionNotFound)
    }

    /// Returns a key to one of the two parties of its session.
    ///
    /// # Errors
    ///
    /// `KeyNotFound`, `Unauthorized` for anyone who is neither Alice nor
    /// Bob, or `KeyExpired` (the key is deactivated) past its TTL.
    pub fn get_key(&self, key_id: Uuid, user_id: &str) -> Result<KeyRecord, SessionError> {
        let tables = self.tables.upgradable_read();

        let key = tables.keys.get(&key_id).ok_or(SessionError::KeyNotFound)?;
        let session = tables
            .sessions
            .get(&key.session_id)
            .ok_or(SessionError::SessionNotFound)?;

        let authorized =
            session.alice_id == user_id || session.bob_id.as_deref() == Some(user_id);
        if !authorized {
            return Err(SessionError::Unauthorized);
        }

        if Utc::now() > key.expires_at {
            let mut tables = RwLockUpgradableReadGuard::upgrade(tables);
            if let Some(key) = tables.keys.get_mut(&key_id) {
                key.is_active = false;
            }
            return Err(SessionError::KeyExpired);
        }

        Ok(key.clone())
    }

    /// Deactivates a key and stamps its use time.
    pub fn revoke_key(&self, key_id: Uuid) -> Result<(), SessionError> {
        let mut tables = self.tables.write();
        let key = tables
            .keys
            .get_mut(&key_id)
            .ok_or(SessionError::KeyNotFound)?;

        key.is_active = false;
        key.used_at = Some(Utc::now());

        Ok(())
    }

    /// Drops every session and key past its TTL; returns how many records
    /// were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut tables = self.tables.write();

        let before = tables.sessions.len() + tables.keys.len();
        tables.sessions.retain(|_, session| now <= session.expires_at);
        tables.keys.retain(|_, key| now <= key.expires_at);

        before - (tables.sessions.len() + tables.keys.len())
    }

    fn begin_exchange(&self, session_id: Uuid) -> Result<SessionRecord, SessionError> {
        let mut tables = self.tables.write();
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound)?;

        if session.status != SessionStatus::Active {
            return Err(SessionError::NotActive);
        }

        session.status = SessionStatus::Initiating;
        Ok(session.clone())
    }

    fn run_post_processing(
        &self,
        session: &SessionRecord,
        protocol: &Bb84Protocol,
    ) -> Result<PostProcessed, SessionError> {
        let alice = protocol.alice_generate_qubits()?;
        let bob = protocol.bob_measure_qubits(&alice.qubits)?;
        let sifted = protocol.basis_reconciliation(&alice, &bob)?;

        let estimate = protocol.estimate_qber(&sifted)?;
        let qber = estimate.qber;
        let raw_key_length = sifted.len();

        if qber > protocol.qber_threshold() {
            return Ok(PostProcessed::Aborted {
                qber,
                raw_key_length,
                message: format!(
                    "QBER too high: {:.2}% (threshold: {:.2}%)",
                    qber * 100.0,
                    protocol.qber_threshold() * 100.0
                ),
            });
        }

        let corrector = CascadeCorrector::new(qber);
        let report = corrector.correct(&sifted.alice_key, &sifted.bob_key)?;

        let (keys_match, residual) =
            verify_key_correctness(&sifted.alice_key, &report.corrected_key);
        if !keys_match {
            return Err(SessionError::ReconciliationDiverged(residual * 100.0));
        }

        let sampled_bits = estimate.sampled_indices.len();
        let leakage =
            calculate_information_leakage(sampled_bits + report.disclosed_bits, raw_key_length);

        let secure_length = calculate_secure_key_length(
            raw_key_length,
            qber,
            report.disclosed_bits,
            DEFAULT_SECURITY_PARAMETER,
        );
        if secure_length < session.key_length {
            return Err(AmplifyError::InsufficientSecurity {
                target: session.key_length,
                max_secure: secure_length as i64,
            }
            .into());
        }

        let amplifier = PrivacyAmplifier::new(AmplificationMethod::default());
        let material = amplifier.amplify(&sifted.alice_key, leakage, session.key_length)?;

        Ok(PostProcessed::Completed {
            material,
            qber,
            raw_key_length,
            disclosed_bits: report.disclosed_bits,
        })
    }

    /// Marks the session completed and stores the key in one critical
    /// section.
    fn complete_with_key(
        &self,
        session_id: Uuid,
        result: &KeyExchangeResult,
        material: Vec<u8>,
        key_length_bits: usize,
    ) -> KeyRecord {
        let now = Utc::now();
        let key = KeyRecord {
            key_id: Uuid::new_v4(),
            session_id,
            material,
            key_length_bits,
            generated_at: now,
            expires_at: now + Duration::hours(KEY_TTL_HOURS),
            used_at: None,
            is_active: true,
        };

        let mut tables = self.tables.write();
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.status = SessionStatus::Completed;
            session.qber = Some(result.qber);
            session.raw_key_length = Some(result.raw_key_length);
            session.final_key_length = Some(result.final_key_length);
            session.is_secure = Some(true);
            session.message = Some(result.message.clone());
            session.completed_at = Some(now);
        }
        tables.keys.insert(key.key_id, key.clone());
        drop(tables);

        info!(
            session_id = %session_id,
            key_id = %key.key_id,
            qber = result.qber,
            "exchange completed, key stored"
        );

        key
    }

    fn record_result(&self, session_id: Uuid, status: SessionStatus, result: &KeyExchangeResult) {
        let mut tables = self.tables.write();
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.status = status;
            session.qber = Some(result.qber);
            session.raw_key_length = Some(result.raw_key_length);
            session.final_key_length = Some(result.final_key_length);
            session.is_secure = Some(result.secure);
            session.message = Some(result.message.clone());
            if status.is_terminal() {
                session.completed_at = Some(Utc::now());
            }
        }
    }

    fn record_failure(&self, session_id: Uuid, message: &str) {
        warn!(session_id = %session_id, "exchange failed: {message}");

        let mut tables = self.tables.write();
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.status = SessionStatus::Failed;
            session.is_secure = Some(false);
            session.message = Some(message.to_string());
            session.completed_at = Some(Utc::now());
        }
    }
}

enum PostProcessed {
    Completed {
        material: Vec<u8>,
        qber: f64,
        raw_key_length: usize,
        disclosed_bits: usize,
    },
    Aborted {
        qber: f64,
        raw_key_length: usize,
        message: String,
    },
}

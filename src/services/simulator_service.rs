//! src/services/simulator_service.rs
//!
//! SimulatorService: in-memory registry of upload sessions behind the demo
//! HTTP API. Each session owns its coordinator, simulated transport and
//! presigning secret. Nothing is persisted. Once the registry holds more
//! than `max_sessions` entries, the oldest finished sessions are evicted.

use crate::{
    models::{
        multipart::{PartSizePolicy, SessionStatus, UploadSession},
        token::{PresignedToken, ValidationResult},
        verification::VerificationResult,
    },
    services::{
        byte_source::ByteSource,
        coordinator::{CoordinatorConfig, UploadCoordinator},
        error::{UploadError, UploadResult},
        presigner::{PresignConfig, PresignedUrlSimulator},
        transport::{SimulatedTransport, SimulationConfig, Transport},
        verifier::verify,
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_SESSIONS: usize = 256;
use uuid::Uuid;

/// Engine settings applied to every session unless a request overrides them.
#[derive(Debug, Clone, Copy)]
pub struct EngineDefaults {
    pub policy: PartSizePolicy,
    pub coordinator: CoordinatorConfig,
    pub simulation: SimulationConfig,
    pub single_use_tokens: bool,
    /// Registry size above which finished sessions are evicted.
    pub max_sessions: usize,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            policy: PartSizePolicy::default(),
            coordinator: CoordinatorConfig::default(),
            simulation: SimulationConfig::default_with_seed(0),
            single_use_tokens: false,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

/// Per-session overrides. Absent fields fall back to [`EngineDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionOptions {
    pub part_size: Option<u64>,
    pub min_part_size: Option<u64>,
    pub max_parts: Option<u32>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub latency_ms: Option<u64>,
    pub failure_rate: Option<f64>,
    pub corruption_rate: Option<f64>,
    pub seed: Option<u64>,
    /// Grow the part size instead of rejecting payloads that need too many parts.
    #[serde(default)]
    pub fit: bool,
}

/// Token as sent by a client: compact string or structured fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenInput {
    Compact(String),
    Structured(PresignedToken),
}

impl TokenInput {
    pub fn into_token(self) -> UploadResult<PresignedToken> {
        match self {
            TokenInput::Compact(compact) => compact.parse(),
            TokenInput::Structured(token) => Ok(token),
        }
    }
}

struct SessionEntry {
    coordinator: Arc<UploadCoordinator>,
    options: SessionOptions,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SimulatorService {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    defaults: EngineDefaults,
}

impl SimulatorService {
    pub fn new(defaults: EngineDefaults) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            defaults,
        }
    }

    pub fn defaults(&self) -> &EngineDefaults {
        &self.defaults
    }

    /// Build a coordinator for `payload` without registering or running it.
    pub fn build_coordinator(
        &self,
        payload: ByteSource,
        options: &SessionOptions,
    ) -> UploadResult<UploadCoordinator> {
        let policy = self.policy_for(&payload, options);
        let config = self.config_for(options);
        let transport = self.transport_for(options)?;
        let coordinator = UploadCoordinator::new(payload, policy, config, transport)?;
        Ok(coordinator.with_presigner(self.presigner()))
    }

    /// Register a new session and start uploading it in the background.
    pub async fn create_session(
        &self,
        payload: ByteSource,
        options: SessionOptions,
    ) -> UploadResult<UploadSession> {
        let coordinator = Arc::new(self.build_coordinator(payload, &options)?);
        self.register(coordinator, options).await
    }

    /// Start a fresh session that keeps the uploaded parts of an aborted one.
    pub async fn resume_session(&self, id: Uuid) -> UploadResult<UploadSession> {
        let (previous, options) = {
            let sessions = self.sessions.read().await;
            let entry = sessions.get(&id).ok_or(UploadError::SessionNotFound(id))?;
            (Arc::clone(&entry.coordinator), entry.options.clone())
        };

        let snapshot = previous.snapshot().await;
        if snapshot.status != SessionStatus::Aborted {
            return Err(UploadError::ResumeMismatch(format!(
                "session `{}` is {:?}; only aborted sessions can be resumed",
                id, snapshot.status
            )));
        }

        let coordinator = UploadCoordinator::resume(
            &snapshot,
            previous.payload().clone(),
            self.config_for(&options),
            self.transport_for(&options)?,
        )?
        .with_presigner(self.presigner());
        self.register(Arc::new(coordinator), options).await
    }

    async fn register(
        &self,
        coordinator: Arc<UploadCoordinator>,
        options: SessionOptions,
    ) -> UploadResult<UploadSession> {
        let id = coordinator.session_id();
        let snapshot = coordinator.snapshot().await;
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                id,
                SessionEntry {
                    coordinator: Arc::clone(&coordinator),
                    options,
                    created_at: snapshot.created_at,
                },
            );
        }
        self.evict_finished().await;

        tokio::spawn(async move {
            match coordinator.run().await {
                Ok(etag) => info!(session_id = %id, etag = %etag.value, "background upload finished"),
                Err(err) => warn!(session_id = %id, error = %err, "background upload failed"),
            }
        });
        Ok(snapshot)
    }

    pub async fn coordinator(&self, id: Uuid) -> UploadResult<Arc<UploadCoordinator>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .map(|entry| Arc::clone(&entry.coordinator))
            .ok_or(UploadError::SessionNotFound(id))
    }

    pub async fn snapshot(&self, id: Uuid) -> UploadResult<UploadSession> {
        Ok(self.coordinator(id).await?.snapshot().await)
    }

    /// Snapshots of every session, oldest first.
    pub async fn list_sessions(&self) -> Vec<UploadSession> {
        let coordinators: Vec<_> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .map(|entry| Arc::clone(&entry.coordinator))
                .collect()
        };

        let mut snapshots = Vec::with_capacity(coordinators.len());
        for coordinator in coordinators {
            snapshots.push(coordinator.snapshot().await);
        }
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    pub async fn cancel_session(&self, id: Uuid) -> UploadResult<UploadSession> {
        Ok(self.coordinator(id).await?.cancel().await)
    }

    /// Cancel a session and drop it from the registry, releasing its buffers.
    pub async fn remove_session(&self, id: Uuid) -> UploadResult<UploadSession> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(UploadError::SessionNotFound(id))?;
        info!(session_id = %id, "session removed");
        Ok(entry.coordinator.cancel().await)
    }

    /// Drop the oldest terminal sessions while the registry is over its cap.
    /// Sessions still uploading are never evicted.
    async fn evict_finished(&self) -> usize {
        let candidates: Vec<(Uuid, DateTime<Utc>, Arc<UploadCoordinator>)> = {
            let sessions = self.sessions.read().await;
            if sessions.len() <= self.defaults.max_sessions {
                return 0;
            }
            sessions
                .iter()
                .map(|(id, entry)| (*id, entry.created_at, Arc::clone(&entry.coordinator)))
                .collect()
        };

        let mut finished = Vec::new();
        for (id, created_at, coordinator) in candidates {
            if coordinator.status().await.is_terminal() {
                finished.push((created_at, id));
            }
        }
        finished.sort();

        let mut sessions = self.sessions.write().await;
        let excess = sessions.len().saturating_sub(self.defaults.max_sessions);
        let mut evicted = 0;
        for (_, id) in finished.into_iter().take(excess) {
            if sessions.remove(&id).is_some() {
                debug!(session_id = %id, "evicted finished session");
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(count = evicted, "evicted finished upload sessions");
        }
        evicted
    }

    pub async fn verify_session(
        &self,
        id: Uuid,
        expected_etag: Option<&str>,
    ) -> UploadResult<VerificationResult> {
        let session = self.snapshot(id).await?;
        Ok(verify(&session, expected_etag))
    }

    /// Flip one byte of a part's stored buffer.
    pub async fn tamper_part(
        &self,
        id: Uuid,
        part_number: u32,
        offset: u64,
    ) -> UploadResult<VerificationResult> {
        let coordinator = self.coordinator(id).await?;
        let session = coordinator.snapshot().await;
        let stored = session
            .part(part_number)
            .ok_or(UploadError::UnknownPart(part_number))?
            .received
            .clone()
            .ok_or(UploadError::IncompleteUpload {
                missing: vec![part_number],
            })?;

        let index = usize::try_from(offset)
            .ok()
            .filter(|index| *index < stored.len())
            .ok_or(UploadError::OutOfRange {
                offset,
                width: 1,
                len: stored.len() as u64,
            })?;
        let mut tampered = stored.to_vec();
        tampered[index] ^= 0xff;
        coordinator
            .overwrite_received(part_number, Bytes::from(tampered))
            .await?;

        warn!(session_id = %id, part_number, offset, "tampered with stored part");
        Ok(verify(&coordinator.snapshot().await, None))
    }

    pub async fn issue_token(
        &self,
        id: Uuid,
        part_number: u32,
        ttl_secs: Option<u64>,
    ) -> UploadResult<PresignedToken> {
        let coordinator = self.coordinator(id).await?;
        if coordinator.snapshot().await.part(part_number).is_none() {
            return Err(UploadError::UnknownPart(part_number));
        }
        let ttl = ttl_secs.unwrap_or(coordinator.config().token_ttl_secs);
        Ok(coordinator.issue_token_with_ttl(part_number, ttl))
    }

    pub async fn validate_token(
        &self,
        id: Uuid,
        token: TokenInput,
        part_number: Option<u32>,
    ) -> UploadResult<ValidationResult> {
        let coordinator = self.coordinator(id).await?;
        let token = token.into_token()?;
        Ok(coordinator.validate_token(&token, part_number))
    }

    fn policy_for(&self, payload: &ByteSource, options: &SessionOptions) -> PartSizePolicy {
        let mut policy = self.defaults.policy;
        if let Some(part_size) = options.part_size {
            // An explicit part size without an explicit floor is taken as-is.
            policy = PartSizePolicy::fixed(part_size).with_max_parts(policy.max_parts);
        }
        if let Some(min_part_size) = options.min_part_size {
            policy = policy.with_min_part_size(min_part_size);
        }
        if let Some(max_parts) = options.max_parts {
            policy = policy.with_max_parts(max_parts);
        }
        if options.fit {
            policy = policy.fit_to(payload.len());
        }
        policy
    }

    fn config_for(&self, options: &SessionOptions) -> CoordinatorConfig {
        let defaults = self.defaults.coordinator;
        CoordinatorConfig {
            concurrency_limit: options.concurrency.unwrap_or(defaults.concurrency_limit),
            max_retries: options.max_retries.unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    fn transport_for(&self, options: &SessionOptions) -> UploadResult<Arc<dyn Transport>> {
        let defaults = self.defaults.simulation;
        let failure_rate = options.failure_rate.unwrap_or(defaults.failure_rate);
        let corruption_rate = options.corruption_rate.unwrap_or(defaults.corruption_rate);
        for (name, rate) in [("failure_rate", failure_rate), ("corruption_rate", corruption_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(UploadError::InvalidPolicy(format!(
                    "{} must be within [0, 1], got {}",
                    name, rate
                )));
            }
        }

        let simulation = SimulationConfig {
            latency: options
                .latency_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.latency),
            failure_rate,
            corruption_rate,
            seed: options.seed.unwrap_or_else(rand::random),
            ..defaults
        };
        Ok(Arc::new(SimulatedTransport::new(simulation)))
    }

    fn presigner(&self) -> Arc<PresignedUrlSimulator> {
        Arc::new(PresignedUrlSimulator::with_random_secret(PresignConfig {
            single_use: self.defaults.single_use_tokens,
        }))
    }
}

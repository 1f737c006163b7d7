//! src/services/coordinator.rs
//!
//! UploadCoordinator: drives the per-part and session state machines of one
//! multipart upload.
//!
//! Part:    Pending -> Uploading -> Uploaded | Failed,  Failed -> Pending (attempt += 1)
//! Session: Initiated -> InProgress -> Completed | Aborted
//!
//! The session arena sits behind a single `RwLock`. Writers take it only for
//! short transitions (claim, settle, complete, abort); transport and hashing
//! run outside the lock. A part in `Uploading` is owned by exactly one
//! worker, and any other claim on it fails with `PartBusy`.

use crate::{
    models::{
        etag::{ETag, PartDigest},
        multipart::{PartSizePolicy, PartState, PartStatus, SessionStatus, UploadSession},
        token::{PresignedToken, ValidationResult},
    },
    services::{
        byte_source::ByteSource,
        clock::{Clock, SystemClock},
        error::{UploadError, UploadResult},
        etag_aggregator::compute_session_etag,
        hasher,
        partitioner::partition,
        presigner::{PresignConfig, PresignedUrlSimulator},
        transport::{Transport, TransportError},
    },
};
use bytes::Bytes;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{OwnedSemaphorePermit, RwLock, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Maximum number of parts in flight at once.
    pub concurrency_limit: usize,

    /// Retries allowed per part after its first attempt.
    pub max_retries: u32,

    /// Lifetime of the presigned token issued for each attempt.
    pub token_ttl_secs: u64,

    /// Pause between automatic retries of the same part.
    pub retry_backoff: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            max_retries: 3,
            token_ttl_secs: 900,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

enum Claim {
    /// Part was already uploaded; nothing to do.
    Settled(PartState),
    Owned { attempt: u32, data: Bytes },
}

enum Outcome {
    Received { bytes: Bytes, digest: PartDigest },
    Transport(TransportError),
    Cancelled,
}

pub struct UploadCoordinator {
    session_id: Uuid,
    config: CoordinatorConfig,
    payload: ByteSource,
    session: RwLock<UploadSession>,
    transport: Arc<dyn Transport>,
    presigner: Arc<PresignedUrlSimulator>,
    clock: Arc<dyn Clock>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl UploadCoordinator {
    /// Partition the payload and open a session in `Initiated`.
    ///
    /// An invalid policy is rejected here, before any part state exists.
    pub fn new(
        payload: ByteSource,
        policy: PartSizePolicy,
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
    ) -> UploadResult<Self> {
        let specs = partition(payload.len(), &policy)?;
        let session = UploadSession::new(policy, payload.len(), specs);
        info!(
            session_id = %session.session_id,
            payload_len = payload.len(),
            parts = session.part_count(),
            part_size = policy.fixed_part_size,
            "initiated multipart session"
        );
        Ok(Self::from_session(session, payload, config, transport))
    }

    /// Start a new session over the same payload, keeping every part the
    /// previous session already uploaded.
    ///
    /// The previous session is not touched; if it was aborted it stays aborted.
    pub fn resume(
        previous: &UploadSession,
        payload: ByteSource,
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
    ) -> UploadResult<Self> {
        if previous.payload_len != payload.len() {
            return Err(UploadError::ResumeMismatch(format!(
                "payload is {} bytes, session `{}` covered {}",
                payload.len(),
                previous.session_id,
                previous.payload_len
            )));
        }
        let specs = partition(payload.len(), &previous.policy)?;
        if specs.len() != previous.parts.len()
            || specs.iter().zip(&previous.parts).any(|(a, b)| *a != b.spec)
        {
            return Err(UploadError::ResumeMismatch(
                "part layout differs from the previous session".into(),
            ));
        }

        let mut session = UploadSession::new(previous.policy, payload.len(), specs);
        session.resumed_from = Some(previous.session_id);
        let mut carried = 0;
        for (fresh, old) in session.parts.iter_mut().zip(&previous.parts) {
            if !old.is_uploaded() {
                continue;
            }
            let expected = hasher::digest(&payload.part(&old.spec)?);
            if old.digest == Some(expected) {
                *fresh = old.clone();
                carried += 1;
            }
        }

        info!(
            session_id = %session.session_id,
            resumed_from = %previous.session_id,
            carried,
            parts = session.part_count(),
            "resumed multipart session"
        );
        Ok(Self::from_session(session, payload, config, transport))
    }

    fn from_session(
        session: UploadSession,
        payload: ByteSource,
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let config = CoordinatorConfig {
            concurrency_limit: config.concurrency_limit.max(1),
            ..config
        };
        Self {
            session_id: session.session_id,
            slots: Arc::new(Semaphore::new(config.concurrency_limit)),
            config,
            payload,
            session: RwLock::new(session),
            transport,
            presigner: Arc::new(PresignedUrlSimulator::with_random_secret(
                PresignConfig::default(),
            )),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_presigner(mut self, presigner: Arc<PresignedUrlSimulator>) -> Self {
        self.presigner = presigner;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn payload(&self) -> &ByteSource {
        &self.payload
    }

    pub fn presigner(&self) -> &Arc<PresignedUrlSimulator> {
        &self.presigner
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Point-in-time copy of the session, including stored part buffers.
    pub async fn snapshot(&self) -> UploadSession {
        self.session.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.read().await.status
    }

    /// Replace a stored part buffer, e.g. to demonstrate tamper detection.
    pub async fn overwrite_received(&self, part_number: u32, bytes: Bytes) -> UploadResult<()> {
        let mut session = self.session.write().await;
        if session.overwrite_received(part_number, bytes) {
            Ok(())
        } else {
            Err(UploadError::UnknownPart(part_number))
        }
    }

    pub fn issue_token(&self, part_number: u32) -> PresignedToken {
        self.issue_token_with_ttl(part_number, self.config.token_ttl_secs)
    }

    pub fn issue_token_with_ttl(&self, part_number: u32, ttl_secs: u64) -> PresignedToken {
        self.presigner.issue(part_number, ttl_secs, self.clock.now())
    }

    pub fn validate_token(
        &self,
        token: &PresignedToken,
        part_number: Option<u32>,
    ) -> ValidationResult {
        let now = self.clock.now();
        match part_number {
            Some(part_number) => self.presigner.validate_for_part(token, part_number, now),
            None => self.presigner.validate(token, now),
        }
    }

    /// One upload attempt for `part_number`, authorized by `token`.
    ///
    /// Waits for a worker slot first. Failures are reported, not retried.
    pub async fn submit_part(
        &self,
        part_number: u32,
        token: &PresignedToken,
    ) -> UploadResult<PartState> {
        let _permit = self.acquire_slot().await?;
        self.attempt(part_number, token).await
    }

    /// Upload `part_number`, retrying transient failures with fresh tokens.
    pub async fn upload_part(&self, part_number: u32) -> UploadResult<PartState> {
        let _permit = self.acquire_slot().await?;
        self.upload_with_retries(part_number).await
    }

    /// Upload every outstanding part on the bounded worker pool, then
    /// complete the session.
    ///
    /// Parts are scheduled in ascending part-number order; the scheduler
    /// waits for a free slot before starting the next one. Any part that
    /// cannot be uploaded aborts the session.
    pub async fn run(self: &Arc<Self>) -> UploadResult<ETag> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(UploadError::AlreadyRunning(self.session_id));
        }
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(self: &Arc<Self>) -> UploadResult<ETag> {
        let outstanding: Vec<u32> = {
            let session = self.session.read().await;
            match session.status {
                SessionStatus::Completed => {
                    if let Some(etag) = &session.etag {
                        return Ok(etag.clone());
                    }
                }
                SessionStatus::Aborted => {
                    return Err(UploadError::SessionClosed {
                        session_id: self.session_id,
                        status: session.status,
                    });
                }
                SessionStatus::Initiated | SessionStatus::InProgress => {}
            }
            session
                .parts
                .iter()
                .filter(|p| !p.is_uploaded())
                .map(PartState::part_number)
                .collect()
        };

        debug!(
            session_id = %self.session_id,
            outstanding = outstanding.len(),
            concurrency = self.config.concurrency_limit,
            "scheduling parts"
        );

        let mut workers = JoinSet::new();
        let mut root_cause: Option<UploadError> = None;
        for part_number in outstanding {
            let permit = match self.acquire_slot().await {
                Ok(permit) => permit,
                Err(err) => {
                    record_error(&mut root_cause, err);
                    break;
                }
            };
            let this = Arc::clone(self);
            workers.spawn(async move {
                let _permit = permit;
                let result = this.upload_with_retries(part_number).await;
                if let Err(err) = &result {
                    if !matches!(err, UploadError::Cancelled(_)) {
                        this.abort(&err.to_string()).await;
                    }
                }
                result
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => record_error(&mut root_cause, err),
                Err(join_err) => {
                    let err = UploadError::Worker(join_err.to_string());
                    self.abort(&err.to_string()).await;
                    record_error(&mut root_cause, err);
                }
            }
        }

        if let Some(err) = root_cause {
            self.abort(&err.to_string()).await;
            return Err(err);
        }
        self.complete().await
    }

    /// Compute the ETag and mark the session `Completed`.
    ///
    /// Fails with `IncompleteUpload` while any part is not `Uploaded`.
    /// Calling it again on a completed session returns the same ETag.
    pub async fn complete(&self) -> UploadResult<ETag> {
        let mut session = self.session.write().await;
        match session.status {
            SessionStatus::Completed => {
                if let Some(etag) = &session.etag {
                    return Ok(etag.clone());
                }
            }
            SessionStatus::Aborted => {
                return Err(UploadError::SessionClosed {
                    session_id: self.session_id,
                    status: session.status,
                });
            }
            SessionStatus::Initiated | SessionStatus::InProgress => {}
        }

        let etag = compute_session_etag(&session)?;
        session.etag = Some(etag.clone());
        session.status = SessionStatus::Completed;
        info!(
            session_id = %self.session_id,
            etag = %etag.value,
            parts = etag.part_count,
            "multipart session completed"
        );
        Ok(etag)
    }

    /// Abort the session. In-flight attempts observe the cancellation and
    /// their results are discarded; uploaded parts keep their digests.
    pub async fn cancel(&self) -> UploadSession {
        self.abort("cancelled by caller").await;
        self.snapshot().await
    }

    async fn abort(&self, reason: &str) -> bool {
        self.cancel.cancel();
        let mut session = self.session.write().await;
        if session.status.is_terminal() {
            return false;
        }
        session.status = SessionStatus::Aborted;
        info!(session_id = %self.session_id, reason, "multipart session aborted");
        true
    }

    async fn acquire_slot(&self) -> UploadResult<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled(self.session_id)),
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| UploadError::Cancelled(self.session_id))
            }
        }
    }

    async fn upload_with_retries(&self, part_number: u32) -> UploadResult<PartState> {
        loop {
            let token = self.issue_token(part_number);
            match self.attempt(part_number, &token).await {
                Ok(state) => return Ok(state),
                Err(err) if err.is_retryable() => {
                    warn!(session_id = %self.session_id, part_number, error = %err, "retrying part");
                    if !self.config.retry_backoff.is_zero() {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                return Err(UploadError::Cancelled(self.session_id));
                            }
                            _ = tokio::time::sleep(self.config.retry_backoff) => {}
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, part_number: u32, token: &PresignedToken) -> UploadResult<PartState> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled(self.session_id));
        }
        let validation = self
            .presigner
            .validate_for_part(token, part_number, self.clock.now());
        let (attempt, data) = match self.claim(part_number, validation).await? {
            Claim::Settled(state) => return Ok(state),
            Claim::Owned { attempt, data } => (attempt, data),
        };

        let expected = hasher::digest(&data);
        debug!(
            session_id = %self.session_id,
            part_number,
            attempt,
            bytes = data.len(),
            "uploading part"
        );
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Outcome::Cancelled,
            sent = self.transport.send_part(part_number, attempt, data) => match sent {
                Ok(bytes) => {
                    let digest = hasher::digest(&bytes);
                    Outcome::Received { bytes, digest }
                }
                Err(err) => Outcome::Transport(err),
            },
        };
        self.settle(part_number, expected, outcome).await
    }

    /// Take ownership of a part for one attempt.
    async fn claim(&self, part_number: u32, validation: ValidationResult) -> UploadResult<Claim> {
        let mut session = self.session.write().await;
        let status = session.status;
        let max_retries = self.config.max_retries;
        let part = session
            .part_mut(part_number)
            .ok_or(UploadError::UnknownPart(part_number))?;

        match part.status {
            PartStatus::Uploaded => {
                return match validation.reason {
                    Some(reason) => Err(UploadError::TokenInvalid {
                        part_number,
                        reason,
                    }),
                    None => Ok(Claim::Settled(part.clone())),
                };
            }
            _ if status.is_terminal() => {
                return Err(UploadError::SessionClosed {
                    session_id: self.session_id,
                    status,
                });
            }
            PartStatus::Uploading => return Err(UploadError::PartBusy(part_number)),
            PartStatus::Failed if part.attempt >= max_retries => {
                let err = UploadError::RetriesExhausted {
                    part_number,
                    attempts: part.attempt + 1,
                    last_error: part.last_error.clone().unwrap_or_default(),
                };
                session.status = SessionStatus::Aborted;
                self.cancel.cancel();
                warn!(session_id = %self.session_id, part_number, "part has no retries left");
                return Err(err);
            }
            PartStatus::Pending | PartStatus::Failed => {}
        }

        if let Some(reason) = validation.reason {
            part.status = PartStatus::Failed;
            part.last_error = Some(reason.to_string());
            warn!(
                session_id = %self.session_id,
                part_number,
                %reason,
                "presigned token rejected"
            );
            return Err(UploadError::TokenInvalid {
                part_number,
                reason,
            });
        }

        let data = self.payload.part(&part.spec)?;
        if part.status == PartStatus::Failed {
            part.attempt += 1;
            part.status = PartStatus::Pending;
        }
        part.status = PartStatus::Uploading;
        let attempt = part.attempt;
        if status == SessionStatus::Initiated {
            session.status = SessionStatus::InProgress;
        }
        Ok(Claim::Owned { attempt, data })
    }

    /// Record the outcome of an attempt and release ownership of the part.
    async fn settle(
        &self,
        part_number: u32,
        expected: PartDigest,
        outcome: Outcome,
    ) -> UploadResult<PartState> {
        let mut session = self.session.write().await;
        let aborted = session.status == SessionStatus::Aborted;
        let max_retries = self.config.max_retries;
        let part = session
            .part_mut(part_number)
            .ok_or(UploadError::UnknownPart(part_number))?;
        let attempt = part.attempt;

        let error = match outcome {
            Outcome::Cancelled => None,
            _ if aborted => None,
            Outcome::Received { bytes, digest } if digest == expected => {
                part.status = PartStatus::Uploaded;
                part.digest = Some(digest);
                part.received_bytes = bytes.len() as u64;
                part.received = Some(bytes);
                part.last_error = None;
                debug!(session_id = %self.session_id, part_number, attempt, %digest, "part uploaded");
                return Ok(part.clone());
            }
            Outcome::Received { bytes, digest } => {
                part.received_bytes = bytes.len() as u64;
                Some(UploadError::HashMismatch {
                    part_number,
                    expected: expected.to_hex(),
                    actual: digest.to_hex(),
                })
            }
            Outcome::Transport(err) => Some(UploadError::TransportFailure {
                part_number,
                reason: err.0,
            }),
        };

        let Some(error) = error else {
            part.status = PartStatus::Failed;
            part.last_error = Some("discarded: session cancelled".into());
            debug!(session_id = %self.session_id, part_number, attempt, "discarded in-flight part");
            return Err(UploadError::Cancelled(self.session_id));
        };

        part.status = PartStatus::Failed;
        part.last_error = Some(error.to_string());
        if attempt < max_retries {
            return Err(error);
        }

        session.status = SessionStatus::Aborted;
        self.cancel.cancel();
        warn!(
            session_id = %self.session_id,
            part_number,
            attempts = attempt + 1,
            error = %error,
            "part exhausted its retries"
        );
        Err(UploadError::RetriesExhausted {
            part_number,
            attempts: attempt + 1,
            last_error: error.to_string(),
        })
    }
}

/// Keep the first error that explains a failed run; cancellations are only
/// kept when nothing better is known.
fn record_error(slot: &mut Option<UploadError>, err: UploadError) {
    match slot {
        None => *slot = Some(err),
        Some(UploadError::Cancelled(_)) if !matches!(err, UploadError::Cancelled(_)) => {
            *slot = Some(err)
        }
        Some(_) => {}
    }
}

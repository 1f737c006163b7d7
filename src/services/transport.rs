//! Pluggable simulated transport for part uploads.
//!
//! The coordinator hands each attempt's bytes to a [`Transport`] and gets
//! back what the simulated store received. Implementations decide latency,
//! failures and corruption:
//!
//! - [`SimulatedTransport`]: seeded randomness (ChaCha8), reproducible runs.
//! - [`ScriptedTransport`]: explicit per-part outcomes for deterministic tests.

use async_trait::async_trait;
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one part attempt and return the bytes the store received.
    async fn send_part(
        &self,
        part_number: u32,
        attempt: u32,
        data: Bytes,
    ) -> Result<Bytes, TransportError>;
}

/// Configuration for the randomized transport.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    /// Base latency per attempt.
    pub latency: Duration,

    /// Uniform extra latency in `[0, jitter]`.
    pub jitter: Duration,

    /// Probability in [0.0, 1.0] that an attempt fails outright.
    pub failure_rate: f64,

    /// Probability in [0.0, 1.0] that one byte arrives flipped.
    pub corruption_rate: f64,

    /// Random seed for determinism.
    pub seed: u64,
}

impl SimulationConfig {
    /// No latency, no failures.
    pub fn perfect(seed: u64) -> Self {
        Self {
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            failure_rate: 0.0,
            corruption_rate: 0.0,
            seed,
        }
    }

    /// Moderate impairments, suitable for the interactive demo.
    pub fn default_with_seed(seed: u64) -> Self {
        Self {
            latency: Duration::from_millis(40),
            jitter: Duration::from_millis(20),
            failure_rate: 0.1,
            corruption_rate: 0.02,
            seed,
        }
    }
}

pub struct SimulatedTransport {
    config: SimulationConfig,
    rng: Mutex<ChaCha8Rng>,
    attempts: AtomicU64,
}

impl SimulatedTransport {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed)),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Roll every random decision for one attempt up front so the lock is
    /// never held across an await.
    fn roll(&self, len: usize) -> (Duration, bool, Option<usize>) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let delay = self.config.latency
            + Duration::from_millis(if jitter_ms > 0 {
                rng.gen_range(0..=jitter_ms)
            } else {
                0
            });
        let fail = self.config.failure_rate > 0.0 && rng.r#gen::<f64>() < self.config.failure_rate;
        let corrupt_at = (len > 0
            && self.config.corruption_rate > 0.0
            && rng.r#gen::<f64>() < self.config.corruption_rate)
            .then(|| rng.gen_range(0..len));
        (delay, fail, corrupt_at)
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send_part(
        &self,
        part_number: u32,
        attempt: u32,
        data: Bytes,
    ) -> Result<Bytes, TransportError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let (delay, fail, corrupt_at) = self.roll(data.len());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError(format!(
                "simulated connection reset (part {}, attempt {})",
                part_number, attempt
            )));
        }
        Ok(match corrupt_at {
            Some(index) => flip_byte(&data, index),
            None => data,
        })
    }
}

/// What a scripted attempt should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Deliver,
    Fail(String),
    /// Deliver with the first byte flipped.
    Corrupt,
}

/// Transport that plays back queued outcomes per part, then delivers.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<u32, VecDeque<ScriptedOutcome>>>,
    calls: Mutex<HashMap<u32, u32>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the same latency to every attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(self, part_number: u32, outcome: ScriptedOutcome) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(part_number)
            .or_default()
            .push_back(outcome);
        self
    }

    /// Fail the next `times` attempts of `part_number`.
    pub fn fail_times(mut self, part_number: u32, times: u32) -> Self {
        for n in 0..times {
            self = self.push(
                part_number,
                ScriptedOutcome::Fail(format!("scripted failure #{}", n + 1)),
            );
        }
        self
    }

    /// Corrupt the next `times` attempts of `part_number`.
    pub fn corrupt_times(mut self, part_number: u32, times: u32) -> Self {
        for _ in 0..times {
            self = self.push(part_number, ScriptedOutcome::Corrupt);
        }
        self
    }

    /// Number of attempts the transport has seen for `part_number`.
    pub fn calls(&self, part_number: u32) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    fn next_outcome(&self, part_number: u32) -> ScriptedOutcome {
        *self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(part_number)
            .or_default() += 1;
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(&part_number)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedOutcome::Deliver)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_part(
        &self,
        part_number: u32,
        _attempt: u32,
        data: Bytes,
    ) -> Result<Bytes, TransportError> {
        let outcome = self.next_outcome(part_number);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match outcome {
            ScriptedOutcome::Deliver => Ok(data),
            ScriptedOutcome::Fail(reason) => Err(TransportError(reason)),
            ScriptedOutcome::Corrupt if data.is_empty() => Ok(data),
            ScriptedOutcome::Corrupt => Ok(flip_byte(&data, 0)),
        }
    }
}

fn flip_byte(data: &Bytes, index: usize) -> Bytes {
    let mut copy = data.to_vec();
    copy[index] ^= 0xff;
    Bytes::from(copy)
}

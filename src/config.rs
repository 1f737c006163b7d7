use crate::{
    models::multipart::PartSizePolicy,
    services::{
        coordinator::CoordinatorConfig, simulator_service::EngineDefaults,
        transport::SimulationConfig,
    },
};
use anyhow::{Context, Result, ensure};
use clap::Parser;
use std::{
    env,
    fmt::{Debug, Display},
    str::FromStr,
    time::Duration,
};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub engine: EngineDefaults,
    /// Run one simulated upload of this many bytes and exit instead of serving.
    pub simulate: Option<u64>,
    pub seed: Option<u64>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Multipart object upload simulator")]
pub struct Args {
    /// Host to bind to (overrides MULTIPART_SIM_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MULTIPART_SIM_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Part size in bytes (overrides MULTIPART_SIM_PART_SIZE)
    #[arg(long)]
    pub part_size: Option<u64>,

    /// Part-count ceiling (overrides MULTIPART_SIM_MAX_PARTS)
    #[arg(long)]
    pub max_parts: Option<u32>,

    /// Parts uploaded at once (overrides MULTIPART_SIM_CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries per part (overrides MULTIPART_SIM_MAX_RETRIES)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Presigned token lifetime (overrides MULTIPART_SIM_TOKEN_TTL_SECS)
    #[arg(long)]
    pub token_ttl_secs: Option<u64>,

    /// Simulated latency per attempt (overrides MULTIPART_SIM_LATENCY_MS)
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Probability an attempt fails (overrides MULTIPART_SIM_FAILURE_RATE)
    #[arg(long)]
    pub failure_rate: Option<f64>,

    /// Reject tokens on second use (overrides MULTIPART_SIM_SINGLE_USE_TOKENS)
    #[arg(long)]
    pub single_use_tokens: bool,

    /// Registry size above which finished sessions are evicted (overrides MULTIPART_SIM_MAX_SESSIONS)
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Simulate one upload of this many bytes, print the result and exit
    #[arg(long, value_name = "BYTES")]
    pub simulate: Option<u64>,

    /// Seed for the simulated payload and transport
    #[arg(long)]
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let defaults = EngineDefaults::default();

        // --- Environment fallback ---
        let env_host = env::var("MULTIPART_SIM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("MULTIPART_SIM_PORT", 3000u16)?;
        let env_part_size = env_parse("MULTIPART_SIM_PART_SIZE", defaults.policy.fixed_part_size)?;
        let env_max_parts = env_parse("MULTIPART_SIM_MAX_PARTS", defaults.policy.max_parts)?;
        let env_concurrency = env_parse(
            "MULTIPART_SIM_CONCURRENCY",
            defaults.coordinator.concurrency_limit,
        )?;
        let env_max_retries =
            env_parse("MULTIPART_SIM_MAX_RETRIES", defaults.coordinator.max_retries)?;
        let env_ttl = env_parse(
            "MULTIPART_SIM_TOKEN_TTL_SECS",
            defaults.coordinator.token_ttl_secs,
        )?;
        let env_latency = env_parse(
            "MULTIPART_SIM_LATENCY_MS",
            defaults.simulation.latency.as_millis() as u64,
        )?;
        let env_failure_rate =
            env_parse("MULTIPART_SIM_FAILURE_RATE", defaults.simulation.failure_rate)?;
        let env_single_use = env_parse("MULTIPART_SIM_SINGLE_USE_TOKENS", false)?;
        let env_max_sessions = env_parse("MULTIPART_SIM_MAX_SESSIONS", defaults.max_sessions)?;

        // --- Merge ---
        let part_size = args.part_size.unwrap_or(env_part_size);
        let failure_rate = args.failure_rate.unwrap_or(env_failure_rate);
        ensure!(part_size > 0, "part size must be positive");
        ensure!(
            (0.0..=1.0).contains(&failure_rate),
            "failure rate must be within [0, 1], got {}",
            failure_rate
        );

        let engine = EngineDefaults {
            policy: PartSizePolicy {
                fixed_part_size: part_size,
                min_part_size: defaults.policy.min_part_size.min(part_size),
                max_parts: args.max_parts.unwrap_or(env_max_parts),
            },
            coordinator: CoordinatorConfig {
                concurrency_limit: args.concurrency.unwrap_or(env_concurrency),
                max_retries: args.max_retries.unwrap_or(env_max_retries),
                token_ttl_secs: args.token_ttl_secs.unwrap_or(env_ttl),
                ..defaults.coordinator
            },
            simulation: SimulationConfig {
                latency: Duration::from_millis(args.latency_ms.unwrap_or(env_latency)),
                failure_rate,
                seed: args.seed.unwrap_or(defaults.simulation.seed),
                ..defaults.simulation
            },
            single_use_tokens: args.single_use_tokens || env_single_use,
            max_sessions: args.max_sessions.unwrap_or(env_max_sessions),
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            engine,
            simulate: args.simulate,
            seed: args.seed,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Debug + Display + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

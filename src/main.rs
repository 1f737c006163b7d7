use anyhow::{Context, Result};
use multipart_upload_sim::{
    config::AppConfig,
    routes::routes::app,
    services::{
        byte_source::ByteSource,
        simulator_service::{SessionOptions, SimulatorService},
        verifier::verify,
    },
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env_and_args().context("loading configuration")?;
    tracing::info!("Starting multipart-upload-sim with config: {:?}", cfg);

    let service = SimulatorService::new(cfg.engine);

    // --- One-shot simulation mode ---
    if let Some(len) = cfg.simulate {
        return simulate(&service, len, cfg.seed).await;
    }

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(service)).await?;

    Ok(())
}

/// Upload a seeded random payload of `len` bytes and print the outcome as JSON.
async fn simulate(service: &SimulatorService, len: u64, seed: Option<u64>) -> Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    let len = usize::try_from(len).context("payload length does not fit in memory")?;
    let mut payload = vec![0u8; len];
    ChaCha8Rng::seed_from_u64(seed).fill_bytes(&mut payload);

    let options = SessionOptions {
        seed: Some(seed),
        fit: true,
        ..SessionOptions::default()
    };
    let coordinator = Arc::new(
        service
            .build_coordinator(ByteSource::from(payload), &options)
            .context("creating upload session")?,
    );

    let outcome = coordinator.run().await;
    let session = coordinator.snapshot().await;
    let verification = verify(&session, None);

    let report = json!({
        "seed": seed,
        "etag": outcome.as_ref().ok().map(|etag| etag.to_string()),
        "error": outcome.as_ref().err().map(|err| err.to_string()),
        "session": session,
        "verification": verification,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    outcome.map(|_| ()).context("simulated upload failed")
}

//! kvcache demo - exercises the configured cache backend
//!
//! Opens the backend selected by the `CACHE_*` environment variables,
//! registers it with a manager, runs a few typed and rate-limited
//! operations, then waits for a shutdown signal and closes every cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kvcache::{
    backends, Cache, CacheError, CacheManager, CacheOptions, FixedWindowLimiter, RawCache,
};

const CACHE_NAME: &str = "default";

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    user_id: u64,
    user_name: String,
}

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load cache options from environment variables
/// 3. Open the configured backend and register it
/// 4. Run typed operations and rate limiter checks
/// 5. Close every cache on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = CacheOptions::from_env();
    info!(
        "Configuration loaded: backend={}, name={:?}, max_age={:?}, timeout={:?}",
        options.backend, options.name, options.max_age, options.timeout
    );

    let raw = backends::open(&options)
        .await
        .with_context(|| format!("opening {} cache", options.backend))?;

    let manager = CacheManager::new();
    manager.add_cache(CACHE_NAME, Arc::clone(&raw));

    run_demo(&manager, raw).await?;

    info!("Waiting for shutdown signal");
    shutdown_signal().await;

    manager.close().await.context("closing caches")?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_demo(manager: &CacheManager, raw: Arc<dyn RawCache>) -> anyhow::Result<()> {
    let sessions: Cache<String, Session> = manager
        .get_cache_with(CACHE_NAME, |id: &String| format!("session:{}", id))
        .context("cache not registered")?;

    let id = "demo".to_string();
    sessions
        .set(
            &id,
            &Session {
                user_id: 42,
                user_name: "demo-user".to_string(),
            },
            Some(Duration::from_secs(60)),
        )
        .await?;
    let session = sessions.get(&id).await?;
    info!(?session, "Read session back");

    match FixedWindowLimiter::new(raw, 3, Duration::from_secs(10)) {
        Ok(limiter) => {
            for _ in 0..5 {
                let decision = limiter.check("demo-client").await?;
                info!(
                    allowed = decision.allowed,
                    count = decision.count,
                    remaining = decision.remaining,
                    "Rate limit check"
                );
            }
        }
        Err(CacheError::UnsupportedCapability(capability)) => {
            warn!("Rate limiter unavailable: backend lacks {}", capability);
        }
        Err(err) => return Err(err.into()),
    }

    sessions.delete(&id).await?;
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

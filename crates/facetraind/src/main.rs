use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use facetrain_core::{PoolError, UnknownPool};

mod config;
mod engine;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        listen = %config.listen_addr,
        model_dir = %config.model_dir.display(),
        dim = config.embedding_dim,
        "facetraind starting"
    );

    let pool = Arc::new(load_pool(&config)?);
    let engine = engine::spawn_engine(&config)?;

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let ctx = server::ServerContext {
        engine,
        pool,
        queue: config.session_queue,
    };

    tracing::info!("facetraind ready");
    tokio::select! {
        result = server::serve(listener, ctx) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("facetraind shutting down");
        }
    }

    Ok(())
}

/// A missing pool file means no augmentation; a broken one is fatal.
fn load_pool(config: &config::Config) -> Result<UnknownPool> {
    match UnknownPool::load(&config.pool_path, config.embedding_dim) {
        Ok(pool) => {
            tracing::info!(path = %config.pool_path.display(), size = pool.len(), "unknown pool loaded");
            Ok(pool)
        }
        Err(PoolError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %config.pool_path.display(),
                "unknown pool not found; training without augmentation"
            );
            Ok(UnknownPool::empty(config.embedding_dim))
        }
        Err(e) => Err(e).with_context(|| format!("loading {}", config.pool_path.display())),
    }
}

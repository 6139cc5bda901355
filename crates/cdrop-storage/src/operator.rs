//! OpenDAL Operator factory for ciphertext backends

use anyhow::{Context, Result};
use opendal::Operator;

use cdrop_core::config::{StorageBackend, StorageConfig};

/// Path prefix served by content gateways.
pub const GATEWAY_ROOT: &str = "/ipfs/";

/// Build an operator over a content gateway: reading `<cid>` issues
/// `GET <gateway>/ipfs/<cid>`.
pub fn build_gateway_operator(gateway: &str) -> Result<Operator> {
    // opendal 0.55: builders use the consuming pattern (methods take `self`)
    let builder = opendal::services::Http::default()
        .endpoint(gateway.trim_end_matches('/'))
        .root(GATEWAY_ROOT);

    let op = Operator::new(builder)
        .context("creating OpenDAL HTTP gateway operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build an operator for an S3-compatible bucket.
///
/// Uses path-style addressing (default in opendal 0.55), which MinIO and
/// SeaweedFS require.
pub fn build_s3_operator(
    cfg: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// In-process operator, for tests and offline use.
pub fn build_memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish())
}

/// Build the configured backend's operator.
///
/// If `enforce_tls` is set, a plaintext HTTP endpoint is an error; otherwise
/// it is logged as a warning. S3 credentials are only required for the S3
/// backend.
pub fn build_from_config(
    storage: &StorageConfig,
    s3_credentials: Option<(&str, &str)>,
) -> Result<Operator> {
    let endpoint = match storage.backend {
        StorageBackend::Gateway => &storage.gateway,
        StorageBackend::S3 => &storage.endpoint,
    };

    if endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "storage endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                endpoint
            );
        }
        tracing::warn!(
            endpoint = %endpoint,
            "storage endpoint uses plaintext HTTP; set storage.enforce_tls = true and use HTTPS in production"
        );
    }

    match storage.backend {
        StorageBackend::Gateway => build_gateway_operator(&storage.gateway),
        StorageBackend::S3 => {
            let (access_key_id, secret_access_key) = s3_credentials
                .context("S3 backend selected but no credentials were provided")?;
            build_s3_operator(storage, access_key_id, secret_access_key)
        }
    }
}

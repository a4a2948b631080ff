//! # RBAC demo
//!
//! Seeds an in-memory backend with a small role hierarchy and runs a few
//! grant checks against it.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RBAC_MAX_AGE_SECS` - snapshot max age (default: 60, 0 reloads every check)
//! - `RBAC_ALWAYS_RELOAD` - reload before every check (default: false)
//! - `RUST_LOG` - log level (default: info)

use bitmap_rbac::{admin, AdminBackend, EngineConfig, InMemoryBackend, Rbac};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting RBAC demo v{}", bitmap_rbac::VERSION);

    let config = EngineConfig::from_env()?;
    info!(max_age_secs = config.max_age_secs, always_reload = config.always_reload, "Engine configuration");

    let backend = Arc::new(InMemoryBackend::new());
    admin::register_builtin_permissions(backend.as_ref()).await?;

    backend.new_permission("read").await?;
    backend.new_permission("write").await?;
    backend.new_role("viewer").await?;
    backend.new_role("editor").await?;
    backend.new_role("auditor").await?;
    backend.role_add_permission("viewer", "read").await?;
    backend.role_add_permission("editor", "write").await?;
    backend.role_add_super("editor", "viewer").await?;
    backend.role_add_wildcard("auditor", "rbac.api.*").await?;

    backend.subject_add_role(1, "viewer").await?;
    backend.subject_add_role(2, "editor").await?;
    backend.subject_add_role(3, "auditor").await?;

    let rbac = Rbac::with_config(backend.clone(), config);

    for (subject, permission) in [(1, "read"), (1, "write"), (2, "read"), (2, "write"), (3, "rbac.api.read")] {
        let granted = rbac.has_all(subject, &[permission]).await?;
        info!(subject, permission, granted, "Check");
    }

    match rbac.has_all(1, &["delete"]).await {
        Ok(granted) => info!(granted, "Check on undefined permission"),
        Err(err) => warn!(error = %err, "Check on undefined permission"),
    }

    for role in ["viewer", "editor", "auditor"] {
        let names: Vec<String> = rbac
            .role_permissions(role)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        info!(role, permissions = ?names, "Resolved role");
    }

    let inventory = admin::dump(&rbac, backend.as_ref(), 3).await?;
    info!("Inventory: {}", serde_json::to_string(&inventory)?);

    for err in rbac.errors().await {
        warn!(error = %err, "Load error");
    }

    let stats = rbac.cache_stats().await;
    info!(entries = stats.entries, hits = stats.hit_count, misses = stats.miss_count, "Cache statistics");

    Ok(())
}

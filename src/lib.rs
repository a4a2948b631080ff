//! # Bitmap RBAC
//!
//! Embeddable role-based access control engine with:
//! - Role hierarchies resolved ahead of time into per-role permission bitmaps
//! - Prefix and universal wildcard grants
//! - Cycle, dangling-reference and mutual-exclusion detection at load time
//! - Memoized unions for subjects holding several roles
//! - Staleness-driven reloads from a pluggable storage backend
//!
//! ## Example
//!
//! ```rust,no_run
//! use bitmap_rbac::{AdminBackend, InMemoryBackend, Rbac};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> bitmap_rbac::Result<()> {
//! let backend = Arc::new(InMemoryBackend::new());
//! backend.new_permission("docs.read").await?;
//! backend.new_permission("docs.write").await?;
//! backend.new_role("viewer").await?;
//! backend.new_role("editor").await?;
//! backend.role_add_permission("viewer", "docs.read").await?;
//! backend.role_add_super("editor", "viewer").await?;
//! backend.role_add_wildcard("editor", "docs.*").await?;
//! backend.subject_add_role(7, "editor").await?;
//!
//! let rbac = Rbac::new(backend, Duration::from_secs(60));
//! rbac.must_has_all(7, &["docs.read", "docs.write"]).await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod snapshot;
pub mod types;

pub use backend::{AdminBackend, Backend, InMemoryBackend};
pub use config::EngineConfig;
pub use engine::Rbac;
pub use error::{AuthzError, EntityKind, LoadError, LoadWarning, Result};
pub use snapshot::{CacheStats, Snapshot};
pub use types::{CheckPolicy, Permission, PermissionId, Role, RoleId, SubjectId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Authorization engine façade
//!
//! Orchestrates staleness-triggered reloads and answers grant checks against
//! the current [`Snapshot`].
//!
//! # Architecture
//!
//! ```text
//! check → update (stale?) → Snapshot::fetch → HierarchyResolver
//!   ↓
//! resolve names (snapshot indices) → backend role ids → joined bitmap → contains?
//! ```
//!
//! # Locking
//!
//! A single reader/writer lock guards the current snapshot. A reload holds
//! the write lock for the whole fetch-and-resolve, so a check sees either the
//! old snapshot or the new one. A check clones the snapshot handle under the
//! read lock and releases it before asking the backend for the subject's
//! roles, then finishes against that same snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::error::{AuthzError, LoadError, LoadWarning, Result};
use crate::snapshot::{CacheStats, Snapshot};
use crate::types::{CheckPolicy, Permission, SubjectId};

struct State {
    snapshot: Arc<Snapshot>,
    loaded: Option<Instant>,
}

/// Role-based access control engine
///
/// Construct one per tenant or store; instances are fully independent.
///
/// # Examples
///
/// ```rust
/// use bitmap_rbac::backend::InMemoryBackend;
/// use bitmap_rbac::types::{Permission, Role};
/// use bitmap_rbac::Rbac;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> bitmap_rbac::Result<()> {
/// let backend = Arc::new(InMemoryBackend::new());
/// backend.seed_permission(Permission::new(1, "read")).await;
/// backend.seed_permission(Permission::new(2, "write")).await;
/// backend.seed_role(Role::new(1, "viewer").with_permission(1)).await;
/// backend.seed_role(Role::new(2, "editor").with_super(1).with_permission(2)).await;
/// backend.set_subject_roles(7, vec![2]);
///
/// let rbac = Rbac::new(backend, Duration::from_secs(60));
/// assert!(rbac.has_all(7, &["read", "write"]).await?);
/// # Ok(())
/// # }
/// ```
pub struct Rbac {
    backend: Arc<dyn Backend>,
    config: EngineConfig,
    max_age: Duration,
    state: RwLock<State>,
}

impl Rbac {
    /// Creates an engine that reloads once a snapshot is older than `max_age`.
    /// A zero `max_age` reloads before every check.
    pub fn new(backend: Arc<dyn Backend>, max_age: Duration) -> Self {
        let mut engine = Self::with_config(backend, EngineConfig::with_max_age(max_age));
        // keep sub-second precision the config does not carry
        engine.max_age = max_age;
        engine
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: EngineConfig) -> Self {
        Self {
            backend,
            max_age: config.max_age(),
            config,
            state: RwLock::new(State {
                snapshot: Arc::new(Snapshot::empty()),
                loaded: None,
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Rebuilds the snapshot from the backend
    ///
    /// Holds the write lock for the whole fetch and resolution. On a backend
    /// failure the previous snapshot stays in place.
    pub async fn load(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.load_locked(&mut state).await
    }

    async fn load_locked(&self, state: &mut State) -> Result<()> {
        let start = Instant::now();

        let snapshot = Snapshot::fetch(self.backend.as_ref()).await.map_err(|err| {
            warn!(error = %err, "RBAC reload failed, keeping previous snapshot");
            err
        })?;

        info!(
            errors = snapshot.errors().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "RBAC snapshot loaded"
        );

        state.snapshot = Arc::new(snapshot);
        state.loaded = Some(Instant::now());
        Ok(())
    }

    fn is_fresh(&self, state: &State) -> bool {
        if self.config.reloads_every_check() {
            return false;
        }
        match state.loaded {
            Some(at) => at.elapsed() <= self.max_age,
            None => false,
        }
    }

    /// Reloads when the snapshot is stale
    ///
    /// When a previous snapshot exists, a failed reload is logged and the
    /// previous snapshot keeps serving; before the first successful load the
    /// failure is returned.
    async fn update(&self) -> Result<()> {
        {
            let state = self.state.read().await;
            if self.is_fresh(&state) {
                return Ok(());
            }
        }

        let mut state = self.state.write().await;
        // a concurrent caller may have reloaded while we waited
        if self.is_fresh(&state) {
            return Ok(());
        }

        debug!("RBAC snapshot stale, reloading");
        let reloaded = self.load_locked(&mut state).await;
        match reloaded {
            Ok(()) => Ok(()),
            Err(_) if state.loaded.is_some() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// The snapshot currently being served, without a staleness check
    pub async fn current_snapshot(&self) -> Arc<Snapshot> {
        self.state.read().await.snapshot.clone()
    }

    async fn fresh_snapshot(&self) -> Result<Arc<Snapshot>> {
        self.update().await?;
        Ok(self.current_snapshot().await)
    }

    /// Checks whether `subject` holds the named permissions under `policy`
    ///
    /// - `All`: every name must exist (an unknown name is an error, not a
    ///   denial) and every permission must be granted
    /// - `Any`: unknown names are ignored; with none left the answer is `false`
    pub async fn ensure(&self, subject: SubjectId, policy: CheckPolicy, permissions: &[&str]) -> Result<bool> {
        let snapshot = self.fresh_snapshot().await?;

        let mut required = Vec::with_capacity(permissions.len());
        for &name in permissions {
            match snapshot.permission_by_name(name) {
                Some(permission) => required.push(permission.id),
                None if policy == CheckPolicy::All => {
                    return Err(AuthzError::UnknownPermission {
                        name: name.to_string(),
                    });
                }
                None => debug!(permission = name, "Ignoring unknown permission"),
            }
        }
        if required.is_empty() {
            return Ok(false);
        }

        let role_ids = self.backend.get_subject_role_ids(subject).await?;
        let Some(bitmap) = snapshot.joined_bitmap(&role_ids) else {
            debug!(subject, "Subject holds no roles");
            return Ok(false);
        };

        let granted = match policy {
            CheckPolicy::All => required.iter().all(|id| bitmap.contains(*id)),
            CheckPolicy::Any => required.iter().any(|id| bitmap.contains(*id)),
        };

        debug!(subject, %policy, granted, "Permission check");
        Ok(granted)
    }

    /// Like [`Rbac::ensure`] with the policy given by name (`"all"` / `"any"`)
    pub async fn ensure_named(&self, subject: SubjectId, policy: &str, permissions: &[&str]) -> Result<bool> {
        let policy: CheckPolicy = policy.parse()?;
        self.ensure(subject, policy, permissions).await
    }

    pub async fn has_all(&self, subject: SubjectId, permissions: &[&str]) -> Result<bool> {
        self.ensure(subject, CheckPolicy::All, permissions).await
    }

    pub async fn has_any(&self, subject: SubjectId, permissions: &[&str]) -> Result<bool> {
        self.ensure(subject, CheckPolicy::Any, permissions).await
    }

    /// Fails with [`AuthzError::PermissionDenied`] unless every permission is granted
    pub async fn must_has_all(&self, subject: SubjectId, permissions: &[&str]) -> Result<()> {
        if self.has_all(subject, permissions).await? {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied)
        }
    }

    /// Fails with [`AuthzError::PermissionDenied`] unless some permission is granted
    pub async fn must_has_any(&self, subject: SubjectId, permissions: &[&str]) -> Result<()> {
        if self.has_any(subject, permissions).await? {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied)
        }
    }

    /// Every permission a role grants, ascending by id
    pub async fn role_permissions(&self, role: &str) -> Result<Vec<Permission>> {
        let snapshot = self.fresh_snapshot().await?;
        Ok(snapshot.role_permissions(role))
    }

    /// Structural errors of the current snapshot
    pub async fn errors(&self) -> Vec<LoadError> {
        self.current_snapshot().await.errors().to_vec()
    }

    pub async fn warnings(&self) -> Vec<LoadWarning> {
        self.current_snapshot().await.warnings().to_vec()
    }

    /// When the current snapshot was built; `None` before the first load
    pub async fn loaded_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read().await;
        state.loaded.map(|_| state.snapshot.loaded_at())
    }

    /// Joined-bitmap cache statistics of the current snapshot
    pub async fn cache_stats(&self) -> CacheStats {
        self.current_snapshot().await.cache_stats()
    }
}

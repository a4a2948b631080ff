//! Administrative batch model
//!
//! Transport-free rendition of the administration surface: a list of
//! [`AdminOp`]s applied in order through an [`AdminBackend`], and a full
//! [`Inventory`] dump. Both are gated by the engine through the built-in
//! `rbac.api.*` permissions.
//!
//! Ops deserialize from JSON:
//!
//! ```json
//! [
//!   {"type": "add", "column": "role", "name": "editor"},
//!   {"type": "add", "column": "role.super", "name": "editor", "second_name": "viewer"},
//!   {"type": "add", "column": "subject", "id": 7, "name": "editor"}
//! ]
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::backend::{AdminBackend, Backend};
use crate::engine::Rbac;
use crate::error::{AuthzError, LoadError, Result};
use crate::snapshot::{Snapshot, WildcardPattern};
use crate::types::{Permission, PermissionId, Role, RoleId, SubjectId};

pub const PERM_API_LOGIN: &str = "rbac.api.login";
pub const PERM_API_READ: &str = "rbac.api.read";
pub const PERM_API_WRITE: &str = "rbac.api.write";

pub const BUILTIN_PERMISSIONS: [&str; 3] = [PERM_API_LOGIN, PERM_API_READ, PERM_API_WRITE];

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+(\.\w+)*$").expect("name pattern is a valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Del,
}

/// What an op mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "perm")]
    Perm,
    #[serde(rename = "role")]
    Role,
    /// `name` = role, `second_name` = permission
    #[serde(rename = "role.perm")]
    RolePerm,
    /// `name` = role, `second_name` = super role
    #[serde(rename = "role.super")]
    RoleSuper,
    /// `name` = role, `second_name` = wildcard pattern
    #[serde(rename = "role.wildcard")]
    RoleWildcard,
    /// `name` and `second_name` are the two exclusive permissions
    #[serde(rename = "perm.mutex")]
    PermMutex,
    /// `id` = subject, `name` = role
    #[serde(rename = "subject")]
    Subject,
}

/// One administrative mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOp {
    #[serde(rename = "type")]
    pub op: OpKind,
    pub column: Column,
    #[serde(default)]
    pub id: SubjectId,
    pub name: String,
    #[serde(default)]
    pub second_name: String,
}

impl AdminOp {
    pub fn add(column: Column, name: impl Into<String>) -> Self {
        Self::new(OpKind::Add, column, name)
    }

    pub fn del(column: Column, name: impl Into<String>) -> Self {
        Self::new(OpKind::Del, column, name)
    }

    fn new(op: OpKind, column: Column, name: impl Into<String>) -> Self {
        Self {
            op,
            column,
            id: 0,
            name: name.into(),
            second_name: String::new(),
        }
    }

    pub fn with_second(mut self, second_name: impl Into<String>) -> Self {
        self.second_name = second_name.into();
        self
    }

    pub fn with_subject(mut self, id: SubjectId) -> Self {
        self.id = id;
        self
    }

    /// Checks names, wildcard syntax and subject id before touching storage
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        match self.column {
            Column::RolePerm | Column::RoleSuper | Column::PermMutex => check_name(&self.second_name),
            Column::RoleWildcard => WildcardPattern::parse(&self.second_name)
                .map(|_| ())
                .map_err(|err| AuthzError::InvalidName(err.0)),
            Column::Subject if self.id < 1 => Err(AuthzError::InvalidOperation(format!(
                "bad subject id {}",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    /// Whether applying this op can introduce a structural load error
    fn affects_resolution(&self) -> bool {
        match self.column {
            Column::RoleSuper | Column::PermMutex => true,
            Column::RolePerm | Column::RoleWildcard => self.op == OpKind::Add,
            _ => false,
        }
    }

    fn inverse(&self) -> Self {
        let op = match self.op {
            OpKind::Add => OpKind::Del,
            OpKind::Del => OpKind::Add,
        };
        Self { op, ..self.clone() }
    }
}

fn check_name(name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(AuthzError::InvalidName(name.to_string()))
    }
}

/// Everything the backend stores, as returned by [`dump`]
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub permissions: Vec<Permission>,
    pub roles: Vec<Role>,
}

/// Creates the built-in `rbac.api.*` permissions (no-op for existing ones)
pub async fn register_builtin_permissions<B>(backend: &B) -> Result<Vec<PermissionId>>
where
    B: AdminBackend + ?Sized,
{
    let mut ids = Vec::with_capacity(BUILTIN_PERMISSIONS.len());
    for name in BUILTIN_PERMISSIONS {
        ids.push(backend.new_permission(name).await?);
    }
    Ok(ids)
}

/// Fails unless `subject` holds `rbac.api.login`
pub async fn authorize_login(engine: &Rbac, subject: SubjectId) -> Result<()> {
    engine.must_has_all(subject, &[PERM_API_LOGIN]).await
}

/// Applies `ops` in order on behalf of `subject`
///
/// Requires `rbac.api.write`. Ops that can break the role graph are checked
/// by building a candidate snapshot afterwards; if it shows new load errors
/// the op is reverted and [`AuthzError::Configuration`] returned. Only roles
/// that resolved before the op count, so an op that merely reshapes an
/// existing defect goes through. The first failing op stops the batch, ops
/// before it stay applied. The engine is reloaded at the end either way.
pub async fn apply_batch<B>(engine: &Rbac, backend: &B, subject: SubjectId, ops: &[AdminOp]) -> Result<()>
where
    B: AdminBackend + ?Sized,
{
    if ops.is_empty() {
        return Ok(());
    }
    engine.must_has_all(subject, &[PERM_API_WRITE]).await?;

    let outcome = apply_ops(backend, ops).await;

    if let Err(err) = engine.load().await {
        warn!(error = %err, "Reload after administrative batch failed");
    }
    outcome
}

async fn apply_ops<B>(backend: &B, ops: &[AdminOp]) -> Result<()>
where
    B: AdminBackend + ?Sized,
{
    for (index, op) in ops.iter().enumerate() {
        op.validate()?;

        let baseline = if op.affects_resolution() {
            Some(Baseline::of(&Snapshot::fetch(backend).await?))
        } else {
            None
        };

        apply_op(backend, op).await?;

        if let Some(baseline) = baseline {
            let candidate = Snapshot::fetch(backend).await?;
            let introduced = introduced_errors(&baseline, &candidate);

            if !introduced.is_empty() {
                warn!(
                    index,
                    column = ?op.column,
                    name = %op.name,
                    errors = introduced.len(),
                    "Reverting administrative operation"
                );
                apply_op(backend, &op.inverse()).await?;
                return Err(AuthzError::Configuration(introduced));
            }
        }

        debug!(index, op = ?op.op, column = ?op.column, name = %op.name, "Applied administrative operation");
    }

    info!(ops = ops.len(), "Administrative batch applied");
    Ok(())
}

/// What was already broken before an op
struct Baseline {
    failed_roles: HashSet<RoleId>,
    /// Errors not tied to resolving a role (self-exclusion, id 0)
    standalone: Vec<LoadError>,
}

impl Baseline {
    fn of(snapshot: &Snapshot) -> Self {
        let failed_roles: HashSet<RoleId> = snapshot.failed_roles().collect();
        let standalone = standalone_errors(snapshot).cloned().collect();
        Self {
            failed_roles,
            standalone,
        }
    }
}

fn standalone_errors(snapshot: &Snapshot) -> impl Iterator<Item = &LoadError> {
    snapshot
        .errors()
        .iter()
        .filter(|err| matches!(err, LoadError::SelfExclusive { .. } | LoadError::InvalidId { .. }))
}

/// Errors of roles that resolved before but fail now, plus new standalone errors.
///
/// A role that was already broken does not count again, even if its error
/// now reports a different cycle path or conflicting permission.
fn introduced_errors(baseline: &Baseline, candidate: &Snapshot) -> Vec<LoadError> {
    let mut introduced: Vec<(RoleId, LoadError)> = candidate
        .failed_roles()
        .filter(|id| !baseline.failed_roles.contains(id))
        .filter_map(|id| candidate.role_error(id).map(|err| (id, err.clone())))
        .collect();
    introduced.sort_unstable_by_key(|(id, _)| *id);

    introduced
        .into_iter()
        .map(|(_, err)| err)
        .chain(
            standalone_errors(candidate)
                .filter(|err| !baseline.standalone.contains(err))
                .cloned(),
        )
        .collect()
}

async fn apply_op<B>(backend: &B, op: &AdminOp) -> Result<()>
where
    B: AdminBackend + ?Sized,
{
    let name = op.name.as_str();
    let second = op.second_name.as_str();

    match (op.column, op.op) {
        (Column::Perm, OpKind::Add) => backend.new_permission(name).await.map(|_| ()),
        (Column::Perm, OpKind::Del) => backend.del_permission(name).await,
        (Column::Role, OpKind::Add) => backend.new_role(name).await.map(|_| ()),
        (Column::Role, OpKind::Del) => backend.del_role(name).await,
        (Column::RolePerm, OpKind::Add) => backend.role_add_permission(name, second).await,
        (Column::RolePerm, OpKind::Del) => backend.role_del_permission(name, second).await,
        (Column::RoleSuper, OpKind::Add) => backend.role_add_super(name, second).await,
        (Column::RoleSuper, OpKind::Del) => backend.role_del_super(name, second).await,
        (Column::RoleWildcard, OpKind::Add) => backend.role_add_wildcard(name, second).await,
        (Column::RoleWildcard, OpKind::Del) => backend.role_del_wildcard(name, second).await,
        (Column::PermMutex, OpKind::Add) => backend.permission_add_mutex(name, second).await,
        (Column::PermMutex, OpKind::Del) => backend.permission_del_mutex(name, second).await,
        (Column::Subject, OpKind::Add) => backend.subject_add_role(op.id, name).await,
        (Column::Subject, OpKind::Del) => backend.subject_del_role(op.id, name).await,
    }
}

/// Lists every live permission and role on behalf of `subject`
///
/// Requires `rbac.api.read`.
pub async fn dump<B>(engine: &Rbac, backend: &B, subject: SubjectId) -> Result<Inventory>
where
    B: Backend + ?Sized,
{
    engine.must_has_all(subject, &[PERM_API_READ]).await?;

    Ok(Inventory {
        permissions: backend.get_all_permissions().await?,
        roles: backend.get_all_roles().await?,
    })
}

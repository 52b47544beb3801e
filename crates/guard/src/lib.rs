//! Ownership guard: decides whether a principal may run a mutation.
//!
//! Admins bypass every check. Members hold `NamespaceWrite` only on
//! namespaces the directory assigns to them; nobody else holds
//! `ClusterAdmin`. Reads are not guarded.

#![forbid(unsafe_code)]

use berth_core::{BerthError, BerthResult, Capability, Principal, Role};
use berth_persist::Directory;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct OwnershipGuard {
    directory: Arc<dyn Directory>,
}

impl OwnershipGuard {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Whether `principal` holds `capability`, scoped to `namespace` when
    /// the capability is namespace-bound.
    pub async fn allows(
        &self,
        principal: &Principal,
        namespace: Option<&str>,
        capability: Capability,
    ) -> BerthResult<bool> {
        if principal.role == Role::Admin {
            return Ok(true);
        }
        match capability {
            Capability::ClusterAdmin => Ok(false),
            Capability::NamespaceWrite => {
                let Some(ns) = namespace else { return Ok(false) };
                let owner = self.directory.namespace_owner(ns).await?;
                Ok(owner.is_some_and(|t| t.principal_id == principal.id))
            }
        }
    }

    /// [`Self::allows`], with refusal mapped to `Unauthorized`.
    pub async fn authorize(
        &self,
        principal: &Principal,
        namespace: Option<&str>,
        capability: Capability,
    ) -> BerthResult<()> {
        if self.allows(principal, namespace, capability).await? {
            return Ok(());
        }
        debug!(principal = %principal.name, ?capability, "guard: refused");
        let what = match (capability, namespace) {
            (Capability::ClusterAdmin, _) => "cluster administration".to_string(),
            (Capability::NamespaceWrite, Some(ns)) => format!("writes in namespace {ns}"),
            (Capability::NamespaceWrite, None) => "namespace writes".to_string(),
        };
        Err(BerthError::Unauthorized(format!("{} may not perform {what}", principal.name)))
    }
}

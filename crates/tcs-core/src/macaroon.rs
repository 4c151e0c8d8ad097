//! Permission sets and the credential-baking collaborator.

use async_trait::async_trait;
use thiserror::Error;

/// A single `(entity, action)` grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    pub entity: &'static str,
    pub action: &'static str,
}

impl Permission {
    const fn new(entity: &'static str, action: &'static str) -> Self {
        Self { entity, action }
    }

    pub fn is_read(&self) -> bool {
        self.action == ACTION_READ
    }
}

const ACTION_READ: &str = "read";

/// Every permission a session credential can carry.
pub const PERMISSION_TABLE: &[Permission] = &[
    Permission::new("onchain", "read"),
    Permission::new("onchain", "write"),
    Permission::new("offchain", "read"),
    Permission::new("offchain", "write"),
    Permission::new("address", "read"),
    Permission::new("address", "write"),
    Permission::new("message", "read"),
    Permission::new("message", "write"),
    Permission::new("peers", "read"),
    Permission::new("peers", "write"),
    Permission::new("info", "read"),
    Permission::new("info", "write"),
    Permission::new("invoices", "read"),
    Permission::new("invoices", "write"),
    Permission::new("signer", "read"),
    Permission::new("signer", "generate"),
    Permission::new("macaroon", "read"),
    Permission::new("macaroon", "write"),
    Permission::new("macaroon", "generate"),
    Permission::new("swap", "read"),
    Permission::new("swap", "execute"),
    Permission::new("account", "read"),
    Permission::new("account", "write"),
    Permission::new("order", "read"),
    Permission::new("order", "write"),
    Permission::new("auction", "read"),
    Permission::new("insights", "read"),
    Permission::new("report", "read"),
];

/// Permissions granted to a session credential. Read-only sessions get every
/// `read` action, admin sessions get the whole table.
pub fn all_permissions(read_only: bool) -> Vec<Permission> {
    PERMISSION_TABLE
        .iter()
        .copied()
        .filter(|p| !read_only || p.is_read())
        .collect()
}

/// What to bake into a credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacaroonRecipe {
    pub permissions: Vec<Permission>,
}

impl MacaroonRecipe {
    pub fn for_session(read_only: bool) -> Self {
        Self {
            permissions: all_permissions(read_only),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BakeError {
    #[error("macaroon service unavailable: {0}")]
    Unavailable(String),

    #[error("failed to bake macaroon: {0}")]
    Failed(String),
}

/// Mints a credential for a root key id and a recipe.
#[async_trait]
pub trait MacaroonBaker: Send + Sync {
    async fn bake(&self, root_key_id: u64, recipe: &MacaroonRecipe) -> Result<String, BakeError>;
}

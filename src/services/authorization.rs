//! Maps an actor to a role relative to one record's owner.
//!
//! Resolution order: the static super-admin allow-list, then group
//! membership, then plain ownership. A failing group lookup counts as "no
//! groups"; it never raises.

use crate::{
    models::actor::{Actor, Role},
    services::group_directory::GroupDirectory,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::warn;

/// Admin tier an actor holds independently of any particular record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminTier {
    Super,
    Business,
}

impl From<AdminTier> for Role {
    fn from(tier: AdminTier) -> Self {
        match tier {
            AdminTier::Super => Role::SuperAdmin,
            AdminTier::Business => Role::BusinessAdmin,
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationResolver {
    directory: Arc<dyn GroupDirectory>,
    super_admins: BTreeSet<String>,
    super_admin_group: String,
    business_admin_group: String,
}

impl AuthorizationResolver {
    pub fn new(
        directory: Arc<dyn GroupDirectory>,
        super_admins: impl IntoIterator<Item = String>,
        super_admin_group: impl Into<String>,
        business_admin_group: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            super_admins: super_admins
                .into_iter()
                .map(|identity| identity.trim().to_ascii_lowercase())
                .filter(|identity| !identity.is_empty())
                .collect(),
            super_admin_group: super_admin_group.into(),
            business_admin_group: business_admin_group.into(),
        }
    }

    fn on_allow_list(&self, actor: &Actor) -> bool {
        let listed = |value: &str| self.super_admins.contains(&value.to_ascii_lowercase());
        listed(&actor.id) || actor.email.as_deref().is_some_and(listed)
    }

    /// The highest admin tier the actor holds, if any.
    pub async fn admin_tier(&self, actor: &Actor) -> Option<AdminTier> {
        if self.on_allow_list(actor) {
            return Some(AdminTier::Super);
        }

        let groups = match self.directory.list_groups(actor.directory_identity()).await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(actor = %actor.id, error = %err, "group lookup failed, treating as no groups");
                return None;
            }
        };

        if groups.contains(&self.super_admin_group) {
            Some(AdminTier::Super)
        } else if groups.contains(&self.business_admin_group) {
            Some(AdminTier::Business)
        } else {
            None
        }
    }

    /// Role of `actor` with respect to a record owned by `owner_id`.
    pub async fn resolve(&self, actor: &Actor, owner_id: &str) -> Role {
        match self.admin_tier(actor).await {
            Some(tier) => tier.into(),
            None if actor.id == owner_id => Role::Owner,
            None => Role::Anonymous,
        }
    }
}

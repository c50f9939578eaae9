//! Deletion policy: who may delete a record, and whether that deletion should
//! later be reverted by the reconciler.

use crate::models::actor::Role;

/// Decide, at deletion time, whether the record should be healed.
///
/// Deletions by the owner or a super-admin are final. Business-admin
/// deletions are provisional and get reverted. Anything else should never
/// have been authorized, so it falls back to healing.
pub fn decide_should_heal(actor_role: Role, is_owner: bool) -> bool {
    match actor_role {
        Role::Owner if is_owner => false,
        Role::BusinessAdmin => true,
        Role::SuperAdmin => false,
        Role::Owner | Role::Anonymous => true,
    }
}

/// Owners and either admin tier may delete; nobody else.
pub fn is_authorized_to_delete(actor_role: Role, is_owner: bool) -> bool {
    actor_role.is_admin() || (actor_role == Role::Owner && is_owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_deletions_are_final() {
        assert!(!decide_should_heal(Role::Owner, true));
        assert!(is_authorized_to_delete(Role::Owner, true));
    }

    #[test]
    fn business_admin_deletions_heal_regardless_of_ownership() {
        assert!(decide_should_heal(Role::BusinessAdmin, false));
        assert!(decide_should_heal(Role::BusinessAdmin, true));
        assert!(is_authorized_to_delete(Role::BusinessAdmin, false));
    }

    #[test]
    fn super_admin_deletions_are_final_regardless_of_ownership() {
        assert!(!decide_should_heal(Role::SuperAdmin, false));
        assert!(!decide_should_heal(Role::SuperAdmin, true));
        assert!(is_authorized_to_delete(Role::SuperAdmin, false));
    }

    #[test]
    fn other_users_cannot_delete_and_default_to_healing() {
        assert!(!is_authorized_to_delete(Role::Anonymous, false));
        assert!(decide_should_heal(Role::Anonymous, false));
    }

    #[test]
    fn owner_role_without_ownership_is_not_trusted() {
        assert!(!is_authorized_to_delete(Role::Owner, false));
        assert!(decide_should_heal(Role::Owner, false));
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{AccessError, PermissionSource};
use crate::model::{PermissionMap, Role, RoleId, RolePermission, TenantId, UserId, UserRole};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGrants {
    pub active_roles: BTreeSet<RoleId>,
    pub permissions: PermissionMap,
}

/// Roles that count for `user_id` in `tenant_id`: the assignment is active and
/// belongs to this user and tenant, and the role itself is active and either
/// global or scoped to the tenant.
pub fn active_role_ids(
    user_id: &UserId,
    tenant_id: &TenantId,
    assignments: &[UserRole],
    roles: &[Role],
) -> BTreeSet<RoleId> {
    let assigned: BTreeSet<RoleId> = assignments
        .iter()
        .filter(|ur| ur.is_active && ur.user_id == *user_id && ur.tenant_id == *tenant_id)
        .map(|ur| ur.role_id)
        .collect();

    roles
        .iter()
        .filter(|r| r.is_active && r.applies_to(tenant_id) && assigned.contains(&r.id))
        .map(|r| r.id)
        .collect()
}

pub fn aggregate_role_permissions(
    active_roles: &BTreeSet<RoleId>,
    rows: &[RolePermission],
) -> PermissionMap {
    let mut permissions = PermissionMap::new();
    for row in rows
        .iter()
        .filter(|rp| rp.is_active && active_roles.contains(&rp.role_id))
    {
        permissions.grant(&row.module_key, &row.actions);
    }
    permissions
}

pub struct RoleAggregator<S: PermissionSource> {
    source: Arc<S>,
}

impl<S: PermissionSource> RoleAggregator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub async fn active_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<BTreeSet<RoleId>, AccessError> {
        let assignments = self.source.user_roles(user_id, tenant_id).await?;
        let candidates: Vec<RoleId> = assignments
            .iter()
            .filter(|ur| ur.is_active)
            .map(|ur| ur.role_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if candidates.is_empty() {
            return Ok(BTreeSet::new());
        }

        let roles = self.source.roles(&candidates).await?;
        Ok(active_role_ids(user_id, tenant_id, &assignments, &roles))
    }

    pub async fn permissions_for(
        &self,
        active_roles: &BTreeSet<RoleId>,
    ) -> Result<PermissionMap, AccessError> {
        if active_roles.is_empty() {
            return Ok(PermissionMap::new());
        }
        let ids: Vec<RoleId> = active_roles.iter().copied().collect();
        let rows = self.source.role_permissions(&ids).await?;
        Ok(aggregate_role_permissions(active_roles, &rows))
    }

    pub async fn aggregate(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<RoleGrants, AccessError> {
        let active_roles = self.active_roles(user_id, tenant_id).await?;
        let permissions = self.permissions_for(&active_roles).await?;
        Ok(RoleGrants {
            active_roles,
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixture::FixtureSource;
    use crate::model::Operation;

    fn aggregator(source: FixtureSource) -> RoleAggregator<FixtureSource> {
        RoleAggregator::new(Arc::new(source))
    }

    #[tokio::test]
    async fn user_without_roles_gets_empty_map() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.active_roles.is_empty());
        assert!(grants.permissions.is_empty());
    }

    #[tokio::test]
    async fn single_role_grants_its_actions() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(Some(tenant));
        source.assign_role(user, role, tenant);
        source.grant_role(role, "coupons", &[Operation::Select, Operation::Insert]);

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.permissions.allows("coupons", Operation::Select));
        assert!(grants.permissions.allows("coupons", Operation::Insert));
        assert!(!grants.permissions.allows("coupons", Operation::Delete));
    }

    #[tokio::test]
    async fn multiple_roles_union_and_collapse_duplicates() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let cashier = source.add_role(Some(tenant));
        let manager = source.add_role(Some(tenant));
        source.assign_role(user, cashier, tenant);
        source.assign_role(user, manager, tenant);
        source.grant_role(cashier, "orders", &[Operation::Select, Operation::Insert]);
        source.grant_role(manager, "orders", &[Operation::Select, Operation::Update]);
        source.grant_role(manager, "dashboard", &[Operation::Select]);

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert_eq!(grants.active_roles.len(), 2);
        assert_eq!(grants.permissions.get("orders").unwrap().len(), 3);
        assert!(grants.permissions.allows("dashboard", Operation::Select));
    }

    #[tokio::test]
    async fn inactive_role_contributes_nothing() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(Some(tenant));
        source.assign_role(user, role, tenant);
        source.grant_role(role, "coupons", &[Operation::Select]);
        source.roles[0].is_active = false;

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.active_roles.is_empty());
        assert!(grants.permissions.is_empty());
    }

    #[tokio::test]
    async fn inactive_assignment_contributes_nothing() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(Some(tenant));
        source.assign_role(user, role, tenant);
        source.grant_role(role, "coupons", &[Operation::Select]);
        source.user_roles[0].is_active = false;

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.permissions.is_empty());
    }

    #[tokio::test]
    async fn inactive_permission_row_is_ignored() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(Some(tenant));
        source.assign_role(user, role, tenant);
        source.grant_role(role, "coupons", &[Operation::Select]);
        source.grant_role(role, "dashboard", &[Operation::Select]);
        source.role_permissions[0].is_active = false;

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.permissions.get("coupons").is_none());
        assert!(grants.permissions.allows("dashboard", Operation::Select));
    }

    #[tokio::test]
    async fn role_scoped_to_other_tenant_is_ignored() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let other = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(Some(other));
        source.assign_role(user, role, tenant);
        source.grant_role(role, "coupons", &[Operation::Select]);

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.permissions.is_empty());
    }

    #[tokio::test]
    async fn global_role_assigned_in_tenant_counts() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(None);
        source.assign_role(user, role, tenant);
        source.grant_role(role, "menu", &[Operation::Select]);

        let grants = aggregator(source).aggregate(&user, &tenant).await.unwrap();

        assert!(grants.permissions.allows("menu", Operation::Select));
    }

    #[tokio::test]
    async fn role_permission_failure_propagates() {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let role = source.add_role(Some(tenant));
        source.assign_role(user, role, tenant);
        let source = source.fail("role_permissions");

        let err = aggregator(source).aggregate(&user, &tenant).await.unwrap_err();

        assert!(matches!(err, AccessError::StoreUnavailable(ref msg) if msg.contains("role_permissions")));
    }

    #[test]
    fn active_role_ids_requires_matching_assignment() {
        let tenant = TenantId::generate();
        let user = UserId::generate();
        let role = Role {
            id: RoleId::generate(),
            tenant_id: Some(tenant),
            name: "cook".to_string(),
            is_active: true,
        };
        let someone_else = UserRole {
            user_id: UserId::generate(),
            role_id: role.id,
            tenant_id: tenant,
            is_active: true,
        };

        let ids = active_role_ids(&user, &tenant, &[someone_else], &[role]);

        assert!(ids.is_empty());
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{AccessError, PermissionSource};
use crate::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, AccountAccessGroup, PermissionMap,
    RoleAccessGroup, RoleId, TenantId, UserId,
};

/// Group ids reachable by `user_id` at `now`, before the groups themselves are
/// checked: direct grants that are active and unexpired, plus active links
/// from the user's active roles.
pub fn reachable_groups(
    user_id: &UserId,
    direct: &[AccountAccessGroup],
    via_roles: &[RoleAccessGroup],
    active_roles: &BTreeSet<RoleId>,
    now: DateTime<Utc>,
) -> BTreeSet<AccessGroupId> {
    let from_grants = direct
        .iter()
        .filter(|g| g.user_id == *user_id && g.is_effective_at(now))
        .map(|g| g.access_group_id);

    let from_roles = via_roles
        .iter()
        .filter(|rg| rg.is_active && active_roles.contains(&rg.role_id))
        .map(|rg| rg.access_group_id);

    from_grants.chain(from_roles).collect()
}

/// Narrows `reachable` to groups that are active and usable in `tenant_id`.
pub fn usable_groups(
    reachable: &BTreeSet<AccessGroupId>,
    groups: &[AccessGroup],
    tenant_id: &TenantId,
) -> BTreeSet<AccessGroupId> {
    groups
        .iter()
        .filter(|g| g.is_active && g.applies_to(tenant_id) && reachable.contains(&g.id))
        .map(|g| g.id)
        .collect()
}

pub fn aggregate_group_permissions(
    usable: &BTreeSet<AccessGroupId>,
    rows: &[AccessGroupPermission],
) -> PermissionMap {
    let mut permissions = PermissionMap::new();
    for row in rows
        .iter()
        .filter(|p| p.is_active && usable.contains(&p.access_group_id))
    {
        permissions.grant(&row.module_key, &row.actions);
    }
    permissions
}

/// Earliest moment one of the user's currently effective direct grants runs
/// out.
pub fn next_grant_expiry(
    user_id: &UserId,
    direct: &[AccountAccessGroup],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    direct
        .iter()
        .filter(|g| g.user_id == *user_id && g.is_effective_at(now))
        .filter_map(|g| g.expires_at)
        .min()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupGrants {
    pub permissions: PermissionMap,
    /// When `permissions` may shrink because a direct grant expires.
    pub next_expiry: Option<DateTime<Utc>>,
}

pub struct AccessGroupAggregator<S: PermissionSource> {
    source: Arc<S>,
}

impl<S: PermissionSource> AccessGroupAggregator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub async fn aggregate(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        active_roles: &BTreeSet<RoleId>,
        now: DateTime<Utc>,
    ) -> Result<PermissionMap, AccessError> {
        Ok(self
            .grants(user_id, tenant_id, active_roles, now)
            .await?
            .permissions)
    }

    pub async fn grants(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        active_roles: &BTreeSet<RoleId>,
        now: DateTime<Utc>,
    ) -> Result<GroupGrants, AccessError> {
        let role_ids: Vec<RoleId> = active_roles.iter().copied().collect();

        let (direct, via_roles) = futures::try_join!(
            self.source.account_access_groups(user_id),
            async {
                if role_ids.is_empty() {
                    Ok(Vec::new())
                } else {
                    self.source.role_access_groups(&role_ids).await
                }
            },
        )?;

        let reachable = reachable_groups(user_id, &direct, &via_roles, active_roles, now);
        if reachable.is_empty() {
            return Ok(GroupGrants::default());
        }

        let group_ids: Vec<AccessGroupId> = reachable.iter().copied().collect();
        let (groups, rows) = futures::try_join!(
            self.source.access_groups(&group_ids),
            self.source.access_group_permissions(&group_ids),
        )?;

        let usable = usable_groups(&reachable, &groups, tenant_id);
        tracing::trace!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            reachable = reachable.len(),
            usable = usable.len(),
            "resolved access groups"
        );

        Ok(GroupGrants {
            permissions: aggregate_group_permissions(&usable, &rows),
            next_expiry: next_grant_expiry(user_id, &direct, now),
        })
    }
}

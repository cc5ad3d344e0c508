use serde::{Deserialize, Serialize};

use super::access::{
    AccessGroup, AccessGroupPermission, Account, AccountAccessGroup, Module, Role,
    RoleAccessGroup, RolePermission, Tenant, UserRole,
};
use super::billing::{Plan, PlanModule, Subscription, TenantModule};
use crate::cache::InvalidationScope;

/// One upsert against the access records. Rows are never physically removed:
/// revoking a grant means writing it again with its activity flag cleared.
///
/// Each record is keyed by its natural identity (an id, or the pair of ids
/// of a join record); writing an existing key replaces the stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum AccessWrite {
    Tenant(Tenant),
    Account(Account),
    Module(Module),
    Role(Role),
    UserRole(UserRole),
    RolePermission(RolePermission),
    AccessGroup(AccessGroup),
    AccessGroupPermission(AccessGroupPermission),
    AccountAccessGroup(AccountAccessGroup),
    RoleAccessGroup(RoleAccessGroup),
    Plan(Plan),
    PlanModule(PlanModule),
    Subscription(Subscription),
    TenantModule(TenantModule),
}

impl AccessWrite {
    pub fn kind(&self) -> &'static str {
        match self {
            AccessWrite::Tenant(_) => "tenant",
            AccessWrite::Account(_) => "account",
            AccessWrite::Module(_) => "module",
            AccessWrite::Role(_) => "role",
            AccessWrite::UserRole(_) => "user_role",
            AccessWrite::RolePermission(_) => "role_permission",
            AccessWrite::AccessGroup(_) => "access_group",
            AccessWrite::AccessGroupPermission(_) => "access_group_permission",
            AccessWrite::AccountAccessGroup(_) => "account_access_group",
            AccessWrite::RoleAccessGroup(_) => "role_access_group",
            AccessWrite::Plan(_) => "plan",
            AccessWrite::PlanModule(_) => "plan_module",
            AccessWrite::Subscription(_) => "subscription",
            AccessWrite::TenantModule(_) => "tenant_module",
        }
    }

    /// Cached decisions this write can change.
    ///
    /// Records that do not carry the tenant or user they affect (role
    /// permissions, group definitions, plans, the module catalog) widen to
    /// the whole cache. Over-invalidating costs a recomputation, never a
    /// wrong answer.
    pub fn invalidation_scope(&self) -> InvalidationScope {
        match self {
            AccessWrite::Tenant(t) => InvalidationScope::Tenant(t.id),
            AccessWrite::Account(a) => InvalidationScope::User(a.id),
            AccessWrite::Role(r) => match r.tenant_id {
                Some(tenant_id) => InvalidationScope::Tenant(tenant_id),
                None => InvalidationScope::All,
            },
            AccessWrite::UserRole(ur) => InvalidationScope::UserInTenant {
                user_id: ur.user_id,
                tenant_id: ur.tenant_id,
            },
            AccessWrite::AccessGroup(g) => match g.tenant_id {
                Some(tenant_id) => InvalidationScope::Tenant(tenant_id),
                None => InvalidationScope::All,
            },
            AccessWrite::AccountAccessGroup(aag) => InvalidationScope::User(aag.user_id),
            AccessWrite::Subscription(s) => InvalidationScope::Tenant(s.tenant_id),
            AccessWrite::TenantModule(tm) => InvalidationScope::Tenant(tm.tenant_id),
            AccessWrite::Module(_)
            | AccessWrite::RolePermission(_)
            | AccessWrite::AccessGroupPermission(_)
            | AccessWrite::RoleAccessGroup(_)
            | AccessWrite::Plan(_)
            | AccessWrite::PlanModule(_) => InvalidationScope::All,
        }
    }
}

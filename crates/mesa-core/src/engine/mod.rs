mod entitlement;
mod groups;
mod resolve;
mod roles;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;

pub use entitlement::{
    Entitlement, EntitlementResolver, current_subscription, entitled_modules,
    next_subscription_start,
};
pub use groups::{
    AccessGroupAggregator, GroupGrants, aggregate_group_permissions, next_grant_expiry,
    reachable_groups, usable_groups,
};
pub use resolve::{EffectiveAccess, PermissionEngine};
pub use roles::{RoleAggregator, RoleGrants, active_role_ids, aggregate_role_permissions};

use std::future::Future;

use crate::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, Account, AccountAccessGroup, Module,
    ModuleKey, Operation, Plan, PlanId, PlanModule, Role, RoleAccessGroup, RoleId,
    RolePermission, Subscription, Tenant, TenantId, TenantModule, UserId, UserRole,
};

/// Outcomes of an access query other than "allowed".
///
/// `Forbidden` is the only variant that is a decision. The not-found variants
/// mean the question was malformed, and `StoreUnavailable` means it could not
/// be answered; neither may be read as a grant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("operation '{operation}' on module '{module}' is forbidden")]
    Forbidden { module: ModuleKey, operation: Operation },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AccessError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AccessError::TenantNotFound(_)
                | AccessError::AccountNotFound(_)
                | AccessError::ModuleNotFound(_)
        )
    }
}

/// Read side of the role and access-group records.
///
/// Implementations return rows as stored, inactive and expired ones
/// included. Filtering on activity and expiry is the engine's job.
pub trait PermissionSource: Send + Sync {
    fn tenant(
        &self,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Option<Tenant>, AccessError>> + Send;

    fn account(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<Account>, AccessError>> + Send;

    fn modules(&self) -> impl Future<Output = Result<Vec<Module>, AccessError>> + Send;

    fn user_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Vec<UserRole>, AccessError>> + Send;

    fn roles(
        &self,
        role_ids: &[RoleId],
    ) -> impl Future<Output = Result<Vec<Role>, AccessError>> + Send;

    fn role_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> impl Future<Output = Result<Vec<RolePermission>, AccessError>> + Send;

    fn account_access_groups(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<AccountAccessGroup>, AccessError>> + Send;

    fn role_access_groups(
        &self,
        role_ids: &[RoleId],
    ) -> impl Future<Output = Result<Vec<RoleAccessGroup>, AccessError>> + Send;

    fn access_groups(
        &self,
        group_ids: &[AccessGroupId],
    ) -> impl Future<Output = Result<Vec<AccessGroup>, AccessError>> + Send;

    fn access_group_permissions(
        &self,
        group_ids: &[AccessGroupId],
    ) -> impl Future<Output = Result<Vec<AccessGroupPermission>, AccessError>> + Send;
}

/// Read side of plans, subscriptions and tenant module switches.
pub trait EntitlementSource: Send + Sync {
    fn subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Vec<Subscription>, AccessError>> + Send;

    fn plan(
        &self,
        plan_id: &PlanId,
    ) -> impl Future<Output = Result<Option<Plan>, AccessError>> + Send;

    fn plan_modules(
        &self,
        plan_id: &PlanId,
    ) -> impl Future<Output = Result<Vec<PlanModule>, AccessError>> + Send;

    fn tenant_modules(
        &self,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Vec<TenantModule>, AccessError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_are_classified() {
        assert!(AccessError::TenantNotFound(TenantId::generate()).is_not_found());
        assert!(AccessError::ModuleNotFound("coupons".to_string()).is_not_found());
        assert!(!AccessError::StoreUnavailable("down".to_string()).is_not_found());
    }

    #[test]
    fn forbidden_names_module_and_operation() {
        let err = AccessError::Forbidden {
            module: ModuleKey::parse("coupons").unwrap(),
            operation: Operation::Delete,
        };
        assert_eq!(
            err.to_string(),
            "operation 'delete' on module 'coupons' is forbidden"
        );
    }
}

use std::fmt;
use std::future::Future;

use mesa_core::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, Account, AccountAccessGroup, AccessWrite,
    Module, Plan, PlanId, PlanModule, Role, RoleAccessGroup, RoleId, RolePermission,
    Subscription, Tenant, TenantId, TenantModule, UserId, UserRole,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store timed out: {0}")]
    Timeout(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Monotonic counter bumped by every applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistence for every access and billing record.
///
/// Reads return rows as stored, inactive and expired ones included. `apply`
/// upserts a batch atomically: either every write lands or none does.
pub trait AccessStore: Send + Sync {
    fn tenant(
        &self,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Option<Tenant>, StorageError>> + Send;

    fn account(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<Account>, StorageError>> + Send;

    fn modules(&self) -> impl Future<Output = Result<Vec<Module>, StorageError>> + Send;

    fn user_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Vec<UserRole>, StorageError>> + Send;

    fn roles(
        &self,
        role_ids: &[RoleId],
    ) -> impl Future<Output = Result<Vec<Role>, StorageError>> + Send;

    fn role_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> impl Future<Output = Result<Vec<RolePermission>, StorageError>> + Send;

    fn account_access_groups(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<AccountAccessGroup>, StorageError>> + Send;

    fn role_access_groups(
        &self,
        role_ids: &[RoleId],
    ) -> impl Future<Output = Result<Vec<RoleAccessGroup>, StorageError>> + Send;

    fn access_groups(
        &self,
        group_ids: &[AccessGroupId],
    ) -> impl Future<Output = Result<Vec<AccessGroup>, StorageError>> + Send;

    fn access_group_permissions(
        &self,
        group_ids: &[AccessGroupId],
    ) -> impl Future<Output = Result<Vec<AccessGroupPermission>, StorageError>> + Send;

    fn subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Vec<Subscription>, StorageError>> + Send;

    fn plan(
        &self,
        plan_id: &PlanId,
    ) -> impl Future<Output = Result<Option<Plan>, StorageError>> + Send;

    fn plan_modules(
        &self,
        plan_id: &PlanId,
    ) -> impl Future<Output = Result<Vec<PlanModule>, StorageError>> + Send;

    fn tenant_modules(
        &self,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Vec<TenantModule>, StorageError>> + Send;

    fn apply(
        &self,
        writes: &[AccessWrite],
    ) -> impl Future<Output = Result<Revision, StorageError>> + Send;

    fn revision(&self) -> impl Future<Output = Result<Revision, StorageError>> + Send;
}

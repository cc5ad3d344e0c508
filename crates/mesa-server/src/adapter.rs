use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mesa_core::engine::{AccessError, EntitlementSource, PermissionSource};
use mesa_core::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, Account, AccountAccessGroup, Module, Plan,
    PlanId, PlanModule, Role, RoleAccessGroup, RoleId, RolePermission, Subscription, Tenant,
    TenantId, TenantModule, UserId, UserRole,
};
use mesa_storage::{AccessStore, StorageError};

/// Exposes an [`AccessStore`] to the engine. Every read is bounded by
/// `timeout`; a read that errors or overruns becomes
/// [`AccessError::StoreUnavailable`] naming the call.
pub struct StoreSource<S: AccessStore> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: AccessStore> StoreSource<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

async fn guarded<T>(
    call: &'static str,
    timeout: Duration,
    read: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, AccessError> {
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AccessError::StoreUnavailable(format!("{call}: {e}"))),
        Err(_) => Err(AccessError::StoreUnavailable(format!(
            "{call}: no response within {}ms",
            timeout.as_millis()
        ))),
    }
}

impl<S: AccessStore> PermissionSource for StoreSource<S> {
    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, AccessError> {
        guarded("tenant", self.timeout, self.store.tenant(tenant_id)).await
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, AccessError> {
        guarded("account", self.timeout, self.store.account(user_id)).await
    }

    async fn modules(&self) -> Result<Vec<Module>, AccessError> {
        guarded("modules", self.timeout, self.store.modules()).await
    }

    async fn user_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Vec<UserRole>, AccessError> {
        guarded(
            "user_roles",
            self.timeout,
            self.store.user_roles(user_id, tenant_id),
        )
        .await
    }

    async fn roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, AccessError> {
        guarded("roles", self.timeout, self.store.roles(role_ids)).await
    }

    async fn role_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RolePermission>, AccessError> {
        guarded(
            "role_permissions",
            self.timeout,
            self.store.role_permissions(role_ids),
        )
        .await
    }

    async fn account_access_groups(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<AccountAccessGroup>, AccessError> {
        guarded(
            "account_access_groups",
            self.timeout,
            self.store.account_access_groups(user_id),
        )
        .await
    }

    async fn role_access_groups(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RoleAccessGroup>, AccessError> {
        guarded(
            "role_access_groups",
            self.timeout,
            self.store.role_access_groups(role_ids),
        )
        .await
    }

    async fn access_groups(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroup>, AccessError> {
        guarded(
            "access_groups",
            self.timeout,
            self.store.access_groups(group_ids),
        )
        .await
    }

    async fn access_group_permissions(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroupPermission>, AccessError> {
        guarded(
            "access_group_permissions",
            self.timeout,
            self.store.access_group_permissions(group_ids),
        )
        .await
    }
}

impl<S: AccessStore> EntitlementSource for StoreSource<S> {
    async fn subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, AccessError> {
        guarded(
            "subscriptions",
            self.timeout,
            self.store.subscriptions(tenant_id),
        )
        .await
    }

    async fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, AccessError> {
        guarded("plan", self.timeout, self.store.plan(plan_id)).await
    }

    async fn plan_modules(&self, plan_id: &PlanId) -> Result<Vec<PlanModule>, AccessError> {
        guarded("plan_modules", self.timeout, self.store.plan_modules(plan_id)).await
    }

    async fn tenant_modules(&self, tenant_id: &TenantId) -> Result<Vec<TenantModule>, AccessError> {
        guarded(
            "tenant_modules",
            self.timeout,
            self.store.tenant_modules(tenant_id),
        )
        .await
    }
}

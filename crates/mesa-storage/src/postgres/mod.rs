pub mod migrations;
mod queries;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use mesa_core::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, Account, AccountAccessGroup, AccessWrite,
    Module, Plan, PlanId, PlanModule, Role, RoleAccessGroup, RoleId, RolePermission,
    Subscription, Tenant, TenantId, TenantModule, UserId, UserRole,
};

use crate::traits::{AccessStore, Revision, StorageError};

fn uuids<'a, T: 'a>(ids: impl IntoIterator<Item = &'a T>, as_uuid: fn(&T) -> &Uuid) -> Vec<Uuid> {
    ids.into_iter().map(|id| *as_uuid(id)).collect()
}

fn to_revision(raw: i64) -> Result<Revision, StorageError> {
    u64::try_from(raw)
        .map(Revision::new)
        .map_err(|_| StorageError::Internal(format!("negative revision {raw}")))
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `url`. Connections are made lazily, so an
    /// unreachable database surfaces on first use rather than here.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .map_err(queries::to_storage_error)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        migrations::run_migrations(&self.pool)
            .await
            .map_err(queries::to_storage_error)
    }
}

impl AccessStore for PostgresStore {
    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StorageError> {
        queries::tenant(&self.pool, *tenant_id.as_uuid()).await
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, StorageError> {
        queries::account(&self.pool, *user_id.as_uuid()).await
    }

    async fn modules(&self) -> Result<Vec<Module>, StorageError> {
        queries::modules(&self.pool).await
    }

    async fn user_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Vec<UserRole>, StorageError> {
        queries::user_roles(&self.pool, *user_id.as_uuid(), *tenant_id.as_uuid()).await
    }

    async fn roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StorageError> {
        queries::roles(&self.pool, uuids(role_ids, RoleId::as_uuid)).await
    }

    async fn role_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RolePermission>, StorageError> {
        queries::role_permissions(&self.pool, uuids(role_ids, RoleId::as_uuid)).await
    }

    async fn account_access_groups(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<AccountAccessGroup>, StorageError> {
        queries::account_access_groups(&self.pool, *user_id.as_uuid()).await
    }

    async fn role_access_groups(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RoleAccessGroup>, StorageError> {
        queries::role_access_groups(&self.pool, uuids(role_ids, RoleId::as_uuid)).await
    }

    async fn access_groups(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroup>, StorageError> {
        queries::access_groups(&self.pool, uuids(group_ids, AccessGroupId::as_uuid)).await
    }

    async fn access_group_permissions(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroupPermission>, StorageError> {
        queries::access_group_permissions(&self.pool, uuids(group_ids, AccessGroupId::as_uuid))
            .await
    }

    async fn subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError> {
        queries::subscriptions(&self.pool, *tenant_id.as_uuid()).await
    }

    async fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StorageError> {
        queries::plan(&self.pool, *plan_id.as_uuid()).await
    }

    async fn plan_modules(&self, plan_id: &PlanId) -> Result<Vec<PlanModule>, StorageError> {
        queries::plan_modules(&self.pool, *plan_id.as_uuid()).await
    }

    async fn tenant_modules(&self, tenant_id: &TenantId) -> Result<Vec<TenantModule>, StorageError> {
        queries::tenant_modules(&self.pool, *tenant_id.as_uuid()).await
    }

    async fn apply(&self, writes: &[AccessWrite]) -> Result<Revision, StorageError> {
        let mut tx = self.pool.begin().await.map_err(queries::to_storage_error)?;

        for write in writes {
            queries::upsert(&mut *tx, write).await?;
        }
        let revision = queries::next_revision(&mut *tx).await?;

        tx.commit().await.map_err(queries::to_storage_error)?;

        tracing::debug!(writes = writes.len(), revision, "applied access writes");
        to_revision(revision)
    }

    async fn revision(&self) -> Result<Revision, StorageError> {
        let current = queries::current_revision(&self.pool).await?;
        to_revision(current)
    }
}

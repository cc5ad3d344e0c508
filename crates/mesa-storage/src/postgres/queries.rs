use chrono::{DateTime, Utc};
use uuid::Uuid;

use mesa_core::model::{
    AccessGroup, AccessGroupPermission, Account, AccountAccessGroup, AccessWrite, Module,
    ModuleKey, Operation, OperationSet, Plan, PlanModule, Role, RoleAccessGroup,
    RolePermission, Subscription, SubscriptionStatus, Tenant, TenantModule, UserRole,
};

use crate::traits::StorageError;

pub(crate) fn to_storage_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolTimedOut => {
            StorageError::Timeout("timed out acquiring a database connection".to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::Unavailable(e.to_string()),
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StorageError::Conflict(e.to_string())
        }
        _ => StorageError::Internal(e.to_string()),
    }
}

fn module_key(raw: String) -> Result<ModuleKey, StorageError> {
    ModuleKey::parse(&raw)
        .map_err(|e| StorageError::Internal(format!("stored module key '{raw}': {e}")))
}

fn actions(raw: Vec<String>) -> Result<OperationSet, StorageError> {
    raw.iter()
        .map(|name| {
            name.parse::<Operation>()
                .map_err(|e| StorageError::Internal(format!("stored action: {e}")))
        })
        .collect()
}

fn action_names(ops: &OperationSet) -> Vec<String> {
    ops.iter().map(|op| op.as_str().to_string()).collect()
}

fn status(raw: &str) -> Result<SubscriptionStatus, StorageError> {
    SubscriptionStatus::parse(raw)
        .ok_or_else(|| StorageError::Internal(format!("stored subscription status '{raw}'")))
}

pub async fn tenant<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<Tenant>, StorageError> {
    let row: Option<(Uuid, String, bool)> =
        sqlx::query_as("SELECT id, name, is_active FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(to_storage_error)?;
    Ok(row.map(|(id, name, is_active)| Tenant {
        id: id.into(),
        name,
        is_active,
    }))
}

pub async fn account<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<Account>, StorageError> {
    let row: Option<(Uuid, String, bool)> =
        sqlx::query_as("SELECT id, display_name, is_active FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(to_storage_error)?;
    Ok(row.map(|(id, display_name, is_active)| Account {
        id: id.into(),
        display_name,
        is_active,
    }))
}

pub async fn modules<'e>(executor: impl sqlx::PgExecutor<'e>) -> Result<Vec<Module>, StorageError> {
    let rows: Vec<(Uuid, String, String, Option<String>, bool)> = sqlx::query_as(
        "SELECT id, key, name, description, is_active FROM modules ORDER BY key",
    )
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    rows.into_iter()
        .map(|(id, key, name, description, is_active)| {
            Ok(Module {
                id: id.into(),
                key: module_key(key)?,
                name,
                description,
                is_active,
            })
        })
        .collect()
}

pub async fn user_roles<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: Uuid,
    tenant_id: Uuid,
) -> Result<Vec<UserRole>, StorageError> {
    let rows: Vec<(Uuid, Uuid, Uuid, bool)> = sqlx::query_as(
        r#"SELECT user_id, role_id, tenant_id, is_active
           FROM user_roles
           WHERE user_id = $1 AND tenant_id = $2"#,
    )
    .bind(user_id)
    .bind(tenant_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(user_id, role_id, tenant_id, is_active)| UserRole {
            user_id: user_id.into(),
            role_id: role_id.into(),
            tenant_id: tenant_id.into(),
            is_active,
        })
        .collect())
}

pub async fn roles<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    ids: Vec<Uuid>,
) -> Result<Vec<Role>, StorageError> {
    let rows: Vec<(Uuid, Option<Uuid>, String, bool)> =
        sqlx::query_as("SELECT id, tenant_id, name, is_active FROM roles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(executor)
            .await
            .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(id, tenant_id, name, is_active)| Role {
            id: id.into(),
            tenant_id: tenant_id.map(Into::into),
            name,
            is_active,
        })
        .collect())
}

pub async fn role_permissions<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role_ids: Vec<Uuid>,
) -> Result<Vec<RolePermission>, StorageError> {
    let rows: Vec<(Uuid, String, Vec<String>, bool, DateTime<Utc>, DateTime<Utc>)> =
        sqlx::query_as(
            r#"SELECT role_id, module_key, actions, is_active, created_at, updated_at
               FROM role_permissions
               WHERE role_id = ANY($1)"#,
        )
        .bind(role_ids)
        .fetch_all(executor)
        .await
        .map_err(to_storage_error)?;

    rows.into_iter()
        .map(
            |(role_id, key, raw_actions, is_active, created_at, updated_at)| {
                Ok(RolePermission {
                    role_id: role_id.into(),
                    module_key: module_key(key)?,
                    actions: actions(raw_actions)?,
                    is_active,
                    created_at,
                    updated_at,
                })
            },
        )
        .collect()
}

pub async fn account_access_groups<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Vec<AccountAccessGroup>, StorageError> {
    let rows: Vec<(Uuid, Uuid, Uuid, Option<DateTime<Utc>>, bool)> = sqlx::query_as(
        r#"SELECT user_id, access_group_id, granted_by, expires_at, is_active
           FROM account_access_groups
           WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(
            |(user_id, access_group_id, granted_by, expires_at, is_active)| AccountAccessGroup {
                user_id: user_id.into(),
                access_group_id: access_group_id.into(),
                granted_by: granted_by.into(),
                expires_at,
                is_active,
            },
        )
        .collect())
}

pub async fn role_access_groups<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role_ids: Vec<Uuid>,
) -> Result<Vec<RoleAccessGroup>, StorageError> {
    let rows: Vec<(Uuid, Uuid, bool)> = sqlx::query_as(
        r#"SELECT role_id, access_group_id, is_active
           FROM role_access_groups
           WHERE role_id = ANY($1)"#,
    )
    .bind(role_ids)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(role_id, access_group_id, is_active)| RoleAccessGroup {
            role_id: role_id.into(),
            access_group_id: access_group_id.into(),
            is_active,
        })
        .collect())
}

pub async fn access_groups<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    ids: Vec<Uuid>,
) -> Result<Vec<AccessGroup>, StorageError> {
    let rows: Vec<(Uuid, Option<Uuid>, String, bool)> = sqlx::query_as(
        "SELECT id, tenant_id, name, is_active FROM access_groups WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(id, tenant_id, name, is_active)| AccessGroup {
            id: id.into(),
            tenant_id: tenant_id.map(Into::into),
            name,
            is_active,
        })
        .collect())
}

pub async fn access_group_permissions<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    group_ids: Vec<Uuid>,
) -> Result<Vec<AccessGroupPermission>, StorageError> {
    let rows: Vec<(Uuid, String, Vec<String>, bool)> = sqlx::query_as(
        r#"SELECT access_group_id, module_key, actions, is_active
           FROM access_group_permissions
           WHERE access_group_id = ANY($1)"#,
    )
    .bind(group_ids)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    rows.into_iter()
        .map(|(group_id, key, raw_actions, is_active)| {
            Ok(AccessGroupPermission {
                access_group_id: group_id.into(),
                module_key: module_key(key)?,
                actions: actions(raw_actions)?,
                is_active,
            })
        })
        .collect()
}

pub async fn subscriptions<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    tenant_id: Uuid,
) -> Result<Vec<Subscription>, StorageError> {
    let rows: Vec<(Uuid, Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>, bool)> =
        sqlx::query_as(
            r#"SELECT id, tenant_id, plan_id, status, current_period_start,
                      current_period_end, cancel_at_period_end
               FROM subscriptions
               WHERE tenant_id = $1"#,
        )
        .bind(tenant_id)
        .fetch_all(executor)
        .await
        .map_err(to_storage_error)?;

    rows.into_iter()
        .map(|(id, tenant_id, plan_id, raw_status, start, end, cancel_at_period_end)| {
            Ok(Subscription {
                id: id.into(),
                tenant_id: tenant_id.into(),
                plan_id: plan_id.into(),
                status: status(&raw_status)?,
                current_period_start: start,
                current_period_end: end,
                cancel_at_period_end,
            })
        })
        .collect()
}

pub async fn plan<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<Plan>, StorageError> {
    let row: Option<(Uuid, String, bool)> =
        sqlx::query_as("SELECT id, name, is_active FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(to_storage_error)?;
    Ok(row.map(|(id, name, is_active)| Plan {
        id: id.into(),
        name,
        is_active,
    }))
}

pub async fn plan_modules<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    plan_id: Uuid,
) -> Result<Vec<PlanModule>, StorageError> {
    let rows: Vec<(Uuid, Uuid, bool)> = sqlx::query_as(
        "SELECT plan_id, module_id, is_included FROM plan_modules WHERE plan_id = $1",
    )
    .bind(plan_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(plan_id, module_id, is_included)| PlanModule {
            plan_id: plan_id.into(),
            module_id: module_id.into(),
            is_included,
        })
        .collect())
}

pub async fn tenant_modules<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    tenant_id: Uuid,
) -> Result<Vec<TenantModule>, StorageError> {
    let rows: Vec<(Uuid, Uuid, bool, serde_json::Value)> = sqlx::query_as(
        r#"SELECT tenant_id, module_id, is_enabled, configuration
           FROM tenant_modules
           WHERE tenant_id = $1"#,
    )
    .bind(tenant_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(tenant_id, module_id, is_enabled, configuration)| TenantModule {
            tenant_id: tenant_id.into(),
            module_id: module_id.into(),
            is_enabled,
            configuration,
        })
        .collect())
}

pub async fn upsert<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    write: &AccessWrite,
) -> Result<(), StorageError> {
    let query = match write {
        AccessWrite::Tenant(t) => sqlx::query(
            r#"INSERT INTO tenants (id, name, is_active) VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name, is_active = EXCLUDED.is_active"#,
        )
        .bind(*t.id.as_uuid())
        .bind(t.name.clone())
        .bind(t.is_active),
        AccessWrite::Account(a) => sqlx::query(
            r#"INSERT INTO accounts (id, display_name, is_active) VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE
               SET display_name = EXCLUDED.display_name, is_active = EXCLUDED.is_active"#,
        )
        .bind(*a.id.as_uuid())
        .bind(a.display_name.clone())
        .bind(a.is_active),
        AccessWrite::Module(m) => sqlx::query(
            r#"INSERT INTO modules (id, key, name, description, is_active)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (id) DO UPDATE
               SET key = EXCLUDED.key, name = EXCLUDED.name,
                   description = EXCLUDED.description, is_active = EXCLUDED.is_active"#,
        )
        .bind(*m.id.as_uuid())
        .bind(m.key.as_str().to_string())
        .bind(m.name.clone())
        .bind(m.description.clone())
        .bind(m.is_active),
        AccessWrite::Role(r) => sqlx::query(
            r#"INSERT INTO roles (id, tenant_id, name, is_active) VALUES ($1, $2, $3, $4)
               ON CONFLICT (id) DO UPDATE
               SET tenant_id = EXCLUDED.tenant_id, name = EXCLUDED.name,
                   is_active = EXCLUDED.is_active"#,
        )
        .bind(*r.id.as_uuid())
        .bind(r.tenant_id.map(|t| *t.as_uuid()))
        .bind(r.name.clone())
        .bind(r.is_active),
        AccessWrite::UserRole(ur) => sqlx::query(
            r#"INSERT INTO user_roles (user_id, role_id, tenant_id, is_active)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (user_id, role_id, tenant_id) DO UPDATE
               SET is_active = EXCLUDED.is_active"#,
        )
        .bind(*ur.user_id.as_uuid())
        .bind(*ur.role_id.as_uuid())
        .bind(*ur.tenant_id.as_uuid())
        .bind(ur.is_active),
        AccessWrite::RolePermission(rp) => sqlx::query(
            r#"INSERT INTO role_permissions
                   (role_id, module_key, actions, is_active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (role_id, module_key) DO UPDATE
               SET actions = EXCLUDED.actions, is_active = EXCLUDED.is_active,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(*rp.role_id.as_uuid())
        .bind(rp.module_key.as_str().to_string())
        .bind(action_names(&rp.actions))
        .bind(rp.is_active)
        .bind(rp.created_at)
        .bind(rp.updated_at),
        AccessWrite::AccessGroup(g) => sqlx::query(
            r#"INSERT INTO access_groups (id, tenant_id, name, is_active) VALUES ($1, $2, $3, $4)
               ON CONFLICT (id) DO UPDATE
               SET tenant_id = EXCLUDED.tenant_id, name = EXCLUDED.name,
                   is_active = EXCLUDED.is_active"#,
        )
        .bind(*g.id.as_uuid())
        .bind(g.tenant_id.map(|t| *t.as_uuid()))
        .bind(g.name.clone())
        .bind(g.is_active),
        AccessWrite::AccessGroupPermission(p) => sqlx::query(
            r#"INSERT INTO access_group_permissions (access_group_id, module_key, actions, is_active)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (access_group_id, module_key) DO UPDATE
               SET actions = EXCLUDED.actions, is_active = EXCLUDED.is_active"#,
        )
        .bind(*p.access_group_id.as_uuid())
        .bind(p.module_key.as_str().to_string())
        .bind(action_names(&p.actions))
        .bind(p.is_active),
        AccessWrite::AccountAccessGroup(g) => sqlx::query(
            r#"INSERT INTO account_access_groups
                   (user_id, access_group_id, granted_by, expires_at, is_active)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (user_id, access_group_id) DO UPDATE
               SET granted_by = EXCLUDED.granted_by, expires_at = EXCLUDED.expires_at,
                   is_active = EXCLUDED.is_active"#,
        )
        .bind(*g.user_id.as_uuid())
        .bind(*g.access_group_id.as_uuid())
        .bind(*g.granted_by.as_uuid())
        .bind(g.expires_at)
        .bind(g.is_active),
        AccessWrite::RoleAccessGroup(rg) => sqlx::query(
            r#"INSERT INTO role_access_groups (role_id, access_group_id, is_active)
               VALUES ($1, $2, $3)
               ON CONFLICT (role_id, access_group_id) DO UPDATE
               SET is_active = EXCLUDED.is_active"#,
        )
        .bind(*rg.role_id.as_uuid())
        .bind(*rg.access_group_id.as_uuid())
        .bind(rg.is_active),
        AccessWrite::Plan(p) => sqlx::query(
            r#"INSERT INTO plans (id, name, is_active) VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name, is_active = EXCLUDED.is_active"#,
        )
        .bind(*p.id.as_uuid())
        .bind(p.name.clone())
        .bind(p.is_active),
        AccessWrite::PlanModule(pm) => sqlx::query(
            r#"INSERT INTO plan_modules (plan_id, module_id, is_included) VALUES ($1, $2, $3)
               ON CONFLICT (plan_id, module_id) DO UPDATE
               SET is_included = EXCLUDED.is_included"#,
        )
        .bind(*pm.plan_id.as_uuid())
        .bind(*pm.module_id.as_uuid())
        .bind(pm.is_included),
        AccessWrite::Subscription(s) => sqlx::query(
            r#"INSERT INTO subscriptions
                   (id, tenant_id, plan_id, status, current_period_start,
                    current_period_end, cancel_at_period_end)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id) DO UPDATE
               SET tenant_id = EXCLUDED.tenant_id, plan_id = EXCLUDED.plan_id,
                   status = EXCLUDED.status,
                   current_period_start = EXCLUDED.current_period_start,
                   current_period_end = EXCLUDED.current_period_end,
                   cancel_at_period_end = EXCLUDED.cancel_at_period_end"#,
        )
        .bind(*s.id.as_uuid())
        .bind(*s.tenant_id.as_uuid())
        .bind(*s.plan_id.as_uuid())
        .bind(s.status.as_str())
        .bind(s.current_period_start)
        .bind(s.current_period_end)
        .bind(s.cancel_at_period_end),
        AccessWrite::TenantModule(tm) => sqlx::query(
            r#"INSERT INTO tenant_modules (tenant_id, module_id, is_enabled, configuration)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (tenant_id, module_id) DO UPDATE
               SET is_enabled = EXCLUDED.is_enabled, configuration = EXCLUDED.configuration"#,
        )
        .bind(*tm.tenant_id.as_uuid())
        .bind(*tm.module_id.as_uuid())
        .bind(tm.is_enabled)
        .bind(sqlx::types::Json(tm.configuration.clone())),
    };

    query.execute(executor).await.map_err(to_storage_error)?;
    Ok(())
}

pub async fn next_revision<'e>(executor: impl sqlx::PgExecutor<'e>) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as("SELECT nextval('access_revision_seq')")
        .fetch_one(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn current_revision<'e>(
    executor: impl sqlx::PgExecutor<'e>,
) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COALESCE((SELECT last_value FROM access_revision_seq WHERE is_called = true), 0)",
    )
    .fetch_one(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(row.0)
}

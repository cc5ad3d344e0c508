use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id            UUID PRIMARY KEY,
        display_name  TEXT NOT NULL,
        is_active     BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS modules (
        id           UUID PRIMARY KEY,
        key          TEXT NOT NULL UNIQUE,
        name         TEXT NOT NULL,
        description  TEXT,
        is_active    BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id          UUID PRIMARY KEY,
        tenant_id   UUID,
        name        TEXT NOT NULL,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id     UUID NOT NULL,
        role_id     UUID NOT NULL,
        tenant_id   UUID NOT NULL,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE,
        PRIMARY KEY (user_id, role_id, tenant_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_user_roles_user_tenant
    ON user_roles (user_id, tenant_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id      UUID NOT NULL,
        module_key   TEXT NOT NULL,
        actions      TEXT[] NOT NULL,
        is_active    BOOLEAN NOT NULL DEFAULT TRUE,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (role_id, module_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS access_groups (
        id          UUID PRIMARY KEY,
        tenant_id   UUID,
        name        TEXT NOT NULL,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS access_group_permissions (
        access_group_id  UUID NOT NULL,
        module_key       TEXT NOT NULL,
        actions          TEXT[] NOT NULL,
        is_active        BOOLEAN NOT NULL DEFAULT TRUE,
        PRIMARY KEY (access_group_id, module_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_access_groups (
        user_id          UUID NOT NULL,
        access_group_id  UUID NOT NULL,
        granted_by       UUID NOT NULL,
        expires_at       TIMESTAMPTZ,
        is_active        BOOLEAN NOT NULL DEFAULT TRUE,
        PRIMARY KEY (user_id, access_group_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_access_groups (
        role_id          UUID NOT NULL,
        access_group_id  UUID NOT NULL,
        is_active        BOOLEAN NOT NULL DEFAULT TRUE,
        PRIMARY KEY (role_id, access_group_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS plans (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS plan_modules (
        plan_id      UUID NOT NULL,
        module_id    UUID NOT NULL,
        is_included  BOOLEAN NOT NULL,
        PRIMARY KEY (plan_id, module_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id                    UUID PRIMARY KEY,
        tenant_id             UUID NOT NULL,
        plan_id               UUID NOT NULL,
        status                TEXT NOT NULL,
        current_period_start  TIMESTAMPTZ NOT NULL,
        current_period_end    TIMESTAMPTZ NOT NULL,
        cancel_at_period_end  BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_subscriptions_tenant
    ON subscriptions (tenant_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_modules (
        tenant_id      UUID NOT NULL,
        module_id      UUID NOT NULL,
        is_enabled     BOOLEAN NOT NULL,
        configuration  JSONB NOT NULL DEFAULT 'null'::jsonb,
        PRIMARY KEY (tenant_id, module_id)
    )
    "#,
    "CREATE SEQUENCE IF NOT EXISTS access_revision_seq",
];

/// Creates every table the store reads and writes. Safe to run repeatedly.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = STATEMENTS.len(), "database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_statement_is_idempotent() {
        for statement in STATEMENTS {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "statement must be rerunnable: {statement}"
            );
        }
    }

    #[test]
    fn every_record_kind_has_a_table() {
        let tables = [
            "tenants",
            "accounts",
            "modules",
            "roles",
            "user_roles",
            "role_permissions",
            "access_groups",
            "access_group_permissions",
            "account_access_groups",
            "role_access_groups",
            "plans",
            "plan_modules",
            "subscriptions",
            "tenant_modules",
        ];
        for table in tables {
            let create = format!("CREATE TABLE IF NOT EXISTS {table} (");
            assert!(
                STATEMENTS.iter().any(|s| s.contains(&create)),
                "missing table {table}"
            );
        }
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use super::{AccessError, EntitlementSource, PermissionSource};
use crate::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, Account, AccountAccessGroup, Module,
    ModuleId, ModuleKey, Operation, OperationSet, Plan, PlanId, PlanModule, Role,
    RoleAccessGroup, RoleId, RolePermission, Subscription, SubscriptionId, SubscriptionStatus,
    Tenant, TenantId, TenantModule, UserId, UserRole,
};

/// Source backed by plain vectors, shared by tests and benches. `failing`
/// names source calls that return `StoreUnavailable`.
#[derive(Debug, Default, Clone)]
pub struct FixtureSource {
    pub tenants: Vec<Tenant>,
    pub accounts: Vec<Account>,
    pub modules: Vec<Module>,
    pub roles: Vec<Role>,
    pub user_roles: Vec<UserRole>,
    pub role_permissions: Vec<RolePermission>,
    pub access_groups: Vec<AccessGroup>,
    pub access_group_permissions: Vec<AccessGroupPermission>,
    pub account_access_groups: Vec<AccountAccessGroup>,
    pub role_access_groups: Vec<RoleAccessGroup>,
    pub plans: Vec<Plan>,
    pub plan_modules: Vec<PlanModule>,
    pub subscriptions: Vec<Subscription>,
    pub tenant_modules: Vec<TenantModule>,
    pub failing: BTreeSet<&'static str>,
}

impl FixtureSource {
    fn guard(&self, call: &'static str) -> Result<(), AccessError> {
        if self.failing.contains(call) {
            return Err(AccessError::StoreUnavailable(format!("{call}: connection refused")));
        }
        Ok(())
    }

    pub fn fail(mut self, call: &'static str) -> Self {
        self.failing.insert(call);
        self
    }

    pub fn add_tenant(&mut self) -> TenantId {
        let id = TenantId::generate();
        self.tenants.push(Tenant {
            id,
            name: format!("tenant-{id}"),
            is_active: true,
        });
        id
    }

    pub fn add_account(&mut self) -> UserId {
        let id = UserId::generate();
        self.accounts.push(Account {
            id,
            display_name: format!("user-{id}"),
            is_active: true,
        });
        id
    }

    pub fn add_module(&mut self, key: &str) -> ModuleId {
        let id = ModuleId::generate();
        self.modules.push(Module {
            id,
            key: ModuleKey::parse(key).unwrap(),
            name: key.to_string(),
            description: None,
            is_active: true,
        });
        id
    }

    pub fn add_role(&mut self, tenant_id: Option<TenantId>) -> RoleId {
        let id = RoleId::generate();
        self.roles.push(Role {
            id,
            tenant_id,
            name: format!("role-{id}"),
            is_active: true,
        });
        id
    }

    pub fn assign_role(&mut self, user_id: UserId, role_id: RoleId, tenant_id: TenantId) {
        self.user_roles.push(UserRole {
            user_id,
            role_id,
            tenant_id,
            is_active: true,
        });
    }

    pub fn grant_role(&mut self, role_id: RoleId, module: &str, ops: &[Operation]) {
        let now = Utc::now();
        self.role_permissions.push(RolePermission {
            role_id,
            module_key: ModuleKey::parse(module).unwrap(),
            actions: ops.iter().copied().collect::<OperationSet>(),
            is_active: true,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn add_group(&mut self, tenant_id: Option<TenantId>) -> AccessGroupId {
        let id = AccessGroupId::generate();
        self.access_groups.push(AccessGroup {
            id,
            tenant_id,
            name: format!("group-{id}"),
            is_active: true,
        });
        id
    }

    pub fn grant_group(&mut self, group_id: AccessGroupId, module: &str, ops: &[Operation]) {
        self.access_group_permissions.push(AccessGroupPermission {
            access_group_id: group_id,
            module_key: ModuleKey::parse(module).unwrap(),
            actions: ops.iter().copied().collect::<OperationSet>(),
            is_active: true,
        });
    }

    pub fn give_group(
        &mut self,
        user_id: UserId,
        group_id: AccessGroupId,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.account_access_groups.push(AccountAccessGroup {
            user_id,
            access_group_id: group_id,
            granted_by: UserId::generate(),
            expires_at,
            is_active: true,
        });
    }

    pub fn link_group(&mut self, role_id: RoleId, group_id: AccessGroupId) {
        self.role_access_groups.push(RoleAccessGroup {
            role_id,
            access_group_id: group_id,
            is_active: true,
        });
    }

    pub fn add_plan(&mut self, modules: &[ModuleId]) -> PlanId {
        let id = PlanId::generate();
        self.plans.push(Plan {
            id,
            name: format!("plan-{id}"),
            is_active: true,
        });
        for module_id in modules {
            self.plan_modules.push(PlanModule {
                plan_id: id,
                module_id: *module_id,
                is_included: true,
            });
        }
        id
    }

    pub fn subscribe(
        &mut self,
        tenant_id: TenantId,
        plan_id: PlanId,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.subscriptions.push(Subscription {
            id,
            tenant_id,
            plan_id,
            status,
            current_period_start: now - Duration::days(5),
            current_period_end: now + Duration::days(25),
            cancel_at_period_end: false,
        });
        id
    }

    pub fn set_tenant_module(&mut self, tenant_id: TenantId, module_id: ModuleId, enabled: bool) {
        self.tenant_modules
            .retain(|tm| !(tm.tenant_id == tenant_id && tm.module_id == module_id));
        self.tenant_modules.push(TenantModule {
            tenant_id,
            module_id,
            is_enabled: enabled,
            configuration: serde_json::Value::Null,
        });
    }
}

impl PermissionSource for FixtureSource {
    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, AccessError> {
        self.guard("tenant")?;
        Ok(self.tenants.iter().find(|t| t.id == *tenant_id).cloned())
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, AccessError> {
        self.guard("account")?;
        Ok(self.accounts.iter().find(|a| a.id == *user_id).cloned())
    }

    async fn modules(&self) -> Result<Vec<Module>, AccessError> {
        self.guard("modules")?;
        Ok(self.modules.clone())
    }

    async fn user_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Vec<UserRole>, AccessError> {
        self.guard("user_roles")?;
        Ok(self
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == *user_id && ur.tenant_id == *tenant_id)
            .cloned()
            .collect())
    }

    async fn roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, AccessError> {
        self.guard("roles")?;
        Ok(self
            .roles
            .iter()
            .filter(|r| role_ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn role_permissions(&self, role_ids: &[RoleId]) -> Result<Vec<RolePermission>, AccessError> {
        self.guard("role_permissions")?;
        Ok(self
            .role_permissions
            .iter()
            .filter(|rp| role_ids.contains(&rp.role_id))
            .cloned()
            .collect())
    }

    async fn account_access_groups(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<AccountAccessGroup>, AccessError> {
        self.guard("account_access_groups")?;
        Ok(self
            .account_access_groups
            .iter()
            .filter(|g| g.user_id == *user_id)
            .cloned()
            .collect())
    }

    async fn role_access_groups(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RoleAccessGroup>, AccessError> {
        self.guard("role_access_groups")?;
        Ok(self
            .role_access_groups
            .iter()
            .filter(|rg| role_ids.contains(&rg.role_id))
            .cloned()
            .collect())
    }

    async fn access_groups(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroup>, AccessError> {
        self.guard("access_groups")?;
        Ok(self
            .access_groups
            .iter()
            .filter(|g| group_ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn access_group_permissions(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroupPermission>, AccessError> {
        self.guard("access_group_permissions")?;
        Ok(self
            .access_group_permissions
            .iter()
            .filter(|p| group_ids.contains(&p.access_group_id))
            .cloned()
            .collect())
    }
}

impl EntitlementSource for FixtureSource {
    async fn subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, AccessError> {
        self.guard("subscriptions")?;
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.tenant_id == *tenant_id)
            .cloned()
            .collect())
    }

    async fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, AccessError> {
        self.guard("plan")?;
        Ok(self.plans.iter().find(|p| p.id == *plan_id).cloned())
    }

    async fn plan_modules(&self, plan_id: &PlanId) -> Result<Vec<PlanModule>, AccessError> {
        self.guard("plan_modules")?;
        Ok(self
            .plan_modules
            .iter()
            .filter(|pm| pm.plan_id == *plan_id)
            .cloned()
            .collect())
    }

    async fn tenant_modules(&self, tenant_id: &TenantId) -> Result<Vec<TenantModule>, AccessError> {
        self.guard("tenant_modules")?;
        Ok(self
            .tenant_modules
            .iter()
            .filter(|tm| tm.tenant_id == *tenant_id)
            .cloned()
            .collect())
    }
}

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use mesa_core::model::{
    AccessGroup, AccessGroupId, AccessGroupPermission, Account, AccountAccessGroup, AccessWrite,
    Module, ModuleId, ModuleKey, Plan, PlanId, PlanModule, Role, RoleAccessGroup, RoleId,
    RolePermission, Subscription, SubscriptionId, Tenant, TenantId, TenantModule, UserId,
    UserRole,
};

use crate::traits::{AccessStore, Revision, StorageError};

#[derive(Debug, Default)]
struct InnerState {
    revision: u64,
    tenants: HashMap<TenantId, Tenant>,
    accounts: HashMap<UserId, Account>,
    modules: HashMap<ModuleId, Module>,
    roles: HashMap<RoleId, Role>,
    user_roles: HashMap<(UserId, RoleId, TenantId), UserRole>,
    role_permissions: HashMap<(RoleId, ModuleKey), RolePermission>,
    access_groups: HashMap<AccessGroupId, AccessGroup>,
    access_group_permissions: HashMap<(AccessGroupId, ModuleKey), AccessGroupPermission>,
    account_access_groups: HashMap<(UserId, AccessGroupId), AccountAccessGroup>,
    role_access_groups: HashMap<(RoleId, AccessGroupId), RoleAccessGroup>,
    plans: HashMap<PlanId, Plan>,
    plan_modules: HashMap<(PlanId, ModuleId), PlanModule>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    tenant_modules: HashMap<(TenantId, ModuleId), TenantModule>,
}

impl InnerState {
    /// Rejects a batch that would give one module key to two module ids.
    fn check_module_keys(&self, writes: &[AccessWrite]) -> Result<(), StorageError> {
        let mut owners: HashMap<&ModuleKey, ModuleId> =
            self.modules.values().map(|m| (&m.key, m.id)).collect();

        for write in writes {
            let AccessWrite::Module(module) = write else {
                continue;
            };
            // a module being re-keyed releases its old key
            owners.retain(|_, id| *id != module.id);
            if let Some(owner) = owners.get(&module.key)
                && *owner != module.id
            {
                return Err(StorageError::Conflict(format!(
                    "module key '{}' already belongs to module {owner}",
                    module.key
                )));
            }
            owners.insert(&module.key, module.id);
        }
        Ok(())
    }

    fn upsert(&mut self, write: &AccessWrite) {
        match write {
            AccessWrite::Tenant(t) => {
                self.tenants.insert(t.id, t.clone());
            }
            AccessWrite::Account(a) => {
                self.accounts.insert(a.id, a.clone());
            }
            AccessWrite::Module(m) => {
                self.modules.insert(m.id, m.clone());
            }
            AccessWrite::Role(r) => {
                self.roles.insert(r.id, r.clone());
            }
            AccessWrite::UserRole(ur) => {
                self.user_roles
                    .insert((ur.user_id, ur.role_id, ur.tenant_id), ur.clone());
            }
            AccessWrite::RolePermission(rp) => {
                let key = (rp.role_id, rp.module_key.clone());
                let mut row = rp.clone();
                if let Some(existing) = self.role_permissions.get(&key) {
                    row.created_at = existing.created_at;
                }
                self.role_permissions.insert(key, row);
            }
            AccessWrite::AccessGroup(g) => {
                self.access_groups.insert(g.id, g.clone());
            }
            AccessWrite::AccessGroupPermission(p) => {
                self.access_group_permissions
                    .insert((p.access_group_id, p.module_key.clone()), p.clone());
            }
            AccessWrite::AccountAccessGroup(g) => {
                self.account_access_groups
                    .insert((g.user_id, g.access_group_id), g.clone());
            }
            AccessWrite::RoleAccessGroup(rg) => {
                self.role_access_groups
                    .insert((rg.role_id, rg.access_group_id), rg.clone());
            }
            AccessWrite::Plan(p) => {
                self.plans.insert(p.id, p.clone());
            }
            AccessWrite::PlanModule(pm) => {
                self.plan_modules.insert((pm.plan_id, pm.module_id), pm.clone());
            }
            AccessWrite::Subscription(s) => {
                self.subscriptions.insert(s.id, s.clone());
            }
            AccessWrite::TenantModule(tm) => {
                self.tenant_modules
                    .insert((tm.tenant_id, tm.module_id), tm.clone());
            }
        }
    }
}

fn select<K, V: Clone>(rows: &HashMap<K, V>, mut keep: impl FnMut(&V) -> bool) -> Vec<V>
where
    K: Eq + Hash,
{
    rows.values().filter(|row| keep(row)).cloned().collect()
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessStore for InMemoryStore {
    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.tenants.get(tenant_id).cloned())
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.get(user_id).cloned())
    }

    async fn modules(&self) -> Result<Vec<Module>, StorageError> {
        let state = self.state.lock().unwrap();
        let mut modules: Vec<Module> = state.modules.values().cloned().collect();
        modules.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(modules)
    }

    async fn user_roles(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Vec<UserRole>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.user_roles, |ur| {
            ur.user_id == *user_id && ur.tenant_id == *tenant_id
        }))
    }

    async fn roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(role_ids
            .iter()
            .filter_map(|id| state.roles.get(id).cloned())
            .collect())
    }

    async fn role_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RolePermission>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.role_permissions, |rp| {
            role_ids.contains(&rp.role_id)
        }))
    }

    async fn account_access_groups(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<AccountAccessGroup>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.account_access_groups, |g| g.user_id == *user_id))
    }

    async fn role_access_groups(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<RoleAccessGroup>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.role_access_groups, |rg| {
            role_ids.contains(&rg.role_id)
        }))
    }

    async fn access_groups(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroup>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(group_ids
            .iter()
            .filter_map(|id| state.access_groups.get(id).cloned())
            .collect())
    }

    async fn access_group_permissions(
        &self,
        group_ids: &[AccessGroupId],
    ) -> Result<Vec<AccessGroupPermission>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.access_group_permissions, |p| {
            group_ids.contains(&p.access_group_id)
        }))
    }

    async fn subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.subscriptions, |s| s.tenant_id == *tenant_id))
    }

    async fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.plans.get(plan_id).cloned())
    }

    async fn plan_modules(&self, plan_id: &PlanId) -> Result<Vec<PlanModule>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.plan_modules, |pm| pm.plan_id == *plan_id))
    }

    async fn tenant_modules(&self, tenant_id: &TenantId) -> Result<Vec<TenantModule>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(select(&state.tenant_modules, |tm| tm.tenant_id == *tenant_id))
    }

    async fn apply(&self, writes: &[AccessWrite]) -> Result<Revision, StorageError> {
        let mut state = self.state.lock().unwrap();

        state.check_module_keys(writes)?;

        for write in writes {
            state.upsert(write);
        }
        state.revision += 1;

        Ok(Revision::new(state.revision))
    }

    async fn revision(&self) -> Result<Revision, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(Revision::new(state.revision))
    }
}

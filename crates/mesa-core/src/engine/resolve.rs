use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entitlement::EntitlementResolver;
use super::groups::AccessGroupAggregator;
use super::roles::RoleAggregator;
use super::{AccessError, EntitlementSource, PermissionSource};
use crate::clock::Clock;
use crate::model::{ModuleKey, Operation, PermissionMap, TenantId, UserId};

/// Everything one user may do inside one tenant, resolved at `resolved_at`.
///
/// `catalog` holds every module key known when the value was resolved, so a
/// query for a key outside it can be told apart from a denial. `valid_until`
/// is the first moment the passage of time alone can revoke something here:
/// a group grant expiring or the subscription period ending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveAccess {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub permissions: PermissionMap,
    #[serde(skip)]
    pub catalog: BTreeSet<ModuleKey>,
    pub resolved_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl EffectiveAccess {
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_none_or(|until| now < until)
    }

    pub fn check(&self, module: &str, operation: Operation) -> Result<bool, AccessError> {
        if !self.catalog.contains(module) {
            return Err(AccessError::ModuleNotFound(module.to_string()));
        }
        Ok(self.permissions.allows(module, operation))
    }

    pub fn authorize(&self, module: &str, operation: Operation) -> Result<(), AccessError> {
        if self.check(module, operation)? {
            return Ok(());
        }
        // check() succeeded, so the key is in the catalog.
        let module = self
            .catalog
            .get(module)
            .cloned()
            .ok_or_else(|| AccessError::ModuleNotFound(module.to_string()))?;
        Err(AccessError::Forbidden { module, operation })
    }

    pub fn permissions(&self) -> &PermissionMap {
        &self.permissions
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Combines role grants and access-group overlays, then gates the result by
/// the tenant's module entitlement.
pub struct PermissionEngine<S: PermissionSource + EntitlementSource> {
    source: Arc<S>,
    roles: RoleAggregator<S>,
    groups: AccessGroupAggregator<S>,
    entitlements: EntitlementResolver<S>,
    clock: Arc<dyn Clock>,
}

impl<S: PermissionSource + EntitlementSource> PermissionEngine<S> {
    pub fn new(source: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            roles: RoleAggregator::new(Arc::clone(&source)),
            groups: AccessGroupAggregator::new(Arc::clone(&source)),
            entitlements: EntitlementResolver::new(Arc::clone(&source)),
            source,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn resolve(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<EffectiveAccess, AccessError> {
        self.resolve_at(user_id, tenant_id, self.clock.now()).await
    }

    pub async fn resolve_at(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<EffectiveAccess, AccessError> {
        let (tenant, account) = futures::try_join!(
            self.source.tenant(tenant_id),
            self.source.account(user_id),
        )?;
        let tenant = tenant.ok_or(AccessError::TenantNotFound(*tenant_id))?;
        let account = account.ok_or(AccessError::AccountNotFound(*user_id))?;

        let (modules, active_roles, entitlement) = futures::try_join!(
            self.source.modules(),
            self.roles.active_roles(user_id, tenant_id),
            self.entitlements.entitlement(tenant_id, now),
        )?;
        let catalog: BTreeSet<ModuleKey> = modules.iter().map(|m| m.key.clone()).collect();

        if !tenant.is_active || !account.is_active {
            tracing::debug!(
                tenant_id = %tenant_id,
                user_id = %user_id,
                tenant_active = tenant.is_active,
                account_active = account.is_active,
                "inactive principal, resolving to no permissions"
            );
            return Ok(EffectiveAccess {
                user_id: *user_id,
                tenant_id: *tenant_id,
                permissions: PermissionMap::new(),
                catalog,
                resolved_at: now,
                valid_until: None,
            });
        }

        let (role_permissions, group_grants) = futures::try_join!(
            self.roles.permissions_for(&active_roles),
            self.groups.grants(user_id, tenant_id, &active_roles, now),
        )?;

        let entitled: BTreeSet<&ModuleKey> = modules
            .iter()
            .filter(|m| m.is_active && entitlement.modules.contains(&m.id))
            .map(|m| &m.key)
            .collect();

        let mut permissions = role_permissions;
        permissions.merge(&group_grants.permissions);
        permissions.retain_modules(|key| entitled.contains(key));

        tracing::trace!(
            tenant_id = %tenant_id,
            user_id = %user_id,
            roles = active_roles.len(),
            entitled = entitled.len(),
            modules = permissions.len(),
            "resolved effective access"
        );

        Ok(EffectiveAccess {
            user_id: *user_id,
            tenant_id: *tenant_id,
            permissions,
            catalog,
            resolved_at: now,
            valid_until: earliest(group_grants.next_expiry, entitlement.until),
        })
    }

    pub async fn has_access(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
        module: &str,
        operation: Operation,
    ) -> Result<bool, AccessError> {
        let access = self.resolve(user_id, tenant_id).await?;
        let allowed = access.check(module, operation)?;
        if !allowed {
            tracing::debug!(
                tenant_id = %tenant_id,
                user_id = %user_id,
                module,
                operation = %operation,
                "access denied"
            );
        }
        Ok(allowed)
    }

    pub async fn effective_permissions(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<PermissionMap, AccessError> {
        Ok(self.resolve(user_id, tenant_id).await?.permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::fixture::FixtureSource;
    use crate::model::{ModuleId, SubscriptionStatus};
    use chrono::Duration;

    struct Restaurant {
        source: FixtureSource,
        tenant: TenantId,
        user: UserId,
        coupons: ModuleId,
        group: crate::model::AccessGroupId,
    }

    /// Role grants coupons {select, insert}, a direct group grants coupons
    /// {update}, and the tenant's active plan includes coupons.
    fn restaurant(now: DateTime<Utc>) -> Restaurant {
        let mut source = FixtureSource::default();
        let tenant = source.add_tenant();
        let user = source.add_account();
        let coupons = source.add_module("coupons");
        let role = source.add_role(Some(tenant));
        source.assign_role(user, role, tenant);
        source.grant_role(role, "coupons", &[Operation::Select, Operation::Insert]);
        let group = source.add_group(Some(tenant));
        source.grant_group(group, "coupons", &[Operation::Update]);
        source.give_group(user, group, Some(now + Duration::days(1)));
        let plan = source.add_plan(&[coupons]);
        source.subscribe(tenant, plan, SubscriptionStatus::Active, now);
        source.set_tenant_module(tenant, coupons, true);
        Restaurant {
            source,
            tenant,
            user,
            coupons,
            group,
        }
    }

    fn engine(source: FixtureSource, now: DateTime<Utc>) -> PermissionEngine<FixtureSource> {
        PermissionEngine::new(Arc::new(source), Arc::new(ManualClock::new(now)))
    }

    #[tokio::test]
    async fn role_and_group_grants_combine() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);

        let delete = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Delete)
            .await
            .unwrap();
        let update = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Update)
            .await
            .unwrap();
        let select = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
            .await
            .unwrap();

        assert!(!delete, "no source grants delete");
        assert!(update, "update comes from the access group");
        assert!(select, "select comes from the role");
    }

    #[tokio::test]
    async fn disabled_tenant_module_denies_every_operation() {
        let now = Utc::now();
        let mut r = restaurant(now);
        r.source.set_tenant_module(r.tenant, r.coupons, false);
        let engine = engine(r.source, now);

        for op in Operation::ALL {
            let allowed = engine
                .has_access(&r.user, &r.tenant, "coupons", op)
                .await
                .unwrap();
            assert!(!allowed, "{op} should be denied with the module disabled");
        }
    }

    #[tokio::test]
    async fn expired_subscription_leaves_no_permissions() {
        let now = Utc::now();
        let mut r = restaurant(now);
        r.source.subscriptions[0].status = SubscriptionStatus::Expired;
        let engine = engine(r.source, now);

        let perms = engine
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert!(perms.is_empty());
    }

    #[tokio::test]
    async fn no_roles_and_no_groups_is_empty() {
        let now = Utc::now();
        let mut r = restaurant(now);
        r.source.user_roles.clear();
        r.source.account_access_groups.clear();
        let engine = engine(r.source, now);

        let perms = engine
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert!(perms.is_empty());
    }

    #[tokio::test]
    async fn effective_permissions_lists_combined_operations() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);

        let perms = engine
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        let coupons = perms.get("coupons").unwrap();
        assert_eq!(coupons.len(), 3);
        assert!(!coupons.contains(Operation::Delete));
    }

    #[tokio::test]
    async fn granting_more_only_adds_operations() {
        let now = Utc::now();
        let r = restaurant(now);
        let before = engine(r.source.clone(), now)
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        let mut widened = r.source;
        widened.grant_group(r.group, "coupons", &[Operation::Delete]);
        let after = engine(widened, now)
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert_keeps_every_operation(&before, &after);
        assert!(after.allows("coupons", Operation::Delete));
    }

    fn assert_keeps_every_operation(before: &PermissionMap, after: &PermissionMap) {
        for (module, ops) in before {
            for op in ops.iter() {
                assert!(after.allows(module.as_str(), op), "lost {op} on {module}");
            }
        }
    }

    #[tokio::test]
    async fn activating_role_permission_only_adds_operations() {
        let now = Utc::now();
        let mut r = restaurant(now);
        let role = r.source.roles[0].id;
        r.source.grant_role(role, "coupons", &[Operation::Delete]);
        let row = r.source.role_permissions.len() - 1;
        r.source.role_permissions[row].is_active = false;
        let before = engine(r.source.clone(), now)
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        let mut activated = r.source;
        activated.role_permissions[row].is_active = true;
        let after = engine(activated, now)
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert!(!before.allows("coupons", Operation::Delete));
        assert_keeps_every_operation(&before, &after);
        assert!(after.allows("coupons", Operation::Delete));
    }

    #[tokio::test]
    async fn activating_account_group_only_adds_operations() {
        let now = Utc::now();
        let mut r = restaurant(now);
        let extra = r.source.add_group(Some(r.tenant));
        r.source.grant_group(extra, "coupons", &[Operation::Delete]);
        r.source.give_group(r.user, extra, None);
        let row = r.source.account_access_groups.len() - 1;
        r.source.account_access_groups[row].is_active = false;
        let before = engine(r.source.clone(), now)
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        let mut activated = r.source;
        activated.account_access_groups[row].is_active = true;
        let after = engine(activated, now)
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert!(!before.allows("coupons", Operation::Delete));
        assert_keeps_every_operation(&before, &after);
        assert!(after.allows("coupons", Operation::Delete));
    }

    #[tokio::test]
    async fn group_grant_lapses_after_expiry() {
        let now = Utc::now();
        let r = restaurant(now);
        let clock = Arc::new(ManualClock::new(now));
        let engine = PermissionEngine::new(Arc::new(r.source), clock.clone());

        assert!(
            engine
                .has_access(&r.user, &r.tenant, "coupons", Operation::Update)
                .await
                .unwrap()
        );

        clock.advance(Duration::days(2));

        assert!(
            !engine
                .has_access(&r.user, &r.tenant, "coupons", Operation::Update)
                .await
                .unwrap()
        );
        assert!(
            engine
                .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
                .await
                .unwrap(),
            "role grant is unaffected by the group expiry"
        );
    }

    #[tokio::test]
    async fn resolved_access_is_bounded_by_earliest_expiry() {
        let now = Utc::now();
        let r = restaurant(now);
        let period_end = r.source.subscriptions[0].current_period_end;
        let engine = engine(r.source, now);

        let access = engine.resolve(&r.user, &r.tenant).await.unwrap();

        let expected = (now + Duration::days(1)).min(period_end);
        assert_eq!(access.valid_until, Some(expected));
        assert!(access.is_current_at(now));
        assert!(!access.is_current_at(expected));
    }

    #[tokio::test]
    async fn scheduled_downgrade_bounds_resolved_access() {
        let now = Utc::now();
        let mut r = restaurant(now);
        let basic = r.source.add_plan(&[]);
        r.source
            .subscribe(r.tenant, basic, SubscriptionStatus::Active, now);
        let downgrade_at = now + Duration::hours(1);
        r.source.subscriptions[1].current_period_start = downgrade_at;
        r.source.subscriptions[1].current_period_end = now + Duration::days(60);
        let clock = Arc::new(ManualClock::new(now));
        let engine = PermissionEngine::new(Arc::new(r.source), clock.clone());

        let access = engine.resolve(&r.user, &r.tenant).await.unwrap();
        assert_eq!(access.valid_until, Some(downgrade_at));
        assert!(access.check("coupons", Operation::Select).unwrap());

        clock.advance(Duration::hours(2));

        assert!(
            !engine
                .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn repeated_checks_agree() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);

        let first = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Insert)
            .await
            .unwrap();
        let second = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Insert)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn disabling_module_leaves_other_tenant_untouched() {
        let now = Utc::now();
        let mut r = restaurant(now);
        let other_tenant = r.source.add_tenant();
        let plan = r.source.plans[0].id;
        r.source
            .subscribe(other_tenant, plan, SubscriptionStatus::Active, now);
        r.source.set_tenant_module(other_tenant, r.coupons, true);
        let role = r.source.roles[0].id;
        r.source.assign_role(r.user, role, other_tenant);
        r.source.roles[0].tenant_id = None;
        r.source.set_tenant_module(r.tenant, r.coupons, false);
        let engine = engine(r.source, now);

        let here = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
            .await
            .unwrap();
        let there = engine
            .has_access(&r.user, &other_tenant, "coupons", Operation::Select)
            .await
            .unwrap();

        assert!(!here);
        assert!(there);
    }

    #[tokio::test]
    async fn inactive_module_is_never_entitled() {
        let now = Utc::now();
        let mut r = restaurant(now);
        r.source.modules[0].is_active = false;
        let engine = engine(r.source, now);

        let allowed = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
            .await
            .unwrap();

        assert!(!allowed);
    }

    #[tokio::test]
    async fn inactive_account_resolves_to_nothing() {
        let now = Utc::now();
        let mut r = restaurant(now);
        r.source.accounts[0].is_active = false;
        let engine = engine(r.source, now);

        let perms = engine
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert!(perms.is_empty());
    }

    #[tokio::test]
    async fn inactive_tenant_denies_but_still_knows_modules() {
        let now = Utc::now();
        let mut r = restaurant(now);
        r.source.tenants[0].is_active = false;
        let engine = engine(r.source, now);

        let allowed = engine
            .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
            .await
            .unwrap();

        assert!(!allowed);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);
        let missing = TenantId::generate();

        let err = engine
            .has_access(&r.user, &missing, "coupons", Operation::Select)
            .await
            .unwrap_err();

        assert_eq!(err, AccessError::TenantNotFound(missing));
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);
        let missing = UserId::generate();

        let err = engine
            .effective_permissions(&missing, &r.tenant)
            .await
            .unwrap_err();

        assert_eq!(err, AccessError::AccountNotFound(missing));
    }

    #[tokio::test]
    async fn unknown_module_is_not_found_rather_than_denied() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);

        let err = engine
            .has_access(&r.user, &r.tenant, "payroll", Operation::Select)
            .await
            .unwrap_err();

        assert!(matches!(err, AccessError::ModuleNotFound(ref key) if key == "payroll"));
    }

    #[tokio::test]
    async fn failure_in_any_source_is_store_unavailable() {
        let now = Utc::now();
        let calls = [
            "tenant",
            "account",
            "modules",
            "user_roles",
            "roles",
            "role_permissions",
            "account_access_groups",
            "role_access_groups",
            "access_groups",
            "access_group_permissions",
            "subscriptions",
            "plan",
            "plan_modules",
            "tenant_modules",
        ];

        for call in calls {
            let r = restaurant(now);
            let mut source = r.source.fail(call);
            // route a group through the role so role_access_groups is read
            source.link_group(source.roles[0].id, r.group);
            let engine = engine(source, now);

            let result = engine
                .has_access(&r.user, &r.tenant, "coupons", Operation::Select)
                .await;

            assert!(
                matches!(result, Err(AccessError::StoreUnavailable(_))),
                "failing {call} should surface as StoreUnavailable, got {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn authorize_turns_deny_into_forbidden() {
        let now = Utc::now();
        let r = restaurant(now);
        let engine = engine(r.source, now);
        let access = engine.resolve(&r.user, &r.tenant).await.unwrap();

        assert!(access.authorize("coupons", Operation::Insert).is_ok());
        let err = access.authorize("coupons", Operation::Delete).unwrap_err();
        assert!(matches!(
            err,
            AccessError::Forbidden { ref module, operation: Operation::Delete } if module.as_str() == "coupons"
        ));
    }

    #[tokio::test]
    async fn grant_for_module_outside_catalog_is_dropped() {
        let now = Utc::now();
        let mut r = restaurant(now);
        let role = r.source.roles[0].id;
        r.source.grant_role(role, "legacy-pos", &[Operation::Select]);
        let engine = engine(r.source, now);

        let perms = engine
            .effective_permissions(&r.user, &r.tenant)
            .await
            .unwrap();

        assert!(perms.get("legacy-pos").is_none());
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{AccessError, EntitlementSource};
use crate::model::{ModuleId, Plan, PlanModule, Subscription, TenantId, TenantModule};

/// The subscription that decides entitlement for `tenant_id` at `now`.
///
/// When several entitle at once, the one with the latest period start wins.
pub fn current_subscription<'a>(
    subscriptions: &'a [Subscription],
    tenant_id: &TenantId,
    now: DateTime<Utc>,
) -> Option<&'a Subscription> {
    let mut entitling = subscriptions
        .iter()
        .filter(|s| s.tenant_id == *tenant_id && s.entitles_at(now))
        .peekable();

    let first = entitling.next()?;
    if entitling.peek().is_none() {
        return Some(first);
    }

    let chosen = std::iter::once(first)
        .chain(entitling)
        .max_by_key(|s| (s.current_period_start, s.id))?;
    tracing::warn!(
        tenant_id = %tenant_id,
        subscription_id = %chosen.id,
        "multiple subscriptions entitle at once, using latest period start"
    );
    Some(chosen)
}

/// The earliest future period start among `tenant_id`'s subscriptions that
/// could entitle once it arrives. A scheduled plan change takes over then.
pub fn next_subscription_start(
    subscriptions: &[Subscription],
    tenant_id: &TenantId,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    subscriptions
        .iter()
        .filter(|s| s.tenant_id == *tenant_id && s.status_entitles())
        .filter(|s| s.current_period_start > now && s.current_period_start < s.current_period_end)
        .map(|s| s.current_period_start)
        .min()
}

/// Modules the plan includes that the tenant has switched on.
///
/// A module needs an including plan row and an enabling tenant row. An
/// excluding or disabling row for the same module overrides its counterpart.
pub fn entitled_modules(
    plan: &Plan,
    plan_modules: &[PlanModule],
    tenant_modules: &[TenantModule],
    tenant_id: &TenantId,
) -> BTreeSet<ModuleId> {
    if !plan.is_active {
        return BTreeSet::new();
    }

    let plan_rows = plan_modules.iter().filter(|pm| pm.plan_id == plan.id);
    let excluded: BTreeSet<ModuleId> = plan_rows
        .clone()
        .filter(|pm| !pm.is_included)
        .map(|pm| pm.module_id)
        .collect();
    let included: BTreeSet<ModuleId> = plan_rows
        .filter(|pm| pm.is_included && !excluded.contains(&pm.module_id))
        .map(|pm| pm.module_id)
        .collect();

    let tenant_rows = tenant_modules.iter().filter(|tm| tm.tenant_id == *tenant_id);
    let disabled: BTreeSet<ModuleId> = tenant_rows
        .clone()
        .filter(|tm| !tm.is_enabled)
        .map(|tm| tm.module_id)
        .collect();

    tenant_rows
        .filter(|tm| tm.is_enabled && !disabled.contains(&tm.module_id))
        .map(|tm| tm.module_id)
        .filter(|id| included.contains(id))
        .collect()
}

/// Modules a tenant may use, and when the subscription granting them lapses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entitlement {
    pub modules: BTreeSet<ModuleId>,
    pub until: Option<DateTime<Utc>>,
}

pub struct EntitlementResolver<S: EntitlementSource> {
    source: Arc<S>,
}

impl<S: EntitlementSource> EntitlementResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub async fn enabled_modules(
        &self,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<BTreeSet<ModuleId>, AccessError> {
        Ok(self.entitlement(tenant_id, now).await?.modules)
    }

    pub async fn entitlement(
        &self,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, AccessError> {
        let subscriptions = self.source.subscriptions(tenant_id).await?;
        let next_start = next_subscription_start(&subscriptions, tenant_id, now);
        let Some(subscription) = current_subscription(&subscriptions, tenant_id, now) else {
            tracing::debug!(tenant_id = %tenant_id, "no entitling subscription");
            return Ok(Entitlement {
                modules: BTreeSet::new(),
                until: next_start,
            });
        };
        let until = match next_start {
            Some(start) => start.min(subscription.current_period_end),
            None => subscription.current_period_end,
        };

        let (plan, plan_modules, tenant_modules) = futures::try_join!(
            self.source.plan(&subscription.plan_id),
            self.source.plan_modules(&subscription.plan_id),
            self.source.tenant_modules(tenant_id),
        )?;

        let Some(plan) = plan else {
            tracing::warn!(
                tenant_id = %tenant_id,
                plan_id = %subscription.plan_id,
                "subscription references unknown plan"
            );
            return Ok(Entitlement {
                modules: BTreeSet::new(),
                until: Some(until),
            });
        };

        Ok(Entitlement {
            modules: entitled_modules(&plan, &plan_modules, &tenant_modules, tenant_id),
            until: Some(until),
        })
    }
}

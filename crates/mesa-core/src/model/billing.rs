use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ModuleId, PlanId, SubscriptionId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub is_active: bool,
}

/// Declares which modules a plan can grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanModule {
    pub plan_id: PlanId,
    pub module_id: ModuleId,
    pub is_included: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(SubscriptionStatus::Active),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

impl Subscription {
    pub fn in_period(&self, now: DateTime<Utc>) -> bool {
        self.current_period_start <= now && now < self.current_period_end
    }

    /// Whether this subscription grants its plan's modules at `now`.
    ///
    /// A cancelled subscription set to end at period end keeps entitling until
    /// `current_period_end`.
    pub fn entitles_at(&self, now: DateTime<Utc>) -> bool {
        self.status_entitles() && self.in_period(now)
    }

    /// Whether the status lets this subscription entitle at all, ignoring
    /// its period.
    pub fn status_entitles(&self) -> bool {
        match self.status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Cancelled => self.cancel_at_period_end,
            SubscriptionStatus::Trialing
            | SubscriptionStatus::PastDue
            | SubscriptionStatus::Expired => false,
        }
    }
}

/// Tenant-level switch for a module, e.g. a trial add-on or an explicit
/// opt-out of something the plan includes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantModule {
    pub tenant_id: TenantId,
    pub module_id: ModuleId,
    pub is_enabled: bool,
    #[serde(default)]
    pub configuration: serde_json::Value,
}

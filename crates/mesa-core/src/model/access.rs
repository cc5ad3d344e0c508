use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AccessGroupId, ModuleId, ModuleKey, RoleId, TenantId, UserId};
use super::operation::OperationSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub display_name: String,
    pub is_active: bool,
}

/// Catalog entry for a feature area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub key: ModuleKey,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_active: bool,
}

/// A named grant bundle. `tenant_id == None` makes the role global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub is_active: bool,
}

impl Role {
    pub fn applies_to(&self, tenant_id: &TenantId) -> bool {
        self.tenant_id.is_none_or(|t| t == *tenant_id)
    }
}

/// Assignment of a role to a user inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub tenant_id: TenantId,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub module_key: ModuleKey,
    pub actions: OperationSet,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reusable grant bundle, independent of roles. `tenant_id == None` makes
/// the group usable from every tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroup {
    pub id: AccessGroupId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub is_active: bool,
}

impl AccessGroup {
    pub fn applies_to(&self, tenant_id: &TenantId) -> bool {
        self.tenant_id.is_none_or(|t| t == *tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroupPermission {
    pub access_group_id: AccessGroupId,
    pub module_key: ModuleKey,
    pub actions: OperationSet,
    pub is_active: bool,
}

/// Time-bounded, revocable grant of an access group to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAccessGroup {
    pub user_id: UserId,
    pub access_group_id: AccessGroupId,
    pub granted_by: UserId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl AccountAccessGroup {
    /// Active and not yet expired at `now`. Expiry is exclusive: a grant
    /// expiring exactly at `now` no longer counts.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// Makes an access group flow to every holder of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAccessGroup {
    pub role_id: RoleId,
    pub access_group_id: AccessGroupId,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(expires_at: Option<DateTime<Utc>>, is_active: bool) -> AccountAccessGroup {
        AccountAccessGroup {
            user_id: UserId::generate(),
            access_group_id: AccessGroupId::generate(),
            granted_by: UserId::generate(),
            expires_at,
            is_active,
        }
    }

    #[test]
    fn grant_without_expiry_is_effective() {
        assert!(grant(None, true).is_effective_at(Utc::now()));
    }

    #[test]
    fn inactive_grant_is_not_effective() {
        assert!(!grant(None, false).is_effective_at(Utc::now()));
    }

    #[test]
    fn expired_grant_is_not_effective() {
        let now = Utc::now();
        assert!(!grant(Some(now - Duration::minutes(1)), true).is_effective_at(now));
    }

    #[test]
    fn grant_expiring_exactly_now_is_not_effective() {
        let now = Utc::now();
        assert!(!grant(Some(now), true).is_effective_at(now));
    }

    #[test]
    fn future_expiry_is_effective() {
        let now = Utc::now();
        assert!(grant(Some(now + Duration::hours(1)), true).is_effective_at(now));
    }

    #[test]
    fn global_role_applies_everywhere() {
        let role = Role {
            id: RoleId::generate(),
            tenant_id: None,
            name: "owner".to_string(),
            is_active: true,
        };
        assert!(role.applies_to(&TenantId::generate()));
    }

    #[test]
    fn scoped_role_applies_only_to_its_tenant() {
        let tenant = TenantId::generate();
        let role = Role {
            id: RoleId::generate(),
            tenant_id: Some(tenant),
            name: "cashier".to_string(),
            is_active: true,
        };
        assert!(role.applies_to(&tenant));
        assert!(!role.applies_to(&TenantId::generate()));
    }
}

mod access;
mod billing;
mod ids;
mod operation;
mod write;

pub use access::{
    AccessGroup, AccessGroupPermission, Account, AccountAccessGroup, Module, Role,
    RoleAccessGroup, RolePermission, Tenant, UserRole,
};
pub use billing::{Plan, PlanModule, Subscription, SubscriptionStatus, TenantModule};
pub use ids::{
    AccessGroupId, InvalidModuleKey, MAX_MODULE_KEY_LEN, ModuleId, ModuleKey, PlanId, RoleId,
    SubscriptionId, TenantId, UserId,
};
pub use operation::{Operation, OperationSet, PermissionMap, UnknownOperation};
pub use write::AccessWrite;

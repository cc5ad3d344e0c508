pub mod cache;
pub mod clock;
pub mod engine;
pub mod model;

pub use cache::{CacheConfig, DecisionCache, InvalidationScope, Lookup, PopulationTicket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    AccessError, EffectiveAccess, EntitlementSource, PermissionEngine, PermissionSource,
};

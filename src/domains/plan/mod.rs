pub mod policy;
pub mod tiers;
pub mod usage;

pub use policy::PlanPolicy;
pub use tiers::{TierConfig, TierTable};
pub use usage::UsageCounter;

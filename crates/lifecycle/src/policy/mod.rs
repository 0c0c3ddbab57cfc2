//! Pure lifecycle decisions.
//!
//! Nothing in this module performs I/O. [`plan_rotation`] turns a key
//! snapshot into an ordered [`ActionPlan`]; [`RetirementPolicy`] decides
//! whether an inactive key is stale enough to delete.

pub mod retirement;
pub mod rotation;

pub use retirement::{DEFAULT_THRESHOLD_DAYS, RetirementPolicy};
pub use rotation::{Action, ActionPlan, MAX_KEYS_PER_IDENTITY, SlotUnavailable, plan_rotation};

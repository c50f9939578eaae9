//! Lifecycle policy engine: pure decisions, no I/O.

pub mod policy;
pub mod transitions;

pub use policy::{decide_should_heal, is_authorized_to_delete};
pub use transitions::{plan, LifecycleState, Presence, SweepAction};

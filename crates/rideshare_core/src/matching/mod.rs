//! Rider-to-driver allocation: the iterative allocator and its driver-selection policy.

pub mod allocator;
pub mod selector;
pub mod types;

pub use allocator::{allocate, Allocator};
pub use selector::select_driver;
pub use types::{Allocation, AllocationPhase, DriverSlot, StepOutcome};

//! Inventory queries and VM lifecycle operations.

pub mod inventory;
pub mod lifecycle;
pub mod validate;
pub mod vm;

pub use lifecycle::{LifecycleCommand, LifecycleRunner};
pub use vm::{flatten_snapshots, Outcome, OutcomeKind, SnapshotEntry, VmOps};

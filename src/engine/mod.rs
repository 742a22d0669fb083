// Group capacity & waitlist engine

pub mod ledger;
pub mod lifecycle;
pub mod sweeper;

pub use ledger::CapacityLedger;
pub use lifecycle::{GroupLifecycle, LeaveOutcome};
pub use sweeper::ExpirySweeper;

// Core types and primitives

pub mod clock;
pub mod strong_types;

pub use clock::{from_millis, to_millis, Clock, ManualClock, SystemClock};
pub use strong_types::{GroupId, UserId};

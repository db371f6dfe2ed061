//! Wire protocol to a chamber controller.

mod link;

pub use link::{HardwareLink, Op, HOUSE_LIGHT_CHANNEL, SOLENOID_CHANNEL};

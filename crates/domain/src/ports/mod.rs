pub mod delivery;
pub mod sinks;

pub use delivery::*;
pub use sinks::*;

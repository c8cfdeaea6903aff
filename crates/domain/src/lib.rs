pub mod entities;
pub mod events;
pub mod ports;

pub use courier_errors::{CourierError, CourierResult, ErrorKind};
pub use entities::*;
pub use events::*;
pub use ports::*;

pub mod app_config;
pub mod dispatcher;
pub mod observability;
pub mod queue;
pub mod sender;

pub use app_config::*;
pub use dispatcher::*;
pub use observability::*;
pub use queue::*;
pub use sender::*;

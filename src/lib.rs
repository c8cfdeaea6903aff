pub mod app;
pub mod shutdown;

pub use app::{Application, InputSource, RunSummary};
pub use shutdown::ShutdownManager;

//! # Courier Testing Utils
//!
//! Shared test doubles for the sender and sink ports, fast config builders
//! and small async helpers.
//!
//! ```toml
//! [dev-dependencies]
//! courier-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use helpers::*;
pub use mocks::*;

//! # Application Layer
//!
//! Use cases and orchestration logic coordinating domain and connector
//! layers, plus the ports adapters implement.

pub mod interfaces;
pub mod use_cases;

pub use interfaces::*;
pub use use_cases::*;

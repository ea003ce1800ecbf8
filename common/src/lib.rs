//! Unitwork Common Types
//!
//! Shared types used by the coordinator and by participant implementations:
//! the participant error taxonomy, identifiers, and transaction phases.

pub mod error;
pub mod identifiers;
pub mod phase;

pub use error::*;
pub use identifiers::*;
pub use phase::*;

//! Unitwork Participant Library
//!
//! The [`UnitOfWork`] capability that the coordinator drives, and a few
//! participants that are useful on their own: a closure-backed unit and a
//! transactional outbox for message publishing.

pub mod callback;
pub mod config;
pub mod outbox;
pub mod unit;

pub use callback::CallbackUnit;
pub use config::OutboxConfig;
pub use outbox::Outbox;
pub use unit::{Candidate, UnitOfWork};

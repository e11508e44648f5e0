//! Per-call session continuity.

pub mod store;

pub use store::{Session, SessionStats, SessionStore};

//! Core data models for the transfer monitor.
//!
//! These types describe what the engine observes (asset drops), what it
//! tracks (asset/destination pairs and duplicate drops), and what it emits
//! (alerts and performance rows). They carry no locking of their own; the
//! services own them behind a single mutual-exclusion scope per table.

pub mod alert;
pub mod drop;
pub mod duplication;
pub mod performance;
pub mod transfer;

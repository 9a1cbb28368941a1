//! Engine components and the background tasks that drive them.

pub mod aggregator;
pub mod classifier;
pub mod dispatcher;
pub mod ingest;
pub mod ledger;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod workers;

//! Orchestrators (C7/C8, spec.md §4.7-4.8): the two bus-facing request
//! handlers that stitch every other component together.

pub mod indexing;
pub mod query;

pub use indexing::IndexingOrchestrator;
pub use query::QueryOrchestrator;

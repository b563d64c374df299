//! gradewise-core: access control, rubric aggregation and grading
//! orchestration for coursework.
//!
//! This crate defines the data model, the collaborator traits (record store,
//! criterion scorer, group resolver, event notifier) and the grading logic
//! that the providers and CLI crates build on.

pub mod access;
pub mod error;
pub mod events;
pub mod export;
pub mod fallback;
pub mod gradebook;
pub mod lease;
pub mod model;
pub mod orchestrator;
pub mod paginate;
pub mod parser;
pub mod rubric;
pub mod statistics;
pub mod store;
pub mod traits;
pub mod update;

pub use error::{AggregationError, GradingError, ScorerError};

//! Core domain types
//!
//! These types represent the pipelines owned by the engine. The engine
//! mutates them under its state lock; the front end only ever sees
//! [`crate::dto::pipeline::PipelineView`] snapshots.

pub mod health;
pub mod log;
pub mod pipeline;

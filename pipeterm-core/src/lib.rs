//! Pipeterm Core
//!
//! Core types for the pipeterm pipeline scheduler.
//!
//! This crate contains:
//! - Domain types: Pipeline, its status, logs and health signals
//! - DTOs: read-only views for the front end and the persisted record format
//!
//! Nothing in here performs I/O. Persistence, scheduling and execution live
//! in `pipeterm-engine`.

pub mod domain;
pub mod dto;

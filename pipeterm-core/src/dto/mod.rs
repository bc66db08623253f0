//! Data Transfer Objects
//!
//! Lightweight representations of domain entities:
//! - `pipeline`: creation requests and read-only views for the front end
//! - `record`: the on-disk format written by the persistence store

pub mod pipeline;
pub mod record;

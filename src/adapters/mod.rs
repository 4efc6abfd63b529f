//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure (file I/O, HTTP, in-process price tables). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: JSON HTTP API over the use cases
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL account journals
//! - `quotes`: Configured quote book

pub mod api;
pub mod metrics;
pub mod persistence;
pub mod quotes;

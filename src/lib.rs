//! Assignment Helper — email-driven classroom assignment tracking.
//!
//! Teachers and students send plain emails (ASSIGN, SUBMIT, GRADE,
//! RETURN); the pipeline parses, validates, persists, and replies. A
//! small REST API exposes the same pipeline plus assignment status.

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod store;

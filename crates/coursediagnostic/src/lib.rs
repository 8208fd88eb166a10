//! Course configuration diagnostics.
//!
//! Evaluates a configurable set of checks against a course, caches the
//! results per course, and exposes them over HTTP as a notification banner
//! and a detail report.

pub mod config;
pub mod db;
pub mod diagnostic;
pub mod server;
pub mod types;

//! Schema definitions for Marshal
//!
//! This crate contains the data structures shared between the supervisor
//! core and its command-line front end: the launch configuration consumed at
//! startup and the reports produced by the launch and teardown phases. All
//! types implement JSON Schema generation for external consumption.

pub mod project;
pub mod report;

#[cfg(test)]
mod json_roundtrip_tests;

pub use project::*;
pub use report::*;

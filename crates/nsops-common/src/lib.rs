//! # nsops-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the nsops workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the primitives that the namespace operators
//! and the CLI build upon.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

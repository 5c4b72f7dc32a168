//! # factgraph
//!
//! Library half of the factgraph binary: the clap CLI and config
//! discovery, exposed for integration tests.

pub mod cli;
pub mod config;

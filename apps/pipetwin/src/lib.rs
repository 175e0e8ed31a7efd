//! # pipetwin
//!
//! The server and CLI around `pipetwin-core`: HTTP API, command line and
//! configuration. `main.rs` only wires logging and dispatches to [`cli`].

pub mod api;
pub mod cli;
pub mod config;

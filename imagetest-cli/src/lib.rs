//! imagetest CLI library.
//!
//! This library exposes the command modules for integration testing.
//! In production, `imagetest` is used as a binary (main.rs).

pub mod cli;
pub mod error;
pub mod logging;
pub mod output;
pub mod run;
pub mod suites;

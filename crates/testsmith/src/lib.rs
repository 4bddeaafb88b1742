//! Generates unit tests for front-end components with a language model
//! and keeps regenerating them until jest passes.
//!
//! The crate includes a CLI tool for using in the terminal and an HTTP
//! server for browser front-ends. You can also use it as a library: read
//! [`config::Settings`] from the environment and build a session from it.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod server;

pub use testsmith_core::{
    Component, ComponentName, IterationBudget, Session, SessionBuilder,
    SessionEvent, SessionOutcome, Stopped, TestingType,
};

/// Re-exports of [`testsmith_core`] crate.
pub mod core {
    pub use testsmith_core::*;
}

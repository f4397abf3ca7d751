//! This is a load-testing library which simulates concurrent users of the
//! English school web application.
//!
//! A [`Scenario`] describes a population of simulated users: each one
//! authenticates once at start, then repeatedly waits a random *think time*
//! and executes one task from a weighted catalog of HTTP calls (public
//! reads, authenticated reads, read-modify-write updates and privileged
//! creates).
//!
//! Sessions are private per user and there is no shared state between them;
//! every call classifies its own outcome and failures are only logged,
//! never retried.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod api;
pub mod loadtest;
pub mod user;

pub use crate::loadtest::run;
pub use crate::user::{Scenario, Session, Task};

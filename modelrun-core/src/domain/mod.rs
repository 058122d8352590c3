//! Core domain types
//!
//! This module contains the domain structures shared by the runner and the
//! HTTP collaborators: what a prediction request looks like, what its
//! response looks like, and how a worker setup ends.

pub mod prediction;
pub mod setup;

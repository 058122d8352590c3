//! Data Transfer Objects for inter-process communication
//!
//! This module contains the messages exchanged between the runner and the
//! worker process that actually executes model code.

pub mod worker;

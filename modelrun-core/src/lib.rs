//! Modelrun Core
//!
//! Core types for the modelrun prediction runner.
//!
//! This crate contains:
//! - Domain types: predictions, their status and webhook tags, setup results
//! - DTOs: the JSON-lines protocol spoken with the worker process

pub mod domain;
pub mod dto;

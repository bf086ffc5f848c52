//! Testing utilities for the Muse workspace
//!
//! Shared fixtures and a scripted reasoning client.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
mod scripted;

pub use scripted::{Operation, ScriptedReasoningClient, ANY};

//! Testing utilities and mock implementations
//!
//! Lets the tracker, workflow engine and matcher run against a scripted service
//! instead of the real extraction backend.

pub mod mocks;

pub use mocks::*;

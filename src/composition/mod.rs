//! # Composition Module
//!
//! The engine that runs a full decode → composite → encode pass.

pub mod engine;

pub use engine::{ReelEngine, ReelReport};

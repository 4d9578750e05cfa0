//! Core modules for the capsmith acquisition pipeline.
//!
//! Everything from instruction text to a bound, invocable capability
//! lives here. Shared primitives (db, time, trace) sit alongside the
//! pipeline stages they serve.

pub mod agent;
pub mod ast;
pub mod db;
pub mod error;
pub mod interp;
pub mod loader;
pub mod matcher;
pub mod memory;
pub mod orchestrator;
pub mod parser;
pub mod resolver;
pub mod sandbox;
pub mod schemas;
pub mod spec;
pub mod store;
pub mod synth;
pub mod teach;
pub mod time;
pub mod trace;

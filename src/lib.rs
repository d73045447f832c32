// Author: Dustin Pilgrim
// License: MIT

//! Resource location and guided installation for packaged web
//! applications: ordered-fallback resolution of config files, the log
//! file, gem bundle directories and the restart directory, plus the
//! six-step installer workflow the `quay` binary drives. The resolver
//! API is exported so a packaged application can consume it at runtime.

pub mod cli;
pub mod core;
pub mod installer;
pub mod log;

//! Test modules for the plugin system
//!
//! Lifecycle, routing, event and WebAssembly suites sharing the fixtures in
//! `utils`.

mod utils;

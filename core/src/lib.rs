//! pagestate core: observable state stores with persistence, a debug
//! timeline and coordinated cleanup.

pub mod api;
pub mod app;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod debug;
pub mod error;
pub mod persistence;
pub mod state;
pub mod util;

//! # Cascade - headless runner
//!
//! Layered configuration, RON scenarios and a rain demo on top of
//! `cascade-core`.

pub mod config;
pub mod demo;
pub mod scenario;

pub use config::{AppConfig, RunConfig};
pub use demo::RainDemo;

//! Menud library — vendor menu scraping and caching service.
//!
//! This crate exposes the core modules for integration testing.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod renderer;
pub mod server;
pub mod service;
pub mod stealth;
pub mod transform;

//! Pivot Tracker - sector and revolution tracking for center-pivot irrigation
//!
//! This library exposes the core modules for testing and reuse.

pub mod common;
pub mod config;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod routes;
pub mod services;
pub mod store;
pub mod tracking;

//! VolBot Library
//!
//! Autonomous trading engine for Deriv synthetic-index binary contracts

pub mod activity;
pub mod config;
pub mod engine;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod telemetry;
pub mod types;
pub mod venue;

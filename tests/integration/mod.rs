//! Integration test modules for duet
//!
//! - engine: learning, playback, clocks and panic
//! - models: model files and containers
//! - burst: chord and controller grouping
//! - feedback: reinforcement locality

pub mod burst;
pub mod engine;
pub mod feedback;
pub mod models;

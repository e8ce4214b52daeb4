// ===============================
// src/lib.rs
// ===============================
pub mod domain;
pub mod codec;
pub mod channel;
pub mod tracker;
pub mod risk;
pub mod host;
pub mod strategy;
pub mod metrics;
pub mod recorder;
pub mod feed;
pub mod paper;
pub mod config;

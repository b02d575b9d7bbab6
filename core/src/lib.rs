//! Discrete-event simulation of a shared hematology analyzer.
//!
//! Engine primitives first, then the lab built on top of them.

pub mod clock;
pub mod config;
pub mod depletable;
pub mod engine;
pub mod error;
pub mod event;
pub mod process;
pub mod queue;
pub mod resource;
pub mod rng;
pub mod state;
pub mod stats;
pub mod store;
pub mod types;

pub mod arrival_process;
pub mod dispatcher_process;
pub mod lab;
pub mod level_monitor_process;
pub mod maintenance_process;
pub mod sample_process;

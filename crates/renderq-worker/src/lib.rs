//! Render task worker.
//!
//! This crate provides:
//! - Worker configuration from the environment
//! - The task processor (parse, fetch, render, classify)
//! - The poll loop that receives and acknowledges messages
//! - Signal-driven graceful shutdown
//! - Structured logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod scratch;
pub mod shutdown;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{PollLoop, PollStats};
pub use logging::TaskLogger;
pub use processor::{TaskProcessor, TaskStage};
pub use scratch::ScratchDirs;
pub use shutdown::listen_for_signals;

//! Asset fetching and render engine supervision.
//!
//! This crate provides:
//! - HTTP asset retrieval with atomic writes
//! - Type-safe Blender command building
//! - A render process state machine with captured diagnostics
//! - Tick-based supervision with cancellation and timeouts

pub mod command;
pub mod error;
pub mod fetch;
pub mod process;
pub mod renderer;
pub mod runner;

pub use command::{check_blender, frame_args, BlenderCommand};
pub use error::{MediaError, MediaResult};
pub use fetch::{AssetFetcher, HttpFetcher};
pub use process::{CapturedOutput, ProcessState, RenderProcess};
pub use renderer::{BlenderRenderer, RenderSettings, Renderer};
pub use runner::{RenderExit, RenderRunner};

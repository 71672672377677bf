//! # Bandstack Parallel
//!
//! Caller-side parallel processing of raster blocks.
//!
//! This crate provides:
//! - Processing modes selecting sequential, global-pool or dedicated-pool
//!   execution
//! - Tiled processing of whole rasters with one reader per worker

pub mod error;
#[cfg(feature = "parallel")]
pub mod strategy;
#[cfg(feature = "parallel")]
pub mod tiled;

pub use error::{Error, Result};
#[cfg(feature = "parallel")]
pub use strategy::ProcessingMode;
#[cfg(feature = "parallel")]
pub use tiled::{BlockData, TiledProcessor};

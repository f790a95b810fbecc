pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod seeds;
pub mod task;

pub use error::{Error, Result};

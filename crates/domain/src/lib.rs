pub mod config;
pub mod error;
pub mod models;
pub mod stream;
pub mod tool;

pub use error::{Error, Result};

pub mod cmd;
pub mod db;
pub mod engine;
mod error;
pub mod logbuf;
pub mod metadata;
pub mod paths;
pub mod request;
pub mod runner;
pub mod tools;
pub mod updater;

pub use error::{EngineError, Result};

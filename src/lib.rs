pub mod apis;
pub mod common;
pub mod config;
pub mod domain;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod storage;

pub use common::error::{EtlError, Result};

// lib.rs
#![warn(clippy::large_futures)]

pub use std::{pin::Pin, sync::Arc};

pub use anyhow::bail;
pub use chrono::{DateTime, Utc};
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::sync::RwLock;
pub use tokio::time::{sleep, Duration};

#[cfg(feature = "firmware")]
pub use esp_idf_hal::prelude::*;
#[cfg(feature = "firmware")]
pub use esp_idf_hal::{delay::FreeRtos, spi};
#[cfg(feature = "firmware")]
pub use esp_idf_svc::nvs;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BUILD_TIMESTAMP");

mod error;
pub use error::*;

mod config;
pub use config::*;

mod nfc;
pub use nfc::*;

mod pagereader;
pub use pagereader::*;

mod tlv;
pub use tlv::*;

mod record;
pub use record::*;

mod assembler;
pub use assembler::*;

mod report;
pub use report::*;

pub mod pn532;
pub use pn532::Pn532;

mod tagreader;
pub use tagreader::*;

mod state;
pub use state::*;

mod measure;
pub use measure::*;

#[cfg(test)]
mod faketag;

// EOF

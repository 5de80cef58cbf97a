//! # hwi-rs
//!
//! Signs Partially Signed Bitcoin Transactions with a hardware device.
//!
//! The crate translates a PSBT into the request a Trezor-class device
//! understands, serves the previous transactions the device asks for while
//! it signs, and writes the returned signatures back into the PSBT.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hwi_rs::commands::{get_client, signtx};
//! use hwi_rs::trezor::TransportFactory;
//! use hwi_rs::{init, HwiConfig};
//!
//! async fn sign(factory: &dyn TransportFactory, psbt_base64: &str) -> hwi_rs::Result<String> {
//!     let config = HwiConfig::default();
//!     init(&config)?;
//!
//!     let mut client = get_client("trezor", Some("hid:0001:0005:00"), None, factory, &config)?;
//!     let signed = signtx(client.as_mut(), psbt_base64).await?;
//!     Ok(signed.psbt)
//! }
//! ```
//!
//! ## Modules
//!
//! - [`primitives`]: transactions, scripts, PSBTs, BIP32 keys and addresses
//! - [`hw`]: the device-agnostic client trait and the device handle guard
//! - [`trezor`]: request building, prev-tx resolution, signature merging
//! - [`commands`]: command-level operations and client construction
//! - [`utils`]: configuration loading and logging
//!
//! The USB transport itself is not part of this crate. Supply it by
//! implementing [`trezor::TransportFactory`] and [`trezor::DeviceTransport`].

pub mod commands;
pub mod error;
pub mod hw;
pub mod primitives;
pub mod trezor;
pub mod types;
pub mod utils;

pub use error::{ErrorCode, HwiError};
pub use hw::{DeviceType, HardwareWalletClient};
pub use primitives::psbt::PartiallySignedTransaction;
pub use trezor::TrezorClient;
pub use types::HwiConfig;

use utils::logging::{HwiLogger, LoggingConfig};

pub type Result<T> = std::result::Result<T, HwiError>;

/// Sets up logging. Call once per process; later calls are no-ops.
///
/// With `log_level` set the crate's own stderr logger is installed at that
/// level, otherwise `env_logger` reads `RUST_LOG`.
pub fn init(config: &HwiConfig) -> Result<()> {
    match config.log_level {
        Some(level) => {
            // It's ok if this fails, it just means logging was already initialized.
            let _ = HwiLogger::init(LoggingConfig {
                level,
                ..Default::default()
            });
        }
        None => {
            let _ = env_logger::try_init();
        }
    }

    log::info!("hwi-rs initialized with config: {:?}", config);
    Ok(())
}

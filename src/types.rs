use crate::hw::DeviceType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// Re-export logging types
pub use crate::utils::logging::LogLevel;

const DEFAULT_SIGN_TIMEOUT_SECS: u64 = 300;

fn default_sign_timeout_secs() -> u64 {
    DEFAULT_SIGN_TIMEOUT_SECS
}

/// Library configuration, loadable from `hwi.json` and `HWI_HWI_*` variables.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HwiConfig {
    /// Use testnet address prefixes and tpub keys
    pub testnet: bool,
    pub device_type: Option<DeviceType>,
    pub device_path: Option<String>,
    /// Upper bound on how long the device may take to sign
    #[serde(default = "default_sign_timeout_secs")]
    pub sign_timeout_secs: u64,
    /// Reject single-key inputs owned by another master key instead of
    /// passing them to the device without a path
    pub strict_key_ownership: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Device passphrase. Only ever set in code, never read from or
    /// written to config files or the environment.
    #[serde(skip)]
    pub passphrase: Option<String>,
}

impl Default for HwiConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            device_type: None,
            device_path: None,
            sign_timeout_secs: DEFAULT_SIGN_TIMEOUT_SECS,
            strict_key_ownership: false,
            log_level: None,
            passphrase: None,
        }
    }
}

impl HwiConfig {
    pub fn sign_timeout(&self) -> Duration {
        Duration::from_secs(self.sign_timeout_secs)
    }
}

impl fmt::Debug for HwiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwiConfig")
            .field("testnet", &self.testnet)
            .field("device_type", &self.device_type)
            .field("device_path", &self.device_path)
            .field("sign_timeout_secs", &self.sign_timeout_secs)
            .field("strict_key_ownership", &self.strict_key_ownership)
            .field("log_level", &self.log_level)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Parameters for building a keypool import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypoolOptions {
    /// Custom path; must start with `m` and end with `*`
    pub path: Option<String>,
    pub start: u32,
    pub end: u32,
    /// Change addresses instead of receive addresses
    pub internal: bool,
    pub keypool: bool,
    pub account: u32,
    /// Native segwit (`wpkh`)
    pub wpkh: bool,
    /// Wrapped segwit (`sh(wpkh)`)
    pub sh_wpkh: bool,
}

/// One entry for Bitcoin Core's `importmulti`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypoolImport {
    pub desc: String,
    pub range: [u32; 2],
    pub timestamp: String,
    pub internal: bool,
    pub keypool: bool,
}

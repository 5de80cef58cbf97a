//! Device-agnostic hardware wallet interface.
//!
//! Every device binding implements [`HardwareWalletClient`]. Operations a
//! binding does not provide fall through to the trait's default methods,
//! which report [`HwiError::Unsupported`] with the missing [`Capability`].

use crate::error::HwiError;
use crate::primitives::bip32::DerivationPath;
use crate::primitives::psbt::PartiallySignedTransaction;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardware wallet device types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Trezor,
    KeepKey,
    Ledger,
    DigitalBitbox,
    Coldcard,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Trezor => "trezor",
            DeviceType::KeepKey => "keepkey",
            DeviceType::Ledger => "ledger",
            DeviceType::DigitalBitbox => "digitalbitbox",
            DeviceType::Coldcard => "coldcard",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = HwiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trezor" => Ok(DeviceType::Trezor),
            "keepkey" => Ok(DeviceType::KeepKey),
            "ledger" => Ok(DeviceType::Ledger),
            "digitalbitbox" => Ok(DeviceType::DigitalBitbox),
            "coldcard" => Ok(DeviceType::Coldcard),
            other => Err(HwiError::UnknownDeviceType(other.to_string())),
        }
    }
}

/// An operation a device binding may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    GetPubkey,
    SignTx,
    SignMessage,
    DisplayAddress,
    SetupDevice,
    WipeDevice,
    /// No client binding exists for the device type at all.
    DeviceBinding,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::GetPubkey => "public key retrieval",
            Capability::SignTx => "transaction signing",
            Capability::SignMessage => "message signing",
            Capability::DisplayAddress => "address display",
            Capability::SetupDevice => "device setup",
            Capability::WipeDevice => "device wipe",
            Capability::DeviceBinding => "this device type",
        };
        f.write_str(name)
    }
}

/// Hardware wallet capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareWalletCapabilities {
    /// Can report extended public keys
    pub xpub_support: bool,
    /// Can sign PSBTs
    pub psbt_support: bool,
    pub message_signing: bool,
    pub address_display: bool,
    pub setup: bool,
    pub wipe: bool,
}

impl HardwareWalletCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::GetPubkey => self.xpub_support,
            Capability::SignTx => self.psbt_support,
            Capability::SignMessage => self.message_signing,
            Capability::DisplayAddress => self.address_display,
            Capability::SetupDevice => self.setup,
            Capability::WipeDevice => self.wipe,
            Capability::DeviceBinding => true,
        }
    }
}

/// Hardware wallet connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Hardware wallet trait for device-agnostic operations
#[async_trait::async_trait]
pub trait HardwareWalletClient: Send {
    fn device_type(&self) -> DeviceType;

    fn capabilities(&self) -> HardwareWalletCapabilities;

    fn status(&self) -> ConnectionStatus;

    /// Whether keys and addresses are reported for testnet.
    fn is_testnet(&self) -> bool;

    /// Extended public key at `path`, versioned for the client's network.
    async fn get_pubkey_at_path(&mut self, _path: &DerivationPath) -> Result<String> {
        Err(HwiError::Unsupported(Capability::GetPubkey))
    }

    /// Signs every input this device owns and returns the PSBT as base64.
    ///
    /// On error the PSBT is left exactly as it was passed in.
    async fn sign_tx(&mut self, _psbt: &mut PartiallySignedTransaction) -> Result<String> {
        Err(HwiError::Unsupported(Capability::SignTx))
    }

    /// Base64 signature over `message` with the key at `path`.
    async fn sign_message(&mut self, _message: &str, _path: &DerivationPath) -> Result<String> {
        Err(HwiError::Unsupported(Capability::SignMessage))
    }

    /// Shows the single-key address at `path` on the device screen.
    async fn display_address(&mut self, _path: &DerivationPath, _sh_wpkh: bool, _wpkh: bool) -> Result<String> {
        Err(HwiError::Unsupported(Capability::DisplayAddress))
    }

    async fn setup_device(&mut self) -> Result<()> {
        Err(HwiError::Unsupported(Capability::SetupDevice))
    }

    async fn wipe_device(&mut self) -> Result<()> {
        Err(HwiError::Unsupported(Capability::WipeDevice))
    }

    /// Releases the device. Further calls fail with `DeviceUnavailable`.
    fn close(&mut self);
}

impl fmt::Debug for dyn HardwareWalletClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareWalletClient")
            .field("device_type", &self.device_type())
            .finish_non_exhaustive()
    }
}

/// A raw connection that must be released when no longer used.
pub trait Transport: Send {
    fn close(&mut self);
}

/// Exclusive, scoped ownership of an open device.
///
/// The transport is closed exactly once: by [`DeviceHandle::close`] or,
/// failing that, when the handle is dropped. Dropping covers early returns,
/// timeouts and a cancelled signing future alike.
pub struct DeviceHandle<T: Transport + ?Sized> {
    path: String,
    transport: Option<Box<T>>,
}

impl<T: Transport + ?Sized> DeviceHandle<T> {
    pub fn new(path: impl Into<String>, transport: Box<T>) -> Self {
        let path = path.into();
        log::debug!("Opened device at {}", path);
        DeviceHandle {
            path,
            transport: Some(transport),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn transport(&mut self) -> Result<&mut T> {
        self.transport
            .as_deref_mut()
            .ok_or_else(|| HwiError::DeviceUnavailable(format!("device at {} is closed", self.path)))
    }

    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            log::debug!("Closed device at {}", self.path);
        }
    }
}

impl<T: Transport + ?Sized> Drop for DeviceHandle<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport + ?Sized> fmt::Debug for DeviceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

//! Command-level operations over a [`HardwareWalletClient`].
//!
//! Each function takes already-parsed arguments and returns a serializable
//! response. Failures map to numeric codes through [`ErrorResponse`].

use crate::hw::{Capability, DeviceType, HardwareWalletClient};
use crate::primitives::address::fingerprint_of;
use crate::primitives::bip32::{DerivationPath, Fingerprint};
use crate::primitives::psbt::PartiallySignedTransaction;
use crate::trezor::{TransportFactory, TrezorClient};
use crate::types::{HwiConfig, KeypoolImport, KeypoolOptions};
use crate::{HwiError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpubResponse {
    pub xpub: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTxResponse {
    /// Base64 PSBT with this device's partial signatures added
    pub psbt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMessageResponse {
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
}

/// `{"error": ..., "code": ...}` as reported for a failed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: i32,
}

impl From<&HwiError> for ErrorResponse {
    fn from(err: &HwiError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            code: err.code() as i32,
        }
    }
}

/// Opens a client for `device_type` at `device_path`.
pub fn get_client(
    device_type: &str,
    device_path: Option<&str>,
    passphrase: Option<&str>,
    factory: &dyn TransportFactory,
    config: &HwiConfig,
) -> Result<Box<dyn HardwareWalletClient>> {
    let device_type: DeviceType = device_type.parse()?;
    match device_type {
        DeviceType::Trezor => {}
        DeviceType::DigitalBitbox if passphrase.map_or(true, str::is_empty) => {
            return Err(HwiError::NoPassword(device_type.to_string()));
        }
        other => {
            log::warn!("No client binding for {}", other);
            return Err(HwiError::Unsupported(Capability::DeviceBinding));
        }
    }

    let path = device_path.ok_or(HwiError::NoDevicePath)?;
    let client = TrezorClient::open(factory, path, passphrase, config)?;
    Ok(Box::new(client))
}

/// [`get_client`] with type, path and passphrase taken from `config`.
pub fn get_client_from_config(
    factory: &dyn TransportFactory,
    config: &HwiConfig,
) -> Result<Box<dyn HardwareWalletClient>> {
    let device_type = config.device_type.ok_or(HwiError::NoDeviceType)?;
    get_client(
        device_type.as_str(),
        config.device_path.as_deref(),
        config.passphrase.as_deref(),
        factory,
        config,
    )
}

/// One attached device, as listed by [`enumerate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "type")]
    pub device_type: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fingerprint of the device's master key, read from the key at `m/0h`.
async fn master_fingerprint(client: &mut dyn HardwareWalletClient) -> Result<Fingerprint> {
    let xpub = client
        .get_pubkey_at_path(&DerivationPath::new(vec![DerivationPath::hardened(0)]))
        .await?;
    fingerprint_of(&xpub)
}

/// Lists attached devices with their master fingerprints.
///
/// Each device is opened once and closed again. A device that cannot be
/// opened or queried is still listed, with `error` set.
pub async fn enumerate(factory: &dyn TransportFactory, config: &HwiConfig) -> Result<Vec<DeviceEntry>> {
    let mut entries = Vec::new();
    for path in factory.enumerate()? {
        let mut entry = DeviceEntry {
            device_type: DeviceType::Trezor.to_string(),
            path: path.clone(),
            fingerprint: None,
            error: None,
        };

        let fingerprint = match TrezorClient::open(factory, &path, config.passphrase.as_deref(), config) {
            Ok(mut client) => {
                let fingerprint = master_fingerprint(&mut client).await;
                client.close();
                fingerprint
            }
            Err(e) => Err(e),
        };
        match fingerprint {
            Ok(fingerprint) => entry.fingerprint = Some(fingerprint.to_string()),
            Err(e) => {
                entry.error = Some(format!("Could not open client or get fingerprint information: {}", e));
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Opens the first attached device of `device_type` whose master
/// fingerprint is `fingerprint`. Either filter may be left out.
///
/// Devices that are opened but not returned are closed. Devices that fail
/// to open or answer are skipped.
pub async fn find_device(
    factory: &dyn TransportFactory,
    device_type: Option<&str>,
    fingerprint: Option<&str>,
    config: &HwiConfig,
) -> Result<Option<Box<dyn HardwareWalletClient>>> {
    let wanted = fingerprint
        .map(|f| {
            f.parse::<Fingerprint>()
                .map_err(|e| HwiError::BadArgument(format!("Invalid fingerprint {}: {}", f, e)))
        })
        .transpose()?;

    if let Some(device_type) = device_type {
        let device_type: DeviceType = device_type.parse()?;
        if device_type != DeviceType::Trezor {
            log::debug!("No attached devices of type {}", device_type);
            return Ok(None);
        }
    }

    for path in factory.enumerate()? {
        let mut client = match TrezorClient::open(factory, &path, config.passphrase.as_deref(), config) {
            Ok(client) => client,
            Err(e) => {
                log::debug!("Skipping {}: {}", path, e);
                continue;
            }
        };

        match master_fingerprint(&mut client).await {
            Ok(found) if wanted.map_or(true, |w| w == found) => {
                log::info!("Using device {} ({})", path, found);
                return Ok(Some(Box::new(client)));
            }
            Ok(found) => log::debug!("Device {} has fingerprint {}", path, found),
            Err(e) => log::debug!("Skipping {}: {}", path, e),
        }
        client.close();
    }

    Ok(None)
}

fn parse_path(path: &str) -> Result<DerivationPath> {
    path.parse()
        .map_err(|e: HwiError| HwiError::BadArgument(format!("{}: {}", path, e)))
}

pub async fn getxpub(client: &mut dyn HardwareWalletClient, path: &str) -> Result<XpubResponse> {
    let path = parse_path(path)?;
    let xpub = client.get_pubkey_at_path(&path).await?;
    Ok(XpubResponse { xpub })
}

/// The account xpub at `m/44'/0'/0'`, or `m/44'/1'/0'` on testnet.
pub async fn getmasterxpub(client: &mut dyn HardwareWalletClient) -> Result<XpubResponse> {
    let coin_type = if client.is_testnet() { 1 } else { 0 };
    let path = DerivationPath::new(vec![
        DerivationPath::hardened(44),
        DerivationPath::hardened(coin_type),
        DerivationPath::hardened(0),
    ]);
    let xpub = client.get_pubkey_at_path(&path).await?;
    Ok(XpubResponse { xpub })
}

pub async fn signtx(client: &mut dyn HardwareWalletClient, psbt: &str) -> Result<SignTxResponse> {
    let mut psbt = PartiallySignedTransaction::from_base64(psbt).map_err(|e| match e {
        HwiError::InvalidPsbt(_) => e,
        other => HwiError::invalid_psbt(format!("You must provide a PSBT ({})", other)),
    })?;
    let psbt = client.sign_tx(&mut psbt).await?;
    Ok(SignTxResponse { psbt })
}

pub async fn signmessage(
    client: &mut dyn HardwareWalletClient,
    message: &str,
    path: &str,
) -> Result<SignMessageResponse> {
    let path = parse_path(path)?;
    let signature = client.sign_message(message, &path).await?;
    Ok(SignMessageResponse { signature })
}

pub async fn displayaddress(
    client: &mut dyn HardwareWalletClient,
    path: &str,
    sh_wpkh: bool,
    wpkh: bool,
) -> Result<AddressResponse> {
    if sh_wpkh && wpkh {
        return Err(HwiError::BadArgument(
            "Both `--wpkh` and `--sh_wpkh` can not be selected at the same time.".to_string(),
        ));
    }
    let path = parse_path(path)?;
    let address = client.display_address(&path, sh_wpkh, wpkh).await?;
    Ok(AddressResponse { address })
}

/// Keypool path for `options`, using the BIP44/49/84 layout when no
/// custom path is given.
fn keypool_path(options: &KeypoolOptions, testnet: bool) -> Result<String> {
    match &options.path {
        Some(path) => {
            if !path.starts_with('m') {
                return Err(HwiError::BadArgument("Path must start with m/".to_string()));
            }
            if !path.ends_with('*') {
                return Err(HwiError::BadArgument("Path must end with /*".to_string()));
            }
            Ok(path.replace(&['\'', 'H'][..], "h"))
        }
        None => {
            let purpose = if options.wpkh {
                84
            } else if options.sh_wpkh {
                49
            } else {
                44
            };
            Ok(format!(
                "m/{}h/{}h/{}h/{}/*",
                purpose,
                if testnet { 1 } else { 0 },
                options.account,
                if options.internal { 1 } else { 0 }
            ))
        }
    }
}

/// Splits a normalized path after its last hardened step.
///
/// `m/84h/0h/0h/0/*` becomes (`m/84h/0h/0h`, `/0/*`). The suffix may only
/// hold unhardened indexes and a final `*`.
fn split_at_last_hardened(path: &str) -> Result<(String, String)> {
    let components: Vec<&str> = path.split('/').collect();
    let base_len = components
        .iter()
        .rposition(|c| *c == "m" || c.ends_with('h'))
        .map(|i| i + 1)
        .ok_or_else(|| HwiError::BadArgument(format!("Path {} has no base", path)))?;

    let (base, rest) = components.split_at(base_len);
    let last = rest.len().saturating_sub(1);
    for (i, component) in rest.iter().enumerate() {
        let valid = if i == last { *component == "*" } else { component.parse::<u32>().is_ok() };
        if !valid {
            return Err(HwiError::BadArgument(format!("Invalid path component '{}' in {}", component, path)));
        }
    }

    let suffix: String = rest.iter().map(|c| format!("/{}", c)).collect();
    Ok((base.join("/"), suffix))
}

/// Import records for Bitcoin Core's `importmulti`.
pub async fn getkeypool(client: &mut dyn HardwareWalletClient, options: &KeypoolOptions) -> Result<Vec<KeypoolImport>> {
    if options.sh_wpkh && options.wpkh {
        return Err(HwiError::BadArgument(
            "Both `--wpkh` and `--sh_wpkh` can not be selected at the same time.".to_string(),
        ));
    }

    let path = keypool_path(options, client.is_testnet())?;
    let (base, suffix) = split_at_last_hardened(&path)?;

    let master_fingerprint = master_fingerprint(client).await?;

    let base_key = client.get_pubkey_at_path(&parse_path(&base)?).await?;

    let (open, close) = if options.wpkh {
        ("wpkh(", ")")
    } else if options.sh_wpkh {
        ("sh(wpkh(", "))")
    } else {
        ("pkh(", ")")
    };
    let desc = format!(
        "{}[{}{}]{}{}{}",
        open,
        master_fingerprint,
        base.trim_start_matches('m'),
        base_key,
        suffix,
        close
    );
    log::debug!("Keypool descriptor {}", desc);

    Ok(vec![KeypoolImport {
        desc,
        range: [options.start, options.end],
        timestamp: "now".to_string(),
        internal: options.internal,
        keypool: options.keypool,
    }])
}

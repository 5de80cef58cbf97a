//! Trezor binding of [`HardwareWalletClient`].
//!
//! Signing runs as a fixed pipeline over one device session: query the
//! master fingerprint, build the request from the PSBT, let the device pull
//! previous transactions while it signs, merge the returned signatures and
//! serialize. The device is released when the pipeline ends, however it ends.

pub mod merge;
pub mod messages;
pub mod prev_tx;
pub mod request;
pub mod transport;

pub use merge::{SignatureMerger, SIGHASH_ALL};
pub use messages::{
    InputScriptType, OutputScriptType, PrevTxInput, PrevTxOutput, SignTxRequest, TransactionType, TxInputType,
    TxOutputType,
};
pub use prev_tx::PsbtPrevTxResolver;
pub use request::SigningRequestBuilder;
pub use transport::{DeviceTransport, PrevTxSource, TransportFactory};

use crate::hw::{ConnectionStatus, DeviceHandle, DeviceType, HardwareWalletCapabilities, HardwareWalletClient};
use crate::primitives::address::{fingerprint_of, NetworkParams};
use crate::primitives::bip32::{xpub_main_to_test, DerivationPath, Fingerprint};
use crate::primitives::psbt::PartiallySignedTransaction;
use crate::types::HwiConfig;
use crate::utils::logging::PerformanceTimer;
use crate::{HwiError, Result};
use std::time::Duration;
use uuid::Uuid;

/// Progress of one signing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningState {
    Idle,
    FingerprintDerived,
    RequestBuilt,
    AwaitingDevice,
    SignaturesMerged,
    Serialized,
    Failed(String),
}

struct SigningSession {
    id: Uuid,
    state: SigningState,
}

impl SigningSession {
    fn new() -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            state: SigningState::Idle,
        };
        log::debug!("[{}] signing session started", session.id);
        session
    }

    fn advance(&mut self, next: SigningState) {
        log::debug!("[{}] {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Per-client signing parameters, fixed at construction.
#[derive(Debug, Clone, Copy)]
struct SigningSettings {
    params: NetworkParams,
    sign_timeout: Duration,
    strict_key_ownership: bool,
}

/// A Trezor signing client bound to one open device.
pub struct TrezorClient {
    handle: Option<DeviceHandle<dyn DeviceTransport>>,
    path: String,
    testnet: bool,
    settings: SigningSettings,
    last_state: Option<SigningState>,
}

impl TrezorClient {
    /// Opens the device at `path` through `factory`.
    ///
    /// The passphrase is handed to this session only.
    pub fn open(
        factory: &dyn TransportFactory,
        path: &str,
        passphrase: Option<&str>,
        config: &HwiConfig,
    ) -> Result<Self> {
        let transport = factory.open(path, passphrase)?;
        Ok(Self::new(DeviceHandle::new(path, transport), config))
    }

    pub fn new(handle: DeviceHandle<dyn DeviceTransport>, config: &HwiConfig) -> Self {
        log::info!(
            "Trezor client at {} ({})",
            handle.path(),
            if config.testnet { "testnet" } else { "mainnet" }
        );
        Self {
            path: handle.path().to_string(),
            handle: Some(handle),
            testnet: config.testnet,
            settings: SigningSettings {
                params: NetworkParams::for_testnet(config.testnet),
                sign_timeout: config.sign_timeout(),
                strict_key_ownership: config.strict_key_ownership,
            },
            last_state: None,
        }
    }

    pub fn network_params(&self) -> &NetworkParams {
        &self.settings.params
    }

    /// Final state of the most recent signing call, if any.
    pub fn last_signing_state(&self) -> Option<&SigningState> {
        self.last_state.as_ref()
    }

    fn closed_error(&self) -> HwiError {
        HwiError::DeviceUnavailable(format!("device at {} is closed", self.path))
    }

    fn handle(&mut self) -> Result<&mut DeviceHandle<dyn DeviceTransport>> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle),
            None => Err(HwiError::DeviceUnavailable(format!("device at {} is closed", self.path))),
        }
    }

    /// Master key fingerprint, read from the parent field of `m/0`.
    pub async fn master_fingerprint(&mut self) -> Result<Fingerprint> {
        query_master_fingerprint(self.handle()?).await
    }
}

async fn query_master_fingerprint(handle: &mut DeviceHandle<dyn DeviceTransport>) -> Result<Fingerprint> {
    let xpub = handle.transport()?.get_public_node(&DerivationPath::new(vec![0])).await?;
    fingerprint_of(&xpub)
}

/// Runs the pipeline against a copy of `psbt`; the caller swaps it in
/// only on success.
async fn run_signing(
    settings: SigningSettings,
    session: &mut SigningSession,
    handle: &mut DeviceHandle<dyn DeviceTransport>,
    psbt: &PartiallySignedTransaction,
) -> Result<(PartiallySignedTransaction, String)> {
    let master_fingerprint = query_master_fingerprint(handle).await?;
    session.advance(SigningState::FingerprintDerived);

    let request = SigningRequestBuilder::new(master_fingerprint, settings.params)
        .strict_key_ownership(settings.strict_key_ownership)
        .build(psbt)?;
    session.advance(SigningState::RequestBuilt);

    session.advance(SigningState::AwaitingDevice);
    let signatures = {
        let resolver = PsbtPrevTxResolver::new(psbt);
        let timer = PerformanceTimer::start("device sign_tx");
        let result = tokio::time::timeout(settings.sign_timeout, handle.transport()?.sign_tx(&request, &resolver)).await;
        timer.stop();
        match result {
            Ok(signatures) => signatures?,
            Err(_) => {
                log::warn!("[{}] device did not sign within {:?}", session.id, settings.sign_timeout);
                return Err(HwiError::DeviceTimeout);
            }
        }
    };

    let mut signed = psbt.clone();
    let written = SignatureMerger::new(master_fingerprint).merge(&mut signed, &signatures)?;
    session.advance(SigningState::SignaturesMerged);

    let encoded = signed.to_base64()?;
    session.advance(SigningState::Serialized);
    log::info!("[{}] signed {} of {} inputs", session.id, written, signed.inputs.len());
    Ok((signed, encoded))
}

#[async_trait::async_trait]
impl HardwareWalletClient for TrezorClient {
    fn device_type(&self) -> DeviceType {
        DeviceType::Trezor
    }

    fn capabilities(&self) -> HardwareWalletCapabilities {
        HardwareWalletCapabilities {
            xpub_support: true,
            psbt_support: true,
            ..Default::default()
        }
    }

    fn status(&self) -> ConnectionStatus {
        match &self.handle {
            Some(handle) if handle.is_open() => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }

    fn is_testnet(&self) -> bool {
        self.testnet
    }

    async fn get_pubkey_at_path(&mut self, path: &DerivationPath) -> Result<String> {
        let xpub = self.handle()?.transport()?.get_public_node(path).await?;
        if self.testnet {
            xpub_main_to_test(&xpub)
        } else {
            Ok(xpub)
        }
    }

    /// Signs with the device and ends the device session.
    ///
    /// The handle is moved into the call, so it is closed on every exit
    /// path including a dropped future. Later calls on this client fail
    /// with `DeviceUnavailable`.
    async fn sign_tx(&mut self, psbt: &mut PartiallySignedTransaction) -> Result<String> {
        let mut session = SigningSession::new();
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                let err = self.closed_error();
                session.advance(SigningState::Failed(err.to_string()));
                self.last_state = Some(session.state);
                return Err(err);
            }
        };

        let result = run_signing(self.settings, &mut session, &mut handle, psbt).await;
        handle.close();

        match result {
            Ok((signed, encoded)) => {
                *psbt = signed;
                self.last_state = Some(session.state);
                Ok(encoded)
            }
            Err(err) => {
                session.advance(SigningState::Failed(err.to_string()));
                self.last_state = Some(session.state);
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }
}

impl std::fmt::Debug for TrezorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrezorClient")
            .field("path", &self.path)
            .field("open", &self.handle.is_some())
            .field("testnet", &self.testnet)
            .field("sign_timeout", &self.settings.sign_timeout)
            .finish()
    }
}

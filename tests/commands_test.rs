mod common;

use common::*;
use hwi_rs::commands::{
    displayaddress, enumerate, find_device, get_client, get_client_from_config, getkeypool, getmasterxpub, getxpub,
    signmessage, signtx, ErrorResponse,
};
use hwi_rs::hw::{Capability, DeviceType, HardwareWalletClient};
use hwi_rs::primitives::bip32::{xpub_main_to_test, DerivationPath, Fingerprint};
use hwi_rs::types::KeypoolOptions;
use hwi_rs::{ErrorCode, HwiConfig, HwiError, PartiallySignedTransaction};

fn path(s: &str) -> DerivationPath {
    s.parse().unwrap()
}

#[test]
fn test_get_client_by_type() {
    let device = MockDevice::new();
    let config = HwiConfig::default();

    let client = get_client("trezor", Some("hid:0001"), Some("secret"), &device, &config).unwrap();
    assert_eq!(client.device_type(), DeviceType::Trezor);
    assert!(client.capabilities().psbt_support);
    assert!(!client.capabilities().message_signing);
    assert_eq!(device.opened(), vec![("hid:0001".to_string(), Some("secret".to_string()))]);

    let err = get_client("nano", Some("hid:0001"), None, &device, &config).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownDeviceType);

    let err = get_client("digitalbitbox", Some("hid:0001"), None, &device, &config).unwrap_err();
    assert!(matches!(err, HwiError::NoPassword(_)));
    assert_eq!(err.code() as i32, -6);

    let err = get_client("digitalbitbox", Some("hid:0001"), Some("pw"), &device, &config).unwrap_err();
    assert!(matches!(err, HwiError::Unsupported(Capability::DeviceBinding)));

    let err = get_client("ledger", Some("hid:0001"), None, &device, &config).unwrap_err();
    assert!(matches!(err, HwiError::Unsupported(Capability::DeviceBinding)));

    let err = get_client("trezor", None, None, &device, &config).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoDevicePath);

    assert_eq!(device.opened().len(), 1);
}

#[test]
fn test_get_client_from_config() {
    let device = MockDevice::new();

    let err = get_client_from_config(&device, &HwiConfig::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoDeviceType);

    let config = HwiConfig {
        device_type: Some(DeviceType::Trezor),
        device_path: Some("hid:cfg".to_string()),
        passphrase: Some("hunter2".to_string()),
        ..Default::default()
    };
    let client = get_client_from_config(&device, &config).unwrap();
    assert!(!client.is_testnet());
    assert_eq!(device.opened(), vec![("hid:cfg".to_string(), Some("hunter2".to_string()))]);
}

#[tokio::test]
async fn test_getxpub() {
    let device = MockDevice::new();
    let mut client = device.client(&HwiConfig::default());

    let response = getxpub(&mut client, "m/84h/0h/0h").await.unwrap();
    assert_eq!(response.xpub, mock_xpub(&path("m/84'/0'/0'")));
    assert!(response.xpub.starts_with("xpub"));

    let err = getxpub(&mut client, "84h/0h").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadArgument);
}

#[tokio::test]
async fn test_getmasterxpub() {
    let device = MockDevice::new();
    let mut client = device.client(&HwiConfig::default());
    let response = getmasterxpub(&mut client).await.unwrap();
    assert_eq!(response.xpub, mock_xpub(&path("m/44'/0'/0'")));
    assert_eq!(device.pubkey_queries(), vec![path("m/44'/0'/0'")]);

    let testnet = MockDevice::new();
    let config = HwiConfig {
        testnet: true,
        ..Default::default()
    };
    let mut client = testnet.client(&config);
    let response = getmasterxpub(&mut client).await.unwrap();
    assert!(response.xpub.starts_with("tpub"));
    assert_eq!(response.xpub, xpub_main_to_test(&mock_xpub(&path("m/44'/1'/0'"))).unwrap());
}

#[tokio::test]
async fn test_signtx_command() {
    let device = MockDevice::new();
    let mut client = device.client(&HwiConfig::default());

    let err = signtx(&mut client, "not a psbt").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTx);
    assert!(matches!(err, HwiError::InvalidPsbt(_)));

    let psbt = segwit_psbt(1).to_base64().unwrap();
    let response = signtx(&mut client, &psbt).await.unwrap();
    let signed = PartiallySignedTransaction::from_base64(&response.psbt).unwrap();
    assert_eq!(signed.inputs[0].partial_sigs.len(), 1);
}

#[tokio::test]
async fn test_unsupported_operations() {
    let device = MockDevice::new();
    let mut client = device.client(&HwiConfig::default());

    let err = signmessage(&mut client, "hello", "m/44h/0h/0h/0/0").await.unwrap_err();
    assert!(matches!(err, HwiError::Unsupported(Capability::SignMessage)));

    let err = displayaddress(&mut client, "m/84h/0h/0h/0/0", true, true).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadArgument);

    let err = displayaddress(&mut client, "m/84h/0h/0h/0/0", false, true).await.unwrap_err();
    assert!(matches!(err, HwiError::Unsupported(Capability::DisplayAddress)));

    assert!(matches!(
        client.setup_device().await,
        Err(HwiError::Unsupported(Capability::SetupDevice))
    ));
    assert!(matches!(
        client.wipe_device().await,
        Err(HwiError::Unsupported(Capability::WipeDevice))
    ));
}

#[tokio::test]
async fn test_getkeypool_default_legacy() {
    let device = MockDevice::new();
    let mut client = device.client(&HwiConfig::default());
    let options = KeypoolOptions {
        start: 0,
        end: 1000,
        keypool: true,
        ..Default::default()
    };

    let imports = getkeypool(&mut client, &options).await.unwrap();
    assert_eq!(imports.len(), 1);
    let import = &imports[0];
    assert_eq!(
        import.desc,
        format!("pkh([{}/44h/0h/0h]{}/0/*)", DEVICE_FP, mock_xpub(&path("m/44'/0'/0'")))
    );
    assert_eq!(import.range, [0, 1000]);
    assert_eq!(import.timestamp, "now");
    assert!(import.keypool);
    assert!(!import.internal);

    assert_eq!(device.pubkey_queries(), vec![path("m/0'"), path("m/44'/0'/0'")]);
}

#[tokio::test]
async fn test_getkeypool_segwit_variants() {
    let device = MockDevice::new();
    let mut client = device.client(&HwiConfig::default());

    let wpkh = KeypoolOptions {
        wpkh: true,
        internal: true,
        account: 2,
        ..Default::default()
    };
    let imports = getkeypool(&mut client, &wpkh).await.unwrap();
    assert_eq!(
        imports[0].desc,
        format!("wpkh([{}/84h/0h/2h]{}/1/*)", DEVICE_FP, mock_xpub(&path("m/84'/0'/2'")))
    );
    assert!(imports[0].internal);

    let sh_wpkh = KeypoolOptions {
        sh_wpkh: true,
        ..Default::default()
    };
    let imports = getkeypool(&mut client, &sh_wpkh).await.unwrap();
    assert!(imports[0].desc.starts_with("sh(wpkh(["));
    assert!(imports[0].desc.ends_with("/0/*))"));

    let both = KeypoolOptions {
        wpkh: true,
        sh_wpkh: true,
        ..Default::default()
    };
    let err = getkeypool(&mut client, &both).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadArgument);
}

#[tokio::test]
async fn test_getkeypool_custom_path_on_testnet() {
    let device = MockDevice::new();
    let config = HwiConfig {
        testnet: true,
        ..Default::default()
    };
    let mut client = device.client(&config);

    let options = KeypoolOptions {
        path: Some("m/0'/5/1'/7/*".to_string()),
        start: 10,
        end: 20,
        ..Default::default()
    };
    let imports = getkeypool(&mut client, &options).await.unwrap();
    let base_key = xpub_main_to_test(&mock_xpub(&path("m/0'/5/1'"))).unwrap();
    assert_eq!(imports[0].desc, format!("pkh([{}/0h/5/1h]{}/7/*)", DEVICE_FP, base_key));
    assert_eq!(imports[0].range, [10, 20]);

    let bad = KeypoolOptions {
        path: Some("m/0'/5".to_string()),
        ..Default::default()
    };
    assert!(matches!(getkeypool(&mut client, &bad).await, Err(HwiError::BadArgument(_))));
}

#[test]
fn test_error_response_shape() {
    let response = ErrorResponse::from(&HwiError::invalid_psbt("You must provide a PSBT"));
    assert_eq!(response.code, -5);
    assert_eq!(response.error, "Invalid PSBT: You must provide a PSBT");
}

/// Four attached devices: two foreign, one busy, one ours.
fn attached_devices() -> MockDevice {
    let third = Fingerprint([0x0b, 0xad, 0xf0, 0x0d]);
    MockDevice::with_behavior(MockBehavior {
        attached: vec!["hid:a".into(), "hid:b".into(), "hid:c".into(), "hid:d".into()],
        fingerprints: [("hid:a".to_string(), OTHER_FP), ("hid:d".to_string(), third)]
            .into_iter()
            .collect(),
        unreachable: vec!["hid:b".into()],
        ..Default::default()
    })
}

fn opened_paths(device: &MockDevice) -> Vec<String> {
    device.opened().into_iter().map(|(path, _)| path).collect()
}

#[tokio::test]
async fn test_find_device_by_fingerprint() {
    let device = attached_devices();
    let config = HwiConfig {
        passphrase: Some("pw".to_string()),
        ..Default::default()
    };

    let mut client = find_device(&device, None, Some("d34db33f"), &config)
        .await
        .unwrap()
        .expect("device with matching fingerprint");
    assert_eq!(opened_paths(&device), vec!["hid:a", "hid:c"]);
    assert_eq!(device.opened()[1].1.as_deref(), Some("pw"));
    // hid:a was opened, did not match and was closed again
    assert_eq!(device.closes(), 1);
    assert_eq!(device.pubkey_queries(), vec![path("m/0'"), path("m/0'")]);

    let xpub = getmasterxpub(client.as_mut()).await.unwrap();
    assert_eq!(xpub.xpub, mock_xpub(&path("m/44'/0'/0'")));

    client.close();
    assert_eq!(device.closes(), 2);
}

#[tokio::test]
async fn test_find_device_without_filters_takes_first() {
    let device = attached_devices();
    let client = find_device(&device, Some("trezor"), None, &HwiConfig::default())
        .await
        .unwrap();
    assert!(client.is_some());
    assert_eq!(opened_paths(&device), vec!["hid:a"]);
    assert_eq!(device.closes(), 0);
}

#[tokio::test]
async fn test_find_device_no_match() {
    let device = attached_devices();
    let found = find_device(&device, None, Some("ffffffff"), &HwiConfig::default())
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(opened_paths(&device), vec!["hid:a", "hid:c", "hid:d"]);
    assert_eq!(device.closes(), 3);

    let found = find_device(&device, Some("ledger"), None, &HwiConfig::default())
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(device.opened().len(), 3);

    let err = find_device(&device, Some("nano"), None, &HwiConfig::default()).await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::UnknownDeviceType);

    let err = find_device(&device, None, Some("xyz"), &HwiConfig::default()).await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::BadArgument);
}

#[tokio::test]
async fn test_enumerate_lists_every_device() {
    let device = attached_devices();
    let entries = enumerate(&device, &HwiConfig::default()).await.unwrap();

    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.device_type == "trezor"));
    assert_eq!(entries[0].fingerprint.as_deref(), Some("12345678"));
    assert!(entries[1].fingerprint.is_none());
    assert!(entries[1].error.as_deref().unwrap().contains("hid:b is busy"));
    assert_eq!(entries[2].fingerprint.as_deref(), Some("d34db33f"));
    assert_eq!(entries[3].fingerprint.as_deref(), Some("0badf00d"));
    assert_eq!(device.closes(), 3);

    let json = serde_json::to_value(&entries[0]).unwrap();
    assert_eq!(json["type"], "trezor");
    assert_eq!(json["path"], "hid:a");
    assert!(json.get("error").is_none());
}


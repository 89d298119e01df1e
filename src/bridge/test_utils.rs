//! Fakes shared by the bridge tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::collaborators::{ActivityLauncher, LaunchError, SignerProvider, StaticDiscovery};
use super::{BridgeConfig, Nip55Bridge};
use crate::error::SignerError;
use crate::types::{DelegationRequest, Permission, SignedEvent, SignerAppInfo};

pub(crate) const TEST_PACKAGE: &str = "com.example.signer";

pub(crate) fn extras(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProviderMode {
    Available,
    Unavailable,
    Rejecting,
}

/// Provider returning canned values and counting calls.
#[derive(Debug)]
pub(crate) struct ScriptedProvider {
    mode: Mutex<ProviderMode>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(mode: ProviderMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: ProviderMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn answer<T>(&self, value: T) -> Result<Option<T>, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.mode.lock().unwrap() {
            ProviderMode::Available => Ok(Some(value)),
            ProviderMode::Unavailable => Ok(None),
            ProviderMode::Rejecting => Err(SignerError::Rejected),
        }
    }
}

impl SignerProvider for ScriptedProvider {
    fn get_public_key(
        &self,
        _package_name: &str,
        _permissions: &[Permission],
    ) -> Result<Option<String>, SignerError> {
        self.answer("npub1xyz".to_string())
    }

    fn sign_event(
        &self,
        _package_name: &str,
        _event_json: &str,
        _current_user: &str,
    ) -> Result<Option<SignedEvent>, SignerError> {
        self.answer(SignedEvent {
            signature: "direct-signature".to_string(),
            event: "{\"sig\":\"direct-signature\"}".to_string(),
        })
    }

    fn nip04_encrypt(
        &self,
        _package_name: &str,
        plain_text: &str,
        _pubkey: &str,
        _current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.answer(format!("nip04({plain_text})"))
    }

    fn nip04_decrypt(
        &self,
        _package_name: &str,
        _cipher_text: &str,
        _pubkey: &str,
        _current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.answer("nip04 plain".to_string())
    }

    fn nip44_encrypt(
        &self,
        _package_name: &str,
        plain_text: &str,
        _pubkey: &str,
        _current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.answer(format!("nip44({plain_text})"))
    }

    fn nip44_decrypt(
        &self,
        _package_name: &str,
        _cipher_text: &str,
        _pubkey: &str,
        _current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.answer("nip44 plain".to_string())
    }

    fn decrypt_zap_event(
        &self,
        _package_name: &str,
        _event_json: &str,
        _current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.answer("{\"kind\":9734}".to_string())
    }

    fn get_relays(
        &self,
        _package_name: &str,
        _current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        self.answer("{\"wss://relay.example.com\":{\"read\":true,\"write\":true}}".to_string())
    }
}

/// Launcher that records every delegation and optionally fails.
#[derive(Debug, Default)]
pub(crate) struct RecordingLauncher {
    launched: Mutex<Vec<DelegationRequest>>,
    failure: Option<String>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn launched(&self) -> Vec<DelegationRequest> {
        self.launched.lock().unwrap().clone()
    }
}

impl ActivityLauncher for RecordingLauncher {
    fn launch(&self, request: &DelegationRequest) -> Result<(), LaunchError> {
        if let Some(message) = &self.failure {
            return Err(LaunchError(message.clone()));
        }
        self.launched.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub(crate) fn signer_app(package_name: &str) -> SignerAppInfo {
    SignerAppInfo {
        name: "Test Signer".to_string(),
        package_name: package_name.to_string(),
        icon_data: None,
        icon_url: Some("https://example.com/icon.png".to_string()),
    }
}

pub(crate) fn create_test_bridge(
    config: BridgeConfig,
    provider: Arc<ScriptedProvider>,
    launcher: Arc<RecordingLauncher>,
) -> Arc<Nip55Bridge> {
    let discovery = Arc::new(StaticDiscovery::new(vec![signer_app(TEST_PACKAGE)]));
    Arc::new(
        Nip55Bridge::new(config, discovery, provider, launcher)
            .expect("Failed to create test bridge"),
    )
}

/// Waits until a delegation has been registered on `bridge`.
pub(crate) async fn wait_for_pending(bridge: &Nip55Bridge) {
    for _ in 0..200 {
        if bridge.has_pending_delegation() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no delegation became pending");
}

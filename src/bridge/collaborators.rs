//! Seams to the host platform.
//!
//! The bridge never talks to Android directly. The host shell implements these
//! traits: discovery of installed signer apps, the in-process content-provider
//! path, and the activity launcher used for delegation.

use thiserror::Error;

use crate::error::SignerError;
use crate::types::{DelegationRequest, Permission, SignedEvent, SignerAppInfo};

/// Failure reported by the host when the signer activity cannot be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LaunchError(pub String);

/// Lists the NIP-55 signer apps installed on the device.
pub trait SignerDiscovery: Send + Sync + std::fmt::Debug {
    fn installed_signers(&self) -> Vec<SignerAppInfo>;

    fn is_installed(&self, package_name: &str) -> bool {
        self.installed_signers()
            .iter()
            .any(|app| app.package_name == package_name)
    }
}

/// Hands control to the signer app's UI.
///
/// The outcome is reported later through
/// [`Nip55Bridge::on_activity_result`](crate::Nip55Bridge::on_activity_result).
/// Implementations may deliver that outcome before `launch` returns.
pub trait ActivityLauncher: Send + Sync + std::fmt::Debug {
    fn launch(&self, request: &DelegationRequest) -> Result<(), LaunchError>;
}

/// In-process signer interface (the content-provider path on Android).
///
/// Every method may block. `Ok(None)` means the signer does not serve the call
/// in-process and the request has to be delegated to its UI.
pub trait SignerProvider: Send + Sync + std::fmt::Debug {
    fn get_public_key(
        &self,
        package_name: &str,
        permissions: &[Permission],
    ) -> Result<Option<String>, SignerError>;

    fn sign_event(
        &self,
        package_name: &str,
        event_json: &str,
        current_user: &str,
    ) -> Result<Option<SignedEvent>, SignerError>;

    fn nip04_encrypt(
        &self,
        package_name: &str,
        plain_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError>;

    fn nip04_decrypt(
        &self,
        package_name: &str,
        cipher_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError>;

    fn nip44_encrypt(
        &self,
        package_name: &str,
        plain_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError>;

    fn nip44_decrypt(
        &self,
        package_name: &str,
        cipher_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError>;

    fn decrypt_zap_event(
        &self,
        package_name: &str,
        event_json: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError>;

    fn get_relays(
        &self,
        package_name: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError>;
}

/// Discovery backed by a fixed list, for hosts that resolve signers up front.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    apps: Vec<SignerAppInfo>,
}

impl StaticDiscovery {
    pub fn new(apps: Vec<SignerAppInfo>) -> Self {
        Self { apps }
    }
}

impl SignerDiscovery for StaticDiscovery {
    fn installed_signers(&self) -> Vec<SignerAppInfo> {
        self.apps.clone()
    }
}

//! NIP-55 signer bridge.
//!
//! Every operation first tries the signer's in-process provider. When the
//! signer does not serve the call that way, the request is delegated to the
//! signer app's UI and the caller waits for the activity result. Both paths
//! resolve to the same result shape.
//!
//! See: https://github.com/nostr-protocol/nips/blob/master/55.md

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

#[cfg(target_os = "android")]
pub mod android;
pub mod collaborators;
pub mod correlation;
pub mod delegation;
pub mod direct;
pub mod router;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::error::{BridgeError, Result};
use crate::init_tracing;
use crate::types::{
    ActivityOutcome, ContentResponse, OperationKind, OperationResult, Permission,
    PublicKeyResponse, SignedEventResponse, SignerAppInfo, SignerRequest,
};
use collaborators::{ActivityLauncher, SignerDiscovery, SignerProvider};
use correlation::CorrelationTable;
use delegation::FallbackDelegator;
use direct::DirectInvoker;
use router::{ResultRouter, RouteOutcome};

/// Environment variable holding the default signer package.
pub const ENV_SIGNER_PACKAGE: &str = "NIP55_SIGNER_PACKAGE";
/// Environment variable holding the logs directory.
pub const ENV_LOGS_DIR: &str = "NIP55_LOGS_DIR";
/// Environment variable enabling the installed-signer check.
pub const ENV_REQUIRE_INSTALLED: &str = "NIP55_REQUIRE_INSTALLED";

#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    /// Directory for bridge logs. Tracing is left to the host when unset.
    pub logs_dir: Option<PathBuf>,

    /// Signer package used until `set_package_name` is called.
    pub default_package_name: Option<String>,

    /// Fail with `SignerUnavailable` when discovery does not list the package.
    pub require_installed_signer: bool,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from `NIP55_*` environment variables.
    pub fn from_env() -> Self {
        let default_package_name = std::env::var(ENV_SIGNER_PACKAGE)
            .ok()
            .filter(|package| !package.trim().is_empty());
        let logs_dir = std::env::var_os(ENV_LOGS_DIR).map(PathBuf::from);
        let require_installed_signer = std::env::var(ENV_REQUIRE_INSTALLED)
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            logs_dir,
            default_package_name,
            require_installed_signer,
        }
    }

    pub fn with_logs_dir(mut self, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };
        self.logs_dir = Some(logs_dir.join(env_suffix));
        self
    }

    pub fn with_default_package(mut self, package_name: impl Into<String>) -> Self {
        self.default_package_name = Some(package_name.into());
        self
    }

    pub fn require_installed_signer(mut self, require: bool) -> Self {
        self.require_installed_signer = require;
        self
    }
}

/// The public surface of the bridge.
///
/// One instance is one signer session: it owns the active signer selection and
/// the single delegation slot.
#[derive(Debug)]
pub struct Nip55Bridge {
    config: BridgeConfig,
    active_package: RwLock<Option<String>>,
    discovery: Arc<dyn SignerDiscovery>,
    direct: DirectInvoker,
    delegator: FallbackDelegator,
    router: ResultRouter,
    table: Arc<CorrelationTable>,
}

impl Nip55Bridge {
    /// Creates a bridge over the host's collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs directory cannot be created or logging
    /// cannot be set up.
    pub fn new(
        config: BridgeConfig,
        discovery: Arc<dyn SignerDiscovery>,
        provider: Arc<dyn SignerProvider>,
        launcher: Arc<dyn ActivityLauncher>,
    ) -> Result<Self> {
        if let Some(logs_dir) = &config.logs_dir {
            std::fs::create_dir_all(logs_dir)?;
            init_tracing(logs_dir)?;
            tracing::debug!(
                target: "nip55_bridge::new",
                "Logging initialized in directory: {:?}",
                logs_dir
            );
        }

        let table = Arc::new(CorrelationTable::new());
        let active_package = config
            .default_package_name
            .clone()
            .filter(|package| !package.trim().is_empty());

        Ok(Self {
            active_package: RwLock::new(active_package),
            discovery,
            direct: DirectInvoker::new(provider),
            delegator: FallbackDelegator::new(Arc::clone(&table), launcher),
            router: ResultRouter::new(Arc::clone(&table)),
            table,
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_external_signer_installed(&self, package_name: &str) -> bool {
        self.discovery.is_installed(package_name)
    }

    pub fn get_installed_signer_apps(&self) -> Vec<SignerAppInfo> {
        self.discovery.installed_signers()
    }

    /// Sets the signer package used when an operation does not name one.
    pub async fn set_package_name(&self, package_name: &str) -> Result<()> {
        if package_name.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "Missing or empty packageName parameter".to_string(),
            ));
        }
        let mut active = self.active_package.write().await;
        *active = Some(package_name.to_string());
        tracing::info!(target: "nip55_bridge::set_package_name", "Signer package set to {}", package_name);
        Ok(())
    }

    pub async fn active_package_name(&self) -> Option<String> {
        self.active_package.read().await.clone()
    }

    pub async fn get_public_key(
        &self,
        package_name: Option<&str>,
        permissions: Option<&[Permission]>,
    ) -> Result<PublicKeyResponse> {
        let request = SignerRequest::GetPublicKey {
            permissions: permissions.map(<[Permission]>::to_vec).unwrap_or_default(),
        };
        self.execute(package_name, request)
            .await?
            .into_public_key()
            .ok_or_else(|| unexpected_result(OperationKind::GetPublicKey))
    }

    pub async fn sign_event(
        &self,
        package_name: Option<&str>,
        event_json: &str,
        event_id: &str,
        npub: &str,
    ) -> Result<SignedEventResponse> {
        let request = SignerRequest::SignEvent {
            event_json: event_json.to_string(),
            event_id: event_id.to_string(),
            current_user: npub.to_string(),
        };
        self.execute(package_name, request)
            .await?
            .into_signed_event()
            .ok_or_else(|| unexpected_result(OperationKind::SignEvent))
    }

    pub async fn nip04_encrypt(
        &self,
        package_name: Option<&str>,
        plain_text: &str,
        id: &str,
        pub_key: &str,
        npub: &str,
    ) -> Result<ContentResponse> {
        let request = SignerRequest::Nip04Encrypt {
            plain_text: plain_text.to_string(),
            id: id.to_string(),
            pubkey: pub_key.to_string(),
            current_user: npub.to_string(),
        };
        self.execute_content(package_name, request).await
    }

    pub async fn nip04_decrypt(
        &self,
        package_name: Option<&str>,
        cipher_text: &str,
        id: &str,
        pub_key: &str,
        npub: &str,
    ) -> Result<ContentResponse> {
        let request = SignerRequest::Nip04Decrypt {
            cipher_text: cipher_text.to_string(),
            id: id.to_string(),
            pubkey: pub_key.to_string(),
            current_user: npub.to_string(),
        };
        self.execute_content(package_name, request).await
    }

    pub async fn nip44_encrypt(
        &self,
        package_name: Option<&str>,
        plain_text: &str,
        id: &str,
        pub_key: &str,
        npub: &str,
    ) -> Result<ContentResponse> {
        let request = SignerRequest::Nip44Encrypt {
            plain_text: plain_text.to_string(),
            id: id.to_string(),
            pubkey: pub_key.to_string(),
            current_user: npub.to_string(),
        };
        self.execute_content(package_name, request).await
    }

    pub async fn nip44_decrypt(
        &self,
        package_name: Option<&str>,
        cipher_text: &str,
        id: &str,
        pub_key: &str,
        npub: &str,
    ) -> Result<ContentResponse> {
        let request = SignerRequest::Nip44Decrypt {
            cipher_text: cipher_text.to_string(),
            id: id.to_string(),
            pubkey: pub_key.to_string(),
            current_user: npub.to_string(),
        };
        self.execute_content(package_name, request).await
    }

    pub async fn decrypt_zap_event(
        &self,
        package_name: Option<&str>,
        event_json: &str,
        id: &str,
        npub: &str,
    ) -> Result<ContentResponse> {
        let request = SignerRequest::DecryptZapEvent {
            event_json: event_json.to_string(),
            id: id.to_string(),
            current_user: npub.to_string(),
        };
        self.execute_content(package_name, request).await
    }

    pub async fn get_relays(
        &self,
        package_name: Option<&str>,
        id: &str,
        npub: &str,
    ) -> Result<ContentResponse> {
        let request = SignerRequest::GetRelays {
            id: id.to_string(),
            current_user: npub.to_string(),
        };
        self.execute_content(package_name, request).await
    }

    /// Entry point for the host's activity-result callback.
    pub fn on_activity_result(&self, outcome: ActivityOutcome) -> RouteOutcome {
        self.router.route(outcome)
    }

    /// Fails the pending delegation, if any, with `DelegationAbandoned`.
    ///
    /// The signer UI may still be open, so its token stays reserved: new
    /// delegations get `DelegationInProgress` until that UI's outcome arrives
    /// (and is discarded) or [`release_abandoned_delegation`] is called.
    /// Returns `true` if a caller was waiting.
    ///
    /// [`release_abandoned_delegation`]: Self::release_abandoned_delegation
    pub fn abandon_delegation(&self) -> bool {
        let released = self.table.abandon_all();
        if released > 0 {
            tracing::info!(
                target: "nip55_bridge::abandon_delegation",
                "Abandoned {} pending delegation(s), token kept until the signer UI returns",
                released
            );
        }
        released > 0
    }

    /// Frees a token held by an abandoned delegation whose outcome will never arrive,
    /// e.g. after the host activity was recreated. Live delegations are untouched.
    pub fn release_abandoned_delegation(&self) -> bool {
        let removed = self.table.clear_abandoned();
        if removed > 0 {
            tracing::info!(
                target: "nip55_bridge::release_abandoned_delegation",
                "Released {} abandoned delegation(s)",
                removed
            );
        }
        removed > 0
    }

    /// True while the delegation slot is taken, including by an abandoned
    /// delegation that still waits for its signer UI.
    pub fn has_pending_delegation(&self) -> bool {
        !self.table.is_empty()
    }

    /// True when the slot is held only by an abandoned delegation.
    pub fn has_abandoned_delegation(&self) -> bool {
        self.table.is_abandoned()
    }

    pub fn pending_kind(&self) -> Option<OperationKind> {
        self.table.pending_token().and_then(|token| token.kind())
    }

    async fn resolve_package_name(&self, package_name: Option<&str>) -> Result<String> {
        if let Some(package_name) = package_name.filter(|p| !p.trim().is_empty()) {
            return Ok(package_name.to_string());
        }
        self.active_package.read().await.clone().ok_or_else(|| {
            BridgeError::Configuration(
                "Signer package name not set. Call setPackageName first.".to_string(),
            )
        })
    }

    async fn execute(
        &self,
        package_name: Option<&str>,
        request: SignerRequest,
    ) -> Result<OperationResult> {
        let package_name = self.resolve_package_name(package_name).await?;
        let kind = request.kind();

        if self.config.require_installed_signer && !self.discovery.is_installed(&package_name) {
            return Err(BridgeError::SignerUnavailable(package_name));
        }

        if let Some(result) = self.direct.invoke(&package_name, &request).await? {
            tracing::debug!(
                target: "nip55_bridge::execute",
                "{} served in-process by {}",
                kind,
                package_name
            );
            return Ok(result);
        }

        tracing::debug!(
            target: "nip55_bridge::execute",
            "{} not available in-process from {}, delegating",
            kind,
            package_name
        );
        self.delegator.launch(&package_name, request)?.await
    }

    async fn execute_content(
        &self,
        package_name: Option<&str>,
        request: SignerRequest,
    ) -> Result<ContentResponse> {
        let kind = request.kind();
        self.execute(package_name, request)
            .await?
            .into_content()
            .ok_or_else(|| unexpected_result(kind))
    }
}

fn unexpected_result(kind: OperationKind) -> BridgeError {
    BridgeError::UnknownOperation(kind.request_code())
}

//! Direct path: call the signer's in-process provider without leaving the app.

use std::sync::Arc;

use super::collaborators::SignerProvider;
use crate::error::{BridgeError, Result};
use crate::types::{
    ContentResponse, OperationResult, PublicKeyResponse, SignedEventResponse, SignerRequest,
};

#[derive(Debug, Clone)]
pub struct DirectInvoker {
    provider: Arc<dyn SignerProvider>,
}

impl DirectInvoker {
    pub fn new(provider: Arc<dyn SignerProvider>) -> Self {
        Self { provider }
    }

    /// Attempts `request` in-process.
    ///
    /// Returns `Ok(None)` when the signer does not serve the call directly.
    /// Provider calls can block, so they run on the blocking thread pool.
    pub async fn invoke(
        &self,
        package_name: &str,
        request: &SignerRequest,
    ) -> Result<Option<OperationResult>> {
        let provider = Arc::clone(&self.provider);
        let package_name = package_name.to_string();
        let request = request.clone();

        tokio::task::spawn_blocking(move || call_provider(provider.as_ref(), &package_name, &request))
            .await
            .map_err(|e| BridgeError::Task(e.to_string()))?
    }
}

fn call_provider(
    provider: &dyn SignerProvider,
    package_name: &str,
    request: &SignerRequest,
) -> Result<Option<OperationResult>> {
    let result = match request {
        SignerRequest::GetPublicKey { permissions } => provider
            .get_public_key(package_name, permissions)?
            .map(|npub| {
                OperationResult::PublicKey(PublicKeyResponse {
                    npub,
                    package: package_name.to_string(),
                })
            }),
        SignerRequest::SignEvent {
            event_json,
            event_id,
            current_user,
        } => provider
            .sign_event(package_name, event_json, current_user)?
            .map(|signed| {
                OperationResult::SignedEvent(SignedEventResponse {
                    signature: signed.signature,
                    id: event_id.clone(),
                    event: signed.event,
                })
            }),
        SignerRequest::Nip04Encrypt {
            plain_text,
            id,
            pubkey,
            current_user,
        } => content(
            provider.nip04_encrypt(package_name, plain_text, pubkey, current_user)?,
            id,
        ),
        SignerRequest::Nip04Decrypt {
            cipher_text,
            id,
            pubkey,
            current_user,
        } => content(
            provider.nip04_decrypt(package_name, cipher_text, pubkey, current_user)?,
            id,
        ),
        SignerRequest::Nip44Encrypt {
            plain_text,
            id,
            pubkey,
            current_user,
        } => content(
            provider.nip44_encrypt(package_name, plain_text, pubkey, current_user)?,
            id,
        ),
        SignerRequest::Nip44Decrypt {
            cipher_text,
            id,
            pubkey,
            current_user,
        } => content(
            provider.nip44_decrypt(package_name, cipher_text, pubkey, current_user)?,
            id,
        ),
        SignerRequest::DecryptZapEvent {
            event_json,
            id,
            current_user,
        } => content(
            provider.decrypt_zap_event(package_name, event_json, current_user)?,
            id,
        ),
        SignerRequest::GetRelays { id, current_user } => {
            content(provider.get_relays(package_name, current_user)?, id)
        }
    };

    Ok(result)
}

fn content(result: Option<String>, id: &str) -> Option<OperationResult> {
    result.map(|result| {
        OperationResult::Content(ContentResponse {
            result,
            id: id.to_string(),
        })
    })
}

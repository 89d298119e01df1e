//! In-memory signer provider backed by [`Keys`].
//!
//! Serves every operation in-process with real NIP-04/NIP-44/NIP-57 crypto.
//! Useful for tests, the demo binary and desktop hosts without a signer app.

use std::collections::BTreeMap;

use nostr_sdk::prelude::*;
use serde::Serialize;

use crate::bridge::collaborators::SignerProvider;
use crate::error::SignerError;
use crate::types::{Permission, SignedEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct RelayPolicy {
    read: bool,
    write: bool,
}

#[derive(Debug)]
pub struct KeysProvider {
    keys: Keys,
    available: bool,
    relays: BTreeMap<String, RelayPolicy>,
}

impl KeysProvider {
    /// Generate a provider with random keys.
    pub fn generate() -> Self {
        Self::from_keys(Keys::generate())
    }

    pub fn from_keys(keys: Keys) -> Self {
        Self {
            keys,
            available: true,
            relays: BTreeMap::new(),
        }
    }

    /// A provider that answers "not served in-process" to everything, forcing
    /// every call onto the delegation path.
    pub fn unavailable(keys: Keys) -> Self {
        Self {
            available: false,
            ..Self::from_keys(keys)
        }
    }

    pub fn with_relay(mut self, url: impl Into<String>, read: bool, write: bool) -> Self {
        self.relays.insert(url.into(), RelayPolicy { read, write });
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// Whether this provider should serve a call made on behalf of `current_user`.
    fn serves(&self, current_user: &str) -> Result<bool, SignerError> {
        if !self.available {
            return Ok(false);
        }
        if current_user.trim().is_empty() {
            return Ok(true);
        }
        let user = parse_public_key(current_user)?;
        if user != self.keys.public_key() {
            tracing::debug!(
                target: "nip55_bridge::signers::keys",
                "Call is for another account, not serving it"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

fn parse_public_key(value: &str) -> Result<PublicKey, SignerError> {
    PublicKey::parse(value).map_err(|e| SignerError::InvalidArgument(e.to_string()))
}

impl SignerProvider for KeysProvider {
    fn get_public_key(
        &self,
        _package_name: &str,
        _permissions: &[Permission],
    ) -> Result<Option<String>, SignerError> {
        if !self.available {
            return Ok(None);
        }
        let npub = self
            .keys
            .public_key()
            .to_bech32()
            .map_err(|e| SignerError::Crypto(e.to_string()))?;
        Ok(Some(npub))
    }

    fn sign_event(
        &self,
        _package_name: &str,
        event_json: &str,
        current_user: &str,
    ) -> Result<Option<SignedEvent>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        let unsigned = UnsignedEvent::from_json(event_json)
            .map_err(|e| SignerError::InvalidArgument(e.to_string()))?;
        let event = unsigned
            .sign_with_keys(&self.keys)
            .map_err(|e| SignerError::Crypto(e.to_string()))?;

        Ok(Some(SignedEvent {
            signature: event.sig.to_string(),
            event: event.as_json(),
        }))
    }

    fn nip04_encrypt(
        &self,
        _package_name: &str,
        plain_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        let peer = parse_public_key(pubkey)?;
        nip04::encrypt(self.keys.secret_key(), &peer, plain_text)
            .map(Some)
            .map_err(|e| SignerError::Crypto(e.to_string()))
    }

    fn nip04_decrypt(
        &self,
        _package_name: &str,
        cipher_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        let peer = parse_public_key(pubkey)?;
        nip04::decrypt(self.keys.secret_key(), &peer, cipher_text)
            .map(Some)
            .map_err(|e| SignerError::Crypto(e.to_string()))
    }

    fn nip44_encrypt(
        &self,
        _package_name: &str,
        plain_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        let peer = parse_public_key(pubkey)?;
        nip44::encrypt(self.keys.secret_key(), &peer, plain_text, nip44::Version::V2)
            .map(Some)
            .map_err(|e| SignerError::Crypto(e.to_string()))
    }

    fn nip44_decrypt(
        &self,
        _package_name: &str,
        cipher_text: &str,
        pubkey: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        let peer = parse_public_key(pubkey)?;
        nip44::decrypt(self.keys.secret_key(), &peer, cipher_text)
            .map(Some)
            .map_err(|e| SignerError::Crypto(e.to_string()))
    }

    fn decrypt_zap_event(
        &self,
        _package_name: &str,
        event_json: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        let zap_request =
            Event::from_json(event_json).map_err(|e| SignerError::InvalidArgument(e.to_string()))?;
        let private_zap =
            nip57::decrypt_received_private_zap_message(self.keys.secret_key(), &zap_request)
                .map_err(|e| SignerError::Crypto(e.to_string()))?;
        Ok(Some(private_zap.as_json()))
    }

    fn get_relays(
        &self,
        _package_name: &str,
        current_user: &str,
    ) -> Result<Option<String>, SignerError> {
        if !self.serves(current_user)? {
            return Ok(None);
        }
        serde_json::to_string(&self.relays)
            .map(Some)
            .map_err(|e| SignerError::InvalidResponse(e.to_string()))
    }
}

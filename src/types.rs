use std::collections::{BTreeMap, HashMap};
use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// URI scheme every NIP-55 signer app registers for delegated requests.
pub const NOSTRSIGNER_SCHEME: &str = "nostrsigner:";

/// The operations a NIP-55 signer app can perform on our behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    GetPublicKey,
    SignEvent,
    Nip04Encrypt,
    Nip04Decrypt,
    Nip44Encrypt,
    Nip44Decrypt,
    DecryptZapEvent,
    GetRelays,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::GetPublicKey,
        OperationKind::SignEvent,
        OperationKind::Nip04Encrypt,
        OperationKind::Nip04Decrypt,
        OperationKind::Nip44Encrypt,
        OperationKind::Nip44Decrypt,
        OperationKind::DecryptZapEvent,
        OperationKind::GetRelays,
    ];

    /// Activity request code reserved for this kind.
    pub fn request_code(self) -> u32 {
        match self {
            Self::GetPublicKey => 1001,
            Self::SignEvent => 1002,
            Self::Nip04Encrypt => 1003,
            Self::Nip04Decrypt => 1004,
            Self::Nip44Encrypt => 1005,
            Self::Nip44Decrypt => 1006,
            Self::DecryptZapEvent => 1007,
            Self::GetRelays => 1008,
        }
    }

    pub fn from_request_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.request_code() == code)
    }

    pub fn correlation_token(self) -> CorrelationToken {
        CorrelationToken(self.request_code())
    }

    /// Value of the `type` extra in a NIP-55 intent.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetPublicKey => "get_public_key",
            Self::SignEvent => "sign_event",
            Self::Nip04Encrypt => "nip04_encrypt",
            Self::Nip04Decrypt => "nip04_decrypt",
            Self::Nip44Encrypt => "nip44_encrypt",
            Self::Nip44Decrypt => "nip44_decrypt",
            Self::DecryptZapEvent => "decrypt_zap_event",
            Self::GetRelays => "get_relays",
        }
    }

    /// Content provider method name (`content://<package>.<METHOD>`).
    pub fn content_method(self) -> &'static str {
        match self {
            Self::GetPublicKey => "GET_PUBLIC_KEY",
            Self::SignEvent => "SIGN_EVENT",
            Self::Nip04Encrypt => "NIP04_ENCRYPT",
            Self::Nip04Decrypt => "NIP04_DECRYPT",
            Self::Nip44Encrypt => "NIP44_ENCRYPT",
            Self::Nip44Decrypt => "NIP44_DECRYPT",
            Self::DecryptZapEvent => "DECRYPT_ZAP_EVENT",
            Self::GetRelays => "GET_RELAYS",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier matching an activity result back to the delegation that caused it.
///
/// Tokens are the fixed request codes of [`OperationKind`]; they are only unique
/// among pending delegations because at most one delegation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(pub u32);

impl CorrelationToken {
    pub fn code(self) -> u32 {
        self.0
    }

    pub fn kind(self) -> Option<OperationKind> {
        OperationKind::from_request_code(self.0)
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An installed signer application, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerAppInfo {
    pub name: String,
    pub package_name: String,
    /// Base64 encoded icon bytes, when the icon is bundled with the app.
    pub icon_data: Option<String>,
    pub icon_url: Option<String>,
}

impl SignerAppInfo {
    pub fn new(name: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_name: package_name.into(),
            icon_data: None,
            icon_url: None,
        }
    }

    /// Attaches a PNG icon as base64 `icon_data` and a matching `data:` URL.
    pub fn with_icon_png(mut self, png: &[u8]) -> Self {
        let encoded = general_purpose::STANDARD.encode(png);
        self.icon_url = Some(format!("data:image/png;base64,{encoded}"));
        self.icon_data = Some(encoded);
        self
    }
}

/// A permission requested up front with `get_public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub permission_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u16>,
}

impl Permission {
    pub fn new(permission_type: impl Into<String>) -> Self {
        Self {
            permission_type: permission_type.into(),
            kind: None,
        }
    }

    pub fn for_kind(permission_type: impl Into<String>, kind: u16) -> Self {
        Self {
            permission_type: permission_type.into(),
            kind: Some(kind),
        }
    }
}

/// Signature and signed event JSON returned by a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvent {
    pub signature: String,
    pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub npub: String,
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEventResponse {
    pub signature: String,
    pub id: String,
    pub event: String,
}

/// Result shape shared by encryption, decryption, zap decryption and relay lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentResponse {
    pub result: String,
    pub id: String,
}

/// A decoded result, regardless of whether it came from the direct or delegated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OperationResult {
    PublicKey(PublicKeyResponse),
    SignedEvent(SignedEventResponse),
    Content(ContentResponse),
}

impl OperationResult {
    pub fn into_public_key(self) -> Option<PublicKeyResponse> {
        match self {
            Self::PublicKey(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_signed_event(self) -> Option<SignedEventResponse> {
        match self {
            Self::SignedEvent(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_content(self) -> Option<ContentResponse> {
        match self {
            Self::Content(response) => Some(response),
            _ => None,
        }
    }
}

/// Arguments of a single signer operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignerRequest {
    GetPublicKey {
        #[serde(default)]
        permissions: Vec<Permission>,
    },
    SignEvent {
        event_json: String,
        event_id: String,
        current_user: String,
    },
    Nip04Encrypt {
        plain_text: String,
        id: String,
        pubkey: String,
        current_user: String,
    },
    Nip04Decrypt {
        cipher_text: String,
        id: String,
        pubkey: String,
        current_user: String,
    },
    Nip44Encrypt {
        plain_text: String,
        id: String,
        pubkey: String,
        current_user: String,
    },
    Nip44Decrypt {
        cipher_text: String,
        id: String,
        pubkey: String,
        current_user: String,
    },
    DecryptZapEvent {
        event_json: String,
        id: String,
        current_user: String,
    },
    GetRelays {
        id: String,
        current_user: String,
    },
}

impl SignerRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::GetPublicKey { .. } => OperationKind::GetPublicKey,
            Self::SignEvent { .. } => OperationKind::SignEvent,
            Self::Nip04Encrypt { .. } => OperationKind::Nip04Encrypt,
            Self::Nip04Decrypt { .. } => OperationKind::Nip04Decrypt,
            Self::Nip44Encrypt { .. } => OperationKind::Nip44Encrypt,
            Self::Nip44Decrypt { .. } => OperationKind::Nip44Decrypt,
            Self::DecryptZapEvent { .. } => OperationKind::DecryptZapEvent,
            Self::GetRelays { .. } => OperationKind::GetRelays,
        }
    }

    /// The caller-supplied id echoed back in the result, if the operation has one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::GetPublicKey { .. } => None,
            Self::SignEvent { event_id, .. } => Some(event_id),
            Self::Nip04Encrypt { id, .. }
            | Self::Nip04Decrypt { id, .. }
            | Self::Nip44Encrypt { id, .. }
            | Self::Nip44Decrypt { id, .. }
            | Self::DecryptZapEvent { id, .. }
            | Self::GetRelays { id, .. } => Some(id),
        }
    }
}

/// A request handed to the host UI layer to open the signer app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub token: CorrelationToken,
    pub package_name: String,
    pub request: SignerRequest,
}

/// Platform-neutral picture of the `ACTION_VIEW` intent a NIP-55 signer expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignerIntent {
    pub uri: String,
    pub package: String,
    pub extras: BTreeMap<String, String>,
}

impl DelegationRequest {
    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }

    pub fn to_intent(&self) -> crate::Result<SignerIntent> {
        let mut extras = BTreeMap::new();
        extras.insert("type".to_string(), self.kind().as_str().to_string());

        let content = match &self.request {
            SignerRequest::GetPublicKey { permissions } => {
                if !permissions.is_empty() {
                    extras.insert(
                        "permissions".to_string(),
                        serde_json::to_string(permissions)?,
                    );
                }
                String::new()
            }
            SignerRequest::SignEvent {
                event_json,
                event_id,
                current_user,
            } => {
                extras.insert("id".to_string(), event_id.clone());
                extras.insert("current_user".to_string(), current_user.clone());
                event_json.clone()
            }
            SignerRequest::Nip04Encrypt {
                plain_text: text,
                id,
                pubkey,
                current_user,
            }
            | SignerRequest::Nip44Encrypt {
                plain_text: text,
                id,
                pubkey,
                current_user,
            }
            | SignerRequest::Nip04Decrypt {
                cipher_text: text,
                id,
                pubkey,
                current_user,
            }
            | SignerRequest::Nip44Decrypt {
                cipher_text: text,
                id,
                pubkey,
                current_user,
            } => {
                extras.insert("id".to_string(), id.clone());
                extras.insert("current_user".to_string(), current_user.clone());
                extras.insert("pubkey".to_string(), pubkey.clone());
                text.clone()
            }
            SignerRequest::DecryptZapEvent {
                event_json,
                id,
                current_user,
            } => {
                extras.insert("id".to_string(), id.clone());
                extras.insert("current_user".to_string(), current_user.clone());
                event_json.clone()
            }
            SignerRequest::GetRelays { id, current_user } => {
                extras.insert("id".to_string(), id.clone());
                extras.insert("current_user".to_string(), current_user.clone());
                String::new()
            }
        };

        Ok(SignerIntent {
            uri: format!("{NOSTRSIGNER_SCHEME}{content}"),
            package: self.package_name.clone(),
            extras,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Ok,
    Cancelled,
}

/// What the host UI layer reports once the signer app hands control back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    pub token: CorrelationToken,
    pub status: ActivityStatus,
    /// Intent extras returned by the signer, `None` when no intent came back.
    pub data: Option<HashMap<String, String>>,
}

impl ActivityOutcome {
    pub fn ok(token: CorrelationToken, data: HashMap<String, String>) -> Self {
        Self {
            token,
            status: ActivityStatus::Ok,
            data: Some(data),
        }
    }

    pub fn cancelled(token: CorrelationToken) -> Self {
        Self {
            token,
            status: ActivityStatus::Cancelled,
            data: None,
        }
    }

    pub fn empty(token: CorrelationToken) -> Self {
        Self {
            token,
            status: ActivityStatus::Ok,
            data: None,
        }
    }
}

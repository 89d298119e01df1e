//! JSON surface for JavaScript hosts.
//!
//! Methods keep the names and positional arguments the JS side calls
//! (`getPublicKey(packageName?, permissions?)`, `signEvent(packageName?,
//! eventJson, eventId, npub)`, ...). Results are plain JSON objects and failures
//! are `{ code, message }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::Nip55Bridge;
use crate::error::BridgeError;
use crate::types::Permission;

/// Error shape the JS side rejects its promise with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// A single call as sent over a string-only FFI boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCall {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

type ApiResult = core::result::Result<Value, ApiError>;

fn invalid_argument(message: String) -> ApiError {
    BridgeError::InvalidArgument(message).into()
}

fn optional_string(args: &[Value], index: usize, name: &str) -> Result<Option<String>, ApiError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(invalid_argument(format!(
            "`{name}` must be a string, got {other}"
        ))),
    }
}

fn required_string(args: &[Value], index: usize, name: &str) -> Result<String, ApiError> {
    optional_string(args, index, name)?
        .ok_or_else(|| invalid_argument(format!("Missing `{name}` parameter")))
}

/// Permissions arrive either as a JSON array or as its string encoding.
fn permissions(args: &[Value], index: usize) -> Result<Option<Vec<Permission>>, ApiError> {
    let value = match args.get(index) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => return Ok(None),
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .map_err(|e| invalid_argument(format!("Invalid permissions: {e}")))?,
        Some(value) => value.clone(),
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| invalid_argument(format!("Invalid permissions: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> ApiResult {
    serde_json::to_value(value).map_err(|e| BridgeError::from(e).into())
}

/// Runs `method` on `bridge` with positional `args`.
pub async fn dispatch(bridge: &Nip55Bridge, method: &str, args: &[Value]) -> ApiResult {
    tracing::debug!(target: "nip55_bridge::api", "Dispatching {}", method);

    match method {
        "isExternalSignerInstalled" => {
            let package_name = required_string(args, 0, "packageName")?;
            Ok(Value::Bool(bridge.is_external_signer_installed(&package_name)))
        }
        "getInstalledSignerApps" => to_value(&bridge.get_installed_signer_apps()),
        "setPackageName" => {
            let package_name = optional_string(args, 0, "packageName")?.unwrap_or_default();
            bridge.set_package_name(&package_name).await?;
            Ok(Value::Null)
        }
        "getPublicKey" => {
            let package_name = optional_string(args, 0, "packageName")?;
            let permissions = permissions(args, 1)?;
            let response = bridge
                .get_public_key(package_name.as_deref(), permissions.as_deref())
                .await?;
            to_value(&response)
        }
        "signEvent" => {
            let package_name = optional_string(args, 0, "packageName")?;
            let event_json = required_string(args, 1, "eventJson")?;
            let event_id = required_string(args, 2, "eventId")?;
            let npub = required_string(args, 3, "npub")?;
            let response = bridge
                .sign_event(package_name.as_deref(), &event_json, &event_id, &npub)
                .await?;
            to_value(&response)
        }
        "nip04Encrypt" | "nip04Decrypt" | "nip44Encrypt" | "nip44Decrypt" => {
            let package_name = optional_string(args, 0, "packageName")?;
            let text = required_string(args, 1, "text")?;
            let id = required_string(args, 2, "id")?;
            let pub_key = required_string(args, 3, "pubKey")?;
            let npub = required_string(args, 4, "npub")?;
            let package_name = package_name.as_deref();

            let response = match method {
                "nip04Encrypt" => {
                    bridge
                        .nip04_encrypt(package_name, &text, &id, &pub_key, &npub)
                        .await?
                }
                "nip04Decrypt" => {
                    bridge
                        .nip04_decrypt(package_name, &text, &id, &pub_key, &npub)
                        .await?
                }
                "nip44Encrypt" => {
                    bridge
                        .nip44_encrypt(package_name, &text, &id, &pub_key, &npub)
                        .await?
                }
                _ => {
                    bridge
                        .nip44_decrypt(package_name, &text, &id, &pub_key, &npub)
                        .await?
                }
            };
            to_value(&response)
        }
        "decryptZapEvent" => {
            let package_name = optional_string(args, 0, "packageName")?;
            let event_json = required_string(args, 1, "eventJson")?;
            let id = required_string(args, 2, "id")?;
            let npub = required_string(args, 3, "npub")?;
            let response = bridge
                .decrypt_zap_event(package_name.as_deref(), &event_json, &id, &npub)
                .await?;
            to_value(&response)
        }
        "getRelays" => {
            let package_name = optional_string(args, 0, "packageName")?;
            let id = required_string(args, 1, "id")?;
            let npub = required_string(args, 2, "npub")?;
            let response = bridge
                .get_relays(package_name.as_deref(), &id, &npub)
                .await?;
            to_value(&response)
        }
        other => Err(invalid_argument(format!("Unknown method: {other}"))),
    }
}

/// Decodes an [`ApiCall`] from JSON, runs it and encodes the outcome as
/// `{"ok": <result>}` or `{"error": {code, message}}`.
pub async fn dispatch_json(bridge: &Nip55Bridge, call_json: &str) -> String {
    let outcome = match serde_json::from_str::<ApiCall>(call_json) {
        Ok(call) => dispatch(bridge, &call.method, &call.args).await,
        Err(e) => Err(invalid_argument(format!("Invalid call: {e}"))),
    };

    let envelope = match outcome {
        Ok(value) => serde_json::json!({ "ok": value }),
        Err(error) => serde_json::json!({ "error": error }),
    };
    envelope.to_string()
}

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use nip55_bridge::signers::KeysProvider;
use nip55_bridge::{
    ActivityLauncher, ActivityOutcome, BridgeConfig, DelegationRequest, LaunchError, Nip55Bridge,
    SignerProvider, SignerRequest, StaticDiscovery, api,
};
use nostr_sdk::prelude::*;

const DEMO_PACKAGE: &str = "com.example.signer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// The signer serves every call in-process.
    Direct,
    /// Every call goes through the simulated signer UI, which approves it.
    Delegate,
    /// Every call goes through the simulated signer UI, which cancels it.
    Cancel,
}

/// Walks a NIP-55 signer bridge through every operation against an in-memory signer
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory for logs
    #[clap(long, value_name = "PATH", default_value = "./logs")]
    logs_dir: PathBuf,

    /// Signer package name (falls back to NIP55_SIGNER_PACKAGE)
    #[clap(long)]
    package: Option<String>,

    #[clap(long, value_enum, default_value_t = Scenario::Delegate)]
    scenario: Scenario,
}

/// Stands in for the host activity launcher: forwards requests to the fake signer app.
#[derive(Debug)]
struct ChannelLauncher {
    sender: mpsc::UnboundedSender<DelegationRequest>,
}

impl ActivityLauncher for ChannelLauncher {
    fn launch(&self, request: &DelegationRequest) -> std::result::Result<(), LaunchError> {
        self.sender
            .send(request.clone())
            .map_err(|_| LaunchError("Signer app is not running".to_string()))
    }
}

/// Answers a delegated request the way a signer app fills its result intent.
fn approve(
    signer: &KeysProvider,
    delegation: &DelegationRequest,
) -> Result<HashMap<String, String>> {
    let package = delegation.package_name.as_str();
    let mut extras = HashMap::new();

    match &delegation.request {
        SignerRequest::GetPublicKey { permissions } => {
            let npub = signer
                .get_public_key(package, permissions)?
                .context("signer returned no public key")?;
            extras.insert("signature".to_string(), npub);
            extras.insert("package".to_string(), package.to_string());
        }
        SignerRequest::SignEvent {
            event_json,
            event_id,
            current_user,
        } => {
            let signed = signer
                .sign_event(package, event_json, current_user)?
                .context("signer returned no event")?;
            extras.insert("signature".to_string(), signed.signature);
            extras.insert("id".to_string(), event_id.clone());
            extras.insert("event".to_string(), signed.event);
        }
        SignerRequest::Nip04Encrypt {
            plain_text,
            id,
            pubkey,
            current_user,
        } => {
            let cipher = signer
                .nip04_encrypt(package, plain_text, pubkey, current_user)?
                .context("signer returned no ciphertext")?;
            extras.insert("signature".to_string(), cipher);
            extras.insert("id".to_string(), id.clone());
        }
        SignerRequest::Nip44Encrypt {
            plain_text,
            id,
            pubkey,
            current_user,
        } => {
            let cipher = signer
                .nip44_encrypt(package, plain_text, pubkey, current_user)?
                .context("signer returned no ciphertext")?;
            extras.insert("signature".to_string(), cipher);
            extras.insert("id".to_string(), id.clone());
        }
        SignerRequest::Nip04Decrypt {
            cipher_text,
            id,
            pubkey,
            current_user,
        } => {
            let plain = signer
                .nip04_decrypt(package, cipher_text, pubkey, current_user)?
                .context("signer returned no plaintext")?;
            extras.insert("result".to_string(), plain);
            extras.insert("id".to_string(), id.clone());
        }
        SignerRequest::Nip44Decrypt {
            cipher_text,
            id,
            pubkey,
            current_user,
        } => {
            let plain = signer
                .nip44_decrypt(package, cipher_text, pubkey, current_user)?
                .context("signer returned no plaintext")?;
            extras.insert("result".to_string(), plain);
            extras.insert("id".to_string(), id.clone());
        }
        SignerRequest::DecryptZapEvent {
            event_json,
            id,
            current_user,
        } => {
            let zap = signer
                .decrypt_zap_event(package, event_json, current_user)?
                .context("signer returned no zap request")?;
            extras.insert("result".to_string(), zap);
            extras.insert("id".to_string(), id.clone());
        }
        SignerRequest::GetRelays { id, current_user } => {
            let relays = signer
                .get_relays(package, current_user)?
                .context("signer returned no relays")?;
            extras.insert("result".to_string(), relays);
            extras.insert("id".to_string(), id.clone());
        }
    }

    Ok(extras)
}

/// Fake signer app: receives launched requests and reports activity outcomes.
async fn run_signer_app(
    bridge: Arc<Nip55Bridge>,
    signer: KeysProvider,
    mut requests: mpsc::UnboundedReceiver<DelegationRequest>,
    cancel: bool,
) {
    while let Some(delegation) = requests.recv().await {
        let intent = match delegation.to_intent() {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!("Failed to build intent: {}", e);
                continue;
            }
        };
        tracing::info!(
            "Signer app opened for {} ({} extras)",
            intent.extras.get("type").map(String::as_str).unwrap_or("?"),
            intent.extras.len()
        );

        let outcome = if cancel {
            ActivityOutcome::cancelled(delegation.token)
        } else {
            match approve(&signer, &delegation) {
                Ok(extras) => ActivityOutcome::ok(delegation.token, extras),
                Err(e) => {
                    tracing::warn!("Signer app could not serve request: {}", e);
                    ActivityOutcome::cancelled(delegation.token)
                }
            }
        };

        let route = bridge.on_activity_result(outcome);
        tracing::debug!("Activity outcome routed: {:?}", route);
    }
}

async fn call(bridge: &Nip55Bridge, method: &str, args: Vec<Value>) -> Option<Value> {
    match api::dispatch(bridge, method, &args).await {
        Ok(value) => {
            println!("{method}: {value}");
            Some(value)
        }
        Err(e) => {
            println!("{method} failed: {}", json!(e));
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let env_config = BridgeConfig::from_env();
    let package = args
        .package
        .clone()
        .or(env_config.default_package_name.clone())
        .unwrap_or_else(|| DEMO_PACKAGE.to_string());
    let config = BridgeConfig::new()
        .with_logs_dir(&args.logs_dir)
        .require_installed_signer(env_config.require_installed_signer);

    let keys = match std::env::var("NOSTR_NSEC") {
        Ok(nsec) => Keys::parse(&nsec).context("Invalid NOSTR_NSEC")?,
        Err(_) => Keys::generate(),
    };
    let npub = keys.public_key().to_bech32()?;

    let provider = match args.scenario {
        Scenario::Direct => KeysProvider::from_keys(keys.clone()),
        Scenario::Delegate | Scenario::Cancel => KeysProvider::unavailable(keys.clone()),
    };
    let signer_app =
        KeysProvider::from_keys(keys.clone()).with_relay("wss://relay.damus.io", true, true);

    let (sender, receiver) = mpsc::unbounded_channel();
    let discovery = StaticDiscovery::new(vec![nip55_bridge::SignerAppInfo {
        name: "Demo Signer".to_string(),
        package_name: package.clone(),
        icon_data: None,
        icon_url: None,
    }]);
    let bridge = Arc::new(Nip55Bridge::new(
        config,
        Arc::new(discovery),
        Arc::new(provider),
        Arc::new(ChannelLauncher { sender }),
    )?);

    let app = tokio::spawn(run_signer_app(
        Arc::clone(&bridge),
        signer_app,
        receiver,
        args.scenario == Scenario::Cancel,
    ));

    tracing::info!("=== Running {:?} scenario against {} ===", args.scenario, package);

    call(&bridge, "getInstalledSignerApps", vec![]).await;
    call(&bridge, "setPackageName", vec![json!(package)]).await;
    let permissions = json!(r#"[{"type":"sign_event","kind":1}]"#);
    call(&bridge, "getPublicKey", vec![Value::Null, permissions]).await;

    let unsigned =
        EventBuilder::text_note("hello from the nip55 bridge demo").build(keys.public_key());
    let event_id = unsigned.id.map(|id| id.to_hex()).unwrap_or_default();
    call(
        &bridge,
        "signEvent",
        vec![Value::Null, json!(unsigned.as_json()), json!(event_id), json!(npub)],
    )
    .await;

    let peer = keys.public_key().to_hex();
    for (encrypt, decrypt) in [("nip44Encrypt", "nip44Decrypt"), ("nip04Encrypt", "nip04Decrypt")] {
        let encrypted = call(
            &bridge,
            encrypt,
            vec![
                Value::Null,
                json!("a secret note to self"),
                json!("m1"),
                json!(peer),
                json!(npub),
            ],
        )
        .await;
        if let Some(cipher) = encrypted.as_ref().and_then(|v| v["result"].as_str()) {
            call(
                &bridge,
                decrypt,
                vec![Value::Null, json!(cipher), json!("m2"), json!(peer), json!(npub)],
            )
            .await;
        }
    }

    // A fan zaps us privately; only our key can open the request.
    let relay = RelayUrl::parse("wss://relay.damus.io")?;
    let zap_request = nip57::private_zap_request(
        ZapRequestData::new(keys.public_key(), [relay]).message("great note"),
        &Keys::generate(),
    )?;
    call(
        &bridge,
        "decryptZapEvent",
        vec![Value::Null, json!(zap_request.as_json()), json!("z1"), json!(npub)],
    )
    .await;

    call(&bridge, "getRelays", vec![Value::Null, json!("r1"), json!(npub)]).await;

    drop(bridge);
    app.abort();
    tracing::info!("=== Demo finished ===");
    Ok(())
}

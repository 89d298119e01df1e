//! Routes activity results back to the delegation that is waiting for them.

use std::collections::HashMap;
use std::sync::Arc;

use super::correlation::{CorrelationTable, PendingCall};
use crate::error::{BridgeError, Result};
use crate::types::{
    ActivityOutcome, ActivityStatus, ContentResponse, OperationKind, OperationResult,
    PublicKeyResponse, SignedEventResponse,
};

/// What happened to an incoming activity outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The pending call was completed with a decoded result.
    Completed,
    /// The user cancelled in the signer app.
    Cancelled,
    /// Control came back without any data.
    NoData,
    /// Data came back but a required field was missing.
    Malformed,
    /// The token was pending but does not map to any operation.
    UnknownOperation,
    /// No live call matched; the outcome was dropped.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct ResultRouter {
    table: Arc<CorrelationTable>,
}

impl ResultRouter {
    pub fn new(table: Arc<CorrelationTable>) -> Self {
        Self { table }
    }

    /// Consumes one activity outcome. Every matched pending call is completed
    /// exactly once and removed from the table. An outcome for an abandoned call
    /// only frees its token.
    pub fn route(&self, outcome: ActivityOutcome) -> RouteOutcome {
        let Some(call) = self.table.take(outcome.token) else {
            tracing::debug!(
                target: "nip55_bridge::router",
                "No pending call for token {}, discarding outcome",
                outcome.token
            );
            return RouteOutcome::Discarded;
        };

        if call.is_abandoned() {
            tracing::debug!(
                target: "nip55_bridge::router",
                "Late outcome for abandoned delegation {}, discarding",
                call.token
            );
            return RouteOutcome::Discarded;
        }

        if outcome.status == ActivityStatus::Cancelled {
            tracing::info!(
                target: "nip55_bridge::router",
                "User cancelled delegation {}",
                call.token
            );
            call.complete(Err(BridgeError::UserCancelled));
            return RouteOutcome::Cancelled;
        }

        let Some(data) = outcome.data else {
            tracing::warn!(
                target: "nip55_bridge::router",
                "Delegation {} returned without data",
                call.token
            );
            call.complete(Err(BridgeError::NoData));
            return RouteOutcome::NoData;
        };

        let Some(kind) = call.token.kind() else {
            tracing::error!(
                target: "nip55_bridge::router",
                "Unknown request code: {}",
                call.token
            );
            let code = call.token.code();
            call.complete(Err(BridgeError::UnknownOperation(code)));
            return RouteOutcome::UnknownOperation;
        };

        match decode(kind, &data, &call) {
            Ok(result) => {
                tracing::debug!(
                    target: "nip55_bridge::router",
                    "Delegation {} ({}) completed",
                    call.token,
                    kind
                );
                call.complete(Ok(result));
                RouteOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(target: "nip55_bridge::router", "{}", e);
                call.complete(Err(e));
                RouteOutcome::Malformed
            }
        }
    }
}

/// Decodes returned intent extras into the result shape for `kind`.
///
/// Encryption results arrive under `signature`, decryption results under
/// `result`; that asymmetry belongs to the signer protocol. A missing `id` or
/// `package` falls back to what was sent at launch.
fn decode(
    kind: OperationKind,
    data: &HashMap<String, String>,
    call: &PendingCall,
) -> Result<OperationResult> {
    let require = |field: &'static str| {
        data.get(field)
            .cloned()
            .ok_or(BridgeError::MalformedResult { kind, field })
    };
    let id = || {
        data.get("id")
            .cloned()
            .or_else(|| call.request_id.clone())
            .ok_or(BridgeError::MalformedResult { kind, field: "id" })
    };

    let result = match kind {
        OperationKind::GetPublicKey => OperationResult::PublicKey(PublicKeyResponse {
            npub: require("signature")?,
            package: data
                .get("package")
                .cloned()
                .unwrap_or_else(|| call.package_name.clone()),
        }),
        OperationKind::SignEvent => OperationResult::SignedEvent(SignedEventResponse {
            signature: require("signature")?,
            id: id()?,
            event: require("event")?,
        }),
        OperationKind::Nip04Encrypt | OperationKind::Nip44Encrypt => {
            OperationResult::Content(ContentResponse {
                result: require("signature")?,
                id: id()?,
            })
        }
        OperationKind::Nip04Decrypt
        | OperationKind::Nip44Decrypt
        | OperationKind::DecryptZapEvent
        | OperationKind::GetRelays => OperationResult::Content(ContentResponse {
            result: require("result")?,
            id: id()?,
        }),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::test_utils::extras;
    use crate::types::CorrelationToken;

    fn setup() -> (ResultRouter, Arc<CorrelationTable>) {
        let table = Arc::new(CorrelationTable::new());
        (ResultRouter::new(Arc::clone(&table)), table)
    }

    fn register(
        table: &CorrelationTable,
        kind: OperationKind,
        request_id: Option<&str>,
    ) -> crate::bridge::correlation::CompletionReceiver {
        let (_serial, rx) = table
            .register(
                kind.correlation_token(),
                "com.example.signer".to_string(),
                request_id.map(str::to_string),
            )
            .unwrap();
        rx
    }

    #[tokio::test]
    async fn test_get_public_key_decoding() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::GetPublicKey, None);

        let outcome = ActivityOutcome::ok(
            OperationKind::GetPublicKey.correlation_token(),
            extras(&[("signature", "abc"), ("package", "com.example")]),
        );
        assert_eq!(router.route(outcome), RouteOutcome::Completed);

        let result = rx.await.unwrap().unwrap();
        assert_eq!(
            result,
            OperationResult::PublicKey(PublicKeyResponse {
                npub: "abc".to_string(),
                package: "com.example".to_string(),
            })
        );
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_get_public_key_falls_back_to_launched_package() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::GetPublicKey, None);

        router.route(ActivityOutcome::ok(
            OperationKind::GetPublicKey.correlation_token(),
            extras(&[("signature", "npub1xyz")]),
        ));

        let response = rx.await.unwrap().unwrap().into_public_key().unwrap();
        assert_eq!(response.package, "com.example.signer");
    }

    #[tokio::test]
    async fn test_sign_event_decoding() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::SignEvent, Some("evt1"));

        router.route(ActivityOutcome::ok(
            OperationKind::SignEvent.correlation_token(),
            extras(&[("signature", "sig1"), ("id", "evt1"), ("event", "{...}")]),
        ));

        assert_eq!(
            rx.await.unwrap().unwrap(),
            OperationResult::SignedEvent(SignedEventResponse {
                signature: "sig1".to_string(),
                id: "evt1".to_string(),
                event: "{...}".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_encrypt_reads_signature_field() {
        for kind in [OperationKind::Nip04Encrypt, OperationKind::Nip44Encrypt] {
            let (router, table) = setup();
            let rx = register(&table, kind, Some("m1"));

            router.route(ActivityOutcome::ok(
                kind.correlation_token(),
                extras(&[("signature", "cipher"), ("result", "ignored"), ("id", "m1")]),
            ));

            assert_eq!(
                rx.await.unwrap().unwrap(),
                OperationResult::Content(ContentResponse {
                    result: "cipher".to_string(),
                    id: "m1".to_string(),
                })
            );
        }
    }

    #[tokio::test]
    async fn test_result_field_kinds() {
        for kind in [
            OperationKind::Nip04Decrypt,
            OperationKind::Nip44Decrypt,
            OperationKind::DecryptZapEvent,
            OperationKind::GetRelays,
        ] {
            let (router, table) = setup();
            let rx = register(&table, kind, Some("r1"));

            router.route(ActivityOutcome::ok(
                kind.correlation_token(),
                extras(&[("result", "plain"), ("signature", "ignored"), ("id", "r1")]),
            ));

            let response = rx.await.unwrap().unwrap().into_content().unwrap();
            assert_eq!(response.result, "plain", "{kind}");
            assert_eq!(response.id, "r1");
        }
    }

    #[tokio::test]
    async fn test_missing_id_uses_request_id() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::Nip04Decrypt, Some("dm-3"));

        router.route(ActivityOutcome::ok(
            OperationKind::Nip04Decrypt.correlation_token(),
            extras(&[("result", "hello")]),
        ));

        let response = rx.await.unwrap().unwrap().into_content().unwrap();
        assert_eq!(response.id, "dm-3");
    }

    #[tokio::test]
    async fn test_missing_primary_field_is_malformed() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::SignEvent, Some("evt1"));

        let route = router.route(ActivityOutcome::ok(
            OperationKind::SignEvent.correlation_token(),
            extras(&[("signature", "sig1")]),
        ));

        assert_eq!(route, RouteOutcome::Malformed);
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::MalformedResult {
                kind: OperationKind::SignEvent,
                field: "event"
            }
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_does_not_read_data() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::Nip44Encrypt, Some("m1"));

        let outcome = ActivityOutcome {
            token: OperationKind::Nip44Encrypt.correlation_token(),
            status: ActivityStatus::Cancelled,
            data: Some(extras(&[("signature", "cipher")])),
        };
        assert_eq!(router.route(outcome), RouteOutcome::Cancelled);

        assert!(matches!(
            rx.await.unwrap().unwrap_err(),
            BridgeError::UserCancelled
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_no_data() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::GetRelays, Some("r1"));

        let route = router.route(ActivityOutcome::empty(
            OperationKind::GetRelays.correlation_token(),
        ));

        assert_eq!(route, RouteOutcome::NoData);
        assert!(matches!(rx.await.unwrap().unwrap_err(), BridgeError::NoData));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unmapped_token_fails_pending_call() {
        let (router, table) = setup();
        let token = CorrelationToken(4242);
        let (_serial, rx) = table.register(token, "pkg".to_string(), None).unwrap();

        let route = router.route(ActivityOutcome::ok(token, extras(&[("result", "x")])));

        assert_eq!(route, RouteOutcome::UnknownOperation);
        assert!(matches!(
            rx.await.unwrap().unwrap_err(),
            BridgeError::UnknownOperation(4242)
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_unmatched_token_is_discarded() {
        let (router, table) = setup();
        let _rx = register(&table, OperationKind::GetPublicKey, None);

        let route = router.route(ActivityOutcome::ok(
            OperationKind::SignEvent.correlation_token(),
            extras(&[("signature", "sig")]),
        ));

        assert_eq!(route, RouteOutcome::Discarded);
        assert_eq!(table.len(), 1);
        assert!(table.contains(OperationKind::GetPublicKey.correlation_token()));
    }

    #[test]
    fn test_duplicate_delivery_is_discarded() {
        let (router, table) = setup();
        let _rx = register(&table, OperationKind::GetRelays, Some("r1"));
        let outcome = ActivityOutcome::ok(
            OperationKind::GetRelays.correlation_token(),
            extras(&[("result", "{}")]),
        );

        assert_eq!(router.route(outcome.clone()), RouteOutcome::Completed);
        assert_eq!(router.route(outcome), RouteOutcome::Discarded);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_outcome_for_abandoned_call_is_discarded_and_frees_token() {
        let (router, table) = setup();
        let rx = register(&table, OperationKind::GetPublicKey, None);
        assert_eq!(table.abandon_all(), 1);
        assert!(matches!(
            rx.await.unwrap(),
            Err(BridgeError::DelegationAbandoned)
        ));

        let late = ActivityOutcome::ok(
            OperationKind::GetPublicKey.correlation_token(),
            extras(&[("signature", "npub_late"), ("package", "com.example.signer")]),
        );
        assert_eq!(router.route(late), RouteOutcome::Discarded);
        assert!(table.is_empty());

        let rx = register(&table, OperationKind::GetPublicKey, None);
        let fresh = ActivityOutcome::ok(
            OperationKind::GetPublicKey.correlation_token(),
            extras(&[("signature", "npub_fresh"), ("package", "com.other.signer")]),
        );
        assert_eq!(router.route(fresh), RouteOutcome::Completed);
        assert_eq!(
            rx.await.unwrap().unwrap(),
            OperationResult::PublicKey(PublicKeyResponse {
                npub: "npub_fresh".to_string(),
                package: "com.other.signer".to_string(),
            })
        );
    }

    #[test]
    fn test_cancel_for_abandoned_call_is_discarded() {
        let (router, table) = setup();
        let _rx = register(&table, OperationKind::Nip44Decrypt, Some("m1"));
        table.abandon_all();

        let route = router.route(ActivityOutcome::cancelled(
            OperationKind::Nip44Decrypt.correlation_token(),
        ));
        assert_eq!(route, RouteOutcome::Discarded);
        assert!(table.is_empty());
    }
}

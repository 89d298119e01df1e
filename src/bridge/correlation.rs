//! Correlation table for in-flight delegations.
//!
//! Holds at most one pending call for the whole bridge. Check-and-insert happens
//! under a single lock so two launches can never both observe an empty table.
//!
//! A call whose caller has gone away stays behind as an abandoned entry until the
//! signer UI reports back. Tokens are fixed per kind, so removing it earlier would
//! let that late result complete the next delegation of the same kind.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{BridgeError, Result};
use crate::types::{CorrelationToken, OperationResult};

pub(crate) type Completion = oneshot::Sender<Result<OperationResult>>;
pub(crate) type CompletionReceiver = oneshot::Receiver<Result<OperationResult>>;

/// A delegation waiting for its activity result.
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub token: CorrelationToken,
    /// Distinguishes successive calls that reuse the same token.
    pub serial: u64,
    pub package_name: String,
    pub request_id: Option<String>,
    /// `None` once the caller has been released; the entry only reserves the token.
    completion: Option<Completion>,
}

impl PendingCall {
    /// True when nobody awaits this call any more.
    pub fn is_abandoned(&self) -> bool {
        self.completion.is_none()
    }

    /// Completes the caller's future. Consumes the call so it can only happen once.
    pub fn complete(self, result: Result<OperationResult>) {
        let delivered = match self.completion {
            Some(completion) => completion.send(result).is_ok(),
            None => false,
        };
        if !delivered {
            tracing::debug!(
                target: "nip55_bridge::correlation",
                "Caller for token {} is gone, result dropped",
                self.token
            );
        }
    }
}

#[derive(Debug, Default)]
struct TableState {
    calls: HashMap<CorrelationToken, PendingCall>,
    next_serial: u64,
}

#[derive(Debug, Default)]
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        // No invariant spans a panic point while the lock is held.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a pending call, failing if any delegation is already in flight.
    ///
    /// Abandoned entries count as in flight: their signer UI may still answer.
    pub(crate) fn register(
        &self,
        token: CorrelationToken,
        package_name: String,
        request_id: Option<String>,
    ) -> Result<(u64, CompletionReceiver)> {
        let mut state = self.state();
        if !state.calls.is_empty() {
            return Err(BridgeError::DelegationInProgress);
        }

        let serial = state.next_serial;
        state.next_serial = state.next_serial.wrapping_add(1);

        let (completion, receiver) = oneshot::channel();
        state.calls.insert(
            token,
            PendingCall {
                token,
                serial,
                package_name,
                request_id,
                completion: Some(completion),
            },
        );
        Ok((serial, receiver))
    }

    /// Removes and returns the entry registered under `token`, abandoned or not.
    pub(crate) fn take(&self, token: CorrelationToken) -> Option<PendingCall> {
        self.state().calls.remove(&token)
    }

    /// Removes the call under `token` only if it is still the same call instance.
    ///
    /// Only for calls whose signer UI never opened.
    pub(crate) fn discard(&self, token: CorrelationToken, serial: u64) -> Option<PendingCall> {
        let mut state = self.state();
        match state.calls.get(&token) {
            Some(call) if call.serial == serial => state.calls.remove(&token),
            _ => None,
        }
    }

    /// Releases the caller of the call under `token` but keeps the token reserved.
    ///
    /// Returns false if the entry is gone, belongs to a newer call, or was
    /// already abandoned.
    pub(crate) fn abandon(&self, token: CorrelationToken, serial: u64) -> bool {
        let mut state = self.state();
        match state.calls.get_mut(&token) {
            Some(call) if call.serial == serial => call.completion.take().is_some(),
            _ => false,
        }
    }

    /// Abandons every live call and fails its caller with [`BridgeError::DelegationAbandoned`].
    ///
    /// Returns how many callers were released.
    pub(crate) fn abandon_all(&self) -> usize {
        let released: Vec<(CorrelationToken, Completion)> = self
            .state()
            .calls
            .values_mut()
            .filter_map(|call| call.completion.take().map(|c| (call.token, c)))
            .collect();

        let count = released.len();
        for (token, completion) in released {
            if completion.send(Err(BridgeError::DelegationAbandoned)).is_err() {
                tracing::debug!(
                    target: "nip55_bridge::correlation",
                    "Caller for token {} was already gone",
                    token
                );
            }
        }
        count
    }

    /// Drops abandoned entries whose results will never be delivered.
    ///
    /// Live calls are left alone. Returns how many entries were removed.
    pub(crate) fn clear_abandoned(&self) -> usize {
        let mut state = self.state();
        let before = state.calls.len();
        state.calls.retain(|_, call| !call.is_abandoned());
        before - state.calls.len()
    }

    /// Number of occupied slots, abandoned entries included.
    pub fn len(&self) -> usize {
        self.state().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().calls.is_empty()
    }

    pub fn contains(&self, token: CorrelationToken) -> bool {
        self.state().calls.contains_key(&token)
    }

    /// True if the slot is held only by an abandoned entry.
    pub fn is_abandoned(&self) -> bool {
        let state = self.state();
        !state.calls.is_empty() && state.calls.values().all(PendingCall::is_abandoned)
    }

    pub fn pending_token(&self) -> Option<CorrelationToken> {
        self.state().calls.keys().next().copied()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentResponse, OperationKind};

    fn token(kind: OperationKind) -> CorrelationToken {
        kind.correlation_token()
    }

    #[test]
    fn test_register_then_take() {
        let table = CorrelationTable::new();
        let (serial, _rx) = table
            .register(
                token(OperationKind::SignEvent),
                "com.example.signer".to_string(),
                Some("evt1".to_string()),
            )
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.pending_token(), Some(token(OperationKind::SignEvent)));

        let call = table.take(token(OperationKind::SignEvent)).unwrap();
        assert_eq!(call.serial, serial);
        assert_eq!(call.package_name, "com.example.signer");
        assert_eq!(call.request_id.as_deref(), Some("evt1"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_second_register_fails_for_any_kind() {
        let table = CorrelationTable::new();
        let (_serial, _rx) = table
            .register(token(OperationKind::GetPublicKey), "pkg".to_string(), None)
            .unwrap();

        for kind in OperationKind::ALL {
            let err = table
                .register(token(kind), "pkg".to_string(), None)
                .unwrap_err();
            assert!(matches!(err, BridgeError::DelegationInProgress));
        }

        // The existing entry is untouched.
        assert_eq!(table.len(), 1);
        assert!(table.contains(token(OperationKind::GetPublicKey)));
    }

    #[test]
    fn test_register_succeeds_after_take() {
        let table = CorrelationTable::new();
        let (first, _rx) = table
            .register(token(OperationKind::Nip04Encrypt), "pkg".to_string(), None)
            .unwrap();
        table.take(token(OperationKind::Nip04Encrypt)).unwrap();

        let (second, _rx) = table
            .register(token(OperationKind::Nip04Encrypt), "pkg".to_string(), None)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_discard_ignores_stale_serial() {
        let table = CorrelationTable::new();
        let (stale, _rx) = table
            .register(token(OperationKind::GetRelays), "pkg".to_string(), None)
            .unwrap();
        table.take(token(OperationKind::GetRelays));
        let (current, _rx) = table
            .register(token(OperationKind::GetRelays), "pkg".to_string(), None)
            .unwrap();

        assert!(table.discard(token(OperationKind::GetRelays), stale).is_none());
        assert_eq!(table.len(), 1);

        assert!(table.discard(token(OperationKind::GetRelays), current).is_some());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_complete_delivers_to_receiver() {
        let table = CorrelationTable::new();
        let (_serial, rx) = table
            .register(token(OperationKind::GetRelays), "pkg".to_string(), None)
            .unwrap();

        let expected = OperationResult::Content(ContentResponse {
            result: "{}".to_string(),
            id: "r1".to_string(),
        });
        table
            .take(token(OperationKind::GetRelays))
            .unwrap()
            .complete(Ok(expected.clone()));

        assert_eq!(rx.await.unwrap().unwrap(), expected);
    }

    #[test]
    fn test_complete_without_receiver_does_not_panic() {
        let table = CorrelationTable::new();
        let (_serial, rx) = table
            .register(token(OperationKind::GetRelays), "pkg".to_string(), None)
            .unwrap();
        drop(rx);

        table
            .take(token(OperationKind::GetRelays))
            .unwrap()
            .complete(Err(BridgeError::NoData));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_abandon_all_fails_caller_and_keeps_token_reserved() {
        let table = CorrelationTable::new();
        let (_serial, rx) = table
            .register(token(OperationKind::SignEvent), "pkg".to_string(), None)
            .unwrap();

        assert_eq!(table.abandon_all(), 1);
        assert!(matches!(
            rx.await.unwrap(),
            Err(BridgeError::DelegationAbandoned)
        ));

        assert!(table.contains(token(OperationKind::SignEvent)));
        assert!(table.is_abandoned());
        assert_eq!(table.abandon_all(), 0);

        let err = table
            .register(token(OperationKind::SignEvent), "pkg".to_string(), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::DelegationInProgress));
    }

    #[test]
    fn test_abandon_only_matches_same_serial() {
        let table = CorrelationTable::new();
        let (serial, _rx) = table
            .register(token(OperationKind::GetPublicKey), "pkg".to_string(), None)
            .unwrap();

        assert!(!table.abandon(token(OperationKind::GetPublicKey), serial + 1));
        assert!(!table.is_abandoned());

        assert!(table.abandon(token(OperationKind::GetPublicKey), serial));
        assert!(table.is_abandoned());
        assert!(!table.abandon(token(OperationKind::GetPublicKey), serial));

        let call = table.take(token(OperationKind::GetPublicKey)).unwrap();
        assert!(call.is_abandoned());
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_abandoned_leaves_live_calls() {
        let table = CorrelationTable::new();
        let (serial, _rx) = table
            .register(token(OperationKind::GetRelays), "pkg".to_string(), None)
            .unwrap();
        assert_eq!(table.clear_abandoned(), 0);
        assert_eq!(table.len(), 1);

        table.abandon(token(OperationKind::GetRelays), serial);
        assert_eq!(table.clear_abandoned(), 1);
        assert!(table.is_empty());
        assert!(
            table
                .register(token(OperationKind::GetRelays), "pkg".to_string(), None)
                .is_ok()
        );
    }

    #[test]
    fn test_concurrent_register_admits_exactly_one() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 50;

        let table = CorrelationTable::new();
        let barrier = std::sync::Barrier::new(THREADS);

        for _ in 0..ROUNDS {
            let admitted: Vec<bool> = std::thread::scope(|scope| {
                let handles: Vec<_> = OperationKind::ALL
                    .iter()
                    .cycle()
                    .take(THREADS)
                    .map(|&kind| {
                        let table = &table;
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            match table.register(token(kind), "pkg".to_string(), None) {
                                Ok(_) => true,
                                Err(BridgeError::DelegationInProgress) => false,
                                Err(e) => panic!("unexpected error: {e}"),
                            }
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(admitted.iter().filter(|ok| **ok).count(), 1);
            assert_eq!(table.len(), 1);

            let winner = table.pending_token().unwrap();
            table.take(winner).unwrap();
            assert!(table.is_empty());
        }
    }
}

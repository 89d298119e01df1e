//! Fallback path: hand the request to the signer app's UI and wait for the result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::collaborators::ActivityLauncher;
use super::correlation::{CompletionReceiver, CorrelationTable};
use crate::error::{BridgeError, Result};
use crate::types::{CorrelationToken, DelegationRequest, OperationResult, SignerRequest};

#[derive(Debug, Clone)]
pub struct FallbackDelegator {
    table: Arc<CorrelationTable>,
    launcher: Arc<dyn ActivityLauncher>,
}

impl FallbackDelegator {
    pub fn new(table: Arc<CorrelationTable>, launcher: Arc<dyn ActivityLauncher>) -> Self {
        Self { table, launcher }
    }

    /// Registers a pending call and asks the host to open the signer app.
    ///
    /// Fails with [`BridgeError::DelegationInProgress`] if any delegation is pending.
    /// If the host cannot start the activity, the pending call is removed before
    /// the launch error is returned.
    pub fn launch(&self, package_name: &str, request: SignerRequest) -> Result<PendingDelegation> {
        let kind = request.kind();
        let token = kind.correlation_token();

        let (serial, receiver) = self.table.register(
            token,
            package_name.to_string(),
            request.request_id().map(str::to_string),
        )?;

        // Built before launching so a synchronous outcome still finds its receiver.
        let pending = PendingDelegation {
            token,
            serial,
            receiver,
            table: Arc::clone(&self.table),
            settled: false,
        };

        let delegation = DelegationRequest {
            token,
            package_name: package_name.to_string(),
            request,
        };

        tracing::debug!(
            target: "nip55_bridge::delegation",
            "Launching {} delegation to {} with token {}",
            kind,
            package_name,
            token
        );

        if let Err(e) = self.launcher.launch(&delegation) {
            tracing::warn!(
                target: "nip55_bridge::delegation",
                "Failed to launch {} delegation to {}: {}",
                kind,
                package_name,
                e
            );
            self.table.discard(token, serial);
            return Err(BridgeError::Launch(e));
        }

        Ok(pending)
    }
}

/// Completion handle for one delegation, fulfilled by the result router.
///
/// Dropping it before it resolves abandons the pending call. The token stays
/// reserved until the signer UI reports back, and that outcome is discarded.
#[derive(Debug)]
#[must_use = "a delegation only delivers its result when awaited"]
pub struct PendingDelegation {
    token: CorrelationToken,
    serial: u64,
    receiver: CompletionReceiver,
    table: Arc<CorrelationTable>,
    settled: bool,
}

impl PendingDelegation {
    pub fn token(&self) -> CorrelationToken {
        self.token
    }
}

impl Future for PendingDelegation {
    type Output = Result<OperationResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.settled = true;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.settled = true;
                Poll::Ready(Err(BridgeError::DelegationAbandoned))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingDelegation {
    fn drop(&mut self) {
        if !self.settled && self.table.abandon(self.token, self.serial) {
            tracing::debug!(
                target: "nip55_bridge::delegation",
                "Delegation {} dropped before completion, awaiting its late outcome",
                self.token
            );
        }
    }
}

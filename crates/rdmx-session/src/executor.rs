//! RDM transaction execution.
//!
//! Every transaction runs on its own spawned task holding exclusive use of
//! the channel, so a caller dropping its future mid-exchange cannot leave
//! the line half-way through a request/response pair.

use std::sync::Arc;

use tracing::debug;

use rdmx_core::error::{Error, Result};
use rdmx_core::types::{CommandKind, RdmRequest, TransactionResult, Uid};

use crate::arbiter::ChannelArbiter;

/// Runs single RDM transactions under the channel arbiter.
#[derive(Clone)]
pub struct TransactionExecutor {
    arbiter: Arc<ChannelArbiter>,
}

impl TransactionExecutor {
    pub fn new(arbiter: Arc<ChannelArbiter>) -> Self {
        TransactionExecutor { arbiter }
    }

    /// Perform one GET or SET.
    ///
    /// NACK, timeout and checksum failures are reported in the returned
    /// [`TransactionResult`]. `Err` means the payload was rejected before
    /// sending, or the adapter itself failed.
    pub async fn execute(
        &self,
        kind: CommandKind,
        target: Uid,
        pid: u16,
        payload: &[u8],
    ) -> Result<TransactionResult> {
        let request = RdmRequest::new(kind, target, pid, payload)?;
        let arbiter = Arc::clone(&self.arbiter);

        let result = tokio::spawn(async move {
            arbiter
                .run_exclusive(move |t| Box::pin(async move { t.transact(&request).await }))
                .await
        })
        .await
        .map_err(|e| Error::Transport(format!("transaction task failed: {e}")))??;

        debug!(
            %kind,
            %target,
            pid = format_args!("0x{pid:04X}"),
            status = %result.status,
            latency_us = result.latency_us(),
            "RDM transaction complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rdmx_core::types::{MAX_PDL, ResponseStatus};
    use rdmx_test_harness::{MockHandle, MockTransport};

    const UID: Uid = Uid::BROADCAST;

    fn executor() -> (TransactionExecutor, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.set_open(true);
        let arbiter = Arc::new(ChannelArbiter::new(Box::new(mock)));
        (TransactionExecutor::new(arbiter), handle)
    }

    #[tokio::test]
    async fn returns_ack_result() {
        let (exec, handle) = executor();
        handle.respond(
            CommandKind::Get,
            0x00F0,
            TransactionResult::ack(&[0x00, 0x01], Duration::from_micros(640)),
        );

        let result = exec.execute(CommandKind::Get, UID, 0x00F0, &[]).await.unwrap();
        assert_eq!(result.status, ResponseStatus::Ack);
        assert_eq!(result.payload, vec![0x00, 0x01]);
        assert_eq!(result.latency_us(), 640);
    }

    #[tokio::test]
    async fn nack_is_a_value() {
        let (exec, handle) = executor();
        handle.respond(
            CommandKind::Set,
            0x00F0,
            TransactionResult::nack(0x0006, Duration::ZERO),
        );

        let result = exec
            .execute(CommandKind::Set, UID, 0x00F0, &[0x02, 0x01])
            .await
            .unwrap();
        assert_eq!(result.status, ResponseStatus::Nack);
        assert_eq!(result.nack_reason().unwrap().to_string(), "NR_DATA_OUT_OF_RANGE");

        let sent = handle.requests();
        assert_eq!(sent[0].payload, vec![0x02, 0x01]);
    }

    #[tokio::test]
    async fn oversized_payload_rejected_without_sending() {
        let (exec, handle) = executor();
        let payload = vec![0u8; MAX_PDL + 1];
        let result = exec.execute(CommandKind::Set, UID, 0x0082, &payload).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(handle.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_err() {
        let (exec, handle) = executor();
        handle.set_open(false);
        let result = exec.execute(CommandKind::Get, UID, 0x0060, &[]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}

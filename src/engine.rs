//! `Engine`: orchestrates decomposition, stream tasks, the transfer task,
//! and the correlator into one call.

use crate::buffer::MessageBuffer;
use crate::config::EngineConfig;
use crate::correlator::Correlator;
use crate::decomposer::decompose_preferred;
use crate::error::EngineError;
use crate::raw_block::RawBlock;
use crate::request::{RequestSpec, TransportPreference};
use crate::stream_task::{StreamOutcome, StreamTask};
use crate::transfer_task::TransferTask;
use crate::transport::{StreamMode, TransportError, TransportFactory};
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop accepting new work and cancel running stream tasks, but let
    /// in-flight buffered messages finish draining through the correlator.
    Soft,
    /// Stop accepting new work and cut in-flight calls short immediately,
    /// without draining buffered messages.
    Hard,
}

/// Maps a stream task's terminal [`TransportError`] to the `EngineError`
/// variant matching its stable kind (spec §7): a remote rejection stays
/// `Rejected` rather than collapsing into a generic `Transport` error, and
/// a cooperative cancel stays `Cancelled`.
fn stream_failure_to_engine_error(sub_request: usize, source: TransportError) -> EngineError {
    match source {
        TransportError::Rejected(message) => EngineError::Rejected { sub_request, message },
        TransportError::Cancelled => EngineError::Cancelled,
        transport @ TransportError::Transport(_) => EngineError::Transport { sub_request, source: transport },
    }
}

fn transport_preference_to_mode(preference: TransportPreference) -> StreamMode {
    match preference {
        TransportPreference::Forward => StreamMode::Forward,
        TransportPreference::Backward => StreamMode::Backward,
        TransportPreference::Bidirectional => StreamMode::Bidirectional,
    }
}

/// Decrements an `Arc<AtomicUsize>` on drop, regardless of how the scope
/// that incremented it exits (success, error, or panic).
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn TransportFactory>,
    shutdown: watch::Sender<bool>,
    hard_shutdown: Arc<std::sync::atomic::AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(transport: Arc<dyn TransportFactory>, config: EngineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            transport,
            shutdown,
            hard_shutdown: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Decomposes `spec` per the engine's configuration, then runs the
    /// resulting sub-requests as one streaming correlation.
    pub async fn query_correlated(&self, spec: RequestSpec) -> Result<Vec<Arc<RawBlock>>, EngineError> {
        let sub_requests = decompose_preferred(&spec, self.config.decomposer_config());
        info!(sub_requests = sub_requests.len(), "decomposed request");
        self.query_correlated_streaming(sub_requests).await
    }

    /// Runs an already-decomposed set of sub-requests as one streaming
    /// correlation (spec §4.9's nine-step process).
    pub async fn query_correlated_streaming(
        &self,
        sub_requests: Vec<RequestSpec>,
    ) -> Result<Vec<Arc<RawBlock>>, EngineError> {
        if *self.shutdown.borrow() {
            return Err(EngineError::Cancelled);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        let correlator = Arc::new(Correlator::new(
            self.config.pivot_size,
            self.config.concurrency_workers,
            self.config.worker_timeout,
        ));
        if !self.config.concurrency_enabled {
            correlator.disable_concurrency().await;
        }

        let buffer = Arc::new(MessageBuffer::new(self.config.buffer_capacity));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Bounds how many stream tasks run at once to `min(maxStreams,
        // subrequests.len())` (spec §4.9 step 6) -- load-bearing here
        // because `query_correlated_streaming` is also a public entry
        // point callers can hand an already-decomposed list larger than
        // `max_streams` to, bypassing the decomposer's own bound.
        let pool_size = self.config.max_streams.min(sub_requests.len()).max(1);
        let pool = Arc::new(tokio::sync::Semaphore::new(pool_size));

        let mut stream_tasks = Vec::with_capacity(sub_requests.len());
        for (index, sub_request) in sub_requests.iter().enumerate() {
            let permit = match Arc::clone(&pool).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = cancel_tx.send(true);
                    return Err(EngineError::Internal("stream pool semaphore closed".to_owned()));
                }
            };
            let mode = transport_preference_to_mode(sub_request.preferred_transport());
            let stream = match self.transport.open(sub_request, mode) {
                Ok(stream) => stream,
                Err(source) => {
                    drop(permit);
                    let _ = cancel_tx.send(true);
                    return Err(stream_failure_to_engine_error(index, source));
                }
            };
            stream_tasks.push(StreamTask::spawn_with_permit(
                index,
                stream,
                Arc::clone(&buffer),
                cancel_rx.clone(),
                permit,
            ));
        }

        let transfer_task = if self.config.correlate_while_streaming {
            Some(TransferTask::spawn(Arc::clone(&buffer), Arc::clone(&correlator), self.config.poll_timeout))
        } else {
            None
        };

        let first_failure = self.drive_stream_tasks(stream_tasks, &cancel_tx).await;

        if let Some(failure) = first_failure {
            error!(error = %failure, "streaming correlation failed, cancelling");
            if let Some(transfer_task) = transfer_task {
                transfer_task.terminate();
                let _ = transfer_task.result().await;
            }
            return Err(failure);
        }

        buffer.close_supply();
        let transfer_task = match transfer_task {
            Some(task) => task,
            None => TransferTask::spawn(Arc::clone(&buffer), Arc::clone(&correlator), self.config.poll_timeout),
        };
        if self.hard_shutdown.load(Ordering::SeqCst) {
            transfer_task.terminate();
        }
        transfer_task.result().await?;

        let set = correlator.correlated_set().await;
        info!(blocks = set.len(), bytes = correlator.bytes_processed(), "streaming correlation complete");
        Ok(set)
    }

    /// Awaits every stream task under the configured overall deadline,
    /// cancelling the rest and returning the first failure cause as soon
    /// as one is seen.
    async fn drive_stream_tasks(
        &self,
        stream_tasks: Vec<StreamTask>,
        cancel_tx: &watch::Sender<bool>,
    ) -> Option<EngineError> {
        let mut pending: FuturesUnordered<_> = stream_tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| async move { (index, task.result().await) })
            .collect();

        let mut first_failure: Option<EngineError> = None;
        let deadline = tokio::time::sleep(self.config.overall_deadline);
        tokio::pin!(deadline);
        let mut shutdown_rx = self.shutdown.subscribe();

        while !pending.is_empty() {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    warn!("overall deadline elapsed, cancelling remaining stream tasks");
                    let _ = cancel_tx.send(true);
                    first_failure.get_or_insert(EngineError::Timeout("overall deadline elapsed".to_owned()));
                    break;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_ok() && *shutdown_rx.borrow() {
                        let _ = cancel_tx.send(true);
                        first_failure.get_or_insert(EngineError::Cancelled);
                        break;
                    }
                }
                next = pending.next() => {
                    match next {
                        Some((_, Ok(StreamOutcome::Success))) => {}
                        Some((index, Ok(StreamOutcome::Failure(source)))) => {
                            let _ = cancel_tx.send(true);
                            first_failure.get_or_insert(stream_failure_to_engine_error(index, source));
                        }
                        Some((_, Err(e))) => {
                            let _ = cancel_tx.send(true);
                            first_failure.get_or_insert(e);
                        }
                        None => break,
                    }
                }
            }
        }

        // Drain whatever is left without blocking indefinitely: cancel is
        // already signalled by the time we reach here on any failure path.
        while let Some((index, outcome)) = pending.next().await {
            if first_failure.is_none() {
                if let Ok(StreamOutcome::Failure(source)) = outcome {
                    first_failure = Some(stream_failure_to_engine_error(index, source));
                }
            }
        }

        first_failure
    }

    pub fn shutdown(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Hard {
            self.hard_shutdown.store(true, Ordering::SeqCst);
        }
        let _ = self.shutdown.send(true);
    }

    /// Polls until no calls are in flight or `timeout` elapses. Returns
    /// `true` if the engine reached quiescence within the deadline.
    pub async fn await_termination(&self, timeout: std::time::Duration) -> bool {
        let check = async {
            loop {
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, check).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{Timestamp, UniformClock};
    use crate::transport::test_support::ScriptedTransport;
    use wire_protocol::{DataBucket, ResponseMessage, SamplingClock, WireDataColumn, WireSamplingKey, WireValue};

    fn request_spec(sources: &[&str]) -> RequestSpec {
        RequestSpec::new(
            sources.iter().map(|s| (*s).to_owned()),
            Timestamp::new(0, 0),
            Timestamp::new(10, 0),
            TransportPreference::Forward,
        )
        .unwrap()
    }

    fn message_with_one_bucket(source: &str) -> ResponseMessage {
        ResponseMessage {
            buckets: vec![DataBucket {
                key: WireSamplingKey::Clock(SamplingClock {
                    epoch_s: 1,
                    epoch_ns: 0,
                    period_ns: 1_000_000_000,
                    count: 1,
                }),
                column: WireDataColumn {
                    name: source.to_owned(),
                    values: vec![WireValue::Sint32(1)],
                },
            }],
        }
    }

    #[tokio::test]
    async fn small_in_order_stream_yields_one_correlated_block() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(vec![Ok(message_with_one_bucket("A")), Ok(message_with_one_bucket("B"))]);
        let engine = Engine::new(transport, EngineConfig::default());
        let result = engine.query_correlated(request_spec(&["A", "B"])).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].column_count(), 2);
    }

    #[tokio::test]
    async fn stream_failure_propagates_as_transport_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(vec![Err(TransportError::Transport("connection reset".to_owned()))]);
        let engine = Engine::new(transport, EngineConfig::default());
        let err = engine.query_correlated_streaming(vec![request_spec(&["A"])]).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }

    #[tokio::test]
    async fn await_termination_reports_quiescence_once_calls_finish() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(vec![Ok(message_with_one_bucket("A"))]);
        let engine = Engine::new(transport, EngineConfig::default());
        engine.query_correlated_streaming(vec![request_spec(&["A"])]).await.unwrap();
        assert!(engine.await_termination(std::time::Duration::from_millis(500)).await);
    }
}

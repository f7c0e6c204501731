//! A failing sub-request stream aborts the whole call with the first
//! failure cause, and does not hang waiting on the others.

mod common;

use common::ScriptedTransport;
use std::sync::Arc;
use std::time::Duration;
use tsq_core::{Engine, EngineConfig, ErrorKind, RequestSpec, Timestamp, TransportError, TransportPreference};
use wire_protocol::{DataBucket, ResponseMessage, SamplingClock, WireDataColumn, WireSamplingKey, WireValue};

fn clock_bucket(epoch_s: i64, count: u64, source: &str) -> DataBucket {
    DataBucket {
        key: WireSamplingKey::Clock(SamplingClock {
            epoch_s,
            epoch_ns: 0,
            period_ns: 1_000_000_000,
            count,
        }),
        column: WireDataColumn {
            name: source.to_owned(),
            values: (0..count).map(|i| WireValue::Sint32(i as i32)).collect(),
        },
    }
}

#[tokio::test]
async fn mid_stream_transport_error_fails_the_whole_request() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(vec![
        Ok(ResponseMessage {
            buckets: vec![clock_bucket(1, 1, "runner-a")],
        }),
        Err(TransportError::Transport("connection reset by peer".to_owned())),
    ]);

    let engine = Engine::new(transport, EngineConfig::default());
    let spec = RequestSpec::new(
        vec!["runner-a".to_owned()],
        Timestamp::new(0, 0),
        Timestamp::new(10, 0),
        TransportPreference::Forward,
    )
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), engine.query_correlated(spec)).await;
    let err = result.expect("call should not hang").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn remote_rejection_surfaces_with_its_own_rejected_kind() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(vec![Err(TransportError::Rejected("unknown source runner-z".to_owned()))]);

    let engine = Engine::new(transport, EngineConfig::default());
    let spec = RequestSpec::new(
        vec!["runner-z".to_owned()],
        Timestamp::new(0, 0),
        Timestamp::new(10, 0),
        TransportPreference::Forward,
    )
    .unwrap();

    let err = engine.query_correlated(spec).await.unwrap_err();
    // A remote rejection is non-retryable at this layer and keeps its own
    // stable kind rather than collapsing into a generic transport error.
    assert_eq!(err.kind(), ErrorKind::Rejected);
    let message = err.to_string();
    assert!(message.contains("runner-z"));
}

#[tokio::test]
async fn one_failing_sub_request_does_not_block_on_a_second_exhausted_one() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(vec![Err(TransportError::Transport("first stream down".to_owned()))]);
    transport.push(vec![Ok(ResponseMessage {
        buckets: vec![clock_bucket(1, 1, "runner-b")],
    })]);

    let config = EngineConfig::default().with_max_streams(2).with_min_domain_threshold(1);
    let engine = Engine::new(transport, config);
    let spec = RequestSpec::new(
        vec!["runner-a".to_owned(), "runner-b".to_owned()],
        Timestamp::new(0, 0),
        Timestamp::new(10, 0),
        TransportPreference::Forward,
    )
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), engine.query_correlated(spec)).await;
    assert!(result.expect("call should not hang").is_err());
}

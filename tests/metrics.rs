#![cfg(feature = "metrics")]
//! Tests for `filterframe` metrics helpers.
//!
//! Counters and gauges are observed through
//! `metrics_util::debugging::DebuggingRecorder`.

use filterframe::{
    ApiKey,
    Direction,
    FilterChain,
    FilterErrorKind,
    filter::{ApiSelector, Capabilities},
    metrics,
};
use filterframe_testing::{Harness, dropping, request, response};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key()
                        .labels()
                        .any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Request, "request")]
#[case(Direction::Response, "response")]
fn forwarded_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_forwarded(direction));

    assert_eq!(
        counter_value(&snapshotter, metrics::FRAMES_FORWARDED, Some(("direction", label))),
        1
    );
}

#[rstest]
#[case(FilterErrorKind::Failed, 1)]
#[case(FilterErrorKind::Timeout, 3)]
fn failure_metric_counts_by_kind(#[case] kind: FilterErrorKind, #[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| metrics::inc_failures(kind));
    });

    assert_eq!(
        counter_value(&snapshotter, metrics::FILTER_FAILURES, Some(("kind", kind.as_str()))),
        expected
    );
}

#[test]
fn dispatcher_gauge_follows_connection_lifetime() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let gauge = || {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(k, _, _, _)| k.key().name() == metrics::DISPATCHERS_ACTIVE)
            .and_then(|(_, _, _, v)| match v {
                DebugValue::Gauge(g) => Some(g.into_inner()),
                _ => None,
            })
    };
    ::metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let first = Harness::with_chain(FilterChain::empty());
            let second = Harness::with_chain(FilterChain::empty());
            assert_eq!(gauge(), Some(2.0));
            first.shutdown().await;
            second.shutdown().await;
        });
    });

    assert_eq!(gauge(), Some(0.0));
}

#[test]
fn connection_records_forwarded_and_dropped_frames() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let chain = FilterChain::builder()
                .filter("drop", dropping(ApiKey::DELETE_TOPICS, false))
                .and_then(|b| {
                    b.filter(
                        "pass",
                        filterframe_testing::passthrough(Capabilities::both(ApiSelector::All)),
                    )
                })
                .expect("chain should build")
                .build();
            let harness = Harness::with_chain(chain);
            harness.request(request(ApiKey::METADATA, 1, b"md")).await;
            harness.request(request(ApiKey::DELETE_TOPICS, 2, b"topic")).await;
            harness.respond(response(1, b"brokers")).await;
            harness.shutdown().await;
        });
    });

    assert_eq!(
        counter_value(&snapshotter, metrics::FRAMES_FORWARDED, Some(("direction", "request"))),
        1
    );
    assert_eq!(
        counter_value(&snapshotter, metrics::FRAMES_FORWARDED, Some(("direction", "response"))),
        1
    );
    assert_eq!(
        counter_value(&snapshotter, metrics::FRAMES_DROPPED, Some(("direction", "request"))),
        1
    );
    assert_eq!(counter_value(&snapshotter, metrics::FILTER_FAILURES, None), 0);
}

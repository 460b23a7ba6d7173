//! Tests for connection close, drain and buffer release.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use filterframe::{
    ApiKey,
    Body,
    DispatcherConfig,
    FilterChain,
    FilterDispatcher,
    FilterErrorKind,
    Frame,
    Header,
    active_dispatcher_count,
    filter::{ApiSelector, Capabilities, PromiseState},
    transport::ChannelTransport,
};
use filterframe_testing::{Deferrals, Harness, dropping, request, response};
use rstest::{fixture, rstest};
use serial_test::serial;

/// Buffer owner counting its own release.
struct Tracked {
    released: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for Tracked {
    fn as_ref(&self) -> &[u8] { b"tracked-records" }
}

impl Drop for Tracked {
    fn drop(&mut self) { self.released.fetch_add(1, Ordering::SeqCst); }
}

fn tracked_request(api_key: ApiKey, correlation_id: i32, released: &Arc<AtomicUsize>) -> Frame {
    let payload = Bytes::from_owner(Tracked {
        released: Arc::clone(released),
    });
    Frame::request(Header::request(api_key, 0, correlation_id), Body::new(payload))
}

#[fixture]
fn released() -> Arc<AtomicUsize> { Arc::new(AtomicUsize::new(0)) }

#[rstest]
#[tokio::test]
#[serial]
async fn dropped_frames_release_buffers_every_cycle(released: Arc<AtomicUsize>) {
    let chain = FilterChain::builder()
        .filter("drop", dropping(ApiKey::DELETE_TOPICS, false))
        .expect("chain should build")
        .build();
    let mut harness = Harness::with_chain(chain);

    for id in 1..=10 {
        harness
            .request(tracked_request(ApiKey::DELETE_TOPICS, id, &released))
            .await;
        assert_eq!(released.load(Ordering::SeqCst), usize::try_from(id).expect("positive id"));
    }
    assert!(harness.backend_frames().is_empty());
    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
#[serial]
async fn close_releases_queued_frames_without_invoking_filters(released: Arc<AtomicUsize>) {
    let deferrals = Deferrals::new();
    let chain = FilterChain::builder()
        .filter("deferring", deferrals.filter(Capabilities::requests(ApiSelector::All)))
        .expect("chain should build")
        .build();
    let harness = Harness::with_chain(chain);

    for id in 1..=3 {
        harness
            .request(tracked_request(ApiKey::PRODUCE, id, &released))
            .await;
    }
    assert_eq!(deferrals.len(), 1);
    harness.shutdown().await;

    assert_eq!(released.load(Ordering::SeqCst), 2, "queued frames released on close");
    assert_eq!(deferrals.len(), 1, "no filter sees queued frames");
    let in_filter = deferrals.take().expect("first request deferred");
    assert_eq!(in_filter.promise.state(), PromiseState::Failed(FilterErrorKind::Closed));
    drop(in_filter);
    assert_eq!(released.load(Ordering::SeqCst), 3);
}

#[rstest]
#[tokio::test]
#[serial]
async fn late_resolution_after_close_is_ignored() {
    let deferrals = Deferrals::new();
    let chain = FilterChain::builder()
        .filter("deferring", deferrals.filter(Capabilities::both(ApiSelector::All)))
        .expect("chain should build")
        .build();
    let mut harness = Harness::with_chain(chain);

    harness.request(request(ApiKey::FETCH, 1, b"fetch")).await;
    let pending = deferrals.take().expect("request deferred");
    harness.handle.close();
    harness.settle().await;

    assert!(!pending.forward());
    assert!(harness.backend_frames().is_empty());
    assert!(harness.is_closed());
    harness.join().await;
}

#[rstest]
#[tokio::test]
#[serial]
async fn shutdown_token_closes_dispatcher() {
    let before = active_dispatcher_count();
    let (backend, _to_backend) = ChannelTransport::pair();
    let (client, _to_client) = ChannelTransport::pair();
    let (dispatcher, handle) =
        FilterDispatcher::new(FilterChain::empty(), DispatcherConfig::default(), backend, client);
    let dispatcher = dispatcher.with_connection_id(7);
    assert_eq!(active_dispatcher_count(), before + 1);

    let token = dispatcher.shutdown_token();
    let worker = tokio::spawn(dispatcher.run());
    token.cancel();
    handle.closed().await;
    worker.await.expect("worker panicked");

    assert!(handle.is_closed());
    assert_eq!(active_dispatcher_count(), before);
}

#[rstest]
#[tokio::test]
#[serial]
async fn closed_client_transport_closes_connection() {
    let (backend, mut to_backend) = ChannelTransport::pair();
    let (client, to_client) = ChannelTransport::pair();
    let (dispatcher, handle) =
        FilterDispatcher::new(FilterChain::empty(), DispatcherConfig::default(), backend, client);
    let worker = tokio::spawn(dispatcher.run());

    handle
        .client_request(request(ApiKey::METADATA, 1, b"md"))
        .expect("connection open");
    assert!(to_backend.recv().await.is_some());
    drop(to_client);
    handle
        .backend_response(response(1, b"brokers"))
        .expect("connection open");

    handle.closed().await;
    worker.await.expect("worker panicked");
    assert!(to_backend.recv().await.is_none(), "backend transport closed too");
}

#[rstest]
#[tokio::test]
#[serial]
async fn dropping_every_handle_closes_connection() {
    let (backend, _to_backend) = ChannelTransport::pair();
    let (client, _to_client) = ChannelTransport::pair();
    let (dispatcher, handle) =
        FilterDispatcher::new(FilterChain::empty(), DispatcherConfig::default(), backend, client);
    let token = dispatcher.shutdown_token();
    let worker = tokio::spawn(dispatcher.run());

    let clone = handle.clone();
    drop(handle);
    clone.flush().await.expect("a remaining handle keeps the connection open");
    assert!(!token.is_cancelled());

    drop(clone);
    token.cancelled().await;
    worker.await.expect("worker panicked");
}

//! Tests for frames that no filter, or only passthrough filters, claim.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use filterframe::{
    ApiKey,
    Direction,
    FilterChain,
    Frame,
    Header,
    filter::{self, ApiSelector, Capabilities},
};
use filterframe_testing::{Harness, payloads, request, response, tagging, tags};
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn empty_chain_forwards_request_unchanged() {
    let mut harness = Harness::with_chain(FilterChain::empty());
    let frame = request(ApiKey::API_VERSIONS, 1, b"\x00\x03api-versions");

    harness.request(frame.clone()).await;

    assert_eq!(harness.backend_frames(), vec![frame]);
    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn response_is_matched_to_its_request() {
    let mut harness = Harness::with_chain(FilterChain::empty());
    harness.request(request(ApiKey::METADATA, 7, b"md")).await;
    harness.respond(response(7, b"brokers")).await;

    let delivered = harness.client_frames();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].direction, Direction::Response);
    assert_eq!(delivered[0].header.api_key, ApiKey::METADATA);
    assert_eq!(payloads(&delivered), vec![Bytes::from_static(b"brokers")]);
    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn unmatched_response_is_discarded() {
    let mut harness = Harness::with_chain(FilterChain::empty());
    harness.respond(response(42, b"stray")).await;

    assert!(harness.client_frames().is_empty());
    assert!(!harness.is_closed());
    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn unclaimed_messages_skip_the_filter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let fetch_only = filter::from_fn(
        Capabilities::requests(ApiSelector::key(ApiKey::FETCH)),
        move |invocation, ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            let (header, body) = invocation.into_parts();
            ctx.forward(header, body).completed()
        },
    );
    let chain = FilterChain::builder()
        .filter("fetch-only", fetch_only)
        .expect("chain should build")
        .build();
    let mut harness = Harness::with_chain(chain);

    harness.request(request(ApiKey::METADATA, 1, b"md")).await;
    harness.request(request(ApiKey::FETCH, 2, b"fetch")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.backend_frames().len(), 2);
    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn opaque_frames_bypass_filters_in_order() {
    let chain = FilterChain::builder()
        .filter("tag", tagging(Capabilities::both(ApiSelector::All), "t"))
        .expect("chain should build")
        .build();
    let mut harness = Harness::with_chain(chain);
    let opaque = Frame::opaque(
        Direction::Request,
        Header::request(ApiKey::LIST_GROUPS, 4, 1),
        &b"raw"[..],
    );

    harness.request(opaque.clone()).await;
    harness.request(request(ApiKey::LIST_GROUPS, 2, b"decoded")).await;

    let forwarded = harness.backend_frames();
    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded[0], opaque);
    let body = forwarded[1].body().expect("decoded body");
    assert_eq!(tags(body), vec!["t"]);
    harness.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn requests_and_responses_visit_filters_symmetrically() {
    let chain = FilterChain::builder()
        .filter("outer", tagging(Capabilities::both(ApiSelector::All), "outer"))
        .and_then(|b| b.filter("inner", tagging(Capabilities::both(ApiSelector::All), "inner")))
        .expect("chain should build")
        .build();
    let mut harness = Harness::with_chain(chain);

    harness.request(request(ApiKey::FETCH, 3, b"fetch")).await;
    harness.respond(response(3, b"records")).await;

    let forwarded = harness.backend_frames();
    let request_tags = tags(forwarded[0].body().expect("decoded body"));
    assert_eq!(request_tags, vec!["outer", "inner"]);

    let delivered = harness.client_frames();
    let response_tags = tags(delivered[0].body().expect("decoded body"));
    assert_eq!(response_tags, vec!["inner", "outer"]);
    harness.shutdown().await;
}

//! Handles for out-of-band requests issued by filters.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::{error::FilterError, frame::Body};

tokio::task_local! {
    /// Set while the connection worker polls a filter's future.
    static ON_WORKER: ();
}

/// Poll `future` as part of a filter invocation on the connection worker.
///
/// Only futures run this way may await a [`SendHandle`].
pub(crate) fn on_worker<F: Future>(future: F) -> impl Future<Output = F::Output> {
    ON_WORKER.scope((), future)
}

/// Result delivered to a filter for an out-of-band request.
///
/// `Ok(None)` means the request kind has no response.
pub type SendOutcome = Result<Option<Body>, FilterError>;

enum SendState {
    Ready(Option<SendOutcome>),
    Waiting(oneshot::Receiver<SendOutcome>),
}

/// Future resolving with the backend's response to an out-of-band request.
///
/// The response has already passed through the response filters that sit
/// between the backend and the issuing filter. The client never sees it.
///
/// The handle belongs to the invocation that issued it: await it inside a
/// [`FilterCompletion::from_future`](super::FilterCompletion::from_future)
/// future. Awaiting it on any other task yields a
/// [`FilterErrorKind::Unsupported`](crate::FilterErrorKind::Unsupported)
/// error. [`SendHandle::try_take`] works anywhere.
#[must_use = "dropping the handle discards the response"]
pub struct SendHandle(SendState);

impl SendHandle {
    pub(crate) fn ready(outcome: SendOutcome) -> Self { Self(SendState::Ready(Some(outcome))) }

    pub(crate) fn waiting(rx: oneshot::Receiver<SendOutcome>) -> Self { Self(SendState::Waiting(rx)) }

    /// Take the outcome if it is already available.
    ///
    /// Returns `None` while the response is outstanding or after the outcome
    /// has been taken.
    pub fn try_take(&mut self) -> Option<SendOutcome> {
        match &mut self.0 {
            SendState::Ready(outcome) => outcome.take(),
            SendState::Waiting(rx) => match rx.try_recv() {
                Ok(outcome) => {
                    self.0 = SendState::Ready(None);
                    Some(outcome)
                }
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.0 = SendState::Ready(None);
                    Some(Err(FilterError::closed()))
                }
            },
        }
    }
}

impl Future for SendHandle {
    type Output = SendOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if ON_WORKER.try_with(|()| ()).is_err() {
            return Poll::Ready(Err(FilterError::unsupported(
                "send handle awaited outside the connection worker",
            )));
        }
        match &mut self.0 {
            SendState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or_else(|| Err(FilterError::closed())))
            }
            SendState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|res| res.unwrap_or_else(|_| Err(FilterError::closed()))),
        }
    }
}

impl std::fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.0 {
            SendState::Ready(Some(_)) => "ready",
            SendState::Ready(None) => "taken",
            SendState::Waiting(_) => "waiting",
        };
        f.debug_tuple("SendHandle").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::{SendHandle, on_worker};
    use crate::{error::FilterErrorKind, frame::Body};

    #[test]
    fn ready_handle_yields_once() {
        let mut handle = SendHandle::ready(Ok(None));
        assert!(matches!(handle.try_take(), Some(Ok(None))));
        assert!(handle.try_take().is_none());
    }

    #[tokio::test]
    async fn waiting_handle_resolves_with_response() {
        let (tx, rx) = oneshot::channel();
        let mut handle = SendHandle::waiting(rx);
        assert!(handle.try_take().is_none());
        tx.send(Ok(Some(Body::new(&b"resp"[..]))))
            .expect("receiver dropped");
        let body = on_worker(handle)
            .await
            .expect("send failed")
            .expect("missing body");
        assert_eq!(body.payload().as_ref(), b"resp");
    }

    #[tokio::test]
    async fn dropped_sender_reports_closed() {
        let (tx, rx) = oneshot::channel::<super::SendOutcome>();
        drop(tx);
        let err = on_worker(SendHandle::waiting(rx))
            .await
            .expect_err("expected failure");
        assert_eq!(err.kind(), FilterErrorKind::Closed);
    }

    #[tokio::test]
    async fn awaiting_off_worker_is_unsupported() {
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(None)).expect("receiver dropped");
        let err = SendHandle::waiting(rx)
            .await
            .expect_err("awaiting outside the worker must fail");
        assert_eq!(err.kind(), FilterErrorKind::Unsupported);

        let spawned = tokio::spawn(on_worker(async {
            tokio::spawn(SendHandle::ready(Ok(None))).await
        }));
        let inner = spawned
            .await
            .expect("outer task panicked")
            .expect("inner task panicked");
        assert!(matches!(inner, Err(err) if err.kind() == FilterErrorKind::Unsupported));
    }
}

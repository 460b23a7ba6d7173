//! Release of client-bound responses in request order.
//!
//! A response synthesized by a request filter can be ready long before the
//! backend answers an earlier request. The orderer holds such responses back
//! until every request that arrived before theirs has been answered, dropped
//! or abandoned.

use std::collections::{HashMap, VecDeque};

use crate::frame::Frame;

#[derive(Debug, Default)]
pub(crate) struct ResponseOrderer {
    expected: VecDeque<i32>,
    ready: HashMap<i32, Frame>,
}

impl ResponseOrderer {
    /// Reserve a slot for the response to `correlation_id`.
    ///
    /// Returns `false` if the id already holds a slot.
    pub(crate) fn expect(&mut self, correlation_id: i32) -> bool {
        if self.contains(correlation_id) {
            return false;
        }
        self.expected.push_back(correlation_id);
        true
    }

    pub(crate) fn contains(&self, correlation_id: i32) -> bool {
        self.expected.contains(&correlation_id)
    }

    /// Give up the slot for `correlation_id`, returning any responses it was
    /// holding back.
    pub(crate) fn cancel(&mut self, correlation_id: i32) -> Vec<Frame> {
        if let Some(pos) = self.expected.iter().position(|id| *id == correlation_id) {
            self.expected.remove(pos);
            self.ready.remove(&correlation_id);
        }
        self.release()
    }

    /// Record a response for its slot.
    ///
    /// Returns the responses now releasable in order. The frame is handed
    /// back if no slot is reserved for its correlation id.
    pub(crate) fn complete(&mut self, frame: Frame) -> Result<Vec<Frame>, Frame> {
        let correlation_id = frame.correlation_id();
        if !self.contains(correlation_id) || self.ready.contains_key(&correlation_id) {
            return Err(frame);
        }
        self.ready.insert(correlation_id, frame);
        Ok(self.release())
    }

    /// Give up every slot, returning the held responses in slot order.
    ///
    /// Used when the connection is about to close on a filter's request:
    /// responses already produced are delivered even though earlier ones
    /// will never arrive.
    pub(crate) fn flush(&mut self) -> Vec<Frame> {
        let out = self
            .expected
            .drain(..)
            .filter_map(|id| self.ready.remove(&id))
            .collect();
        self.ready.clear();
        out
    }

    /// Forget every slot, dropping held responses.
    pub(crate) fn clear(&mut self) {
        self.expected.clear();
        self.ready.clear();
    }

    pub(crate) fn pending(&self) -> usize { self.expected.len() }

    fn release(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(head) = self.expected.front() {
            let Some(frame) = self.ready.remove(head) else {
                break;
            };
            self.expected.pop_front();
            out.push(frame);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::ResponseOrderer;
    use crate::frame::{Body, Frame, Header};

    fn response(id: i32) -> Frame { Frame::response(Header::response(id), Body::default()) }

    fn ids(frames: &[Frame]) -> Vec<i32> { frames.iter().map(Frame::correlation_id).collect() }

    #[fixture]
    fn orderer() -> ResponseOrderer {
        let mut orderer = ResponseOrderer::default();
        for id in 1..=3 {
            assert!(orderer.expect(id));
        }
        orderer
    }

    #[rstest]
    fn later_responses_wait_for_earlier(mut orderer: ResponseOrderer) {
        assert_eq!(orderer.complete(response(3)).map(|f| ids(&f)), Ok(vec![]));
        assert_eq!(orderer.complete(response(2)).map(|f| ids(&f)), Ok(vec![]));
        assert_eq!(
            orderer.complete(response(1)).map(|f| ids(&f)),
            Ok(vec![1, 2, 3])
        );
        assert_eq!(orderer.pending(), 0);
    }

    #[rstest]
    fn cancelled_slot_releases_successors(mut orderer: ResponseOrderer) {
        assert_eq!(orderer.complete(response(2)).map(|f| ids(&f)), Ok(vec![]));
        assert_eq!(ids(&orderer.cancel(1)), vec![2]);
        assert_eq!(orderer.pending(), 1);
    }

    #[rstest]
    fn flush_releases_held_responses_out_of_turn(mut orderer: ResponseOrderer) {
        assert_eq!(orderer.complete(response(3)).map(|f| ids(&f)), Ok(vec![]));
        assert_eq!(orderer.complete(response(2)).map(|f| ids(&f)), Ok(vec![]));
        assert_eq!(ids(&orderer.flush()), vec![2, 3]);
        assert_eq!(orderer.pending(), 0);
    }

    #[rstest]
    fn unknown_and_duplicate_responses_are_refused(mut orderer: ResponseOrderer) {
        assert!(orderer.complete(response(9)).is_err());
        assert!(!orderer.expect(2));
        assert!(orderer.complete(response(2)).is_ok());
        assert!(orderer.complete(response(2)).is_err());
    }
}

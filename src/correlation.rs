//! Per-connection registry of requests awaiting a backend response.
//!
//! Every request forwarded to the backend that expects an answer registers its
//! correlation id here, tagged with who receives the response: the client or
//! the filter that issued an out-of-band request. Client correlation ids are
//! forwarded untouched; out-of-band requests draw ids from the negative space,
//! counting down from `-1` and skipping ids still in flight.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::{
    deadline::DeadlineKey,
    filter::SendOutcome,
    frame::{ApiKey, FilterId},
};

/// Receiver of a backend response.
pub(crate) enum Recipient {
    /// Deliver to the client.
    Client,
    /// Resolve the issuing filter's out-of-band handle.
    Filter {
        issuer: FilterId,
        reply: oneshot::Sender<SendOutcome>,
        deadline: DeadlineKey,
    },
}

impl std::fmt::Debug for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => f.write_str("Client"),
            Self::Filter { issuer, .. } => f.debug_tuple("Filter").field(issuer).finish(),
        }
    }
}

/// Request awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingResponse {
    pub(crate) api_key: ApiKey,
    pub(crate) api_version: i16,
    pub(crate) recipient: Recipient,
}

#[derive(Debug)]
pub(crate) struct CorrelationRegistry {
    entries: HashMap<i32, PendingResponse>,
    next_internal: i32,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_internal: -1,
        }
    }
}

impl CorrelationRegistry {
    /// Allocate an id for an out-of-band request.
    pub(crate) fn allocate_internal(&mut self) -> i32 {
        loop {
            let id = self.next_internal;
            self.next_internal = if id == i32::MIN { -1 } else { id - 1 };
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Register `pending` under `correlation_id`.
    ///
    /// Returns the entry back if the id is already in flight.
    pub(crate) fn register(
        &mut self,
        correlation_id: i32,
        pending: PendingResponse,
    ) -> Result<(), PendingResponse> {
        if self.entries.contains_key(&correlation_id) {
            return Err(pending);
        }
        self.entries.insert(correlation_id, pending);
        Ok(())
    }

    /// Returns `true` if `correlation_id` is awaiting a response.
    pub(crate) fn contains(&self, correlation_id: i32) -> bool {
        self.entries.contains_key(&correlation_id)
    }

    /// Returns `true` if the response to `correlation_id` belongs to a filter.
    pub(crate) fn is_for_filter(&self, correlation_id: i32) -> bool {
        self.entries
            .get(&correlation_id)
            .is_some_and(|pending| matches!(pending.recipient, Recipient::Filter { .. }))
    }

    /// Remove and return the entry for `correlation_id`.
    pub(crate) fn take(&mut self, correlation_id: i32) -> Option<PendingResponse> {
        self.entries.remove(&correlation_id)
    }

    /// Remove every entry.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (i32, PendingResponse)> + '_ {
        self.entries.drain()
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::{CorrelationRegistry, PendingResponse, Recipient};
    use crate::frame::ApiKey;

    fn client_entry() -> PendingResponse {
        PendingResponse {
            api_key: ApiKey::METADATA,
            api_version: 12,
            recipient: Recipient::Client,
        }
    }

    #[fixture]
    fn registry() -> CorrelationRegistry { CorrelationRegistry::default() }

    #[rstest]
    fn internal_ids_count_down_from_minus_one(mut registry: CorrelationRegistry) {
        assert_eq!(registry.allocate_internal(), -1);
        assert_eq!(registry.allocate_internal(), -2);
    }

    #[rstest]
    fn internal_ids_skip_ids_in_flight(mut registry: CorrelationRegistry) {
        registry
            .register(-1, client_entry())
            .expect("first registration");
        assert_eq!(registry.allocate_internal(), -2);
    }

    #[rstest]
    fn internal_ids_wrap_after_minimum(mut registry: CorrelationRegistry) {
        registry.next_internal = i32::MIN;
        assert_eq!(registry.allocate_internal(), i32::MIN);
        assert_eq!(registry.allocate_internal(), -1);
    }

    #[rstest]
    fn duplicate_registration_is_refused(mut registry: CorrelationRegistry) {
        registry.register(5, client_entry()).expect("first registration");
        assert!(registry.register(5, client_entry()).is_err());
        assert_eq!(registry.len(), 1);
        assert!(registry.take(5).is_some());
        assert!(!registry.contains(5));
    }

    #[rstest]
    fn client_entries_are_not_for_filters(mut registry: CorrelationRegistry) {
        registry.register(7, client_entry()).expect("first registration");
        assert!(!registry.is_for_filter(7));
        assert!(!registry.is_for_filter(-1));
    }
}

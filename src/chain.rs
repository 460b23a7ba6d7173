//! Filter chain construction.
//!
//! A [`FilterChain`] is built once per connection, either directly through
//! [`ChainBuilder`] or from configuration via a [`FilterRegistry`], and is
//! shared read-only afterwards. Each filter's [`Capabilities`] are captured at
//! build time so claim checks never call into the filter.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ChainError,
    filter::{Capabilities, Filter},
    frame::{Direction, FilterId, Header},
};

pub(crate) struct ChainEntry {
    pub(crate) id: FilterId,
    pub(crate) filter: Arc<dyn Filter>,
    capabilities: Capabilities,
}

/// Immutable, ordered sequence of filters.
///
/// Requests visit filters in list order and responses in reverse order, so a
/// filter near the client end sees requests first and responses last.
#[derive(Clone)]
pub struct FilterChain {
    entries: Arc<[ChainEntry]>,
}

impl FilterChain {
    /// A chain with no filters; every frame passes straight through.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
        }
    }

    /// Start building a chain.
    #[must_use]
    pub fn builder() -> ChainBuilder { ChainBuilder::default() }

    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if the chain has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Names of the filters in configured order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.id.name())
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&ChainEntry> { self.entries.get(index) }

    /// Advance `cursor` to the next filter claiming `header`, if any.
    pub(crate) fn next_claimant(&self, cursor: &mut Cursor, header: &Header) -> Option<usize> {
        let direction = cursor.direction;
        let claims = |index: &usize| {
            self.entries[*index]
                .capabilities
                .claims(direction, header.api_key, header.api_version)
        };
        match direction {
            Direction::Request => {
                let found = (cursor.lo..cursor.hi).find(claims);
                cursor.lo = found.map_or(cursor.hi, |index| index + 1);
                found
            }
            Direction::Response => {
                let found = (cursor.lo..cursor.hi).rev().find(claims);
                cursor.hi = found.unwrap_or(cursor.lo);
                found
            }
        }
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Remaining chain positions a frame still has to visit.
///
/// The window `lo..hi` shrinks from the front for requests and from the back
/// for responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cursor {
    direction: Direction,
    lo: usize,
    hi: usize,
}

impl Cursor {
    /// Visit the whole chain.
    pub(crate) fn full(direction: Direction, chain: &FilterChain) -> Self {
        Self {
            direction,
            lo: 0,
            hi: chain.len(),
        }
    }

    /// Visit only the filters between `issuer` and the backend.
    ///
    /// Requests a filter issues continue towards the backend from the next
    /// position; their responses stop just before the issuer.
    pub(crate) fn past(issuer: &FilterId, direction: Direction, chain: &FilterChain) -> Self {
        Self {
            direction,
            lo: (issuer.index() + 1).min(chain.len()),
            hi: chain.len(),
        }
    }

    /// Skip every remaining filter.
    pub(crate) fn exhaust(&mut self) { self.lo = self.hi; }
}

/// Builder assembling a [`FilterChain`] from filter instances.
#[derive(Default)]
pub struct ChainBuilder {
    entries: Vec<(String, Arc<dyn Filter>)>,
}

impl ChainBuilder {
    /// Append a filter under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::DuplicateName`] if `name` is already used in this
    /// chain.
    pub fn filter(self, name: impl Into<String>, filter: impl Filter) -> Result<Self, ChainError> {
        self.shared_filter(name, Arc::new(filter))
    }

    /// Append an already shared filter under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::DuplicateName`] if `name` is already used in this
    /// chain.
    pub fn shared_filter(
        mut self,
        name: impl Into<String>,
        filter: Arc<dyn Filter>,
    ) -> Result<Self, ChainError> {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return Err(ChainError::DuplicateName(name));
        }
        self.entries.push((name, filter));
        Ok(self)
    }

    /// Freeze the chain, capturing each filter's capabilities.
    #[must_use]
    pub fn build(self) -> FilterChain {
        let entries: Vec<ChainEntry> = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, (name, filter))| ChainEntry {
                id: FilterId::new(index, Arc::from(name)),
                capabilities: filter.capabilities(),
                filter,
            })
            .collect();
        FilterChain {
            entries: Arc::from(entries),
        }
    }
}

/// Configured filter: a unique name, a registered type and its settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Unique name within the chain.
    pub name: String,
    /// Registered factory type.
    #[serde(rename = "type")]
    pub filter_type: String,
    /// Factory-specific settings.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl FilterDefinition {
    /// Define a filter with no settings.
    #[must_use]
    pub fn new(name: impl Into<String>, filter_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter_type: filter_type.into(),
            config: BTreeMap::new(),
        }
    }

    /// Add a setting.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Creates filter instances from definitions.
pub trait FilterFactory: Send + Sync {
    /// Build a filter for `definition`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the configuration is
    /// unusable.
    fn create(&self, definition: &FilterDefinition) -> Result<Arc<dyn Filter>, String>;
}

impl<F> FilterFactory for F
where
    F: Fn(&FilterDefinition) -> Result<Arc<dyn Filter>, String> + Send + Sync,
{
    fn create(&self, definition: &FilterDefinition) -> Result<Arc<dyn Filter>, String> {
        self(definition)
    }
}

/// Factories keyed by filter type.
#[derive(Default)]
pub struct FilterRegistry {
    factories: HashMap<String, Arc<dyn FilterFactory>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `factory` for `filter_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::DuplicateFilterType`] if the type is already
    /// registered.
    pub fn register(
        mut self,
        filter_type: impl Into<String>,
        factory: impl FilterFactory + 'static,
    ) -> Result<Self, ChainError> {
        let filter_type = filter_type.into();
        if self.factories.contains_key(&filter_type) {
            return Err(ChainError::DuplicateFilterType(filter_type));
        }
        self.factories.insert(filter_type, Arc::new(factory));
        Ok(self)
    }

    /// Build a chain from definitions in configured order.
    ///
    /// Validation completes before any frame is processed.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] for duplicate names, unknown types or
    /// configurations rejected by a factory.
    pub fn build_chain(&self, definitions: &[FilterDefinition]) -> Result<FilterChain, ChainError> {
        let mut seen = HashSet::new();
        let mut builder = FilterChain::builder();
        for definition in definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(ChainError::DuplicateName(definition.name.clone()));
            }
            let factory = self.factories.get(&definition.filter_type).ok_or_else(|| {
                ChainError::UnknownFilterType {
                    name: definition.name.clone(),
                    filter_type: definition.filter_type.clone(),
                }
            })?;
            let filter = factory
                .create(definition)
                .map_err(|reason| ChainError::InvalidConfig {
                    name: definition.name.clone(),
                    reason,
                })?;
            builder = builder.shared_filter(definition.name.clone(), filter)?;
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::{Cursor, FilterChain, FilterDefinition, FilterRegistry};
    use crate::{
        error::ChainError,
        filter::{self, ApiSelector, Capabilities, Filter, FilterResult},
        frame::{ApiKey, Direction, Header},
    };

    fn passthrough(capabilities: Capabilities) -> impl Filter {
        filter::from_fn(capabilities, |invocation, _ctx| {
            let (header, body) = invocation.into_parts();
            FilterResult::forward(header, body).completed()
        })
    }

    #[fixture]
    fn chain() -> FilterChain {
        FilterChain::builder()
            .filter("a", passthrough(Capabilities::both(ApiSelector::All)))
            .and_then(|b| {
                b.filter(
                    "b",
                    passthrough(Capabilities::requests(ApiSelector::key(ApiKey::FETCH))),
                )
            })
            .and_then(|b| b.filter("c", passthrough(Capabilities::both(ApiSelector::All))))
            .expect("chain should build")
            .build()
    }

    fn visit(chain: &FilterChain, mut cursor: Cursor, header: &Header) -> Vec<usize> {
        std::iter::from_fn(|| chain.next_claimant(&mut cursor, header)).collect()
    }

    #[rstest]
    fn requests_visit_in_list_order(chain: FilterChain) {
        let header = Header::request(ApiKey::FETCH, 12, 1);
        let cursor = Cursor::full(Direction::Request, &chain);
        assert_eq!(visit(&chain, cursor, &header), vec![0, 1, 2]);
    }

    #[rstest]
    fn responses_visit_in_reverse_and_skip_unclaimed(chain: FilterChain) {
        let mut header = Header::response(1);
        header.api_key = ApiKey::FETCH;
        let cursor = Cursor::full(Direction::Response, &chain);
        assert_eq!(visit(&chain, cursor, &header), vec![2, 0]);
    }

    #[rstest]
    fn out_of_band_responses_stop_before_issuer(chain: FilterChain) {
        let header = Header::response(-1);
        let issuer = chain.entry(0).expect("entry").id.clone();
        let cursor = Cursor::past(&issuer, Direction::Response, &chain);
        assert_eq!(visit(&chain, cursor, &header), vec![2]);
    }

    #[rstest]
    fn out_of_band_requests_start_after_issuer(chain: FilterChain) {
        let header = Header::request(ApiKey::FETCH, 12, -1);
        let issuer = chain.entry(0).expect("entry").id.clone();
        let cursor = Cursor::past(&issuer, Direction::Request, &chain);
        assert_eq!(visit(&chain, cursor, &header), vec![1, 2]);
    }

    #[test]
    fn empty_chain_has_no_claimants() {
        let chain = FilterChain::empty();
        let header = Header::request(ApiKey::API_VERSIONS, 3, 1);
        assert!(chain.is_empty());
        assert!(visit(&chain, Cursor::full(Direction::Request, &chain), &header).is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = FilterChain::builder()
            .filter("dup", passthrough(Capabilities::default()))
            .and_then(|b| b.filter("dup", passthrough(Capabilities::default())));
        assert!(matches!(result, Err(ChainError::DuplicateName(name)) if name == "dup"));
    }

    fn registry() -> FilterRegistry {
        FilterRegistry::new()
            .register("passthrough", |_def: &FilterDefinition| {
                Ok::<_, String>(
                    Arc::new(passthrough(Capabilities::both(ApiSelector::All))) as Arc<dyn Filter>,
                )
            })
            .and_then(|r| {
                r.register("needs-key", |def: &FilterDefinition| {
                    def.config
                        .get("key")
                        .map(|_| {
                            Arc::new(passthrough(Capabilities::default())) as Arc<dyn Filter>
                        })
                        .ok_or_else(|| "missing `key`".to_owned())
                })
            })
            .expect("registry should build")
    }

    #[test]
    fn registry_builds_chain_in_order() {
        let chain = registry()
            .build_chain(&[
                FilterDefinition::new("first", "passthrough"),
                FilterDefinition::new("second", "needs-key").with_config("key", "v"),
            ])
            .expect("chain should build");
        assert_eq!(chain.names().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[rstest]
    #[case(FilterDefinition::new("x", "missing"), "unknown filter type")]
    #[case(FilterDefinition::new("x", "needs-key"), "missing `key`")]
    fn registry_fails_fast(#[case] definition: FilterDefinition, #[case] expected: &str) {
        let err = registry()
            .build_chain(&[definition])
            .expect_err("chain should fail");
        assert!(err.to_string().contains(expected), "unexpected error: {err}");
    }

    #[test]
    fn duplicate_factory_types_are_rejected() {
        let result = registry().register("passthrough", |_def: &FilterDefinition| {
            Err::<Arc<dyn Filter>, _>("unused".to_owned())
        });
        assert!(matches!(result, Err(ChainError::DuplicateFilterType(_))));
    }
}

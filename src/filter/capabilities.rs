//! Capability descriptors declaring which messages a filter wants to see.
//!
//! Capabilities are queried once while the chain is built. The dispatcher
//! consults the stored descriptor before every invocation, so a filter that
//! does not claim a message is skipped without any call into it.

use crate::frame::{ApiKey, Direction};

/// Inclusive range of api versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionRange {
    min: i16,
    max: i16,
}

impl VersionRange {
    /// Every version.
    pub const ALL: VersionRange = VersionRange {
        min: i16::MIN,
        max: i16::MAX,
    };

    /// Versions `min..=max`.
    #[must_use]
    pub fn new(min: i16, max: i16) -> Self { Self { min, max } }

    /// Returns `true` when `version` falls inside the range.
    #[must_use]
    pub fn contains(&self, version: i16) -> bool { (self.min..=self.max).contains(&version) }
}

/// Set of api keys and versions claimed in one direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ApiSelector {
    /// Nothing is claimed.
    #[default]
    Nothing,
    /// Every api key and version is claimed.
    All,
    /// Only the listed keys, each restricted to a version range.
    Keys(Vec<(ApiKey, VersionRange)>),
}

impl ApiSelector {
    /// Claim every version of `api_key`.
    #[must_use]
    pub fn key(api_key: ApiKey) -> Self { Self::Keys(vec![(api_key, VersionRange::ALL)]) }

    /// Add `api_key` restricted to `versions`.
    #[must_use]
    pub fn and(self, api_key: ApiKey, versions: VersionRange) -> Self {
        match self {
            Self::All => Self::All,
            Self::Nothing => Self::Keys(vec![(api_key, versions)]),
            Self::Keys(mut keys) => {
                keys.push((api_key, versions));
                Self::Keys(keys)
            }
        }
    }

    /// Returns `true` when the selector claims `api_key` at `version`.
    #[must_use]
    pub fn matches(&self, api_key: ApiKey, version: i16) -> bool {
        match self {
            Self::Nothing => false,
            Self::All => true,
            Self::Keys(keys) => keys
                .iter()
                .any(|(key, range)| *key == api_key && range.contains(version)),
        }
    }
}

/// Directions and messages a filter instance handles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    requests: ApiSelector,
    responses: ApiSelector,
}

impl Capabilities {
    /// Claim requests selected by `selector`.
    #[must_use]
    pub fn requests(selector: ApiSelector) -> Self {
        Self {
            requests: selector,
            responses: ApiSelector::Nothing,
        }
    }

    /// Claim responses selected by `selector`.
    #[must_use]
    pub fn responses(selector: ApiSelector) -> Self {
        Self {
            requests: ApiSelector::Nothing,
            responses: selector,
        }
    }

    /// Claim both directions using the same selector.
    #[must_use]
    pub fn both(selector: ApiSelector) -> Self {
        Self {
            requests: selector.clone(),
            responses: selector,
        }
    }

    /// Replace the response selector.
    #[must_use]
    pub fn with_responses(mut self, selector: ApiSelector) -> Self {
        self.responses = selector;
        self
    }

    /// Replace the request selector.
    #[must_use]
    pub fn with_requests(mut self, selector: ApiSelector) -> Self {
        self.requests = selector;
        self
    }

    /// Returns `true` if the filter wants to see this message.
    #[must_use]
    pub fn claims(&self, direction: Direction, api_key: ApiKey, version: i16) -> bool {
        match direction {
            Direction::Request => self.requests.matches(api_key, version),
            Direction::Response => self.responses.matches(api_key, version),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ApiSelector, Capabilities, VersionRange};
    use crate::frame::{ApiKey, Direction};

    #[rstest]
    #[case(Direction::Request, ApiKey::API_VERSIONS, 3, true)]
    #[case(Direction::Response, ApiKey::API_VERSIONS, 3, false)]
    #[case(Direction::Request, ApiKey::FETCH, 3, false)]
    fn request_only_capabilities(
        #[case] direction: Direction,
        #[case] api_key: ApiKey,
        #[case] version: i16,
        #[case] expected: bool,
    ) {
        let caps = Capabilities::requests(ApiSelector::key(ApiKey::API_VERSIONS));
        assert_eq!(caps.claims(direction, api_key, version), expected);
    }

    #[test]
    fn version_ranges_restrict_claims() {
        let selector = ApiSelector::Nothing.and(ApiKey::PRODUCE, VersionRange::new(3, 9));
        assert!(!selector.matches(ApiKey::PRODUCE, 2));
        assert!(selector.matches(ApiKey::PRODUCE, 3));
        assert!(selector.matches(ApiKey::PRODUCE, 9));
        assert!(!selector.matches(ApiKey::PRODUCE, 10));
    }

    #[test]
    fn all_absorbs_additional_keys() {
        let selector = ApiSelector::All.and(ApiKey::FETCH, VersionRange::new(0, 1));
        assert_eq!(selector, ApiSelector::All);
        assert!(Capabilities::both(selector).claims(Direction::Response, ApiKey(42), 7));
    }

    #[test]
    fn default_claims_nothing() {
        let caps = Capabilities::default();
        assert!(!caps.claims(Direction::Request, ApiKey::METADATA, 0));
        assert!(!caps.claims(Direction::Response, ApiKey::METADATA, 0));
    }
}

//! Api key identifiers.

/// Numeric message type of the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiKey(pub i16);

impl ApiKey {
    pub const PRODUCE: ApiKey = ApiKey(0);
    pub const FETCH: ApiKey = ApiKey(1);
    pub const LIST_OFFSETS: ApiKey = ApiKey(2);
    pub const METADATA: ApiKey = ApiKey(3);
    pub const OFFSET_COMMIT: ApiKey = ApiKey(8);
    pub const FIND_COORDINATOR: ApiKey = ApiKey(10);
    pub const LIST_GROUPS: ApiKey = ApiKey(16);
    pub const SASL_HANDSHAKE: ApiKey = ApiKey(17);
    pub const API_VERSIONS: ApiKey = ApiKey(18);
    pub const CREATE_TOPICS: ApiKey = ApiKey(19);
    pub const DELETE_TOPICS: ApiKey = ApiKey(20);
    pub const LIST_TRANSACTIONS: ApiKey = ApiKey(66);
    /// Placeholder for responses not yet matched to their request.
    pub const UNKNOWN: ApiKey = ApiKey(-1);

    /// Return the raw key.
    #[must_use]
    pub fn id(self) -> i16 { self.0 }
}

impl From<i16> for ApiKey {
    fn from(value: i16) -> Self { Self(value) }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            Self::PRODUCE => "Produce",
            Self::FETCH => "Fetch",
            Self::LIST_OFFSETS => "ListOffsets",
            Self::METADATA => "Metadata",
            Self::OFFSET_COMMIT => "OffsetCommit",
            Self::FIND_COORDINATOR => "FindCoordinator",
            Self::LIST_GROUPS => "ListGroups",
            Self::SASL_HANDSHAKE => "SaslHandshake",
            Self::API_VERSIONS => "ApiVersions",
            Self::CREATE_TOPICS => "CreateTopics",
            Self::DELETE_TOPICS => "DeleteTopics",
            Self::LIST_TRANSACTIONS => "ListTransactions",
            _ => return write!(f, "ApiKey({})", self.0),
        };
        f.write_str(name)
    }
}

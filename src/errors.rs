use thiserror::Error;

/// Everything that can go wrong while loading the catalog, initializing the
/// flag client or driving the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// The datafile could not be downloaded (transport error or HTTP status >= 400).
    #[error("failed to fetch flag configuration from {url}: {reason}")]
    ConfigFetch { url: String, reason: String },

    /// The datafile body is not a valid configuration document.
    #[error("invalid flag configuration: {0}")]
    ConfigParse(String),

    /// A flag query or user action arrived before the storefront was ready.
    #[error("storefront is not initialized")]
    NotInitialized,

    /// One catalog line could not be turned into an item record.
    #[error("malformed catalog record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// Required configuration is absent at startup.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("failed to fetch catalog from {source_name}: {reason}")]
    CatalogFetch { source_name: String, reason: String },

    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("no user session; shop first")]
    NoSession,

    #[error("sorting is not available for the current user")]
    SortingUnavailable,

    #[error("no item at position {0} in the current grid")]
    UnknownItem(usize),

    #[error("storefront has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Type alias for results that use `StorefrontError` as the error type
pub type Result<T> = std::result::Result<T, StorefrontError>;

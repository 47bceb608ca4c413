pub mod errors;
pub mod context;
pub mod catalog;
pub mod render;
pub mod sort;
pub mod flags;      // flag facade + pluggable providers and dispatchers
pub mod storefront;

pub use catalog::{load, load_strict, Catalog, CatalogLoad, CatalogSource, ItemRecord};
pub use context::Context;
pub use errors::{Result, StorefrontError};
pub use flags::{FeatureDecision, FetchOptions, FlagClient, FlagProvider};
pub use render::{render, GridCell, PurchaseControl, RenderedGrid};
pub use sort::{sort_by, SortField, SortSelector};
pub use storefront::{State, Storefront, StorefrontView};

/// Environment variable holding the datafile URL.
pub const DATAFILE_URL_ENV: &str = "DATAFILE_URL";


pub mod connector;
pub mod error;
pub mod registry;
pub mod stub;
pub mod syndication;

pub use connector::{FetchConnector, FetchItemError, FetchOutcome, FetchedItem, SourceConfig};
pub use error::{FetchError, Result};
pub use registry::ConnectorRegistry;
pub use syndication::SyndicationConnector;

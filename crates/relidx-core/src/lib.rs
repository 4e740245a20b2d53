pub mod date;
pub mod error;
pub mod indexer;
pub mod io;
pub mod release;
pub mod version;
pub mod workflow;

pub use error::{ParseError, ResolveError};
pub use indexer::forges::{HostEndpoints, HostResolver, Resolution, ResolverRegistry};
pub use io::fetch::{FetchError, FetchErrorKind, Fetcher, RetryPolicy};

/// User Agent string for host API requests
pub const USER_AGENT: &str = concat!("relidx-core/", env!("CARGO_PKG_VERSION"));

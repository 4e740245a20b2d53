//! IO modules - side effects (network)

pub mod cache;
pub mod fetch;
pub mod paginate;

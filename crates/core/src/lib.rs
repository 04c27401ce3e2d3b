//! sc-core: Core library for the sc Swift client
//!
//! This crate provides the foundation the client builds on, including:
//! - The error taxonomy and HTTP status → error maps
//! - The header/metadata model
//! - Account, container and object listing types
//! - Listing options and their query-parameter form
//!
//! This crate is designed to be independent of any specific HTTP client;
//! transport failures are carried as [`Error::Network`].

pub mod error;
pub mod headers;
pub mod options;
pub mod types;

pub use error::{
    auth_error_map, check_status, container_error_map, object_error_map, Error, ErrorMap, Result,
};
pub use headers::{Headers, Metadata};
pub use options::{ContainersOpts, ObjectsOpts, DEFAULT_LISTING_LIMIT};
pub use types::{Account, Container, Object, ObjectType};

//! sc-swift: OpenStack Swift / Rackspace Cloud Files client
//!
//! This crate provides the client proper, layered over the types in
//! [`sc_core`]:
//! - v1/v2/v3 authentication against the identity service
//! - The request pipeline with transparent reauthentication and stall
//!   watchdogs
//! - Account, container and object operations with paginated listings
//! - Streaming single-object reads (with seek) and writes, MD5 verified
//! - Dynamic and static large objects: segmented writes, append, partial
//!   rewrite, move and consistent delete
//!
//! # Usage
//!
//! ```no_run
//! use sc_swift::{Connection, ConnectionBuilder};
//!
//! # async fn example() -> sc_core::Result<()> {
//! let conn = ConnectionBuilder::new()
//!     .user_name("demo")
//!     .api_key("secret")
//!     .auth_url("https://identity.example.com/v3")
//!     .build()?;
//!
//! conn.container_create("backups", None).await?;
//! conn.object_put_string("backups", "hello.txt", "hello", "").await?;
//! let body = conn.object_get_string("backups", "hello.txt").await?;
//! assert_eq!(body, "hello");
//! # Ok(())
//! # }
//! ```

mod account;
mod auth;
mod connection;
mod container;
mod info;
mod largeobject;
mod object;
mod readers;

pub use auth::{AuthRequest, AuthVersion, Authenticator, EndpointType};
pub use connection::{
    Connection, ConnectionBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RETRIES, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use info::ServerInfo;
pub use largeobject::{
    BufferedLargeObjectFile, BulkDeleteResult, DynamicLargeObjectCreateFile, LargeObjectFile,
    LargeObjectOpts, SegmentInfo, StaticLargeObjectCreateFile, DEFAULT_CHUNK_SIZE,
};
pub use object::{ObjectCreateFile, ObjectOpenFile};

// The core types travel with the client for convenience
pub use sc_core::{
    Account, Container, ContainersOpts, Error, Headers, Metadata, Object, ObjectType, ObjectsOpts,
    Result,
};

//! # verso-core
//!
//! Core abstractions for the verso versioned object catalog.
//!
//! This crate provides the foundational types and contracts used across all
//! verso components:
//!
//! - **Names**: Validated repository and branch names
//! - **Blob Store Contract**: Byte-oriented payload storage with in-memory
//!   and local-filesystem backends
//! - **Authorization Contract**: Deny-precedence policy evaluation consulted
//!   by front-ends before catalog calls
//! - **Cancellation**: Cooperative abort handles observed at transaction
//!   boundaries
//! - **Error Types**: Shared error definitions and result types
//! - **Canonical Bytes**: Deterministic encoding feeding content hashes
//!
//! ## Crate Boundary
//!
//! `verso-core` is the only crate allowed to define shared primitives. The
//! catalog engine (`verso-catalog`) builds on these; wire front-ends and the
//! user/credential service live outside this workspace and interact through
//! the contracts defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod cancel;
pub mod canonical;
pub mod error;
pub mod name;
pub mod observability;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::auth::{AuthDecision, Authorizer, Permission, Subject};
    pub use crate::cancel::CancelToken;
    pub use crate::error::{Error, Result};
    pub use crate::name::{BranchName, RepositoryName};
    pub use crate::storage::{BlobStore, ByteRange, InventoryRecord, MemoryBlobStore};
}

pub use auth::{AuthDecision, AuthPolicy, Authorizer, Permission, Subject};
pub use cancel::CancelToken;
pub use canonical::to_canonical_bytes;
pub use error::{Error, Result};
pub use name::{BranchName, RepositoryName};
pub use observability::{catalog_span, init_logging, LogFormat};
pub use storage::{BlobStore, ByteRange, InventoryRecord, LocalBlobStore, MemoryBlobStore};

//! # `meshgraph-core`
//!
//! In-memory, multi-version concurrent graph storage engine.
//!
//! `meshgraph-core` holds a directed graph in a forest of independently
//! writer-serialized shards. Each shard keeps a chain of immutable versions;
//! readers pin a timestamp and walk the chain to the version that was
//! current then, so long-running reads never block writers and writers
//! never block readers. A vertex's neighbor list adapts to its degree: it
//! starts inline in a shared clustered buffer, is extracted to a private
//! range tree once it grows past a configured threshold, and is promoted
//! again to an adaptive radix trie at high degree.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use meshgraph_core::{EngineConfig, TransactionManager};
//!
//! let manager = TransactionManager::new(EngineConfig::default());
//!
//! let mut write = manager.begin_write();
//! write.insert_vertex(1);
//! write.insert_vertex(2);
//! write.insert_edge(1, 2, true);
//! write.commit()?;
//!
//! let read = manager.begin_read();
//! assert!(read.has_edge(1, 2));
//! # Ok::<(), meshgraph_core::MeshError>(())
//! ```
//!
//! ## Module map
//!
//! - [`pool`] — per-worker segment/property allocator caches.
//! - [`property`] — scalar and string property columns.
//! - [`art`], [`range_tree`], [`clustered`] — the three neighborhood tiers.
//! - [`neighborhood`] — the tier dispatch that hides which one a vertex uses.
//! - [`version`] — one immutable shard snapshot.
//! - [`shard`] — a version chain plus its writer lock.
//! - [`forest`] — the lazily-grown table of shards.
//! - [`registry`] — active-reader timestamp bookkeeping for GC.
//! - [`metrics`] — approximate engine-wide counters.
//! - [`txn`] — the four transaction shapes built on top of all of the above.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod art;
pub mod clustered;
pub mod config;
pub mod error;
pub mod forest;
pub mod ids;
pub mod metrics;
pub mod neighborhood;
pub mod pool;
pub mod property;
pub mod range_tree;
pub mod registry;
pub mod shard;
pub mod sync;
pub mod txn;
pub mod version;

pub use config::{ConfigError, EngineConfig};
pub use error::{MeshError, Result};
pub use ids::{Timestamp, VertexId};
pub use metrics::Metrics;
pub use txn::{LightWriteTxn, ReadTxn, Snapshot, TransactionManager, WriteTxn};

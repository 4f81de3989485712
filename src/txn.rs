//! Transaction manager and the four transaction shapes (§6):
//! `ReadTxn` (pinned snapshot, cheap per-call reads), `WriteTxn` (buffered,
//! multi-vertex/edge, commits once across every shard it touched),
//! `LightWriteTxn` (unbuffered, commits per call), and `Snapshot` (like
//! `ReadTxn` but caches the shard versions it visits for repeated access).
//!
//! # Lock ordering
//!
//! A `WriteTxn` that touches several shards locks them in ascending shard
//! index order before applying any buffered operation, and only then
//! commits each. A `LightWriteTxn` normally touches exactly one shard per
//! call — adjacency is stored as an out-edge list on the source vertex
//! only — except for an undirected edge or vertex removal that spans two
//! shards, which locks both in the same ascending order via `commit_pair`
//! / `commit_vertex_removal`.
//!
//! # Commit visibility
//!
//! Every commit reserves a timestamp from `write_ts` before touching any
//! shard, then spins in `finish_commit` until `read_ts` reaches `ts - 1`
//! before publishing it as the new read frontier. This keeps commits
//! visible to new readers in timestamp order even when two writers finish
//! applying their shard mutations out of order.
//!
//! # Undirected edges
//!
//! Directedness is a concern of the caller, not of `Version`/`ClusteredBlock`
//! below it: an undirected `insert_edge`/`remove_edge`/`remove_vertex` just
//! mirrors both directions at this layer. Removing a vertex undirected reads
//! its current neighbor list from the latest committed version before any
//! write lock is taken — this engine has no cross-shard atomic snapshot read
//! for any operation, so that pre-read can race a concurrent writer adding
//! or removing an edge to the vertex being removed. The same tradeoff
//! already exists implicitly everywhere else a multi-shard read informs a
//! multi-shard write; see `DESIGN.md`.
//!
//! # Batch edge ingest
//!
//! `insert_edge_batch` buffers `(src, dst)` pairs separately from `ops`
//! instead of expanding them into one `InsertEdge` op per edge. `commit`
//! groups the batch by source vertex — in parallel across
//! `batch_update_thread_num` threads when the batch is large enough to be
//! worth splitting, each thread only sorting/deduping an owned slice, never
//! touching a shard or a lock — then merges each source's sorted target
//! list into its neighborhood with one relocate/rebuild instead of one per
//! edge. Groups smaller than `batch_update_enable_threshold` fall back to
//! the ordinary per-edge insert path, since the merge's fixed overhead isn't
//! worth it for a handful of edges.

use crate::config::EngineConfig;
use crate::error::{MeshError, Result};
use crate::forest::ShardForest;
use crate::ids::{Timestamp, VertexId};
use crate::metrics::Metrics;
use crate::property::PropertyValue;
use crate::registry::{ReaderHandle, ReaderRegistry};
use crate::shard::{Shard, ShardWriteGuard};
use crate::sync::{Arc, AtomicU64, Mutex, Ordering};
use crate::version::Version;
use rustc_hash::FxHashMap;

/// Owns the shard forest, the write/read timestamp counters, the reader
/// registry, and the approximate counters. The entry point for every
/// transaction shape.
pub struct TransactionManager {
    forest: ShardForest,
    registry: ReaderRegistry,
    write_ts: AtomicU64,
    read_ts: AtomicU64,
    config: EngineConfig,
    metrics: Metrics,
}

impl TransactionManager {
    /// Creates a manager with an empty shard forest.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let forest = ShardForest::new(
            config.vertex_group_bits,
            config.vertex_property_num,
            config.vertex_string_property_num,
        );
        Self {
            forest,
            registry: ReaderRegistry::new(),
            write_ts: AtomicU64::new(0),
            read_ts: AtomicU64::new(0),
            config,
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn read_txn_count(&self) -> usize {
        self.registry.read_txn_count()
    }

    #[must_use]
    pub fn active_reader_timestamps(&self) -> Vec<Timestamp> {
        self.registry.active_reader_timestamps()
    }

    fn next_write_ts(&self) -> Timestamp {
        self.write_ts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Advances the visible read frontier to `ts`, spinning until every
    /// earlier commit has already published (`read_ts` == `ts - 1`).
    fn finish_commit(&self, ts: Timestamp) {
        loop {
            match self
                .read_ts
                .compare_exchange(ts - 1, ts, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Starts a read-only transaction pinned at the current read frontier.
    #[must_use]
    pub fn begin_read(&self) -> ReadTxn<'_> {
        let read_ts = self.read_ts.load(Ordering::Acquire);
        self.metrics.record_read_txn_opened();
        ReadTxn {
            manager: self,
            read_ts,
            _pin: self.registry.register(read_ts),
        }
    }

    /// Starts a buffered, multi-operation write transaction.
    #[must_use]
    pub fn begin_write(&self) -> WriteTxn<'_> {
        WriteTxn {
            manager: self,
            ops: Vec::new(),
            vertex_batch: Vec::new(),
            edge_batch: Vec::new(),
            finished: false,
        }
    }

    /// Starts a streaming write transaction that commits each call
    /// immediately.
    #[must_use]
    pub fn begin_light_write(&self) -> LightWriteTxn<'_> {
        LightWriteTxn { manager: self }
    }

    /// Starts a snapshot: like a read transaction, but caches the shard
    /// versions it visits so repeated traversal doesn't re-walk a shard's
    /// version chain on every call.
    #[must_use]
    pub fn begin_snapshot(&self) -> Snapshot<'_> {
        let read_ts = self.read_ts.load(Ordering::Acquire);
        self.metrics.record_snapshot_opened();
        Snapshot {
            manager: self,
            read_ts,
            cache: Mutex::new(FxHashMap::default()),
            _pin: self.registry.register(read_ts),
        }
    }

    fn shard_size(&self) -> usize {
        self.config.shard_size() as usize
    }
}

fn version_for(forest: &ShardForest, read_ts: Timestamp, vertex: VertexId) -> Arc<Version> {
    let (shard_idx, _) = forest.route(vertex);
    forest.locate(shard_idx).find_version(read_ts)
}

/// Reads `vertex`'s current neighbor list from the latest committed
/// version, before any write lock is taken, and returns `(neighbor,
/// vertex)` pairs — the reverse edges an undirected removal of `vertex`
/// must also remove. This is a best-effort read: a concurrent writer could
/// add or remove an edge to `vertex` between this read and the removal
/// taking effect. See the module doc for why that's an accepted tradeoff.
fn collect_neighbor_removals(manager: &TransactionManager, vertex: VertexId) -> Vec<(VertexId, VertexId)> {
    let read_ts = manager.read_ts.load(Ordering::Acquire);
    let version = version_for(&manager.forest, read_ts, vertex);
    let mut neighbors = Vec::new();
    version.for_each_neighbor(vertex, manager.shard_size(), |n| neighbors.push(n));
    neighbors.into_iter().map(|n| (n, vertex)).collect()
}

/// Groups `edge_batch` by source vertex into sorted, deduplicated target
/// lists, splitting the work across up to `thread_num` threads when the
/// batch is large enough. Each spawned thread only sorts/groups an owned
/// slice of `(src, dst)` pairs — it never touches a shard, a lock, or
/// anything behind `Arc`, so this has none of the `Send` obligations that
/// would come with moving a `ShardWriteGuard` across a thread boundary.
fn group_edge_batch_by_source(edge_batch: &[(VertexId, VertexId)], thread_num: usize) -> FxHashMap<VertexId, Vec<VertexId>> {
    if edge_batch.is_empty() {
        return FxHashMap::default();
    }
    let threads = thread_num.max(1).min(edge_batch.len());
    if threads <= 1 {
        return group_edge_chunk(edge_batch);
    }
    let chunk_size = (edge_batch.len() + threads - 1) / threads;
    let partials: Vec<FxHashMap<VertexId, Vec<VertexId>>> = std::thread::scope(|scope| {
        edge_batch
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || group_edge_chunk(chunk)))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("edge-batch grouping thread panicked"))
            .collect()
    });
    merge_edge_groups(partials)
}

fn group_edge_chunk(chunk: &[(VertexId, VertexId)]) -> FxHashMap<VertexId, Vec<VertexId>> {
    let mut groups: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
    for &(src, dst) in chunk {
        groups.entry(src).or_default().push(dst);
    }
    for targets in groups.values_mut() {
        targets.sort_unstable();
        targets.dedup();
    }
    groups
}

fn merge_edge_groups(partials: Vec<FxHashMap<VertexId, Vec<VertexId>>>) -> FxHashMap<VertexId, Vec<VertexId>> {
    let mut merged: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
    for partial in partials {
        for (src, targets) in partial {
            merged.entry(src).or_default().extend(targets);
        }
    }
    for targets in merged.values_mut() {
        targets.sort_unstable();
        targets.dedup();
    }
    merged
}

/// Operations buffered by a `WriteTxn` until `commit`.
#[derive(Clone)]
enum WriteOp {
    InsertVertex(VertexId),
    RemoveVertex(VertexId, bool),
    InsertEdge(VertexId, VertexId),
    RemoveEdge(VertexId, VertexId),
    SetVertexProperty(VertexId, usize, PropertyValue),
    SetEdgeProperty(VertexId, VertexId, usize, PropertyValue),
    SetVertexStringProperty(VertexId, usize, Arc<str>),
    SetEdgeStringProperty(VertexId, VertexId, usize, Arc<str>),
}

impl WriteOp {
    fn primary_vertex(&self) -> VertexId {
        match *self {
            WriteOp::InsertVertex(v)
            | WriteOp::RemoveVertex(v, _)
            | WriteOp::InsertEdge(v, _)
            | WriteOp::RemoveEdge(v, _)
            | WriteOp::SetVertexProperty(v, _, _)
            | WriteOp::SetEdgeProperty(v, _, _, _) => v,
            WriteOp::SetVertexStringProperty(v, _, _) | WriteOp::SetEdgeStringProperty(v, _, _, _) => v,
        }
    }

    fn apply(&self, version: &mut Version, cfg: &EngineConfig, metrics: &Metrics) {
        let shard_size = cfg.shard_size() as usize;
        match self {
            WriteOp::InsertVertex(v) => {
                version.insert_vertex(*v, shard_size);
                metrics.record_insert_vertex();
            }
            WriteOp::RemoveVertex(v, _directed) => {
                version.remove_vertex(*v, shard_size);
                metrics.record_remove_vertex();
            }
            WriteOp::InsertEdge(src, dst) => {
                version.insert_edge(
                    *src,
                    *dst,
                    shard_size,
                    cfg.range_leaf_size,
                    cfg.art_extract_threshold,
                    cfg.art_leaf_size,
                );
                metrics.record_insert_edge();
            }
            WriteOp::RemoveEdge(src, dst) => {
                version.remove_edge(*src, *dst, shard_size, cfg.range_leaf_size);
                metrics.record_remove_edge();
            }
            WriteOp::SetVertexProperty(v, pid, value) => {
                version.set_vertex_property(*v, shard_size, *pid, *value);
            }
            WriteOp::SetEdgeProperty(src, dst, pid, value) => {
                version.set_edge_property(*src, *dst, shard_size, *pid, *value);
            }
            WriteOp::SetVertexStringProperty(v, pid, value) => {
                version.set_vertex_string_property(*v, shard_size, *pid, value.clone());
            }
            WriteOp::SetEdgeStringProperty(src, dst, pid, value) => {
                version.set_edge_string_property(*src, *dst, shard_size, *pid, value.clone());
            }
        }
    }
}

/// A read-only view pinned at a fixed read timestamp.
pub struct ReadTxn<'a> {
    manager: &'a TransactionManager,
    read_ts: Timestamp,
    _pin: ReaderHandle<'a>,
}

impl ReadTxn<'_> {
    fn version_for(&self, vertex: VertexId) -> Arc<Version> {
        version_for(&self.manager.forest, self.read_ts, vertex)
    }

    #[must_use]
    pub fn read_timestamp(&self) -> Timestamp {
        self.read_ts
    }

    #[must_use]
    pub fn vertex_count(&self) -> u64 {
        self.manager.metrics.vertex_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> u64 {
        self.manager.metrics.edge_count()
    }

    #[must_use]
    pub fn has_vertex(&self, vertex: VertexId) -> bool {
        self.version_for(vertex).has_vertex(vertex, self.manager.shard_size())
    }

    #[must_use]
    pub fn has_edge(&self, src: VertexId, dst: VertexId) -> bool {
        self.version_for(src).has_edge(src, dst, self.manager.shard_size())
    }

    #[must_use]
    pub fn degree(&self, vertex: VertexId) -> usize {
        self.version_for(vertex).degree(vertex, self.manager.shard_size())
    }

    #[must_use]
    pub fn get_vertex_property(&self, vertex: VertexId, property_id: usize) -> Option<PropertyValue> {
        self.version_for(vertex)
            .get_vertex_property(vertex, self.manager.shard_size(), property_id)
    }

    #[must_use]
    pub fn get_vertex_properties(&self, vertex: VertexId, property_ids: &[usize]) -> Vec<Option<PropertyValue>> {
        let version = self.version_for(vertex);
        let shard_size = self.manager.shard_size();
        property_ids
            .iter()
            .map(|&pid| version.get_vertex_property(vertex, shard_size, pid))
            .collect()
    }

    #[must_use]
    pub fn get_edge_property(&self, src: VertexId, dst: VertexId, property_id: usize) -> Option<PropertyValue> {
        self.version_for(src)
            .get_edge_property(src, dst, self.manager.shard_size(), property_id)
    }

    #[must_use]
    pub fn get_edge_properties(&self, src: VertexId, dst: VertexId, property_ids: &[usize]) -> Vec<Option<PropertyValue>> {
        let version = self.version_for(src);
        let shard_size = self.manager.shard_size();
        property_ids
            .iter()
            .map(|&pid| version.get_edge_property(src, dst, shard_size, pid))
            .collect()
    }

    #[must_use]
    pub fn get_vertex_string_property(&self, vertex: VertexId, property_id: usize) -> Option<Arc<str>> {
        self.version_for(vertex)
            .get_vertex_string_property(vertex, self.manager.shard_size(), property_id)
    }

    #[must_use]
    pub fn get_edge_string_property(&self, src: VertexId, dst: VertexId, property_id: usize) -> Option<Arc<str>> {
        self.version_for(src)
            .get_edge_string_property(src, dst, self.manager.shard_size(), property_id)
    }

    /// Visits every neighbor of `vertex` in ascending order.
    pub fn edges(&self, vertex: VertexId, f: impl FnMut(VertexId)) {
        self.version_for(vertex).for_each_neighbor(vertex, self.manager.shard_size(), f);
    }

    /// Collects every neighbor of `vertex`, sorted ascending.
    #[must_use]
    pub fn neighbors(&self, vertex: VertexId) -> Vec<VertexId> {
        let mut out = Vec::new();
        self.edges(vertex, |n| out.push(n));
        out
    }

    /// The sorted intersection of `a`'s and `b`'s neighbor sets.
    #[must_use]
    pub fn intersect(&self, a: VertexId, b: VertexId) -> Vec<VertexId> {
        let a_neighbors = self.neighbors(a);
        self.version_for(b).intersect_neighbors(b, self.manager.shard_size(), &a_neighbors)
    }
}

/// A buffered, multi-operation write transaction. Operations queue until
/// `commit`; a vertex removal must be the only kind of operation in a
/// transaction that contains one (`MeshError::MixedRemoveTransaction`),
/// and can't be mixed with a buffered vertex/edge batch either.
pub struct WriteTxn<'a> {
    manager: &'a TransactionManager,
    ops: Vec<WriteOp>,
    vertex_batch: Vec<VertexId>,
    edge_batch: Vec<(VertexId, VertexId)>,
    finished: bool,
}

impl<'a> WriteTxn<'a> {
    fn push(&mut self, op: WriteOp) -> Result<()> {
        if self.finished {
            return Err(MeshError::TransactionFinished);
        }
        let is_remove_vertex = matches!(op, WriteOp::RemoveVertex(..));
        let has_non_remove = self.ops.iter().any(|o| !matches!(o, WriteOp::RemoveVertex(..)));
        let has_remove = self.ops.iter().any(|o| matches!(o, WriteOp::RemoveVertex(..)));
        let has_batch_data = !self.vertex_batch.is_empty() || !self.edge_batch.is_empty();
        if is_remove_vertex && (has_non_remove || has_batch_data) {
            return Err(MeshError::MixedRemoveTransaction);
        }
        if !is_remove_vertex && has_remove {
            return Err(MeshError::MixedRemoveTransaction);
        }
        self.ops.push(op);
        Ok(())
    }

    fn check_batch_allowed(&self) -> Result<()> {
        if self.finished {
            return Err(MeshError::TransactionFinished);
        }
        if self.ops.iter().any(|o| matches!(o, WriteOp::RemoveVertex(..))) {
            return Err(MeshError::MixedRemoveTransaction);
        }
        Ok(())
    }

    pub fn insert_vertex(&mut self, vertex: VertexId) -> Result<()> {
        self.push(WriteOp::InsertVertex(vertex))
    }

    pub fn remove_vertex(&mut self, vertex: VertexId, directed: bool) -> Result<()> {
        self.push(WriteOp::RemoveVertex(vertex, directed))
    }

    pub fn insert_edge(&mut self, src: VertexId, dst: VertexId, directed: bool) -> Result<()> {
        if !directed {
            self.push(WriteOp::InsertEdge(dst, src))?;
        }
        self.push(WriteOp::InsertEdge(src, dst))
    }

    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId, directed: bool) -> Result<()> {
        if !directed {
            self.push(WriteOp::RemoveEdge(dst, src))?;
        }
        self.push(WriteOp::RemoveEdge(src, dst))
    }

    pub fn set_vertex_property(&mut self, vertex: VertexId, property_id: usize, value: PropertyValue) -> Result<()> {
        self.push(WriteOp::SetVertexProperty(vertex, property_id, value))
    }

    pub fn set_edge_property(&mut self, src: VertexId, dst: VertexId, property_id: usize, value: PropertyValue) -> Result<()> {
        self.push(WriteOp::SetEdgeProperty(src, dst, property_id, value))
    }

    pub fn set_vertex_string_property(&mut self, vertex: VertexId, property_id: usize, value: impl Into<Arc<str>>) -> Result<()> {
        self.push(WriteOp::SetVertexStringProperty(vertex, property_id, value.into()))
    }

    pub fn set_edge_string_property(
        &mut self,
        src: VertexId,
        dst: VertexId,
        property_id: usize,
        value: impl Into<Arc<str>>,
    ) -> Result<()> {
        self.push(WriteOp::SetEdgeStringProperty(src, dst, property_id, value.into()))
    }

    /// Buffers a batch of brand-new vertices for `commit` to insert as one
    /// group, per §4.3.2.
    pub fn insert_vertex_batch(&mut self, vertices: &[VertexId]) -> Result<()> {
        self.check_batch_allowed()?;
        self.vertex_batch.extend_from_slice(vertices);
        Ok(())
    }

    /// Buffers a batch of edges for `commit` to merge per source vertex in
    /// one pass, per §4.3.7. `directed` mirrors both directions into the
    /// batch when false, the same as `insert_edge`.
    pub fn insert_edge_batch(&mut self, edges: &[(VertexId, VertexId)], directed: bool) -> Result<()> {
        self.check_batch_allowed()?;
        self.edge_batch.reserve(edges.len() * if directed { 1 } else { 2 });
        for &(src, dst) in edges {
            self.edge_batch.push((src, dst));
            if !directed {
                self.edge_batch.push((dst, src));
            }
        }
        Ok(())
    }

    /// Applies every buffered operation and batch across whichever shards
    /// they touched, locking them in ascending shard-index order, then
    /// publishes all of them under one commit timestamp.
    pub fn commit(mut self) -> Result<Timestamp> {
        if self.finished {
            return Err(MeshError::TransactionFinished);
        }
        self.finished = true;

        if self.ops.iter().any(|o| matches!(o, WriteOp::RemoveVertex(..))) {
            return self.commit_remove_vertices();
        }

        if self.ops.is_empty() && self.vertex_batch.is_empty() && self.edge_batch.is_empty() {
            return Ok(self.manager.read_ts.load(Ordering::Acquire));
        }

        let grouped_edges = group_edge_batch_by_source(&self.edge_batch, self.manager.config.batch_update_thread_num);

        let mut shard_indices: Vec<u64> = self.ops.iter().map(|op| self.manager.forest.route(op.primary_vertex()).0).collect();
        shard_indices.extend(self.vertex_batch.iter().map(|&v| self.manager.forest.route(v).0));
        shard_indices.extend(grouped_edges.keys().map(|&src| self.manager.forest.route(src).0));
        shard_indices.sort_unstable();
        shard_indices.dedup();

        let shards: Vec<Arc<Shard>> = shard_indices.iter().map(|&idx| self.manager.forest.locate(idx)).collect();

        let ts = self.manager.next_write_ts();
        let mut guards: Vec<ShardWriteGuard<'_>> = shards.iter().map(|s| s.begin_write(ts)).collect();
        let shard_size = self.manager.shard_size();

        for op in &self.ops {
            let shard_idx = self.manager.forest.route(op.primary_vertex()).0;
            let pos = shard_indices.binary_search(&shard_idx).expect("shard was pre-collected");
            op.apply(guards[pos].version_mut(), &self.manager.config, &self.manager.metrics);
        }

        if !self.vertex_batch.is_empty() {
            let mut by_shard: FxHashMap<u64, Vec<VertexId>> = FxHashMap::default();
            for &vertex in &self.vertex_batch {
                by_shard.entry(self.manager.forest.route(vertex).0).or_default().push(vertex);
            }
            for (shard_idx, vertices) in &by_shard {
                let pos = shard_indices.binary_search(shard_idx).expect("shard was pre-collected");
                guards[pos].version_mut().insert_vertices_batch(vertices, shard_size);
                for _ in vertices {
                    self.manager.metrics.record_insert_vertex();
                }
            }
        }

        let threshold = self.manager.config.batch_update_enable_threshold;
        for (src, targets) in &grouped_edges {
            let shard_idx = self.manager.forest.route(*src).0;
            let pos = shard_indices.binary_search(&shard_idx).expect("shard was pre-collected");
            let version = guards[pos].version_mut();
            if targets.len() >= threshold {
                let inserted = version.insert_edges_batch(
                    *src,
                    targets,
                    shard_size,
                    self.manager.config.range_leaf_size,
                    self.manager.config.art_extract_threshold,
                    self.manager.config.art_leaf_size,
                );
                self.manager.metrics.record_insert_edge_n(inserted);
            } else {
                for &dst in targets {
                    version.insert_edge(
                        *src,
                        dst,
                        shard_size,
                        self.manager.config.range_leaf_size,
                        self.manager.config.art_extract_threshold,
                        self.manager.config.art_leaf_size,
                    );
                    self.manager.metrics.record_insert_edge();
                }
            }
        }

        let min_reader_ts = self.manager.registry.min_active_timestamp(ts);
        for guard in guards {
            guard.commit(min_reader_ts);
        }
        self.manager.finish_commit(ts);
        self.manager.metrics.record_write_commit();
        tracing::debug!(
            ts,
            ops = self.ops.len(),
            vertex_batch = self.vertex_batch.len(),
            edge_batch = self.edge_batch.len(),
            shards = shard_indices.len(),
            "write transaction committed"
        );
        Ok(ts)
    }

    /// Handles a transaction made up entirely of `RemoveVertex` ops. An
    /// undirected removal needs its target's current neighbor shards locked
    /// too, so this takes a separate path from the normal op/batch commit
    /// above rather than trying to fold vertex removal into its shard-set
    /// computation.
    fn commit_remove_vertices(self) -> Result<Timestamp> {
        let removals: Vec<(VertexId, bool)> = self
            .ops
            .iter()
            .map(|op| match op {
                WriteOp::RemoveVertex(v, directed) => (*v, *directed),
                _ => unreachable!("commit_remove_vertices only runs for all-RemoveVertex transactions"),
            })
            .collect();

        let mut shard_indices: Vec<u64> = Vec::new();
        let mut reverse_edges: Vec<(VertexId, VertexId)> = Vec::new();
        for &(vertex, directed) in &removals {
            shard_indices.push(self.manager.forest.route(vertex).0);
            if !directed {
                for (neighbor, removed) in collect_neighbor_removals(self.manager, vertex) {
                    shard_indices.push(self.manager.forest.route(neighbor).0);
                    reverse_edges.push((neighbor, removed));
                }
            }
        }
        shard_indices.sort_unstable();
        shard_indices.dedup();

        let shards: Vec<Arc<Shard>> = shard_indices.iter().map(|&idx| self.manager.forest.locate(idx)).collect();
        let ts = self.manager.next_write_ts();
        let mut guards: Vec<ShardWriteGuard<'_>> = shards.iter().map(|s| s.begin_write(ts)).collect();
        let shard_size = self.manager.shard_size();

        for &(neighbor, removed) in &reverse_edges {
            let shard_idx = self.manager.forest.route(neighbor).0;
            let pos = shard_indices.binary_search(&shard_idx).expect("shard was pre-collected");
            guards[pos]
                .version_mut()
                .remove_edge(neighbor, removed, shard_size, self.manager.config.range_leaf_size);
            self.manager.metrics.record_remove_edge();
        }
        for &(vertex, _directed) in &removals {
            let shard_idx = self.manager.forest.route(vertex).0;
            let pos = shard_indices.binary_search(&shard_idx).expect("shard was pre-collected");
            guards[pos].version_mut().remove_vertex(vertex, shard_size);
            self.manager.metrics.record_remove_vertex();
        }

        let min_reader_ts = self.manager.registry.min_active_timestamp(ts);
        for guard in guards {
            guard.commit(min_reader_ts);
        }
        self.manager.finish_commit(ts);
        self.manager.metrics.record_write_commit();
        tracing::debug!(ts, vertices = removals.len(), shards = shard_indices.len(), "vertex removal transaction committed");
        Ok(ts)
    }

    /// Discards every buffered operation without touching a shard.
    pub fn abort(mut self) {
        self.finished = true;
        self.ops.clear();
        self.vertex_batch.clear();
        self.edge_batch.clear();
    }
}

/// A streaming write transaction: every call commits immediately against
/// the shard(s) it touches — one shard for a directed mutation, two (in
/// ascending index order) for an undirected cross-shard edge, and
/// potentially several for an undirected vertex removal.
pub struct LightWriteTxn<'a> {
    manager: &'a TransactionManager,
}

impl LightWriteTxn<'_> {
    fn commit_single(&self, vertex: VertexId, op: WriteOp) -> Timestamp {
        let shard = self.manager.forest.locate_for_vertex(vertex);
        let ts = self.manager.next_write_ts();
        let mut guard = shard.begin_write(ts);
        op.apply(guard.version_mut(), &self.manager.config, &self.manager.metrics);
        let min_reader_ts = self.manager.registry.min_active_timestamp(ts);
        guard.commit(min_reader_ts);
        self.manager.finish_commit(ts);
        self.manager.metrics.record_light_write_commit();
        ts
    }

    /// Commits `op_a` (rooted at `vertex_a`) and `op_b` (rooted at
    /// `vertex_b`) under one timestamp, locking both shards in ascending
    /// index order when they differ — the two-lock path an undirected
    /// cross-shard edge mutation needs.
    fn commit_pair(&self, vertex_a: VertexId, vertex_b: VertexId, op_a: WriteOp, op_b: WriteOp) -> Timestamp {
        let (shard_idx_a, _) = self.manager.forest.route(vertex_a);
        let (shard_idx_b, _) = self.manager.forest.route(vertex_b);
        let ts = self.manager.next_write_ts();

        if shard_idx_a == shard_idx_b {
            let shard = self.manager.forest.locate(shard_idx_a);
            let mut guard = shard.begin_write(ts);
            op_a.apply(guard.version_mut(), &self.manager.config, &self.manager.metrics);
            op_b.apply(guard.version_mut(), &self.manager.config, &self.manager.metrics);
            let min_reader_ts = self.manager.registry.min_active_timestamp(ts);
            guard.commit(min_reader_ts);
        } else {
            let (first_idx, first_op, second_idx, second_op) = if shard_idx_a < shard_idx_b {
                (shard_idx_a, op_a, shard_idx_b, op_b)
            } else {
                (shard_idx_b, op_b, shard_idx_a, op_a)
            };

            let first_shard = self.manager.forest.locate(first_idx);
            let mut first_guard = first_shard.begin_write(ts);
            first_op.apply(first_guard.version_mut(), &self.manager.config, &self.manager.metrics);

            let second_shard = self.manager.forest.locate(second_idx);
            let mut second_guard = second_shard.begin_write(ts);
            second_op.apply(second_guard.version_mut(), &self.manager.config, &self.manager.metrics);

            let min_reader_ts = self.manager.registry.min_active_timestamp(ts);
            first_guard.commit(min_reader_ts);
            second_guard.commit(min_reader_ts);
        }

        self.manager.finish_commit(ts);
        self.manager.metrics.record_light_write_commit();
        ts
    }

    /// Removes `vertex` and, for an undirected removal, every reverse edge
    /// its neighbors hold back to it — locking `vertex`'s shard and every
    /// affected neighbor shard in ascending index order under one
    /// timestamp. See the module doc for the pre-read race this accepts.
    fn commit_vertex_removal(&self, vertex: VertexId, reverse_edges: Vec<(VertexId, VertexId)>) -> Timestamp {
        let mut shard_indices: Vec<u64> = reverse_edges.iter().map(|&(n, _)| self.manager.forest.route(n).0).collect();
        shard_indices.push(self.manager.forest.route(vertex).0);
        shard_indices.sort_unstable();
        shard_indices.dedup();

        let shards: Vec<Arc<Shard>> = shard_indices.iter().map(|&idx| self.manager.forest.locate(idx)).collect();
        let ts = self.manager.next_write_ts();
        let mut guards: Vec<ShardWriteGuard<'_>> = shards.iter().map(|s| s.begin_write(ts)).collect();
        let shard_size = self.manager.shard_size();

        for &(neighbor, removed) in &reverse_edges {
            let shard_idx = self.manager.forest.route(neighbor).0;
            let pos = shard_indices.binary_search(&shard_idx).expect("shard was pre-collected");
            guards[pos]
                .version_mut()
                .remove_edge(neighbor, removed, shard_size, self.manager.config.range_leaf_size);
            self.manager.metrics.record_remove_edge();
        }

        let vertex_shard_idx = self.manager.forest.route(vertex).0;
        let pos = shard_indices.binary_search(&vertex_shard_idx).expect("shard was pre-collected");
        guards[pos].version_mut().remove_vertex(vertex, shard_size);
        self.manager.metrics.record_remove_vertex();

        let min_reader_ts = self.manager.registry.min_active_timestamp(ts);
        for guard in guards {
            guard.commit(min_reader_ts);
        }
        self.manager.finish_commit(ts);
        self.manager.metrics.record_light_write_commit();
        ts
    }

    pub fn insert_vertex(&self, vertex: VertexId) -> Timestamp {
        self.commit_single(vertex, WriteOp::InsertVertex(vertex))
    }

    pub fn remove_vertex(&self, vertex: VertexId, directed: bool) -> Timestamp {
        if directed {
            return self.commit_single(vertex, WriteOp::RemoveVertex(vertex, true));
        }
        let reverse_edges = collect_neighbor_removals(self.manager, vertex);
        self.commit_vertex_removal(vertex, reverse_edges)
    }

    pub fn insert_edge(&self, src: VertexId, dst: VertexId, directed: bool) -> Timestamp {
        if directed {
            return self.commit_single(src, WriteOp::InsertEdge(src, dst));
        }
        self.commit_pair(src, dst, WriteOp::InsertEdge(src, dst), WriteOp::InsertEdge(dst, src))
    }

    pub fn remove_edge(&self, src: VertexId, dst: VertexId, directed: bool) -> Timestamp {
        if directed {
            return self.commit_single(src, WriteOp::RemoveEdge(src, dst));
        }
        self.commit_pair(src, dst, WriteOp::RemoveEdge(src, dst), WriteOp::RemoveEdge(dst, src))
    }

    pub fn set_vertex_property(&self, vertex: VertexId, property_id: usize, value: PropertyValue) -> Timestamp {
        self.commit_single(vertex, WriteOp::SetVertexProperty(vertex, property_id, value))
    }

    pub fn set_edge_property(&self, src: VertexId, dst: VertexId, property_id: usize, value: PropertyValue) -> Timestamp {
        self.commit_single(src, WriteOp::SetEdgeProperty(src, dst, property_id, value))
    }

    pub fn set_vertex_string_property(&self, vertex: VertexId, property_id: usize, value: impl Into<Arc<str>>) -> Timestamp {
        self.commit_single(vertex, WriteOp::SetVertexStringProperty(vertex, property_id, value.into()))
    }

    pub fn set_edge_string_property(&self, src: VertexId, dst: VertexId, property_id: usize, value: impl Into<Arc<str>>) -> Timestamp {
        self.commit_single(src, WriteOp::SetEdgeStringProperty(src, dst, property_id, value.into()))
    }
}

/// A read-only view, like `ReadTxn`, that caches each shard version it
/// visits so repeated traversal of the same neighborhood doesn't re-walk
/// a version chain. Cached handles (and the reader-registry pin) are
/// released when the snapshot drops.
pub struct Snapshot<'a> {
    manager: &'a TransactionManager,
    read_ts: Timestamp,
    cache: Mutex<FxHashMap<u64, Arc<Version>>>,
    _pin: ReaderHandle<'a>,
}

impl Snapshot<'_> {
    fn version_for(&self, vertex: VertexId) -> Arc<Version> {
        let (shard_idx, _) = self.manager.forest.route(vertex);
        if let Some(cached) = self.cache.lock().get(&shard_idx) {
            return cached.clone();
        }
        let version = self.manager.forest.locate(shard_idx).find_version(self.read_ts);
        self.cache.lock().insert(shard_idx, version.clone());
        version
    }

    #[must_use]
    pub fn read_timestamp(&self) -> Timestamp {
        self.read_ts
    }

    #[must_use]
    pub fn has_vertex(&self, vertex: VertexId) -> bool {
        self.version_for(vertex).has_vertex(vertex, self.manager.shard_size())
    }

    #[must_use]
    pub fn has_edge(&self, src: VertexId, dst: VertexId) -> bool {
        self.version_for(src).has_edge(src, dst, self.manager.shard_size())
    }

    #[must_use]
    pub fn degree(&self, vertex: VertexId) -> usize {
        self.version_for(vertex).degree(vertex, self.manager.shard_size())
    }

    pub fn edges(&self, vertex: VertexId, f: impl FnMut(VertexId)) {
        self.version_for(vertex).for_each_neighbor(vertex, self.manager.shard_size(), f);
    }

    #[must_use]
    pub fn neighbors(&self, vertex: VertexId) -> Vec<VertexId> {
        let mut out = Vec::new();
        self.edges(vertex, |n| out.push(n));
        out
    }

    #[must_use]
    pub fn intersect(&self, a: VertexId, b: VertexId) -> Vec<VertexId> {
        let a_neighbors = self.neighbors(a);
        self.version_for(b).intersect_neighbors(b, self.manager.shard_size(), &a_neighbors)
    }

    /// Number of shard versions currently cached by this snapshot.
    #[must_use]
    pub fn cached_shard_count(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransactionManager {
        TransactionManager::new(EngineConfig::default())
    }

    #[test]
    fn write_txn_commits_vertex_and_edge() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.insert_vertex(2).unwrap();
        w.insert_edge(1, 2, true).unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert!(r.has_vertex(1));
        assert!(r.has_edge(1, 2));
        assert_eq!(r.degree(1), 1);
    }

    #[test]
    fn mixing_remove_vertex_with_other_ops_errors() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        assert!(matches!(w.remove_vertex(1, true), Err(MeshError::MixedRemoveTransaction)));
    }

    #[test]
    fn remove_vertex_rejects_subsequent_ops() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.remove_vertex(1, true).unwrap();
        assert!(matches!(w.insert_vertex(2), Err(MeshError::MixedRemoveTransaction)));
    }

    #[test]
    fn commit_after_finish_errors() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.commit().unwrap();
        // Build a second txn and abort, then attempt a push after finishing.
        let mut w2 = mgr.begin_write();
        w2.insert_vertex(2).unwrap();
        w2.abort();
        assert!(matches!(w2.insert_vertex(3), Err(MeshError::TransactionFinished)));
    }

    #[test]
    fn light_write_commits_immediately() {
        let mgr = manager();
        let lw = mgr.begin_light_write();
        lw.insert_vertex(1);
        lw.insert_vertex(2);
        lw.insert_edge(1, 2, true);

        let r = mgr.begin_read();
        assert!(r.has_edge(1, 2));
    }

    #[test]
    fn snapshot_sees_state_as_of_its_own_start() {
        let mgr = manager();
        let lw = mgr.begin_light_write();
        lw.insert_vertex(1);

        let snap = mgr.begin_snapshot();
        lw.insert_vertex(2);

        assert!(snap.has_vertex(1));
        assert!(!snap.has_vertex(2));
    }

    #[test]
    fn read_txn_count_reflects_active_pins() {
        let mgr = manager();
        assert_eq!(mgr.read_txn_count(), 0);
        let r = mgr.begin_read();
        assert_eq!(mgr.read_txn_count(), 1);
        drop(r);
        assert_eq!(mgr.read_txn_count(), 0);
    }

    #[test]
    fn intersect_finds_common_neighbors() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        for v in [1, 2, 3, 4, 5] {
            w.insert_vertex(v).unwrap();
        }
        w.insert_edge(1, 3, true).unwrap();
        w.insert_edge(1, 4, true).unwrap();
        w.insert_edge(2, 4, true).unwrap();
        w.insert_edge(2, 5, true).unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert_eq!(r.intersect(1, 2), vec![4]);
    }

    #[test]
    fn write_batch_across_two_shards_commits_atomically() {
        let mgr = manager();
        let shard_size = mgr.config().shard_size();
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.insert_vertex(shard_size + 1).unwrap();
        w.insert_edge(1, shard_size + 1, true).unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert!(r.has_vertex(1));
        assert!(r.has_vertex(shard_size + 1));
    }

    #[test]
    fn insert_edge_batch_matches_per_edge_insert() {
        let sequential_mgr = manager();
        {
            let mut w = sequential_mgr.begin_write();
            for v in 0u64..8 {
                w.insert_vertex(v).unwrap();
            }
            for &(src, dst) in &[(0u64, 10u64), (0, 20), (1, 30), (1, 40), (1, 50)] {
                w.insert_edge(src, dst, true).unwrap();
            }
            w.commit().unwrap();
        }

        let batched_mgr = manager();
        {
            let mut w = batched_mgr.begin_write();
            for v in 0u64..8 {
                w.insert_vertex(v).unwrap();
            }
            w.insert_edge_batch(&[(0, 10), (0, 20), (1, 30), (1, 40), (1, 50)], true).unwrap();
            w.commit().unwrap();
        }

        let seq_r = sequential_mgr.begin_read();
        let batch_r = batched_mgr.begin_read();
        assert_eq!(seq_r.neighbors(0), batch_r.neighbors(0));
        assert_eq!(seq_r.neighbors(1), batch_r.neighbors(1));
    }

    #[test]
    fn insert_edge_batch_below_threshold_still_lands() {
        let mut cfg = EngineConfig::default();
        cfg.batch_update_enable_threshold = 1_000_000;
        let mgr = TransactionManager::new(cfg);
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.insert_edge_batch(&[(1, 2), (1, 3)], true).unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert_eq!(r.neighbors(1), vec![2, 3]);
    }

    #[test]
    fn insert_vertex_batch_registers_every_vertex() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.insert_vertex_batch(&[1, 2, 3]).unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert!(r.has_vertex(1));
        assert!(r.has_vertex(2));
        assert!(r.has_vertex(3));
    }

    #[test]
    fn undirected_insert_edge_mirrors_both_directions() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.insert_vertex(2).unwrap();
        w.insert_edge(1, 2, false).unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert!(r.has_edge(1, 2));
        assert!(r.has_edge(2, 1));
    }

    #[test]
    fn undirected_light_insert_edge_locks_both_shards() {
        let mgr = manager();
        let shard_size = mgr.config().shard_size();
        let lw = mgr.begin_light_write();
        lw.insert_vertex(1);
        lw.insert_vertex(shard_size + 1);
        lw.insert_edge(1, shard_size + 1, false);

        let r = mgr.begin_read();
        assert!(r.has_edge(1, shard_size + 1));
        assert!(r.has_edge(shard_size + 1, 1));
    }

    #[test]
    fn undirected_remove_vertex_clears_reverse_edges() {
        let mgr = manager();
        let lw = mgr.begin_light_write();
        lw.insert_vertex(1);
        lw.insert_vertex(2);
        lw.insert_vertex(3);
        lw.insert_edge(1, 2, false);
        lw.insert_edge(1, 3, false);

        lw.remove_vertex(1, false);

        let r = mgr.begin_read();
        assert!(!r.has_vertex(1));
        assert!(!r.has_edge(2, 1));
        assert!(!r.has_edge(3, 1));
    }

    #[test]
    fn directed_remove_vertex_leaves_reverse_edges() {
        let mgr = manager();
        let lw = mgr.begin_light_write();
        lw.insert_vertex(1);
        lw.insert_vertex(2);
        lw.insert_edge(1, 2, false);

        lw.remove_vertex(1, true);

        let r = mgr.begin_read();
        assert!(!r.has_vertex(1));
        assert!(r.has_edge(2, 1));
    }

    #[test]
    fn vertex_string_property_round_trips_through_write_and_light_write() {
        let mut cfg = EngineConfig::default();
        cfg.vertex_string_property_num = 1;
        let mgr = TransactionManager::new(cfg);
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.set_vertex_string_property(1, 0, "alice").unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert_eq!(r.get_vertex_string_property(1, 0).as_deref(), Some("alice"));

        let lw = mgr.begin_light_write();
        lw.set_vertex_string_property(1, 0, "alice-updated");
        let r2 = mgr.begin_read();
        assert_eq!(r2.get_vertex_string_property(1, 0).as_deref(), Some("alice-updated"));
    }

    #[test]
    fn edge_string_property_round_trips() {
        let mgr = manager();
        let mut w = mgr.begin_write();
        w.insert_vertex(1).unwrap();
        w.insert_vertex(2).unwrap();
        w.insert_edge(1, 2, true).unwrap();
        w.set_edge_string_property(1, 2, 0, "since-2020").unwrap();
        w.commit().unwrap();

        let r = mgr.begin_read();
        assert_eq!(r.get_edge_string_property(1, 2, 0).as_deref(), Some("since-2020"));
    }
}

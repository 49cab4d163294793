// HNSW-based Approximate Nearest Neighbor Search
//
// An HNSW (Hierarchical Navigable Small World) vector store. The graph does
// not support node removal, so deletes and replacements leave tombstones that
// are filtered from results; records are retained alongside the graph so a
// rebuild can re-insert the live set once tombstones pile up.

use crate::vector::{sort_candidates, validate_vector, Candidate, EmbeddingRecord, MetadataPredicate, VectorError, VectorStore};
use leparse::symbol::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

pub use hnsw_rs::prelude::{DistCosine, Hnsw, Neighbour};

/// HNSW construction and search parameters
///
/// These parameters control the trade-off between accuracy and performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Number of bidirectional links for each node in the graph
    /// Typical range: 8-32, default: 16
    pub m: usize,

    /// Number of neighbors to consider during construction
    /// Typical range: 100-400, default: 200
    pub ef_construction: usize,

    /// Number of neighbors to consider during search
    /// Typical range: 10-100, default: 50
    pub ef_search: usize,

    /// Maximum number of elements the graph is sized for
    pub max_elements: usize,

    /// Maximum number of layers in the HNSW graph
    pub max_layer: usize,

    /// Rebuild once tombstones exceed this fraction of live records
    pub rebuild_ratio: f32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_elements: 100_000,
            max_layer: 16,
            rebuild_ratio: 0.5,
        }
    }
}

impl HnswParams {
    /// Set the number of neighbors per node
    #[must_use]
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Set the search ef parameter
    #[must_use]
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set the maximum number of elements
    #[must_use]
    pub fn with_max_elements(mut self, max: usize) -> Self {
        self.max_elements = max;
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<(), VectorError> {
        if self.m == 0 {
            return Err(VectorError::InvalidParameter("m must be > 0".to_string()));
        }
        if self.ef_construction < self.m {
            return Err(VectorError::InvalidParameter("ef_construction must be >= m".to_string()));
        }
        if self.ef_search == 0 {
            return Err(VectorError::InvalidParameter("ef_search must be > 0".to_string()));
        }
        if self.max_elements == 0 {
            return Err(VectorError::InvalidParameter("max_elements must be > 0".to_string()));
        }
        if self.max_layer == 0 {
            return Err(VectorError::InvalidParameter("max_layer must be > 0".to_string()));
        }
        if !(self.rebuild_ratio > 0.0) {
            return Err(VectorError::InvalidParameter("rebuild_ratio must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Statistics from a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
    /// Live records re-inserted
    pub active: usize,
    /// Tombstones dropped
    pub deleted: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Approximate vector store over an HNSW graph (no filter pushdown)
pub struct HnswVectorStore {
    hnsw: Hnsw<f32, DistCosine>,
    /// Internal id -> symbol id for live entries
    id_map: HashMap<usize, SymbolId>,
    /// Symbol id -> internal id
    reverse_map: HashMap<SymbolId, usize>,
    /// Live records, retained for rebuilds and `get`
    records: HashMap<SymbolId, EmbeddingRecord>,
    /// Tombstoned internal ids still present in the graph
    deleted: HashSet<usize>,
    next_id: usize,
    dimension: usize,
    params: HnswParams,
}

impl HnswVectorStore {
    /// Create a store with default parameters
    pub fn new(dimension: usize) -> Self {
        Self::with_params(dimension, HnswParams::default())
    }

    /// Create a store with custom parameters; invalid parameters fall back to defaults
    pub fn with_params(dimension: usize, params: HnswParams) -> Self {
        let params = match params.validate() {
            Ok(()) => params,
            Err(e) => {
                warn!(error = %e, "Invalid HNSW params, using defaults");
                HnswParams::default()
            }
        };
        Self {
            hnsw: Self::graph(&params),
            id_map: HashMap::new(),
            reverse_map: HashMap::new(),
            records: HashMap::new(),
            deleted: HashSet::new(),
            next_id: 0,
            dimension,
            params,
        }
    }

    fn graph(params: &HnswParams) -> Hnsw<f32, DistCosine> {
        Hnsw::new(
            params.m,
            params.max_elements,
            params.max_layer,
            params.ef_construction,
            DistCosine {},
        )
    }

    /// Parameters in use
    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Tombstones currently in the graph
    pub fn tombstones(&self) -> usize {
        self.deleted.len()
    }

    fn insert_graph(&mut self, id: SymbolId, vector: &[f32]) {
        let internal_id = self.next_id;
        self.next_id += 1;
        let data = vector.to_vec();
        self.hnsw.insert((&data, internal_id));
        self.id_map.insert(internal_id, id.clone());
        self.reverse_map.insert(id, internal_id);
    }

    fn tombstone(&mut self, id: &SymbolId) -> bool {
        match self.reverse_map.remove(id) {
            Some(internal_id) => {
                self.id_map.remove(&internal_id);
                self.deleted.insert(internal_id);
                true
            }
            None => false,
        }
    }

    fn needs_rebuild(&self) -> bool {
        let live = self.records.len().max(1) as f32;
        self.deleted.len() as f32 / live > self.params.rebuild_ratio || self.next_id >= self.params.max_elements
    }

    /// Rebuild the graph from the retained live records, dropping tombstones
    pub fn rebuild(&mut self) -> RebuildStats {
        let start = std::time::Instant::now();
        let deleted = self.deleted.len();

        self.hnsw = Self::graph(&self.params);
        self.id_map.clear();
        self.reverse_map.clear();
        self.deleted.clear();
        self.next_id = 0;

        let mut live: Vec<(SymbolId, Vec<f32>)> = self
            .records
            .values()
            .map(|r| (r.id.clone(), r.vector.clone()))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, vector) in &live {
            self.insert_graph(id.clone(), vector);
        }

        let stats = RebuildStats {
            active: live.len(),
            deleted,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            active = stats.active,
            deleted = stats.deleted,
            duration_ms = stats.duration_ms,
            "HNSW rebuild complete"
        );
        stats
    }
}

impl VectorStore for HnswVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(&mut self, record: EmbeddingRecord) -> Result<(), VectorError> {
        validate_vector(&record.vector, self.dimension)?;
        self.tombstone(&record.id);
        self.insert_graph(record.id.clone(), &record.vector);
        self.records.insert(record.id.clone(), record);
        if self.needs_rebuild() {
            self.rebuild();
        }
        Ok(())
    }

    fn delete(&mut self, id: &SymbolId) -> bool {
        let existed = self.records.remove(id).is_some();
        self.tombstone(id);
        if existed && self.needs_rebuild() {
            self.rebuild();
        }
        existed
    }

    fn search(&self, query: &[f32], k: usize, filter: Option<MetadataPredicate<'_>>) -> Result<Vec<Candidate>, VectorError> {
        validate_vector(query, self.dimension)?;
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // Tombstones still occupy graph slots, so ask for enough to cover them
        let want = k.saturating_add(self.deleted.len()).min(self.next_id);
        let ef_search = self.params.ef_search.max(want);
        let neighbours = self.hnsw.search(query, want, ef_search);

        let mut output = Vec::with_capacity(neighbours.len());
        for neighbour in neighbours {
            if self.deleted.contains(&neighbour.d_id) {
                continue;
            }
            let Some(id) = self.id_map.get(&neighbour.d_id) else {
                continue;
            };
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if let Some(predicate) = filter {
                if !predicate(&record.metadata) {
                    continue;
                }
            }
            // DistCosine distance is 1 - cosine similarity
            output.push(Candidate {
                id: id.clone(),
                similarity: 1.0 - neighbour.distance,
                metadata: record.metadata.clone(),
            });
        }
        sort_candidates(&mut output);
        output.truncate(k);
        debug!(k, returned = output.len(), "HNSW search");
        Ok(output)
    }

    fn supports_filter_pushdown(&self) -> bool {
        false
    }

    fn get(&self, id: &SymbolId) -> Option<&EmbeddingRecord> {
        self.records.get(id)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

impl Default for HnswVectorStore {
    fn default() -> Self {
        Self::new(crate::embedding::DEFAULT_DIMENSION)
    }
}

//! Candidate access paths
//!
//! A `Path` is one fully costed way of producing the rows of a relation.
//! Paths generated for a compressed chunk are handed to the plan selection
//! engine through `RelInfo::pathlist` / `RelInfo::partial_pathlist`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tscomp_common::{RelId, Relids};
use tscomp_sql::{sort_keys_contained_in, RestrictInfo, SortKey};

/// Strategy of a decompression path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecompressStrategy {
    /// Decompress batches in sub-scan order, no ordering promised
    Plain,
    /// Batches arrive pre-ordered; rows are emitted as decompressed
    Pushdown,
    /// Heap merge of individually ordered batches
    SortedMerge,
}

impl fmt::Display for DecompressStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompressStrategy::Plain => write!(f, "Plain"),
            DecompressStrategy::Pushdown => write!(f, "Pushdown"),
            DecompressStrategy::SortedMerge => write!(f, "SortedMerge"),
        }
    }
}

/// Parameterization of a path: outer relations it needs values from and
/// the join clauses evaluated with those values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamInfo {
    pub req_outer: Relids,
    pub clauses: Vec<RestrictInfo>,
}

impl ParamInfo {
    pub fn new(req_outer: Relids, clauses: Vec<RestrictInfo>) -> Self {
        Self { req_outer, clauses }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    SeqScan,
    IndexScan { index: String },
    BitmapHeapScan,
}

/// A scan produced by the storage layer
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPath {
    pub relid: RelId,
    pub kind: ScanKind,
    pub rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    /// Average row width in bytes
    pub width: usize,
    pub sort_keys: Vec<SortKey>,
    pub param_info: Option<ParamInfo>,
    pub parallel_workers: usize,
    pub parallel_safe: bool,
}

impl ScanPath {
    pub fn seq_scan(relid: RelId, rows: f64, total_cost: f64) -> Self {
        Self {
            relid,
            kind: ScanKind::SeqScan,
            rows,
            startup_cost: 0.0,
            total_cost,
            width: 32,
            sort_keys: vec![],
            param_info: None,
            parallel_workers: 0,
            parallel_safe: false,
        }
    }

    pub fn index_scan(relid: RelId, index: impl Into<String>, rows: f64, total_cost: f64) -> Self {
        Self {
            kind: ScanKind::IndexScan {
                index: index.into(),
            },
            ..Self::seq_scan(relid, rows, total_cost)
        }
    }

    pub fn with_sort_keys(mut self, sort_keys: Vec<SortKey>) -> Self {
        self.sort_keys = sort_keys;
        self
    }

    pub fn with_param_info(mut self, param_info: ParamInfo) -> Self {
        self.param_info = Some(param_info);
        self
    }

    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self.parallel_safe = true;
        self
    }
}

/// Decompression of a compressed sub-scan into chunk rows
#[derive(Debug, Clone, PartialEq)]
pub struct DecompressChunkPath {
    pub chunk_relid: RelId,
    pub strategy: DecompressStrategy,
    pub rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    /// Ordering delivered to the parent
    pub sort_keys: Vec<SortKey>,
    /// Ordering the sub-scan must deliver for a pushdown
    pub compressed_sort_keys: Vec<SortKey>,
    pub reverse: bool,
    pub needs_sequence_num: bool,
    pub parallel_safe: bool,
    pub parallel_workers: usize,
    pub child: Box<Path>,
}

impl DecompressChunkPath {
    pub fn req_outer(&self) -> Relids {
        self.child.req_outer()
    }
}

/// Unordered concatenation of its children
#[derive(Debug, Clone, PartialEq)]
pub struct AppendPath {
    pub relid: RelId,
    pub children: Vec<Path>,
    pub rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub req_outer: Relids,
    pub parallel_workers: usize,
    pub parallel_safe: bool,
}

/// Order-preserving merge of its children
#[derive(Debug, Clone, PartialEq)]
pub struct MergeAppendPath {
    pub relid: RelId,
    pub children: Vec<Path>,
    pub sort_keys: Vec<SortKey>,
    pub rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub req_outer: Relids,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Path {
    Scan(ScanPath),
    DecompressChunk(DecompressChunkPath),
    Append(AppendPath),
    MergeAppend(MergeAppendPath),
}

impl Path {
    pub fn rows(&self) -> f64 {
        match self {
            Path::Scan(p) => p.rows,
            Path::DecompressChunk(p) => p.rows,
            Path::Append(p) => p.rows,
            Path::MergeAppend(p) => p.rows,
        }
    }

    pub fn startup_cost(&self) -> f64 {
        match self {
            Path::Scan(p) => p.startup_cost,
            Path::DecompressChunk(p) => p.startup_cost,
            Path::Append(p) => p.startup_cost,
            Path::MergeAppend(p) => p.startup_cost,
        }
    }

    pub fn total_cost(&self) -> f64 {
        match self {
            Path::Scan(p) => p.total_cost,
            Path::DecompressChunk(p) => p.total_cost,
            Path::Append(p) => p.total_cost,
            Path::MergeAppend(p) => p.total_cost,
        }
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        match self {
            Path::Scan(p) => &p.sort_keys,
            Path::DecompressChunk(p) => &p.sort_keys,
            Path::Append(_) => &[],
            Path::MergeAppend(p) => &p.sort_keys,
        }
    }

    pub fn req_outer(&self) -> Relids {
        match self {
            Path::Scan(p) => p
                .param_info
                .as_ref()
                .map(|pi| pi.req_outer)
                .unwrap_or_default(),
            Path::DecompressChunk(p) => p.req_outer(),
            Path::Append(p) => p.req_outer,
            Path::MergeAppend(p) => p.req_outer,
        }
    }

    pub fn param_info(&self) -> Option<&ParamInfo> {
        match self {
            Path::Scan(p) => p.param_info.as_ref(),
            Path::DecompressChunk(p) => p.child.param_info(),
            _ => None,
        }
    }

    pub fn parallel_workers(&self) -> usize {
        match self {
            Path::Scan(p) => p.parallel_workers,
            Path::DecompressChunk(p) => p.parallel_workers,
            Path::Append(p) => p.parallel_workers,
            Path::MergeAppend(_) => 0,
        }
    }

    pub fn parallel_safe(&self) -> bool {
        match self {
            Path::Scan(p) => p.parallel_safe,
            Path::DecompressChunk(p) => p.parallel_safe,
            Path::Append(p) => p.parallel_safe,
            Path::MergeAppend(_) => false,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Path::Scan(p) => p.width,
            Path::DecompressChunk(p) => p.child.width(),
            Path::Append(p) => p.children.iter().map(|c| c.width()).max().unwrap_or(0),
            Path::MergeAppend(p) => p.children.iter().map(|c| c.width()).max().unwrap_or(0),
        }
    }

    pub fn is_parameterized_bitmap_scan(&self) -> bool {
        matches!(
            self,
            Path::Scan(ScanPath {
                kind: ScanKind::BitmapHeapScan,
                param_info: Some(_),
                ..
            })
        )
    }

    pub fn as_decompress(&self) -> Option<&DecompressChunkPath> {
        match self {
            Path::DecompressChunk(p) => Some(p),
            _ => None,
        }
    }

    /// Strategy of the decompression this path is built around, if any
    pub fn strategy(&self) -> Option<DecompressStrategy> {
        match self {
            Path::DecompressChunk(p) => Some(p.strategy),
            Path::Append(p) => p.children.iter().find_map(|c| c.strategy()),
            Path::MergeAppend(p) => p.children.iter().find_map(|c| c.strategy()),
            Path::Scan(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostCriterion {
    Startup,
    Total,
}

/// Cheapest path that delivers `required` ordering and needs no outer
/// relation beyond `req_outer`
pub fn get_cheapest_path_for_sort_keys<'a>(
    paths: &'a [Path],
    required: &[SortKey],
    req_outer: Relids,
    criterion: CostCriterion,
    require_parallel_safe: bool,
) -> Option<&'a Path> {
    let cost = |p: &Path| match criterion {
        CostCriterion::Startup => p.startup_cost(),
        CostCriterion::Total => p.total_cost(),
    };
    paths
        .iter()
        .filter(|p| !require_parallel_safe || p.parallel_safe())
        .filter(|p| p.req_outer().is_subset_of(req_outer))
        .filter(|p| sort_keys_contained_in(required, p.sort_keys()))
        .fold(None, |best: Option<&Path>, p| match best {
            Some(b) if cost(b) <= cost(p) => Some(b),
            _ => Some(p),
        })
}

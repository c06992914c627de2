//! Candidate Plan Generator
//!
//! Builds every decompression candidate of one compressed chunk from the
//! sub-scans the scan layer offers for its compressed relation, and
//! replaces the chunk's path lists with them. Choosing among the candidates
//! is left to the plan selection engine.

use crate::context::PlannerContext;
use crate::cost::{Cost, CostModel, Estimate};
use crate::paths::{
    get_cheapest_path_for_sort_keys, AppendPath, CostCriterion, DecompressChunkPath,
    DecompressStrategy, MergeAppendPath, ParamInfo, Path, ScanKind,
};
use crate::qual_pushdown::push_down_quals;
use crate::sort_info::{build_sort_info, sorted_merge_eligibility, MergeEligibility, SortInfo};
use crate::translate::{build_compression_info, setup_compressed_rel, CompressionInfo};
use tracing::{debug, info, warn};
use tscomp_catalog::CompressionCatalog;
use tscomp_common::{RelId, Relids, Result, TscompError};
use tscomp_sql::{sort_keys_contained_in, Expr, RestrictInfo, SortKey};

// ============================================================================
// ScanPathProvider - Sub-scans of the compressed relation
// ============================================================================

/// Access to the scan layer for the compressed relation
pub trait ScanPathProvider: Send + Sync {
    /// Row estimate of the compressed relation after its pushed-down filters;
    /// one row is one batch.
    fn estimate_rows(&self, ctx: &PlannerContext, compressed_relid: RelId) -> Result<f64>;

    /// Admissible sub-scans. `compressed_sort_keys` is the ordering a
    /// pushdown would like the sub-scan to deliver.
    fn scan_paths(
        &self,
        ctx: &PlannerContext,
        compressed_relid: RelId,
        compressed_sort_keys: &[SortKey],
        include_index: bool,
    ) -> Result<Vec<Path>>;

    /// Sub-scans that can run under parallel workers
    fn partial_scan_paths(&self, ctx: &PlannerContext, compressed_relid: RelId) -> Result<Vec<Path>>;

    /// Same path, parameterized by `req_outer`. Failure is reported as
    /// `ReparameterizationFailure`.
    fn reparameterize(&self, ctx: &PlannerContext, path: &Path, req_outer: Relids) -> Result<Path>;
}

/// Provider handing out a fixed set of scans, retargeted at the compressed
/// relation being planned. Only sequential scans can be reparameterized.
#[derive(Debug, Clone, Default)]
pub struct StaticScanPathProvider {
    pub rows: f64,
    pub paths: Vec<Path>,
    pub partial_paths: Vec<Path>,
}

impl StaticScanPathProvider {
    pub fn new(rows: f64) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.paths.push(path);
        self
    }

    pub fn with_partial_path(mut self, path: Path) -> Self {
        self.partial_paths.push(path);
        self
    }

    fn retarget(path: &Path, relid: RelId) -> Path {
        match path {
            Path::Scan(scan) => {
                let mut scan = scan.clone();
                scan.relid = relid;
                Path::Scan(scan)
            }
            other => other.clone(),
        }
    }
}

impl ScanPathProvider for StaticScanPathProvider {
    fn estimate_rows(&self, _ctx: &PlannerContext, _compressed_relid: RelId) -> Result<f64> {
        Ok(self.rows)
    }

    fn scan_paths(
        &self,
        _ctx: &PlannerContext,
        compressed_relid: RelId,
        _compressed_sort_keys: &[SortKey],
        include_index: bool,
    ) -> Result<Vec<Path>> {
        Ok(self
            .paths
            .iter()
            .filter(|p| {
                include_index
                    || !matches!(p, Path::Scan(s) if matches!(s.kind, ScanKind::IndexScan { .. }))
            })
            .map(|p| Self::retarget(p, compressed_relid))
            .collect())
    }

    fn partial_scan_paths(&self, _ctx: &PlannerContext, compressed_relid: RelId) -> Result<Vec<Path>> {
        Ok(self
            .partial_paths
            .iter()
            .map(|p| Self::retarget(p, compressed_relid))
            .collect())
    }

    fn reparameterize(&self, _ctx: &PlannerContext, path: &Path, req_outer: Relids) -> Result<Path> {
        match path {
            Path::Scan(scan) if scan.kind == ScanKind::SeqScan => {
                let mut scan = scan.clone();
                scan.param_info = (!req_outer.is_empty()).then(|| ParamInfo::new(req_outer, vec![]));
                Ok(Path::Scan(scan))
            }
            Path::Scan(scan) => Err(TscompError::ReparameterizationFailure(format!(
                "{:?} cannot be parameterized by {}",
                scan.kind, req_outer
            ))),
            _ => Err(TscompError::ReparameterizationFailure(format!(
                "composite path cannot be parameterized by {}",
                req_outer
            ))),
        }
    }
}

// ============================================================================
// Path generation
// ============================================================================

/// Plan the decompression of `chunk_relid`.
///
/// On success the chunk's `pathlist` and `partial_pathlist` hold the
/// decompression candidates; whatever they held before is treated as the
/// paths of the uncompressed rows of a partially compressed chunk.
pub fn generate_paths(
    ctx: &mut PlannerContext,
    catalog: &dyn CompressionCatalog,
    provider: &dyn ScanPathProvider,
    chunk_relid: RelId,
    chunk_id: i32,
) -> Result<CompressionInfo> {
    let info = build_compression_info(ctx, catalog, chunk_relid, chunk_id)?;
    let requirement = ctx.query_sort_keys.clone();

    let sort_info = build_sort_info(ctx, &info, &requirement)?;
    let merge = if ctx.config.enable_decompression_sorted_merge && !sort_info.can_pushdown_sort {
        sorted_merge_eligibility(ctx, &info, &requirement)?
    } else {
        MergeEligibility::NotPossible
    };

    let (uncompressed, uncompressed_partial) = {
        let chunk = ctx.rel_mut(chunk_relid)?;
        (
            std::mem::take(&mut chunk.pathlist),
            std::mem::take(&mut chunk.partial_pathlist),
        )
    };

    setup_compressed_rel(
        ctx,
        &info,
        sort_info.needs_sequence_num || merge.is_mergeable(),
    )?;
    push_down_quals(ctx, &info)?;
    set_row_estimates(ctx, provider, &info)?;

    let sub_scans = provider.scan_paths(
        ctx,
        info.compressed_relid,
        &sort_info.compressed_sort_keys,
        ctx.config.enable_compression_indexscan,
    )?;
    let consider_parallel = ctx.rel(chunk_relid)?.consider_parallel;
    let partial_sub_scans = if consider_parallel {
        provider.partial_scan_paths(ctx, info.compressed_relid)?
    } else {
        vec![]
    };

    let generator = CandidateGenerator {
        ctx: &*ctx,
        provider,
        info: &info,
        sort_info: &sort_info,
        merge,
        requirement: &requirement,
        model: CostModel::new(ctx.config.cost.clone()),
        parent_relids: ctx.parent_relids(chunk_relid),
        uncompressed: &uncompressed,
        uncompressed_partial: &uncompressed_partial,
    };

    let mut pathlist = vec![];
    for child in &sub_scans {
        if generator.prune(child) {
            continue;
        }
        pathlist.extend(generator.candidates(child)?);
    }

    let mut partial_pathlist = vec![];
    for child in &partial_sub_scans {
        if let Some(path) = generator.parallel_candidate(child) {
            partial_pathlist.push(path);
        }
    }

    if pathlist.is_empty() {
        return Err(TscompError::Internal(
            "could not create decompression path".to_string(),
        ));
    }

    info!(
        "chunk {}: {} decompression candidates ({} parallel) from {} sub-scans, pushdown: {}, merge: {:?}",
        chunk_relid,
        pathlist.len(),
        partial_pathlist.len(),
        sub_scans.len(),
        sort_info.can_pushdown_sort,
        merge
    );

    {
        let compressed = ctx.rel_mut(info.compressed_relid)?;
        compressed.pathlist = sub_scans;
        compressed.partial_pathlist = partial_sub_scans;
    }
    let chunk = ctx.rel_mut(chunk_relid)?;
    chunk.pathlist = pathlist;
    chunk.partial_pathlist = partial_pathlist;

    Ok(info)
}

/// The chunk yields one batch worth of rows per compressed row. An append
/// member passes the change on to its parent.
fn set_row_estimates(
    ctx: &mut PlannerContext,
    provider: &dyn ScanPathProvider,
    info: &CompressionInfo,
) -> Result<()> {
    let compressed_rows = provider.estimate_rows(ctx, info.compressed_relid)?;
    ctx.rel_mut(info.compressed_relid)?.rows = compressed_rows;

    let new_rows = compressed_rows * ctx.config.cost.batch_size;
    let (old_rows, parent) = {
        let chunk = ctx.rel(info.chunk_relid)?;
        (chunk.rows, chunk.parent())
    };
    if !info.single_chunk {
        if let Some(parent) = parent {
            ctx.rel_mut(parent)?.rows += new_rows - old_rows;
        }
    }
    ctx.rel_mut(info.chunk_relid)?.rows = new_rows;
    Ok(())
}

struct CandidateGenerator<'a> {
    ctx: &'a PlannerContext,
    provider: &'a dyn ScanPathProvider,
    info: &'a CompressionInfo,
    sort_info: &'a SortInfo,
    merge: MergeEligibility,
    requirement: &'a [SortKey],
    model: CostModel,
    parent_relids: Relids,
    uncompressed: &'a [Path],
    uncompressed_partial: &'a [Path],
}

impl CandidateGenerator<'_> {
    /// Sub-scans whose parameterization cannot be expressed on the chunk
    fn prune(&self, child: &Path) -> bool {
        if child.is_parameterized_bitmap_scan() {
            debug!("skipping parameterized bitmap scan of {}", self.info.compressed_relid);
            return true;
        }

        let req_outer = child.req_outer();
        if req_outer.contains(self.info.chunk_relid) {
            debug!("dropping sub-scan parameterized by its own chunk: {}", req_outer);
            return true;
        }
        if !self.info.single_chunk && req_outer.overlaps(self.parent_relids) {
            debug!("dropping sub-scan parameterized by a parent of the chunk: {}", req_outer);
            return true;
        }

        let Some(param_info) = child.param_info() else {
            return false;
        };
        if param_info
            .clauses
            .iter()
            .any(|ri| self.references_payload(ri))
        {
            debug!("dropping sub-scan whose join clauses reference compressed payload");
            return true;
        }
        false
    }

    fn references_payload(&self, ri: &RestrictInfo) -> bool {
        let on_payload = |expr: &Expr| {
            expr.get_columns().iter().any(|c| {
                c.relid == self.info.compressed_relid && self.info.is_payload_column(c.attno)
            })
        };
        if on_payload(&ri.clause) {
            return true;
        }
        [ri.left_em, ri.right_em]
            .into_iter()
            .flatten()
            .filter_map(|em| self.ctx.equivalence.member(em))
            .any(|member| on_payload(&member.expr))
    }

    fn candidates(&self, child: &Path) -> Result<Vec<Path>> {
        let mut candidates = vec![self.plain(child)];
        if self.sort_info.can_pushdown_sort {
            candidates.push(self.pushdown(child));
        }
        if self.merge.is_mergeable() {
            candidates.push(self.sorted_merge(child));
        }

        if !self.info.status.is_partial() {
            return Ok(candidates);
        }
        let mut composed = vec![];
        for candidate in candidates {
            if let Some(path) = self.compose_partial(candidate)? {
                composed.push(path);
            }
        }
        Ok(composed)
    }

    fn decompress(
        &self,
        child: &Path,
        strategy: DecompressStrategy,
        estimate: Estimate,
    ) -> DecompressChunkPath {
        DecompressChunkPath {
            chunk_relid: self.info.chunk_relid,
            strategy,
            rows: estimate.rows,
            startup_cost: estimate.cost.startup,
            total_cost: estimate.cost.total,
            sort_keys: vec![],
            compressed_sort_keys: vec![],
            reverse: false,
            needs_sequence_num: false,
            parallel_safe: child.parallel_safe(),
            parallel_workers: 0,
            child: Box::new(child.clone()),
        }
    }

    fn plain(&self, child: &Path) -> Path {
        let estimate = self.model.decompress_plain(child.rows(), cost_of(child));
        let path = self.decompress(child, DecompressStrategy::Plain, estimate);
        debug!(
            "plain candidate: rows {:.0}, cost {:.2}..{:.2}",
            path.rows, path.startup_cost, path.total_cost
        );
        Path::DecompressChunk(path)
    }

    fn pushdown(&self, child: &Path) -> Path {
        let compressed_sort_keys = &self.sort_info.compressed_sort_keys;
        let input = if sort_keys_contained_in(compressed_sort_keys, child.sort_keys()) {
            cost_of(child)
        } else {
            self.model
                .sort(child.total_cost(), child.rows(), child.width())
        };
        let estimate = self.model.decompress_plain(child.rows(), input);

        let mut path = self.decompress(child, DecompressStrategy::Pushdown, estimate);
        path.sort_keys = self.requirement.to_vec();
        path.compressed_sort_keys = compressed_sort_keys.clone();
        path.reverse = self.sort_info.reverse;
        path.needs_sequence_num = self.sort_info.needs_sequence_num;
        debug!(
            "pushdown candidate: reverse {}, cost {:.2}..{:.2}",
            path.reverse, path.startup_cost, path.total_cost
        );
        Path::DecompressChunk(path)
    }

    fn sorted_merge(&self, child: &Path) -> Path {
        let estimate = self
            .model
            .decompress_sorted_merge(child.rows(), cost_of(child), child.width());

        let mut path = self.decompress(child, DecompressStrategy::SortedMerge, estimate);
        path.sort_keys = self.requirement.to_vec();
        path.reverse = self.merge == MergeEligibility::Backward;
        path.needs_sequence_num = true;
        path.parallel_safe = false;
        debug!(
            "sorted merge candidate over {:.0} batches: cost {:.2}..{:.2}",
            child.rows(),
            path.startup_cost,
            path.total_cost
        );
        Path::DecompressChunk(path)
    }

    /// Combine a candidate with the uncompressed rows of the chunk
    fn compose_partial(&self, candidate: Path) -> Result<Option<Path>> {
        let req_outer = candidate.req_outer();
        let Some(cheapest) = get_cheapest_path_for_sort_keys(
            self.uncompressed,
            &[],
            req_outer,
            CostCriterion::Total,
            false,
        ) else {
            warn!(
                "partially compressed chunk {} has no path for its uncompressed rows",
                self.info.chunk_relid
            );
            return Ok(None);
        };

        let uncompressed = if cheapest.req_outer() == req_outer {
            cheapest.clone()
        } else {
            match self.provider.reparameterize(self.ctx, cheapest, req_outer) {
                Ok(path) => path,
                Err(e) if !e.is_fatal() => {
                    debug!("dropping {:?} candidate: {}", candidate.strategy(), e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        };

        if candidate.sort_keys().is_empty() {
            let children = vec![candidate, uncompressed];
            let estimate = self.model.append(&children);
            return Ok(Some(Path::Append(AppendPath {
                relid: self.info.chunk_relid,
                children,
                rows: estimate.rows,
                startup_cost: estimate.cost.startup,
                total_cost: estimate.cost.total,
                req_outer,
                parallel_workers: 0,
                parallel_safe: false,
            })));
        }

        let sort_keys = candidate.sort_keys().to_vec();
        let children = vec![candidate, uncompressed];
        let mut input = Cost::default();
        for child in &children {
            // unsorted inputs get an explicit sort below the merge
            let cost = if sort_keys_contained_in(&sort_keys, child.sort_keys()) {
                cost_of(child)
            } else {
                self.model
                    .sort(child.total_cost(), child.rows(), child.width())
            };
            input.startup += cost.startup;
            input.total += cost.total;
        }
        let rows: f64 = children.iter().map(|c| c.rows()).sum();
        let cost = self.model.merge_append(children.len(), input, rows);

        Ok(Some(Path::MergeAppend(MergeAppendPath {
            relid: self.info.chunk_relid,
            children,
            sort_keys,
            rows,
            startup_cost: cost.startup,
            total_cost: cost.total,
            req_outer,
        })))
    }

    fn parallel_candidate(&self, child: &Path) -> Option<Path> {
        let req_outer = child.req_outer();
        if req_outer.contains(self.info.chunk_relid)
            || (!self.info.single_chunk && req_outer.overlaps(self.parent_relids))
        {
            debug!("dropping parallel sub-scan parameterized by {}", req_outer);
            return None;
        }

        let workers = child.parallel_workers();
        let estimate = self.model.decompress_plain(child.rows(), cost_of(child));
        let mut path = self.decompress(child, DecompressStrategy::Plain, estimate);
        path.parallel_workers = workers;
        path.parallel_safe = workers > 0;
        let path = Path::DecompressChunk(path);

        if !self.info.status.is_partial() {
            return Some(path);
        }

        let uncompressed = get_cheapest_path_for_sort_keys(
            self.uncompressed_partial,
            &[],
            Relids::new(),
            CostCriterion::Total,
            true,
        )
        .or_else(|| {
            get_cheapest_path_for_sort_keys(
                self.uncompressed,
                &[],
                Relids::new(),
                CostCriterion::Total,
                false,
            )
        });
        let Some(uncompressed) = uncompressed else {
            warn!(
                "partially compressed chunk {} has no path for its uncompressed rows",
                self.info.chunk_relid
            );
            return None;
        };

        let parallel_workers = workers.max(uncompressed.parallel_workers());
        let children = vec![path, uncompressed.clone()];
        let estimate = self.model.append(&children);
        Some(Path::Append(AppendPath {
            relid: self.info.chunk_relid,
            children,
            rows: estimate.rows,
            startup_cost: estimate.cost.startup,
            total_cost: estimate.cost.total,
            req_outer: Relids::new(),
            parallel_workers,
            parallel_safe: true,
        }))
    }
}

fn cost_of(path: &Path) -> Cost {
    Cost::new(path.startup_cost(), path.total_cost())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RelKind;
    use crate::paths::ScanPath;
    use arrow_schema::DataType;
    use tscomp_catalog::{
        ChunkStatus, ColumnCompressionInfo, CompressionSettings, InMemoryCompressionCatalog,
        RelationSchema,
    };
    use tscomp_common::{AttrNumber, PlannerConfig};
    use tscomp_sql::{BinaryOperator, EquivalenceMemberRef};

    const TIME: AttrNumber = 1;
    const DEVICE: AttrNumber = 2;
    const VALUE: AttrNumber = 3;

    // compressed layout: time, device_id, value, count, sequence number, min, max
    const C_DEVICE: AttrNumber = 2;
    const C_VALUE: AttrNumber = 3;
    const C_SEQ: AttrNumber = 5;

    fn chunk_schema() -> RelationSchema {
        RelationSchema::new("_hyper_1_1_chunk")
            .with_column("time", DataType::Int64)
            .with_column("device_id", DataType::Int32)
            .with_column("value", DataType::Float64)
    }

    fn catalog(status: ChunkStatus) -> InMemoryCompressionCatalog {
        let catalog = InMemoryCompressionCatalog::new();
        catalog
            .register_settings(
                CompressionSettings::try_new(
                    1,
                    vec![
                        ColumnCompressionInfo::order_key("time", 1, true, false),
                        ColumnCompressionInfo::segment_key("device_id"),
                        ColumnCompressionInfo::plain("value"),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog.register_chunk(1, 1, chunk_schema(), status).unwrap();
        catalog
    }

    fn partial_status() -> ChunkStatus {
        ChunkStatus {
            partial: true,
            ..ChunkStatus::compressed()
        }
    }

    /// Context with the chunk queried directly
    fn single_chunk(config: PlannerConfig) -> (PlannerContext, RelId) {
        let mut ctx = PlannerContext::new(config);
        let chunk = ctx.add_rel(RelKind::Base, chunk_schema());
        ctx.rel_mut(chunk).unwrap().target = vec![
            Expr::column(chunk, TIME),
            Expr::column(chunk, DEVICE),
            Expr::column(chunk, VALUE),
        ];
        (ctx, chunk)
    }

    /// Context with the chunk expanded from its hypertable
    fn hypertable_member() -> (PlannerContext, RelId, RelId) {
        let mut ctx = PlannerContext::new(PlannerConfig::default());
        let ht = ctx.add_rel(RelKind::Base, RelationSchema::new("metrics"));
        let chunk = ctx.add_rel(RelKind::OtherMember { parent: ht }, chunk_schema());
        ctx.rel_mut(chunk).unwrap().target = vec![Expr::column(chunk, TIME)];
        (ctx, ht, chunk)
    }

    fn next_relid(ctx: &PlannerContext) -> RelId {
        RelId(ctx.num_rels() + 1)
    }

    fn seq_scan(batches: f64) -> Path {
        Path::Scan(ScanPath::seq_scan(RelId(0), batches, batches * 1.01))
    }

    fn parameterized(scan: ScanPath, outer: RelId, clauses: Vec<RestrictInfo>) -> Path {
        Path::Scan(scan.with_param_info(ParamInfo::new(Relids::singleton(outer), clauses)))
    }

    fn strategies(paths: &[Path]) -> Vec<DecompressStrategy> {
        paths.iter().filter_map(|p| p.strategy()).collect()
    }

    fn find(paths: &[Path], strategy: DecompressStrategy) -> &DecompressChunkPath {
        paths
            .iter()
            .filter_map(|p| p.as_decompress())
            .find(|p| p.strategy == strategy)
            .unwrap()
    }

    #[test]
    fn test_time_ordering_gives_plain_and_sorted_merge() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.query_sort_keys = vec![SortKey::asc(chunk, TIME)];
        let provider = StaticScanPathProvider::new(10.0).with_path(seq_scan(10.0));

        let info = generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(
            strategies(paths),
            vec![DecompressStrategy::Plain, DecompressStrategy::SortedMerge]
        );

        let plain = find(paths, DecompressStrategy::Plain);
        let merge = find(paths, DecompressStrategy::SortedMerge);
        assert!(plain.sort_keys.is_empty());
        assert_eq!(merge.sort_keys, ctx.query_sort_keys);
        assert!(!merge.reverse);
        assert!(!merge.parallel_safe);
        assert!(merge.total_cost < plain.total_cost);
        assert_eq!(merge.rows, 10_000.0);

        assert_eq!(ctx.rel(chunk).unwrap().rows, 10_000.0);
        let compressed = ctx.rel(info.compressed_relid).unwrap();
        assert_eq!(compressed.rows, 10.0);
        assert_eq!(compressed.pathlist.len(), 1);
        assert!(compressed
            .target
            .contains(&Expr::column(info.compressed_relid, C_SEQ)));
    }

    #[test]
    fn test_descending_time_merges_backward() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.query_sort_keys = vec![SortKey::desc(chunk, TIME)];
        let provider = StaticScanPathProvider::new(10.0).with_path(seq_scan(10.0));

        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert!(find(paths, DecompressStrategy::SortedMerge).reverse);
    }

    #[test]
    fn test_merge_loses_to_plain_with_many_batches() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.query_sort_keys = vec![SortKey::asc(chunk, TIME)];
        let provider = StaticScanPathProvider::new(500.0).with_path(seq_scan(500.0));

        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert!(
            find(paths, DecompressStrategy::SortedMerge).total_cost
                > find(paths, DecompressStrategy::Plain).total_cost
        );
    }

    #[test]
    fn test_pushdown_charges_sort_only_for_unsorted_sub_scans() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.query_sort_keys = vec![SortKey::asc(chunk, DEVICE), SortKey::asc(chunk, TIME)];
        let compressed = next_relid(&ctx);
        let index_order = vec![
            SortKey::new(Expr::column(compressed, C_DEVICE), false, false),
            SortKey::new(Expr::column(compressed, C_SEQ), false, false),
        ];
        let provider = StaticScanPathProvider::new(10.0)
            .with_path(seq_scan(10.0))
            .with_path(Path::Scan(
                ScanPath::index_scan(RelId(0), "device_seq_idx", 10.0, 10.1)
                    .with_sort_keys(index_order.clone()),
            ));

        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(
            strategies(paths),
            vec![
                DecompressStrategy::Plain,
                DecompressStrategy::Pushdown,
                DecompressStrategy::Plain,
                DecompressStrategy::Pushdown,
            ]
        );

        let over_seq: Vec<&DecompressChunkPath> =
            paths[..2].iter().filter_map(|p| p.as_decompress()).collect();
        let over_index: Vec<&DecompressChunkPath> =
            paths[2..].iter().filter_map(|p| p.as_decompress()).collect();
        assert!(over_seq[1].total_cost > over_seq[0].total_cost);
        assert!((over_index[1].total_cost - over_index[0].total_cost).abs() < 1e-9);

        let pushdown = over_index[1];
        assert_eq!(pushdown.compressed_sort_keys, index_order);
        assert_eq!(pushdown.sort_keys, ctx.query_sort_keys);
        assert!(pushdown.needs_sequence_num);
        assert!(!pushdown.reverse);
    }

    #[test]
    fn test_toggles_gate_candidates() {
        let catalog = catalog(ChunkStatus::compressed());
        let config = PlannerConfig {
            enable_decompression_sorted_merge: false,
            enable_compression_indexscan: false,
            ..PlannerConfig::default()
        };
        let (mut ctx, chunk) = single_chunk(config);
        ctx.query_sort_keys = vec![SortKey::asc(chunk, TIME)];
        let provider = StaticScanPathProvider::new(10.0)
            .with_path(seq_scan(10.0))
            .with_path(Path::Scan(ScanPath::index_scan(RelId(0), "idx", 10.0, 5.0)));

        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(strategies(paths), vec![DecompressStrategy::Plain]);
        assert!(matches!(
            paths[0].as_decompress().map(|p| &*p.child),
            Some(Path::Scan(ScanPath {
                kind: ScanKind::SeqScan,
                ..
            }))
        ));
    }

    #[test]
    fn test_pruning_of_parameterized_sub_scans() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, ht, chunk) = hypertable_member();
        let outer = ctx.add_rel(RelKind::Base, RelationSchema::new("devices"));
        let compressed = next_relid(&ctx);

        let payload_em = ctx.add_equivalence(vec![Expr::column(compressed, C_VALUE)]);
        let mut em_clause = RestrictInfo::new(Expr::binary(
            Expr::column(compressed, C_DEVICE),
            BinaryOperator::Eq,
            Expr::column(outer, 1),
        ));
        em_clause.left_em = Some(EquivalenceMemberRef {
            class: payload_em,
            member: 0,
        });

        let mut bitmap = ScanPath::seq_scan(RelId(0), 1.0, 1.0);
        bitmap.kind = ScanKind::BitmapHeapScan;
        let segment_clause = RestrictInfo::new(Expr::binary(
            Expr::column(compressed, C_DEVICE),
            BinaryOperator::Eq,
            Expr::column(outer, 1),
        ));
        let payload_clause = RestrictInfo::new(Expr::binary(
            Expr::column(compressed, C_VALUE),
            BinaryOperator::Eq,
            Expr::column(outer, 1),
        ));

        let provider = StaticScanPathProvider::new(10.0)
            .with_path(parameterized(bitmap, outer, vec![]))
            .with_path(parameterized(ScanPath::seq_scan(RelId(0), 1.0, 1.0), chunk, vec![]))
            .with_path(parameterized(ScanPath::seq_scan(RelId(0), 1.0, 1.0), ht, vec![]))
            .with_path(parameterized(
                ScanPath::index_scan(RelId(0), "value_idx", 1.0, 1.0),
                outer,
                vec![payload_clause],
            ))
            .with_path(parameterized(
                ScanPath::index_scan(RelId(0), "device_idx", 1.0, 1.0),
                outer,
                vec![em_clause],
            ))
            .with_path(parameterized(
                ScanPath::index_scan(RelId(0), "device_idx", 1.0, 1.0),
                outer,
                vec![segment_clause],
            ))
            .with_path(seq_scan(10.0));

        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].req_outer(), Relids::singleton(outer));
        assert!(paths[1].req_outer().is_empty());
    }

    #[test]
    fn test_append_member_adjusts_parent_rows() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, ht, chunk) = hypertable_member();
        ctx.rel_mut(ht).unwrap().rows = 5_000.0;
        ctx.rel_mut(chunk).unwrap().rows = 2_000.0;
        let provider = StaticScanPathProvider::new(10.0).with_path(seq_scan(10.0));

        let info = generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        assert!(!info.single_chunk);
        assert_eq!(ctx.rel(chunk).unwrap().rows, 10_000.0);
        assert_eq!(ctx.rel(ht).unwrap().rows, 13_000.0);
    }

    #[test]
    fn test_partial_chunk_combines_uncompressed_rows() {
        let catalog = catalog(partial_status());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.query_sort_keys = vec![SortKey::asc(chunk, TIME)];
        ctx.rel_mut(chunk).unwrap().pathlist =
            vec![Path::Scan(ScanPath::seq_scan(chunk, 500.0, 20.0))];
        let provider = StaticScanPathProvider::new(10.0).with_path(seq_scan(10.0));

        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(paths.len(), 2);

        let Path::Append(append) = &paths[0] else {
            panic!("expected append, got {:?}", paths[0]);
        };
        assert_eq!(append.children.len(), 2);
        assert_eq!(append.rows, 10_500.0);
        assert_eq!(append.children[0].strategy(), Some(DecompressStrategy::Plain));

        let Path::MergeAppend(merge) = &paths[1] else {
            panic!("expected merge append, got {:?}", paths[1]);
        };
        assert_eq!(merge.sort_keys, ctx.query_sort_keys);
        assert_eq!(
            merge.children[0].strategy(),
            Some(DecompressStrategy::SortedMerge)
        );
        // the uncompressed scan is unsorted and has to be sorted first
        let children_total: f64 = merge.children.iter().map(|c| c.total_cost()).sum();
        assert!(merge.total_cost > children_total);
    }

    #[test]
    fn test_partial_chunk_reparameterization() {
        let catalog = catalog(partial_status());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        let outer = ctx.add_rel(RelKind::Base, RelationSchema::new("devices"));
        let compressed = next_relid(&ctx);
        let clause = RestrictInfo::new(Expr::binary(
            Expr::column(compressed, C_DEVICE),
            BinaryOperator::Eq,
            Expr::column(outer, 1),
        ));
        let provider = StaticScanPathProvider::new(10.0)
            .with_path(parameterized(
                ScanPath::index_scan(RelId(0), "device_idx", 1.0, 1.0),
                outer,
                vec![clause],
            ))
            .with_path(seq_scan(10.0));

        // a sequential scan of the uncompressed rows can follow the parameterization
        ctx.rel_mut(chunk).unwrap().pathlist =
            vec![Path::Scan(ScanPath::seq_scan(chunk, 500.0, 20.0))];
        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(paths.len(), 2);
        let Path::Append(append) = &paths[0] else {
            panic!("expected append, got {:?}", paths[0]);
        };
        assert_eq!(append.req_outer, Relids::singleton(outer));
        assert_eq!(append.children[1].req_outer(), Relids::singleton(outer));

        // an index scan cannot, so only the unparameterized candidate survives
        let catalog = self::catalog(partial_status());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.add_rel(RelKind::Base, RelationSchema::new("devices"));
        ctx.rel_mut(chunk).unwrap().pathlist = vec![Path::Scan(ScanPath::index_scan(
            chunk, "time_idx", 500.0, 20.0,
        ))];
        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let paths = &ctx.rel(chunk).unwrap().pathlist;
        assert_eq!(paths.len(), 1);
        assert!(paths[0].req_outer().is_empty());
    }

    #[test]
    fn test_no_surviving_candidate_is_an_error() {
        let catalog = catalog(ChunkStatus::compressed());
        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        let outer = ctx.add_rel(RelKind::Base, RelationSchema::new("devices"));
        let mut bitmap = ScanPath::seq_scan(RelId(0), 1.0, 1.0);
        bitmap.kind = ScanKind::BitmapHeapScan;
        let provider =
            StaticScanPathProvider::new(10.0).with_path(parameterized(bitmap, outer, vec![]));

        let result = generate_paths(&mut ctx, &catalog, &provider, chunk, 1);
        assert!(matches!(result, Err(TscompError::Internal(msg)) if msg.contains("could not create")));
    }

    #[test]
    fn test_parallel_candidates() {
        let catalog = catalog(ChunkStatus::compressed());
        let provider = StaticScanPathProvider::new(10.0)
            .with_path(seq_scan(10.0))
            .with_partial_path(Path::Scan(
                ScanPath::seq_scan(RelId(0), 5.0, 5.05).with_parallel_workers(2),
            ));

        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        assert!(ctx.rel(chunk).unwrap().partial_pathlist.is_empty());

        let (mut ctx, chunk) = single_chunk(PlannerConfig::default());
        ctx.rel_mut(chunk).unwrap().consider_parallel = true;
        generate_paths(&mut ctx, &catalog, &provider, chunk, 1).unwrap();
        let partial = &ctx.rel(chunk).unwrap().partial_pathlist;
        assert_eq!(partial.len(), 1);
        assert!(partial[0].parallel_safe());
        assert_eq!(partial[0].parallel_workers(), 2);
        assert_eq!(partial[0].strategy(), Some(DecompressStrategy::Plain));
    }
}

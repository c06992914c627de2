//! tscomp Planner - Decompression planning for compressed chunks

pub mod context;
pub mod cost;
pub mod equivalence;
pub mod generate;
pub mod paths;
pub mod plan;
pub mod qual_pushdown;
pub mod sort_info;
pub mod translate;

pub use context::{PlannerContext, RelInfo, RelKind};
pub use cost::{Cost, CostModel, Estimate};
pub use equivalence::{EquivalenceClass, EquivalenceMember, EquivalenceRegistry};
pub use generate::{generate_paths, ScanPathProvider, StaticScanPathProvider};
pub use paths::{
    get_cheapest_path_for_sort_keys, AppendPath, CostCriterion, DecompressChunkPath,
    DecompressStrategy, MergeAppendPath, ParamInfo, Path, ScanKind, ScanPath,
};
pub use plan::{
    create_decompress_plan, BatchSortColumn, BatchSortKey, DecompressChunkPlan,
    OrderKeyDescriptor,
};
pub use qual_pushdown::{push_down_quals, pushdown_clause};
pub use sort_info::{
    build_sort_info, classify, segment_key_equalities, sorted_merge_eligibility,
    MergeEligibility, OrderingClass, SortInfo,
};
pub use translate::{
    add_segment_keys_to_equivalences, build_compressed_target, build_compression_info,
    setup_compressed_rel, translate_join_clause, ColumnMapping, CompressionInfo, MappedColumn,
};

//! Logical-to-Physical Translation
//!
//! A compressed chunk is planned through a second relation, the compressed
//! relation, added to the range table next to the chunk. This module builds
//! that relation: its target list, its join clauses and its membership in
//! the equivalence classes of the chunk.

use crate::context::{PlannerContext, RelInfo, RelKind};
use crate::equivalence::EquivalenceMember;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use tscomp_catalog::{
    max_column_name, min_column_name, ChunkStatus, ColumnRole, CompressionCatalog,
    CompressionSettings, RelationSchema, COUNT_COLUMN_NAME, SEQUENCE_NUM_COLUMN_NAME,
};
use tscomp_common::{AttrNumber, RelId, Relids, Result, TscompError};
use tscomp_sql::{ColumnRef, Expr, RestrictInfo, SelectivityCache};

/// How one chunk column appears in the compressed relation
#[derive(Debug, Clone, PartialEq)]
pub struct MappedColumn {
    pub chunk_attno: AttrNumber,
    pub name: String,
    /// `None` when the column has no compression settings
    pub role: Option<ColumnRole>,
    pub compressed_attno: Option<AttrNumber>,
}

/// Bidirectional mapping between chunk and compressed columns, by name
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub chunk_relid: RelId,
    pub compressed_relid: RelId,
    chunk_name: String,
    compressed_name: String,
    columns: BTreeMap<AttrNumber, MappedColumn>,
    logical_by_physical: HashMap<AttrNumber, AttrNumber>,
    physical_by_name: HashMap<String, AttrNumber>,
}

impl ColumnMapping {
    pub fn new(
        chunk_relid: RelId,
        chunk: &RelationSchema,
        compressed_relid: RelId,
        compressed: &RelationSchema,
        settings: &CompressionSettings,
    ) -> Self {
        let physical_by_name: HashMap<String, AttrNumber> = compressed
            .live_columns()
            .map(|c| (c.name.clone(), c.attno))
            .collect();

        let mut columns = BTreeMap::new();
        let mut logical_by_physical = HashMap::new();
        for column in chunk.live_columns() {
            let compressed_attno = physical_by_name.get(&column.name).copied();
            if let Some(attno) = compressed_attno {
                logical_by_physical.insert(attno, column.attno);
            }
            columns.insert(
                column.attno,
                MappedColumn {
                    chunk_attno: column.attno,
                    name: column.name.clone(),
                    role: settings.find(&column.name).map(|c| c.role),
                    compressed_attno,
                },
            );
        }

        Self {
            chunk_relid,
            compressed_relid,
            chunk_name: chunk.name.clone(),
            compressed_name: compressed.name.clone(),
            columns,
            logical_by_physical,
            physical_by_name,
        }
    }

    pub fn column(&self, chunk_attno: AttrNumber) -> Result<&MappedColumn> {
        self.columns.get(&chunk_attno).ok_or_else(|| {
            TscompError::schema_mismatch(format!("attribute {}", chunk_attno), &self.chunk_name)
        })
    }

    pub fn column_name(&self, chunk_attno: AttrNumber) -> Result<&str> {
        self.column(chunk_attno).map(|c| c.name.as_str())
    }

    /// Compression role of a chunk column; a column without one is fatal.
    pub fn role(&self, chunk_attno: AttrNumber) -> Result<ColumnRole> {
        let column = self.column(chunk_attno)?;
        column
            .role
            .ok_or_else(|| TscompError::missing_metadata(column.name.as_str()))
    }

    pub fn is_segment_key(&self, chunk_attno: AttrNumber) -> bool {
        matches!(
            self.columns.get(&chunk_attno).and_then(|c| c.role),
            Some(ColumnRole::SegmentKey)
        )
    }

    pub fn physical_attno(&self, chunk_attno: AttrNumber) -> Result<AttrNumber> {
        self.role(chunk_attno)?;
        let column = self.column(chunk_attno)?;
        column.compressed_attno.ok_or_else(|| {
            TscompError::schema_mismatch(column.name.as_str(), &self.compressed_name)
        })
    }

    /// Attribute of a compressed column by name, e.g. a metadata column
    pub fn physical_attno_by_name(&self, name: &str) -> Result<AttrNumber> {
        self.physical_by_name
            .get(name)
            .copied()
            .ok_or_else(|| TscompError::schema_mismatch(name, &self.compressed_name))
    }

    pub fn logical_attno(&self, physical_attno: AttrNumber) -> Option<AttrNumber> {
        self.logical_by_physical.get(&physical_attno).copied()
    }

    /// Rewrite chunk columns into compressed columns; other relations are
    /// left untouched.
    pub fn to_physical(&self, expr: &Expr) -> Result<Expr> {
        expr.map_columns(&mut |col: &ColumnRef| {
            if col.relid != self.chunk_relid {
                return Ok(Expr::Column(*col));
            }
            Ok(Expr::column(self.compressed_relid, self.physical_attno(col.attno)?))
        })
    }

    /// Inverse of `to_physical`. Metadata columns have no logical
    /// counterpart and cannot be mapped back.
    pub fn to_logical(&self, expr: &Expr) -> Result<Expr> {
        expr.map_columns(&mut |col: &ColumnRef| {
            if col.relid != self.compressed_relid {
                return Ok(Expr::Column(*col));
            }
            let attno = self.logical_attno(col.attno).ok_or_else(|| {
                TscompError::schema_mismatch(
                    format!("compressed attribute {}", col.attno),
                    &self.chunk_name,
                )
            })?;
            Ok(Expr::column(self.chunk_relid, attno))
        })
    }
}

/// Everything the planner knows about one compressed chunk
#[derive(Debug, Clone)]
pub struct CompressionInfo {
    pub chunk_id: i32,
    pub hypertable_id: i32,
    pub chunk_relid: RelId,
    pub compressed_relid: RelId,
    pub settings: Arc<CompressionSettings>,
    pub status: ChunkStatus,
    /// The chunk is queried directly rather than through its hypertable
    pub single_chunk: bool,
    pub chunk_segment_attnos: BTreeSet<AttrNumber>,
    /// Compressed-relation attributes holding compressed payload
    pub compressed_payload_attnos: BTreeSet<AttrNumber>,
    pub num_segment_keys: usize,
    pub num_order_keys: usize,
    pub mapping: ColumnMapping,
}

impl CompressionInfo {
    pub fn chunk_relids(&self) -> Relids {
        Relids::singleton(self.chunk_relid)
    }

    pub fn compressed_relids(&self) -> Relids {
        Relids::singleton(self.compressed_relid)
    }

    pub fn is_payload_column(&self, compressed_attno: AttrNumber) -> bool {
        self.compressed_payload_attnos.contains(&compressed_attno)
    }
}

/// Look up the chunk's compression metadata and add its compressed
/// relation to the range table.
pub fn build_compression_info(
    ctx: &mut PlannerContext,
    catalog: &dyn CompressionCatalog,
    chunk_relid: RelId,
    chunk_id: i32,
) -> Result<CompressionInfo> {
    let entry = catalog.chunk(chunk_id)?;
    let settings = catalog.settings(entry.hypertable_id)?;
    settings.validate()?;

    let (chunk_schema, single_chunk, top_parent_relids, consider_parallel) = {
        let chunk = ctx.rel(chunk_relid)?;
        (
            chunk.schema.clone(),
            matches!(chunk.kind, RelKind::Base),
            chunk.top_parent_relids,
            chunk.consider_parallel,
        )
    };

    let compressed_relid = ctx.add_rel(
        RelKind::Compressed { chunk: chunk_relid },
        entry.compressed_schema.clone(),
    );
    {
        let compressed = ctx.rel_mut(compressed_relid)?;
        compressed.top_parent_relids = top_parent_relids;
        compressed.consider_parallel = consider_parallel;
    }

    let mapping = ColumnMapping::new(
        chunk_relid,
        &chunk_schema,
        compressed_relid,
        &entry.compressed_schema,
        &settings,
    );

    let mut chunk_segment_attnos = BTreeSet::new();
    let mut compressed_payload_attnos = BTreeSet::new();
    for column in &settings.columns {
        if column.is_segment_key() {
            if let Some(attno) = chunk_schema.attnum(&column.name) {
                chunk_segment_attnos.insert(attno);
            }
        } else if let Some(attno) = entry.compressed_schema.attnum(&column.name) {
            compressed_payload_attnos.insert(attno);
        }
    }

    Ok(CompressionInfo {
        chunk_id,
        hypertable_id: entry.hypertable_id,
        chunk_relid,
        compressed_relid,
        num_segment_keys: settings.num_segment_keys(),
        num_order_keys: settings.num_order_keys(),
        settings,
        status: entry.status,
        single_chunk,
        chunk_segment_attnos,
        compressed_payload_attnos,
        mapping,
    })
}

/// Fill target list, equivalence membership and join clauses of the
/// compressed relation.
pub fn setup_compressed_rel(
    ctx: &mut PlannerContext,
    info: &CompressionInfo,
    needs_sequence_num: bool,
) -> Result<()> {
    let target = build_compressed_target(ctx.rel(info.chunk_relid)?, info, needs_sequence_num)?;
    let join_info = ctx
        .rel(info.chunk_relid)?
        .join_info
        .iter()
        .map(|ri| translate_join_clause(ri, info))
        .collect::<Result<Vec<_>>>()?;

    let added = add_segment_keys_to_equivalences(ctx, info)?;

    let has_eclass_joins = ctx.rel(info.chunk_relid)?.has_eclass_joins;
    let compressed = ctx.rel_mut(info.compressed_relid)?;
    debug!(
        "compressed relation {} fetches {} columns, {} join clauses, {} equivalence classes",
        compressed.relid,
        target.len(),
        join_info.len(),
        added
    );
    compressed.target = target;
    compressed.join_info = join_info;
    compressed.has_eclass_joins = has_eclass_joins;
    Ok(())
}

/// Columns of the compressed relation needed to produce the chunk's target,
/// evaluate its filters and evaluate its join clauses.
pub fn build_compressed_target(
    chunk: &RelInfo,
    info: &CompressionInfo,
    needs_sequence_num: bool,
) -> Result<Vec<Expr>> {
    let mapping = &info.mapping;
    let mut target = TargetBuilder::new(info.compressed_relid);
    let mut have_whole_row = false;

    let exprs = chunk
        .target
        .iter()
        .chain(chunk.base_restrict.iter().map(|ri| &ri.clause))
        .chain(chunk.join_info.iter().map(|ri| &ri.clause));

    for expr in exprs {
        for col in expr.get_columns() {
            if col.relid != info.chunk_relid {
                continue;
            }
            // system columns and whole-row references are synthesized
            // after decompression
            if !col.is_user_column() {
                have_whole_row = true;
                continue;
            }

            let role = mapping.role(col.attno)?;
            target.add(mapping.physical_attno(col.attno)?);

            if let ColumnRole::OrderKey { position, .. } = role {
                target.add(mapping.physical_attno_by_name(&min_column_name(position))?);
                target.add(mapping.physical_attno_by_name(&max_column_name(position))?);
            }
        }
    }

    target.add(mapping.physical_attno_by_name(COUNT_COLUMN_NAME)?);
    if needs_sequence_num {
        target.add(mapping.physical_attno_by_name(SEQUENCE_NUM_COLUMN_NAME)?);
    }

    if have_whole_row {
        for column in chunk.schema.live_columns() {
            target.add(mapping.physical_attno_by_name(&column.name)?);
        }
    }

    Ok(target.finish())
}

struct TargetBuilder {
    relid: RelId,
    used: BTreeSet<AttrNumber>,
    exprs: Vec<Expr>,
}

impl TargetBuilder {
    fn new(relid: RelId) -> Self {
        Self {
            relid,
            used: BTreeSet::new(),
            exprs: vec![],
        }
    }

    fn add(&mut self, attno: AttrNumber) {
        if self.used.insert(attno) {
            self.exprs.push(Expr::column(self.relid, attno));
        }
    }

    fn finish(self) -> Vec<Expr> {
        self.exprs
    }
}

/// Copy of a chunk join clause that refers to the compressed relation
pub fn translate_join_clause(ri: &RestrictInfo, info: &CompressionInfo) -> Result<RestrictInfo> {
    let (from, to) = (info.chunk_relid, info.compressed_relid);
    Ok(RestrictInfo {
        clause: info.mapping.to_physical(&ri.clause)?,
        or_clause: ri
            .or_clause
            .as_ref()
            .map(|e| info.mapping.to_physical(e))
            .transpose()?,
        clause_relids: ri.clause_relids.replace(from, to),
        required_relids: ri.required_relids.replace(from, to),
        outer_relids: ri.outer_relids.replace(from, to),
        left_relids: ri.left_relids.replace(from, to),
        right_relids: ri.right_relids.replace(from, to),
        // estimates were made against the chunk's column domain
        left_em: None,
        right_em: None,
        cache: SelectivityCache::default(),
    })
}

/// Add a compressed-column member to every equivalence class of the chunk
/// that contains one of its segment keys. Returns the number of classes
/// extended.
pub fn add_segment_keys_to_equivalences(
    ctx: &mut PlannerContext,
    info: &CompressionInfo,
) -> Result<usize> {
    let chunk_relids = info.chunk_relids();
    let compressed_relids = info.compressed_relids();
    let class_indexes: Vec<usize> = ctx
        .rel(info.chunk_relid)?
        .eclass_indexes
        .iter()
        .copied()
        .collect();

    let mut additions = vec![];
    for index in class_indexes {
        let Some(class) = ctx.equivalence.class(index) else {
            continue;
        };
        if class.has_volatile || class.relids.overlaps(compressed_relids) {
            continue;
        }
        let candidate = class.members.iter().find_map(|member| {
            let col = strip_casts(&member.expr).as_column()?;
            if col.relid != info.chunk_relid
                || !col.is_user_column()
                || !info.mapping.is_segment_key(col.attno)
            {
                return None;
            }
            let attno = info.mapping.physical_attno(col.attno).ok()?;
            let relids = member.relids.difference(chunk_relids).union(compressed_relids);
            Some(EquivalenceMember::child(
                Expr::column(info.compressed_relid, attno),
                relids,
            ))
        });
        if let Some(member) = candidate {
            additions.push((index, member));
        }
    }

    let mut added = 0;
    for (index, member) in additions {
        if ctx.equivalence.add_child_member(index, member).is_some() {
            ctx.rel_mut(info.compressed_relid)?.eclass_indexes.insert(index);
            added += 1;
        }
    }
    Ok(added)
}

fn strip_casts(expr: &Expr) -> &Expr {
    match expr {
        Expr::Cast { expr, .. } => strip_casts(expr),
        other => other,
    }
}

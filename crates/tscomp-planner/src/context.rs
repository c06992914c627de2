//! Planner Context
//!
//! Range table of the relations taking part in planning, the equivalence
//! registry and the requested output ordering.

use crate::equivalence::EquivalenceRegistry;
use crate::paths::Path;
use std::collections::BTreeSet;
use tscomp_catalog::RelationSchema;
use tscomp_common::{PlannerConfig, RelId, Relids, Result, TscompError};
use tscomp_sql::{Expr, RestrictInfo, SortKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    /// A relation named directly in the query
    Base,
    /// A child of an append relation, such as a chunk of a hypertable
    OtherMember { parent: RelId },
    /// A compressed relation planned on behalf of a chunk; never replanned
    Compressed { chunk: RelId },
}

/// Planner state of one relation
#[derive(Debug, Clone)]
pub struct RelInfo {
    pub relid: RelId,
    pub kind: RelKind,
    pub schema: RelationSchema,
    /// Expressions the relation must produce
    pub target: Vec<Expr>,
    pub base_restrict: Vec<RestrictInfo>,
    pub join_info: Vec<RestrictInfo>,
    pub rows: f64,
    pub eclass_indexes: BTreeSet<usize>,
    pub has_eclass_joins: bool,
    pub consider_parallel: bool,
    pub top_parent_relids: Relids,
    pub pathlist: Vec<Path>,
    pub partial_pathlist: Vec<Path>,
}

impl RelInfo {
    pub fn new(relid: RelId, kind: RelKind, schema: RelationSchema) -> Self {
        Self {
            relid,
            kind,
            schema,
            target: vec![],
            base_restrict: vec![],
            join_info: vec![],
            rows: 0.0,
            eclass_indexes: BTreeSet::new(),
            has_eclass_joins: false,
            consider_parallel: false,
            top_parent_relids: Relids::new(),
            pathlist: vec![],
            partial_pathlist: vec![],
        }
    }

    pub fn relids(&self) -> Relids {
        Relids::singleton(self.relid)
    }

    pub fn is_append_member(&self) -> bool {
        matches!(self.kind, RelKind::OtherMember { .. })
    }

    pub fn parent(&self) -> Option<RelId> {
        match self.kind {
            RelKind::OtherMember { parent } => Some(parent),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PlannerContext {
    /// Indexed by `RelId`; slot 0 is never used
    rels: Vec<Option<RelInfo>>,
    pub equivalence: EquivalenceRegistry,
    pub query_sort_keys: Vec<SortKey>,
    pub config: PlannerConfig,
}

impl PlannerContext {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            rels: vec![None],
            equivalence: EquivalenceRegistry::new(),
            query_sort_keys: vec![],
            config,
        }
    }

    /// Add a relation to the range table, returning its id
    pub fn add_rel(&mut self, kind: RelKind, schema: RelationSchema) -> RelId {
        if self.rels.is_empty() {
            self.rels.push(None);
        }
        let relid = RelId(self.rels.len());
        let mut rel = RelInfo::new(relid, kind, schema);
        if let RelKind::OtherMember { parent } = kind {
            rel.top_parent_relids = self
                .rel(parent)
                .map(|p| {
                    if p.top_parent_relids.is_empty() {
                        p.relids()
                    } else {
                        p.top_parent_relids
                    }
                })
                .unwrap_or_default();
        }
        self.rels.push(Some(rel));
        relid
    }

    pub fn rel(&self, relid: RelId) -> Result<&RelInfo> {
        self.rels
            .get(relid.index())
            .and_then(|r| r.as_ref())
            .ok_or_else(|| TscompError::Planner(format!("relation {} not in range table", relid)))
    }

    pub fn rel_mut(&mut self, relid: RelId) -> Result<&mut RelInfo> {
        self.rels
            .get_mut(relid.index())
            .and_then(|r| r.as_mut())
            .ok_or_else(|| TscompError::Planner(format!("relation {} not in range table", relid)))
    }

    pub fn num_rels(&self) -> usize {
        self.rels.iter().filter(|r| r.is_some()).count()
    }

    /// All append-parent ancestors of `relid`
    pub fn parent_relids(&self, relid: RelId) -> Relids {
        let mut result = Relids::new();
        let mut current = self.rel(relid).ok().and_then(|r| r.parent());
        while let Some(parent) = current {
            if result.contains(parent) {
                break;
            }
            result.insert(parent);
            current = self.rel(parent).ok().and_then(|r| r.parent());
        }
        result
    }

    /// Register `exprs` as mutually equal and attach the class to the
    /// relations it mentions.
    pub fn add_equivalence(&mut self, exprs: Vec<Expr>) -> usize {
        let index = self.equivalence.add_class(exprs);
        let relids = self
            .equivalence
            .class(index)
            .map(|c| c.relids)
            .unwrap_or_default();
        let multi_rel = relids.len() > 1;
        for relid in relids.iter() {
            if let Ok(rel) = self.rel_mut(relid) {
                rel.eclass_indexes.insert(index);
                rel.has_eclass_joins |= multi_rel;
            }
        }
        index
    }

    /// The expression a sort key stands for when evaluated on `relid`
    pub fn sort_key_expr_for_rel<'a>(
        &'a self,
        key: &'a SortKey,
        relid: RelId,
    ) -> Option<&'a Expr> {
        self.equivalence.find_expr_for_rel(&key.expr, relid)
    }
}

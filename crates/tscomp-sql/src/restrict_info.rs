//! Restriction clauses with their planner caches

use crate::expr::{BinaryOperator, Expr};
use serde::{Deserialize, Serialize};
use tscomp_common::Relids;

/// Position of a member inside the equivalence registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquivalenceMemberRef {
    pub class: usize,
    pub member: usize,
}

/// Values the cost model memoizes on a clause. They are only valid for the
/// column domain the clause was estimated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectivityCache {
    pub eval_cost: Option<f64>,
    pub norm_selec: Option<f64>,
    pub outer_selec: Option<f64>,
    pub left_bucketsize: Option<f64>,
    pub right_bucketsize: Option<f64>,
    pub left_mcvfreq: Option<f64>,
    pub right_mcvfreq: Option<f64>,
    pub scansel: Vec<f64>,
}

impl SelectivityCache {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A filter or join clause together with the relations it needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictInfo {
    pub clause: Expr,
    /// OR-form of the clause, if it was split from a disjunction
    pub or_clause: Option<Expr>,
    pub clause_relids: Relids,
    pub required_relids: Relids,
    pub outer_relids: Relids,
    pub left_relids: Relids,
    pub right_relids: Relids,
    pub left_em: Option<EquivalenceMemberRef>,
    pub right_em: Option<EquivalenceMemberRef>,
    pub cache: SelectivityCache,
}

impl RestrictInfo {
    pub fn new(clause: Expr) -> Self {
        let clause_relids = clause.relids();
        let (left_relids, right_relids) = match &clause {
            Expr::BinaryOp { left, right, .. } => (left.relids(), right.relids()),
            _ => (Relids::new(), Relids::new()),
        };
        Self {
            clause,
            or_clause: None,
            clause_relids,
            required_relids: clause_relids,
            outer_relids: Relids::new(),
            left_relids,
            right_relids,
            left_em: None,
            right_em: None,
            cache: SelectivityCache::default(),
        }
    }

    /// Split a predicate into its top-level conjuncts
    pub fn from_conjunction(predicate: &Expr) -> Vec<RestrictInfo> {
        let mut exprs = vec![];
        let mut stack = vec![predicate];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::BinaryOp {
                    left,
                    op: BinaryOperator::And,
                    right,
                } => {
                    stack.push(right);
                    stack.push(left);
                }
                _ => exprs.push(RestrictInfo::new(expr.clone())),
            }
        }
        exprs
    }

    pub fn with_selectivity(mut self, selectivity: f64) -> Self {
        self.cache.norm_selec = Some(selectivity);
        self
    }
}

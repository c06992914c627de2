//! Requested output orderings

use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use std::fmt;
use tscomp_common::{AttrNumber, RelId};

/// One element of an ORDER BY
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn new(expr: Expr, descending: bool, nulls_first: bool) -> Self {
        Self {
            expr,
            descending,
            nulls_first,
        }
    }

    /// `ASC` with the default `NULLS LAST`
    pub fn asc(relid: RelId, attno: AttrNumber) -> Self {
        Self::new(Expr::column(relid, attno), false, false)
    }

    /// `DESC` with the default `NULLS FIRST`
    pub fn desc(relid: RelId, attno: AttrNumber) -> Self {
        Self::new(Expr::column(relid, attno), true, true)
    }

    /// The same key scanned in the opposite direction
    pub fn reversed(&self) -> Self {
        Self::new(self.expr.clone(), !self.descending, !self.nulls_first)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} NULLS {}",
            self.expr,
            if self.descending { "DESC" } else { "ASC" },
            if self.nulls_first { "FIRST" } else { "LAST" }
        )
    }
}

/// True when `required` is a prefix of `provided`
pub fn sort_keys_contained_in(required: &[SortKey], provided: &[SortKey]) -> bool {
    required.len() <= provided.len() && required.iter().zip(provided).all(|(r, p)| r == p)
}

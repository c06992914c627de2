//! Equivalence Registry
//!
//! Classes of expressions known to be equal, owned by the planner context.
//! Classes live in an arena and are addressed by index. The compression
//! translator only appends child members to existing classes, so members
//! never need a pointer back to their class beyond the index itself.

use tscomp_common::{RelId, Relids};
use tscomp_sql::{EquivalenceMemberRef, Expr};

#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceMember {
    pub expr: Expr,
    pub relids: Relids,
    pub is_const: bool,
    /// Added for a child relation rather than derived from the query
    pub is_child: bool,
}

impl EquivalenceMember {
    pub fn new(expr: Expr) -> Self {
        let relids = expr.relids();
        let is_const = relids.is_empty();
        Self {
            expr,
            relids,
            is_const,
            is_child: false,
        }
    }

    pub fn child(expr: Expr, relids: Relids) -> Self {
        Self {
            expr,
            relids,
            is_const: false,
            is_child: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquivalenceClass {
    pub members: Vec<EquivalenceMember>,
    pub relids: Relids,
    pub has_const: bool,
    pub has_volatile: bool,
}

impl EquivalenceClass {
    /// Member whose expression references exactly `relid`
    pub fn member_for_rel(&self, relid: RelId) -> Option<&EquivalenceMember> {
        let target = Relids::singleton(relid);
        self.members.iter().find(|m| m.relids == target)
    }

    pub fn contains_expr(&self, expr: &Expr) -> bool {
        self.members.iter().any(|m| &m.expr == expr)
    }
}

/// Append-only arena of equivalence classes
#[derive(Debug, Clone, Default)]
pub struct EquivalenceRegistry {
    classes: Vec<EquivalenceClass>,
}

impl EquivalenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class formed by the given expressions; returns its index.
    pub fn add_class(&mut self, exprs: Vec<Expr>) -> usize {
        let mut class = EquivalenceClass::default();
        for expr in exprs {
            let member = EquivalenceMember::new(expr);
            class.relids = class.relids.union(member.relids);
            class.has_const |= member.is_const;
            class.has_volatile |= member.expr.is_volatile();
            class.members.push(member);
        }
        self.classes.push(class);
        self.classes.len() - 1
    }

    pub fn class(&self, index: usize) -> Option<&EquivalenceClass> {
        self.classes.get(index)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &EquivalenceClass)> {
        self.classes.iter().enumerate()
    }

    /// Append a child member to an existing class and widen its relids.
    pub fn add_child_member(
        &mut self,
        class_index: usize,
        member: EquivalenceMember,
    ) -> Option<EquivalenceMemberRef> {
        let class = self.classes.get_mut(class_index)?;
        class.relids = class.relids.union(member.relids);
        class.members.push(member);
        Some(EquivalenceMemberRef {
            class: class_index,
            member: class.members.len() - 1,
        })
    }

    pub fn member(&self, member_ref: EquivalenceMemberRef) -> Option<&EquivalenceMember> {
        self.classes
            .get(member_ref.class)
            .and_then(|c| c.members.get(member_ref.member))
    }

    /// Expression equal to `expr` that references only `relid`
    pub fn find_expr_for_rel<'a>(
        &'a self,
        expr: &'a Expr,
        relid: RelId,
    ) -> Option<&'a Expr> {
        if expr.relids() == Relids::singleton(relid) {
            return Some(expr);
        }
        self.classes
            .iter()
            .filter(|c| c.contains_expr(expr))
            .find_map(|c| c.member_for_rel(relid))
            .map(|m| &m.expr)
    }
}

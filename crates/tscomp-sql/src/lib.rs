//! tscomp SQL - Expressions, restriction clauses and sort requirements

pub mod expr;
pub mod restrict_info;
pub mod sort_key;

pub use expr::{BinaryOperator, ColumnRef, Expr, Literal, UnaryOperator};
pub use restrict_info::{EquivalenceMemberRef, RestrictInfo, SelectivityCache};
pub use sort_key::{sort_keys_contained_in, SortKey};

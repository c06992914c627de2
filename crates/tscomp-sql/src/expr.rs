//! tscomp Expression

use serde::{Deserialize, Serialize};
use tscomp_common::{AttrNumber, RelId, Relids, Result};

/// Reference to a column of a relation in the range table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub relid: RelId,
    /// `<= 0` for system columns and whole-row references
    pub attno: AttrNumber,
}

impl ColumnRef {
    pub fn new(relid: RelId, attno: AttrNumber) -> Self {
        Self { relid, attno }
    }

    pub fn whole_row(relid: RelId) -> Self {
        Self { relid, attno: 0 }
    }

    pub fn is_user_column(&self) -> bool {
        self.attno > 0
    }
}

/// Expression node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(ColumnRef),

    /// Literal value
    Literal(Literal),

    /// Executor parameter, supplied by an outer relation at run time
    Param(usize),

    /// Binary operation
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// Function call
    Function {
        name: String,
        args: Vec<Expr>,
        volatile: bool,
    },

    /// Cast
    Cast { expr: Box<Expr>, data_type: String },
}

/// Literal value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Like,
}

impl BinaryOperator {
    /// Operator with operands swapped: `a < b` is `b > a`
    pub fn commute(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Eq),
            Self::Neq => Some(Self::Neq),
            Self::Lt => Some(Self::Gt),
            Self::Lte => Some(Self::Gte),
            Self::Gt => Some(Self::Lt),
            Self::Gte => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Lt | Self::Lte | Self::Gt | Self::Gte
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

impl Expr {
    pub fn column(relid: RelId, attno: AttrNumber) -> Self {
        Expr::Column(ColumnRef::new(relid, attno))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::And, right)
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(col) => Some(col),
            _ => None,
        }
    }

    /// True for values fixed for the duration of one scan
    pub fn is_const_or_param(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Param(_))
    }

    /// Get all column references in this expression
    pub fn get_columns(&self) -> Vec<ColumnRef> {
        match self {
            Expr::Column(col) => vec![*col],
            Expr::Literal(_) | Expr::Param(_) => vec![],
            Expr::BinaryOp { left, right, .. } => {
                let mut cols = left.get_columns();
                cols.extend(right.get_columns());
                cols
            }
            Expr::UnaryOp { expr, .. } => expr.get_columns(),
            Expr::Function { args, .. } => args.iter().flat_map(|a| a.get_columns()).collect(),
            Expr::Cast { expr, .. } => expr.get_columns(),
        }
    }

    /// Relations referenced by this expression
    pub fn relids(&self) -> Relids {
        self.get_columns().into_iter().map(|c| c.relid).collect()
    }

    pub fn is_volatile(&self) -> bool {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Param(_) => false,
            Expr::BinaryOp { left, right, .. } => left.is_volatile() || right.is_volatile(),
            Expr::UnaryOp { expr, .. } | Expr::Cast { expr, .. } => expr.is_volatile(),
            Expr::Function { args, volatile, .. } => {
                *volatile || args.iter().any(|a| a.is_volatile())
            }
        }
    }

    /// Rebuild the expression, replacing every column reference by the
    /// result of `f`.
    pub fn map_columns<F>(&self, f: &mut F) -> Result<Expr>
    where
        F: FnMut(&ColumnRef) -> Result<Expr>,
    {
        Ok(match self {
            Expr::Column(col) => f(col)?,
            Expr::Literal(_) | Expr::Param(_) => self.clone(),
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: Box::new(left.map_columns(f)?),
                op: *op,
                right: Box::new(right.map_columns(f)?),
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op: *op,
                expr: Box::new(expr.map_columns(f)?),
            },
            Expr::Function {
                name,
                args,
                volatile,
            } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.map_columns(f))
                    .collect::<Result<Vec<_>>>()?,
                volatile: *volatile,
            },
            Expr::Cast { expr, data_type } => Expr::Cast {
                expr: Box::new(expr.map_columns(f)?),
                data_type: data_type.clone(),
            },
        })
    }
}

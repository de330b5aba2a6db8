//! Column expressions: a small, composable AST evaluated column-wise.
//!
//! Expressions are inert values; nothing is computed until an [`eval`](crate::eval)
//! pass runs them against a table. Build them with [`col`], [`lit`] and the
//! combinator methods or arithmetic operators:
//!
//! ```
//! use ironframe::prelude::*;
//!
//! let revenue = (col("price") * col("qty")).alias("revenue");
//! let cheap = col("price").lt(10).and(col("in_stock"));
//! assert_eq!(revenue.output_name(), "revenue");
//! assert_eq!(cheap.referenced_columns(), vec!["price", "in_stock"]);
//! ```

use crate::combiners::AggFunc;
use crate::dtype::{DataType, Field, Schema};
use crate::error::FrameError;
use crate::value::Value;
use anyhow::{Result, bail};
use chrono::NaiveDate;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};

/// Operators with a single operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Abs,
    IsNull,
    IsNotNull,
    Upper,
    Lower,
    StrLen,
    Year,
    Month,
    Day,
}

/// Operators with two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod)
    }

    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&",
            Self::Or => "|",
        }
    }
}

/// A deferred column-wise computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Alias(Box<Expr>, String),
    Unary(UnaryOp, Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        dtype: DataType,
        strict: bool,
    },
    /// First non-null value across the inputs, row by row.
    Coalesce(Vec<Expr>),
    FillNull {
        expr: Box<Expr>,
        fill: Box<Expr>,
    },
    /// Regex match on a textual column.
    Contains {
        expr: Box<Expr>,
        pattern: String,
    },
    IsIn {
        expr: Box<Expr>,
        values: Vec<Value>,
    },
    Agg(AggFunc, Box<Expr>),
}

/// Reference a column by name.
#[must_use]
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// A literal broadcast to the height of the table it is evaluated against.
pub fn lit(v: impl Into<Value>) -> Expr {
    Expr::Literal(v.into())
}

/// First non-null value across `exprs`, row by row.
pub fn coalesce(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Coalesce(exprs.into_iter().collect())
}

/// Count rows per group (or in the whole table when not grouped).
#[must_use]
pub fn len() -> Expr {
    Expr::Agg(AggFunc::Len, Box::new(Expr::Literal(Value::Int(1)))).alias("len")
}

macro_rules! expr_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(v: $t) -> Self {
                Expr::Literal(Value::from(v))
            }
        })*
    };
}

expr_from!(i64, i32, f64, bool, &str, String, NaiveDate, Value);

macro_rules! binary_method {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            #[doc = concat!("`self ", stringify!($name), " other`, null-propagating.")]
            #[must_use]
            pub fn $name(self, other: impl Into<Expr>) -> Expr {
                self.binary(BinaryOp::$op, other.into())
            }
        )*
    };
}

macro_rules! agg_method {
    ($($name:ident => $func:ident),* $(,)?) => {
        $(
            #[doc = concat!("Reduce to the `", stringify!($name), "` of each group.")]
            #[must_use]
            pub fn $name(self) -> Expr {
                Expr::Agg(AggFunc::$func, Box::new(self))
            }
        )*
    };
}

macro_rules! unary_method {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            #[must_use]
            pub fn $name(self) -> Expr {
                Expr::Unary(UnaryOp::$op, Box::new(self))
            }
        )*
    };
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    binary_method!(
        eq => Eq,
        neq => NotEq,
        lt => Lt,
        lt_eq => LtEq,
        gt => Gt,
        gt_eq => GtEq,
        and => And,
        or => Or,
    );

    unary_method!(
        not => Not,
        abs => Abs,
        is_null => IsNull,
        is_not_null => IsNotNull,
        to_uppercase => Upper,
        to_lowercase => Lower,
        str_len => StrLen,
        year => Year,
        month => Month,
        day => Day,
    );

    agg_method!(
        sum => Sum,
        mean => Mean,
        count => Count,
        min => Min,
        max => Max,
        std => Std,
        var => Var,
        median => Median,
        first => First,
        last => Last,
        n_unique => NUnique,
    );

    /// Name the output column.
    #[must_use]
    pub fn alias(self, name: &str) -> Expr {
        Expr::Alias(Box::new(self), name.to_string())
    }

    /// Convert to `dtype`; unconvertible values become null.
    #[must_use]
    pub fn cast(self, dtype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
            strict: false,
        }
    }

    /// Convert to `dtype`; any unconvertible value is an error.
    #[must_use]
    pub fn strict_cast(self, dtype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
            strict: true,
        }
    }

    #[must_use]
    pub fn fill_null(self, fill: impl Into<Expr>) -> Expr {
        Expr::FillNull {
            expr: Box::new(self),
            fill: Box::new(fill.into()),
        }
    }

    /// Regex search over a textual column.
    #[must_use]
    pub fn str_contains(self, pattern: &str) -> Expr {
        Expr::Contains {
            expr: Box::new(self),
            pattern: pattern.to_string(),
        }
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::IsIn {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Name of the column this expression produces: its alias, else the
    /// leftmost referenced column, else `"literal"`.
    #[must_use]
    pub fn output_name(&self) -> String {
        match self {
            Expr::Alias(_, name) => name.clone(),
            other => other
                .referenced_columns()
                .first()
                .map_or_else(|| "literal".to_string(), |c| (*c).to_string()),
        }
    }

    /// Columns read by this expression, in first-reference order, deduplicated.
    #[must_use]
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Column(name) = e
                && !out.contains(&name.as_str())
            {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Whether an aggregate appears anywhere in the tree.
    #[must_use]
    pub fn has_agg(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Agg(..)));
        found
    }

    /// Pre-order traversal.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Column(_) | Expr::Literal(_) => {}
            Expr::Alias(e, _)
            | Expr::Unary(_, e)
            | Expr::Cast { expr: e, .. }
            | Expr::Contains { expr: e, .. }
            | Expr::IsIn { expr: e, .. }
            | Expr::Agg(_, e) => e.visit(f),
            Expr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::FillNull { expr, fill } => {
                expr.visit(f);
                fill.visit(f);
            }
            Expr::Coalesce(es) => es.iter().for_each(|e| e.visit(f)),
        }
    }

    /// Resolve the output field against `schema` without evaluating.
    ///
    /// # Errors
    /// `UnknownColumn` for a missing reference, `Type` for an operator applied
    /// to incompatible inputs.
    pub fn to_field(&self, schema: &Schema) -> Result<Field> {
        let dtype = self.resolve_dtype(schema)?;
        let nullable = !matches!(
            self,
            Expr::Unary(UnaryOp::IsNull | UnaryOp::IsNotNull, _)
                | Expr::Agg(AggFunc::Count | AggFunc::Len | AggFunc::NUnique, _)
        );
        Ok(Field {
            name: self.output_name(),
            dtype,
            nullable,
        })
    }

    fn resolve_dtype(&self, schema: &Schema) -> Result<DataType> {
        Ok(match self {
            Expr::Column(name) => schema.field(name)?.dtype,
            // an untyped null literal takes its type from context; alone it is a string
            Expr::Literal(v) => v.dtype().unwrap_or(DataType::Utf8),
            Expr::Alias(e, _) => e.resolve_dtype(schema)?,
            Expr::Unary(op, e) => unary_dtype(*op, e.resolve_dtype(schema)?)?,
            Expr::Binary { op, left, right } => {
                let (l, r) = pair_dtypes(left, right, schema)?;
                binary_dtype(*op, l, r)?
            }
            Expr::Cast { expr, dtype, .. } => {
                expr.resolve_dtype(schema)?;
                *dtype
            }
            Expr::Coalesce(es) => {
                let mut acc: Option<DataType> = None;
                for e in es.iter().filter(|e| !is_null_literal(e)) {
                    let t = e.resolve_dtype(schema)?;
                    acc = Some(match acc {
                        None => t,
                        Some(a) => a.supertype(t).ok_or_else(|| {
                            FrameError::Type(format!("coalesce mixes {a} and {t}"))
                        })?,
                    });
                }
                acc.unwrap_or(DataType::Utf8)
            }
            Expr::FillNull { expr, fill } => {
                let (l, r) = pair_dtypes(expr, fill, schema)?;
                l.supertype(r)
                    .ok_or_else(|| FrameError::Type(format!("cannot fill {l} nulls with {r}")))?
            }
            Expr::Contains { expr, .. } => {
                let t = expr.resolve_dtype(schema)?;
                if !t.is_textual() {
                    bail!(FrameError::Type(format!("str_contains needs a string column, got {t}")));
                }
                DataType::Boolean
            }
            Expr::IsIn { expr, .. } => {
                expr.resolve_dtype(schema)?;
                DataType::Boolean
            }
            Expr::Agg(func, e) => {
                if e.has_agg() {
                    bail!(FrameError::Type(format!("nested aggregate inside {}", func.name())));
                }
                func.output_dtype(e.resolve_dtype(schema)?)?
            }
        })
    }
}

pub(crate) fn is_null_literal(e: &Expr) -> bool {
    matches!(e, Expr::Literal(Value::Null))
}

/// Resolve both operand types; an untyped null literal borrows the other side's type.
fn pair_dtypes(left: &Expr, right: &Expr, schema: &Schema) -> Result<(DataType, DataType)> {
    match (is_null_literal(left), is_null_literal(right)) {
        (true, false) => {
            let r = right.resolve_dtype(schema)?;
            Ok((r, r))
        }
        (false, true) => {
            let l = left.resolve_dtype(schema)?;
            Ok((l, l))
        }
        _ => Ok((left.resolve_dtype(schema)?, right.resolve_dtype(schema)?)),
    }
}

fn unary_dtype(op: UnaryOp, t: DataType) -> Result<DataType> {
    let ok = match op {
        UnaryOp::Not => t == DataType::Boolean,
        UnaryOp::Neg | UnaryOp::Abs => t.is_numeric(),
        UnaryOp::IsNull | UnaryOp::IsNotNull => true,
        UnaryOp::Upper | UnaryOp::Lower | UnaryOp::StrLen => t.is_textual(),
        UnaryOp::Year | UnaryOp::Month | UnaryOp::Day => t == DataType::Date,
    };
    if !ok {
        bail!(FrameError::Type(format!("{op:?} is not defined for {t}")));
    }
    Ok(match op {
        UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => DataType::Boolean,
        UnaryOp::Neg | UnaryOp::Abs => t,
        UnaryOp::Upper | UnaryOp::Lower => DataType::Utf8,
        UnaryOp::StrLen | UnaryOp::Year | UnaryOp::Month | UnaryOp::Day => DataType::Int64,
    })
}

pub(crate) fn binary_dtype(op: BinaryOp, l: DataType, r: DataType) -> Result<DataType> {
    let mismatch = || FrameError::Type(format!("{l} {} {r} is not defined", op.symbol()));
    match op {
        BinaryOp::And | BinaryOp::Or => {
            if l == DataType::Boolean && r == DataType::Boolean {
                Ok(DataType::Boolean)
            } else {
                Err(mismatch().into())
            }
        }
        _ if op.is_comparison() => {
            l.supertype(r).ok_or_else(mismatch)?;
            Ok(DataType::Boolean)
        }
        BinaryOp::Add if l.is_textual() && r.is_textual() => Ok(DataType::Utf8),
        BinaryOp::Div if l.is_numeric() && r.is_numeric() => Ok(DataType::Float64),
        _ if l.is_numeric() && r.is_numeric() => Ok(l.supertype(r).ok_or_else(mismatch)?),
        _ => Err(mismatch().into()),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "col(\"{name}\")"),
            Expr::Literal(Value::Str(s)) => write!(f, "{s:?}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Alias(e, name) => write!(f, "{e}.alias(\"{name}\")"),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "-{e}"),
            Expr::Unary(op, e) => write!(f, "{e}.{}()", format!("{op:?}").to_lowercase()),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Cast { expr, dtype, strict } => {
                write!(f, "{expr}.{}({dtype})", if *strict { "strict_cast" } else { "cast" })
            }
            Expr::Coalesce(es) => {
                let parts: Vec<String> = es.iter().map(ToString::to_string).collect();
                write!(f, "coalesce([{}])", parts.join(", "))
            }
            Expr::FillNull { expr, fill } => write!(f, "{expr}.fill_null({fill})"),
            Expr::Contains { expr, pattern } => write!(f, "{expr}.str_contains({pattern:?})"),
            Expr::IsIn { expr, values } => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{expr}.is_in([{}])", parts.join(", "))
            }
            Expr::Agg(func, e) => write!(f, "{e}.{}()", func.name()),
        }
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;
    fn add(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Add, rhs.into())
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;
    fn sub(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Sub, rhs.into())
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;
    fn mul(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Mul, rhs.into())
    }
}

impl<T: Into<Expr>> Div<T> for Expr {
    type Output = Expr;
    fn div(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Div, rhs.into())
    }
}

impl<T: Into<Expr>> Rem<T> for Expr {
    type Output = Expr;
    fn rem(self, rhs: T) -> Expr {
        self.binary(BinaryOp::Mod, rhs.into())
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }
}

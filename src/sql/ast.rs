//! Abstract syntax tree for SQL statements

use crate::types::{IntegerWidth, Value};
use std::fmt;

/// Top-level query, one per statement
#[derive(Debug, Clone)]
pub enum Query {
    Transaction(TransactionQuery),
    CreateTable(CreateTableQuery),
    DropTable(DropTableQuery),
    Insert(InsertQuery),
    Select(SelectQuery),
}

/// Transaction statements are accepted as no-op markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionQuery {
    StartTransaction,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
pub struct CreateTableQuery {
    pub database: Option<String>,
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone)]
pub struct DropTableQuery {
    pub database: Option<String>,
    pub table: String,
}

/// Column definition as parsed; the executor lowers it to a typed
/// `types::Column` when the table is created.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub auto_increment: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Integer { width: IntegerWidth, unsigned: bool },
    Varchar(usize),
    Datetime,
}

#[derive(Debug, Clone)]
pub struct InsertQuery {
    pub database: Option<String>,
    pub table: String,
    /// None means the table's full column list in declaration order.
    pub columns: Option<Vec<String>>,
    pub values: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub from: Vec<TableRef>,
    pub columns: Vec<SelectColumn>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<ColumnRef>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    /// 0 means unbounded.
    pub limit: usize,
    pub offset: usize,
    pub distinct: bool,
}

/// One FROM source. The first source carries `join: None`; later sources
/// are combined with the accumulated row set according to `join` (`None`
/// again meaning a comma, i.e. a plain Cartesian product).
#[derive(Debug, Clone)]
pub enum TableRef {
    Table {
        database: Option<String>,
        table: String,
        alias: Option<String>,
        join: Option<JoinKind>,
        on: Option<Expr>,
    },
    Derived {
        query: Box<SelectQuery>,
        alias: Option<String>,
        join: Option<JoinKind>,
        on: Option<Expr>,
    },
}

impl TableRef {
    pub fn join(&self) -> Option<JoinKind> {
        match self {
            TableRef::Table { join, .. } | TableRef::Derived { join, .. } => *join,
        }
    }

    pub fn on(&self) -> Option<&Expr> {
        match self {
            TableRef::Table { on, .. } | TableRef::Derived { on, .. } => on.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Cross,
    Inner,
    Left,
}

#[derive(Debug, Clone)]
pub struct SelectColumn {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Expression
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value, including the transient DEFAULT marker
    Literal(Value),

    /// Column reference
    Column(ColumnRef),

    /// `*` or `t.*`; valid only in the select list
    Star { table: Option<String> },

    /// Value list, the right-hand side of IN
    Array(Vec<Expr>),

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Function call; `distinct` applies to aggregates only
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    Case {
        branches: Vec<(Expr, Expr)>,
        else_branch: Option<Box<Expr>>,
    },

    /// Scalar sub-query
    Subquery(Box<SelectQuery>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    In,
    Like,
    Is,
    IsNot,
}

impl BinaryOp {
    /// Operator precedence (higher binds tighter)
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::In
            | BinaryOp::Like
            | BinaryOp::Is
            | BinaryOp::IsNot => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div => 5,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::In => "IN",
            BinaryOp::Like => "LIKE",
            BinaryOp::Is => "IS",
            BinaryOp::IsNot => "IS NOT",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// SQL-ish rendering, used for un-aliased output column names and error
/// text. Text literals render unquoted the way MySQL names them.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Column(column) => write!(f, "{column}"),
            Expr::Star { table: Some(table) } => write!(f, "{table}.*"),
            Expr::Star { table: None } => f.write_str("*"),
            Expr::Array(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Expr::Binary { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Function { name, args, distinct } => {
                write!(f, "{name}(")?;
                if *distinct {
                    f.write_str("distinct ")?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Case { branches, else_branch } => {
                f.write_str("case")?;
                for (condition, value) in branches {
                    write!(f, " when {condition} then {value}")?;
                }
                if let Some(value) = else_branch {
                    write!(f, " else {value}")?;
                }
                f.write_str(" end")
            }
            Expr::Subquery(_) => f.write_str("(select ...)"),
        }
    }
}

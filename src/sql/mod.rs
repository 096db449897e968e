//! SQL engine: lexer, parser, evaluator, and executor
//!
//! Statements flow text -> tokens -> typed query AST -> executor. SELECT
//! queries run a six-stage relational pipeline; INSERT queries run the
//! insert processor. Both lean on the expression evaluator.

pub mod ast;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::Query;
pub use evaluator::Evaluator;
pub use executor::{QueryExecutor, QueryResult};
pub use lexer::Lexer;
pub use parser::Parser;

use crate::catalog::Server;
use crate::error::Result;
use crate::types::Value;

/// Parse one SQL statement into its typed query form, substituting `?`
/// placeholders from `params`.
pub fn parse(sql: &str, params: &[Value]) -> Result<Query> {
    let tokens = Lexer::new(sql).tokenize()?;
    Parser::new(tokens, params).parse()
}

/// Parse and execute one SQL statement against the server.
pub fn execute_sql(server: &Server, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let query = parse(sql, params)?;
    QueryExecutor::new(server).execute(&query)
}

//! MimicDB
//!
//! An in-process, single-node SQL engine emulating a useful subset of MySQL
//! semantics: connection-less query execution against in-memory relational
//! tables. Intended as a test double or embedded SQL engine, not a
//! persistent database.
//!
//! ## Architecture
//! - SQL layer: lexer + parser producing a typed query AST
//! - Execution: a six-stage relational pipeline (FROM/JOIN, WHERE,
//!   GROUP BY, ORDER BY, SELECT/HAVING, LIMIT) driven by a recursive
//!   expression evaluator
//! - Catalog: a server holds named databases; a database holds in-memory
//!   tables with typed, cast-enforcing columns
//!
//! ```
//! use mimicdb::{execute_sql, Server, Value};
//!
//! let server = Server::new();
//! server.create_database("mydb").unwrap();
//! server.use_database("mydb").unwrap();
//!
//! execute_sql(&server, "CREATE TABLE users (id INT AUTO_INCREMENT, name VARCHAR(32))", &[]).unwrap();
//! execute_sql(&server, "INSERT INTO users (name) VALUES (?)", &[Value::Text("ada".into())]).unwrap();
//!
//! let result = execute_sql(&server, "SELECT id, name FROM users", &[]).unwrap();
//! assert_eq!(result.row_count(), 1);
//! ```

pub mod catalog;
pub mod config;
pub mod sql;
pub mod types;

mod error;

pub use catalog::{Database, Server};
pub use config::ServerConfig;
pub use error::{CastCode, EngineError, Result};
pub use sql::{execute_sql, parse, Query, QueryExecutor, QueryResult};
pub use types::{Column, Datetime, Row, Table, Value};

//! Registry of databases and tables
//!
//! A `Server` holds named `Database`s; a `Database` holds named in-memory
//! `Table`s. Table stores sit behind `RwLock`s so a multi-threaded host can
//! share one server; the engine itself never executes queries concurrently.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::{EngineError, Result};
use crate::types::Table;

/// A named collection of tables.
#[derive(Debug)]
pub struct Database {
    name: String,
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
}

impl Database {
    fn new(name: String) -> Self {
        Self {
            name,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables.read().get(name).cloned().ok_or_else(|| {
            EngineError::Processor(format!("Table '{}.{}' doesn't exist", self.name, name))
        })
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn create_table(&self, table: Table) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(table.name()) {
            return Err(EngineError::Processor(format!(
                "Table '{}' already exists",
                table.name()
            )));
        }
        tables.insert(table.name().to_string(), Arc::new(RwLock::new(table)));
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.tables
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::Processor(format!("Unknown table '{name}'")))
    }
}

/// The engine's root object: named databases plus the session's current
/// database, used as a fallback when a query omits the qualifier.
pub struct Server {
    config: ServerConfig,
    databases: RwLock<HashMap<String, Arc<Database>>>,
    current: RwLock<Option<String>>,
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let server = Self {
            config,
            databases: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
        };
        if let Some(name) = server.config.database.clone() {
            // A fresh server cannot already hold the name.
            let _ = server.create_database(&name);
            let _ = server.use_database(&name);
        }
        server
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn create_database(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.write();
        if databases.contains_key(name) {
            return Err(EngineError::Processor(format!(
                "Can't create database '{name}'; database exists"
            )));
        }
        databases.insert(name.to_string(), Arc::new(Database::new(name.to_string())));
        Ok(())
    }

    pub fn use_database(&self, name: &str) -> Result<()> {
        if !self.databases.read().contains_key(name) {
            return Err(EngineError::Processor(format!("Unknown database '{name}'")));
        }
        *self.current.write() = Some(name.to_string());
        Ok(())
    }

    pub fn current_database(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Resolve a database by name, falling back to the current database
    /// when the query omits the qualifier.
    pub fn database(&self, name: Option<&str>) -> Result<Arc<Database>> {
        let current = self.current.read();
        let name = match name.or(current.as_deref()) {
            Some(name) => name,
            None => return Err(EngineError::Processor("No database selected".into())),
        };
        self.databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Processor(format!("Unknown database '{name}'")))
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

//! Knowledge base handle over SQLite.
//!
//! The `Database` owns the single connection that all adapters of one run
//! share (the ingestion core is single-threaded per handle). It provides
//! schema bootstrap, secondary-index management for the bulk-update
//! envelope, the vocabulary registry, and the derived-table rebuilders in
//! [`resolve`](self::resolve).

pub mod cli;
mod resolve;
pub mod schema;

pub use resolve::ZONE_SIZE;

use std::path::Path;

use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Error;

/// Handle to the knowledge base store.
pub struct Database {
    /// The underlying connection.
    conn: Connection,
}

impl Database {
    /// Create a new and empty knowledge base at `path`, truncating any
    /// existing file, and initialize the schema.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        std::fs::write(path.as_ref(), [])?;
        let db = Self::open(path)?;
        db.init_schema()?;
        Ok(db)
    }

    /// Open an existing knowledge base at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a fresh in-memory knowledge base with initialized schema.
    pub fn open_in_memory() -> Result<Self, Error> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Access the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create all tables and secondary indexes.
    pub fn init_schema(&self) -> Result<(), Error> {
        self.conn.execute_batch("BEGIN;")?;
        for table in schema::TABLES {
            self.conn.execute(table.create, [])?;
            for index in table.indexes {
                self.conn.execute(index.create, [])?;
            }
        }
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    // -- transactions --------------------------------------------------

    /// Begin a transaction on the shared connection.
    pub(crate) fn begin(&self) -> Result<(), Error> {
        self.conn.execute_batch("BEGIN;")?;
        Ok(())
    }

    /// Commit the current transaction.
    pub(crate) fn commit(&self) -> Result<(), Error> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    /// Roll back the current transaction.
    pub(crate) fn rollback(&self) -> Result<(), Error> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    // -- secondary indexes ---------------------------------------------

    /// Drop the secondary indexes of the given table (primary keys are
    /// part of the table definitions and are retained).
    pub fn drop_table_indexes(&self, table: &str) -> Result<(), Error> {
        if let Some(def) = schema::table(table) {
            for index in def.indexes {
                self.conn
                    .execute(&format!("DROP INDEX IF EXISTS {}", index.name), [])?;
            }
        }
        Ok(())
    }

    /// Recreate the secondary indexes of the given table.
    pub fn create_table_indexes(&self, table: &str) -> Result<(), Error> {
        if let Some(def) = schema::table(table) {
            for index in def.indexes {
                self.conn.execute(index.create, [])?;
            }
        }
        Ok(())
    }

    // -- vocabulary lookups --------------------------------------------

    /// Look up a namespace id by (case-insensitive) name.
    pub fn namespace_id(&self, name: &str) -> Result<Option<i64>, Error> {
        self.lookup_id(
            "SELECT namespace_id FROM namespace WHERE namespace = LOWER(?1)",
            name,
        )
    }

    /// Look up a type id by (case-insensitive) name.
    pub fn type_id(&self, name: &str) -> Result<Option<i64>, Error> {
        self.lookup_id("SELECT type_id FROM type WHERE type = LOWER(?1)", name)
    }

    /// Look up a relationship id by (case-insensitive) name.
    pub fn relationship_id(&self, name: &str) -> Result<Option<i64>, Error> {
        self.lookup_id(
            "SELECT relationship_id FROM relationship WHERE relationship = LOWER(?1)",
            name,
        )
    }

    /// Look up a role id by (case-insensitive) name.
    pub fn role_id(&self, name: &str) -> Result<Option<i64>, Error> {
        self.lookup_id("SELECT role_id FROM role WHERE role = LOWER(?1)", name)
    }

    /// Look up a population id by (case-insensitive) name.
    pub fn population_id(&self, name: &str) -> Result<Option<i64>, Error> {
        self.lookup_id(
            "SELECT population_id FROM population WHERE population = LOWER(?1)",
            name,
        )
    }

    /// Look up a source id by (case-insensitive) name.
    pub fn source_id(&self, name: &str) -> Result<Option<i64>, Error> {
        self.lookup_id("SELECT source_id FROM source WHERE source = LOWER(?1)", name)
    }

    /// Run a single-id lookup query with one string parameter.
    fn lookup_id(&self, sql: &str, name: &str) -> Result<Option<i64>, Error> {
        self.conn
            .query_row(sql, params![name], |row| row.get(0))
            .optional()
            .map_err(Error::from)
    }

    // -- vocabulary upserts --------------------------------------------

    /// Get or create the namespace with the given name and return its id.
    ///
    /// Names are stored lowercased; repeated calls return the same id.
    pub fn add_namespace(&self, name: &str, multigene: bool) -> Result<i64, Error> {
        if let Some(id) = self.namespace_id(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO namespace (namespace, multigene) VALUES (LOWER(?1), ?2)",
            params![name, multigene as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get or create namespaces in bulk; one lookup pass, then inserts for
    /// the missing names only. The returned mapping preserves input order.
    pub fn add_namespaces(
        &self,
        namespaces: &[(&str, bool)],
    ) -> Result<IndexMap<String, i64>, Error> {
        let mut result = IndexMap::with_capacity(namespaces.len());
        {
            let mut lookup = self
                .conn
                .prepare("SELECT namespace_id FROM namespace WHERE namespace = LOWER(?1)")?;
            for (name, _) in namespaces {
                let id: Option<i64> = lookup
                    .query_row(params![name], |row| row.get(0))
                    .optional()?;
                result.insert((*name).to_string(), id.unwrap_or(0));
            }
        }
        let mut insert = self
            .conn
            .prepare("INSERT INTO namespace (namespace, multigene) VALUES (LOWER(?1), ?2)")?;
        for (name, multigene) in namespaces {
            if result[*name] == 0 {
                insert.execute(params![name, *multigene as i64])?;
                result[*name] = self.conn.last_insert_rowid();
            }
        }
        Ok(result)
    }

    /// Get or create the type with the given name and return its id.
    pub fn add_type(&self, name: &str) -> Result<i64, Error> {
        if let Some(id) = self.type_id(name)? {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO type (type) VALUES (LOWER(?1))", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get or create types in bulk, preserving input order in the result.
    pub fn add_types(&self, names: &[&str]) -> Result<IndexMap<String, i64>, Error> {
        self.upsert_names(
            names,
            "SELECT type_id FROM type WHERE type = LOWER(?1)",
            "INSERT INTO type (type) VALUES (LOWER(?1))",
        )
    }

    /// Get or create the relationship with the given name and return its id.
    pub fn add_relationship(&self, name: &str) -> Result<i64, Error> {
        if let Some(id) = self.relationship_id(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO relationship (relationship) VALUES (LOWER(?1))",
            params![name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get or create relationships in bulk, preserving input order.
    pub fn add_relationships(&self, names: &[&str]) -> Result<IndexMap<String, i64>, Error> {
        self.upsert_names(
            names,
            "SELECT relationship_id FROM relationship WHERE relationship = LOWER(?1)",
            "INSERT INTO relationship (relationship) VALUES (LOWER(?1))",
        )
    }

    /// Get or create the role with the given name and return its id.
    pub fn add_role(
        &self,
        name: &str,
        description: Option<&str>,
        coding: Option<bool>,
        exon: Option<bool>,
    ) -> Result<i64, Error> {
        if let Some(id) = self.role_id(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO role (role, description, coding, exon) VALUES (LOWER(?1), ?2, ?3, ?4)",
            params![name, description, coding.map(i64::from), exon.map(i64::from)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get or create roles in bulk, given as
    /// `(name, description, coding, exon)`; one lookup pass, then inserts
    /// for the missing names only, preserving input order in the result.
    pub fn add_roles(
        &self,
        roles: &[(&str, Option<&str>, Option<bool>, Option<bool>)],
    ) -> Result<IndexMap<String, i64>, Error> {
        let mut result = IndexMap::with_capacity(roles.len());
        {
            let mut lookup = self
                .conn
                .prepare("SELECT role_id FROM role WHERE role = LOWER(?1)")?;
            for (name, _, _, _) in roles {
                let id: Option<i64> = lookup
                    .query_row(params![name], |row| row.get(0))
                    .optional()?;
                result.insert((*name).to_string(), id.unwrap_or(0));
            }
        }
        let mut insert = self.conn.prepare(
            "INSERT INTO role (role, description, coding, exon) VALUES (LOWER(?1), ?2, ?3, ?4)",
        )?;
        for (name, description, coding, exon) in roles {
            if result[*name] == 0 {
                insert.execute(params![
                    name,
                    description,
                    coding.map(i64::from),
                    exon.map(i64::from)
                ])?;
                result[*name] = self.conn.last_insert_rowid();
            }
        }
        Ok(result)
    }

    /// Get or create the population with the given name and return its id.
    pub fn add_population(
        &self,
        name: &str,
        ldcomment: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64, Error> {
        if let Some(id) = self.population_id(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO population (population, ldcomment, description) \
             VALUES (LOWER(?1), ?2, ?3)",
            params![name, ldcomment, description],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get or create populations in bulk, given as
    /// `(name, ldcomment, description)`, preserving input order.
    pub fn add_populations(
        &self,
        populations: &[(&str, Option<&str>, Option<&str>)],
    ) -> Result<IndexMap<String, i64>, Error> {
        let mut result = IndexMap::with_capacity(populations.len());
        {
            let mut lookup = self
                .conn
                .prepare("SELECT population_id FROM population WHERE population = LOWER(?1)")?;
            for (name, _, _) in populations {
                let id: Option<i64> = lookup
                    .query_row(params![name], |row| row.get(0))
                    .optional()?;
                result.insert((*name).to_string(), id.unwrap_or(0));
            }
        }
        let mut insert = self.conn.prepare(
            "INSERT INTO population (population, ldcomment, description) \
             VALUES (LOWER(?1), ?2, ?3)",
        )?;
        for (name, ldcomment, description) in populations {
            if result[*name] == 0 {
                insert.execute(params![name, ldcomment, description])?;
                result[*name] = self.conn.last_insert_rowid();
            }
        }
        Ok(result)
    }

    /// Get or create the source with the given name and return its id.
    pub fn add_source(&self, name: &str) -> Result<i64, Error> {
        if let Some(id) = self.source_id(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO source (source) VALUES (LOWER(?1))",
            params![name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get or create sources in bulk, preserving input order.
    pub fn add_sources(&self, names: &[&str]) -> Result<IndexMap<String, i64>, Error> {
        self.upsert_names(
            names,
            "SELECT source_id FROM source WHERE source = LOWER(?1)",
            "INSERT INTO source (source) VALUES (LOWER(?1))",
        )
    }

    /// Shared bulk upsert for the single-column vocabulary tables.
    fn upsert_names(
        &self,
        names: &[&str],
        select_sql: &str,
        insert_sql: &str,
    ) -> Result<IndexMap<String, i64>, Error> {
        let mut result = IndexMap::with_capacity(names.len());
        {
            let mut lookup = self.conn.prepare(select_sql)?;
            for name in names {
                let id: Option<i64> = lookup
                    .query_row(params![name], |row| row.get(0))
                    .optional()?;
                result.insert((*name).to_string(), id.unwrap_or(0));
            }
        }
        let mut insert = self.conn.prepare(insert_sql)?;
        for name in names {
            if result[*name] == 0 {
                insert.execute(params![name])?;
                result[*name] = self.conn.last_insert_rowid();
            }
        }
        Ok(result)
    }

    // -- test support --------------------------------------------------

    /// Count the rows of a table, for tests and sanity checks.
    pub fn count_rows(&self, table: &str) -> Result<i64, Error> {
        let quoted = if table == "group" {
            "\"group\"".to_string()
        } else {
            table.to_string()
        };
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |row| {
                row.get(0)
            })
            .map_err(Error::from)
    }
}

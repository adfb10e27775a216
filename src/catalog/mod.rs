mod error;
mod parser;

pub use error::{CatalogError, CatalogResult};
pub use parser::{TableDef, parse_schema};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::record::{DbFile, HeapFile, TableId, TupleDesc};

/// A registered table
#[derive(Debug, Clone)]
struct Table {
    name: String,
    file: Arc<dyn DbFile>,
    pkey_field: String,
}

/// Registry of tables: name and id to schema, backing file and primary key.
///
/// Tables live in one vector; `by_name` and `by_id` index into it. A table id
/// is derived from its file, so re-adding the same file replaces the entry in
/// place, while adding a different file under an existing name only moves the
/// name. Two different files with the same id are refused.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<Table>,
    by_name: AHashMap<String, usize>,
    by_id: AHashMap<TableId, usize>,
    /// Directory `load_schema` creates table files in
    data_dir: PathBuf,
}

impl Catalog {
    /// Create an empty catalog placing schema-loaded tables in the
    /// current directory
    pub fn new() -> Self {
        Self::with_data_dir(".")
    }

    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            tables: Vec::new(),
            by_name: AHashMap::new(),
            by_id: AHashMap::new(),
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Register `file` under `name` with no primary key
    pub fn add_table(&mut self, file: Arc<dyn DbFile>, name: impl Into<String>) -> CatalogResult<()> {
        self.add_table_with_key(file, name, "")
    }

    /// Register `file` under `name`; an empty `pkey_field` means no primary key.
    /// The last table added under a given name wins.
    pub fn add_table_with_key(
        &mut self,
        file: Arc<dyn DbFile>,
        name: impl Into<String>,
        pkey_field: impl Into<String>,
    ) -> CatalogResult<()> {
        let name = name.into();
        let id = file.id();

        let idx = match self.by_id.get(&id).copied() {
            Some(idx) => {
                let existing = &self.tables[idx];
                if existing.file.path() != file.path() {
                    return Err(CatalogError::IdConflict {
                        id,
                        existing: existing.file.path().to_path_buf(),
                        incoming: file.path().to_path_buf(),
                    });
                }

                let renamed_from = (existing.name != name
                    && self.by_name.get(&existing.name) == Some(&idx))
                .then(|| existing.name.clone());

                self.tables[idx] = Table {
                    name: name.clone(),
                    file,
                    pkey_field: pkey_field.into(),
                };

                // A renamed entry gives its old name back to the latest other
                // table still carrying it
                if let Some(old_name) = renamed_from {
                    match self.tables.iter().rposition(|table| table.name == old_name) {
                        Some(other) => self.by_name.insert(old_name, other),
                        None => self.by_name.remove(&old_name),
                    };
                }
                idx
            }
            None => {
                self.tables.push(Table {
                    name: name.clone(),
                    file,
                    pkey_field: pkey_field.into(),
                });
                let idx = self.tables.len() - 1;
                self.by_id.insert(id, idx);
                idx
            }
        };

        self.by_name.insert(name, idx);
        Ok(())
    }

    /// Return the id of the table with a specified name
    pub fn get_table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.by_name
            .get(name)
            .map(|&idx| self.tables[idx].file.id())
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// Returns the schema of the specified table
    pub fn get_tuple_desc(&self, table_id: TableId) -> CatalogResult<&TupleDesc> {
        Ok(self.table(table_id)?.file.tuple_desc().as_ref())
    }

    /// Returns the file holding the contents of the specified table
    pub fn get_db_file(&self, table_id: TableId) -> CatalogResult<Arc<dyn DbFile>> {
        Ok(Arc::clone(&self.table(table_id)?.file))
    }

    pub fn get_primary_key(&self, table_id: TableId) -> CatalogResult<Option<&str>> {
        let table = self.table(table_id)?;
        Ok(Some(table.pkey_field.as_str()).filter(|pkey| !pkey.is_empty()))
    }

    pub fn get_table_name(&self, table_id: TableId) -> CatalogResult<&str> {
        Ok(&self.table(table_id)?.name)
    }

    /// Ids of every registered table, in registration order
    pub fn table_id_iterator(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables.iter().map(|table| table.file.id())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Delete all tables from the catalog
    pub fn clear(&mut self) {
        self.tables.clear();
        self.by_name.clear();
        self.by_id.clear();
    }

    /// Create and register the tables described by `source`, one per line:
    /// `name (field type [pk], ...)`. Each table is stored in
    /// `<data_dir>/<name>.dat`. Nothing is registered unless every line
    /// parses and every file opens.
    pub fn load_schema(&mut self, source: &str) -> CatalogResult<()> {
        let data_dir = self.data_dir.clone();
        self.load_schema_into(source, &data_dir)
    }

    /// Like `load_schema`, reading the description from a file and placing
    /// table files next to it
    pub fn load_schema_file<P: AsRef<Path>>(&mut self, path: P) -> CatalogResult<()> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let data_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.data_dir.clone());
        self.load_schema_into(&source, &data_dir)
    }

    /// Write every table's name, file, primary key and schema as JSON
    pub fn save_metadata<P: AsRef<Path>>(&self, path: P) -> CatalogResult<()> {
        let metadata = CatalogMetadata {
            tables: self
                .tables
                .iter()
                .map(|table| TableMetadata {
                    name: table.name.clone(),
                    file: table.file.path().to_path_buf(),
                    primary_key: Some(table.pkey_field.clone()).filter(|pkey| !pkey.is_empty()),
                    columns: TupleDesc::clone(table.file.tuple_desc()),
                })
                .collect(),
        };
        let content = serde_json::to_string_pretty(&metadata)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Register the tables recorded by `save_metadata`; all or nothing
    pub fn load_metadata<P: AsRef<Path>>(&mut self, path: P) -> CatalogResult<()> {
        let content = fs::read_to_string(path)?;
        let metadata: CatalogMetadata = serde_json::from_str(&content)?;

        let mut staged = self.clone();
        for table in metadata.tables {
            let file = HeapFile::open(&table.file, table.columns)?;
            staged.add_table_with_key(
                Arc::new(file),
                table.name,
                table.primary_key.unwrap_or_default(),
            )?;
        }

        *self = staged;
        Ok(())
    }

    fn load_schema_into(&mut self, source: &str, data_dir: &Path) -> CatalogResult<()> {
        let defs = parse_schema(source)?;

        // Build on a copy so a failure part way leaves this catalog untouched
        let mut staged = self.clone();
        let mut created = Vec::new();
        let mut added = Vec::with_capacity(defs.len());
        for def in defs {
            let path = data_dir.join(format!("{}.dat", def.name));
            if !path.exists() {
                created.push(path.clone());
            }

            let registered = HeapFile::open(&path, def.desc)
                .map_err(CatalogError::from)
                .and_then(|file| {
                    staged.add_table_with_key(
                        Arc::new(file),
                        def.name.clone(),
                        def.primary_key.unwrap_or_default(),
                    )
                });
            if let Err(err) = registered {
                drop(staged);
                Self::remove_created(&created);
                return Err(err);
            }
            added.push(def.name);
        }

        *self = staged;
        for name in added {
            if let Ok(id) = self.get_table_id(&name)
                && let Ok(desc) = self.get_tuple_desc(id)
            {
                info!(table = %name, schema = %desc, "added table");
            }
        }
        Ok(())
    }

    /// Remove the files a failed load created, so it leaves nothing behind
    fn remove_created(created: &[PathBuf]) {
        for path in created {
            if let Err(err) = fs::remove_file(path)
                && err.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %err, "failed to remove table file");
            }
        }
    }

    fn table(&self, table_id: TableId) -> CatalogResult<&Table> {
        self.by_id
            .get(&table_id)
            .map(|&idx| &self.tables[idx])
            .ok_or(CatalogError::TableIdNotFound(table_id))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMetadata {
    name: String,
    file: PathBuf,
    primary_key: Option<String>,
    columns: TupleDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogMetadata {
    tables: Vec<TableMetadata>,
}

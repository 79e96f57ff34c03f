use std::collections::HashMap;
use std::path::{Path, PathBuf};

use zola_db_core::{Result, ZolaError};

/// A per-table, per-column string dictionary: `get_or_insert` assigns the
/// next dense `u32` key to a new string and is idempotent for strings
/// already present. A string column is stored as a 32-bit dictionary key
/// plus a per-column dictionary rather than the table-scoped, `u64`-keyed
/// dictionary this is descended from.
///
/// On-disk format: one name per line, key implied by line number. `save`
/// truncates and rewrites the whole file, which is fine at symbol
/// cardinality, not row count.
pub struct SymbolDictionary {
    path: PathBuf,
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl SymbolDictionary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SymbolDictionary {
            path: path.into(),
            names: Vec::new(),
            ids: HashMap::new(),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(SymbolDictionary::new(path));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ZolaError::io(&path, e))?;
        let mut names = Vec::new();
        let mut ids = HashMap::new();
        for (i, line) in content.lines().enumerate() {
            if !line.is_empty() {
                names.push(line.to_string());
                ids.insert(line.to_string(), i as u32);
            }
        }
        Ok(SymbolDictionary { path, names, ids })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Looks up `value`, assigning it the next dense key if absent. The
    /// target dictionary must be the sole writer during a merge, which the
    /// importer enforces by giving each target symbol column its own task
    /// and processing shadow dictionaries sequentially within that task.
    pub fn get_or_insert(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.ids.get(value) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(value.to_string());
        self.ids.insert(value.to_string(), id);
        id
    }

    pub fn get(&self, value: &str) -> Option<u32> {
        self.ids.get(value).copied()
    }

    pub fn name_of(&self, key: u32) -> Option<&str> {
        self.names.get(key as usize).map(|s| s.as_str())
    }

    pub fn save(&self) -> Result<()> {
        let content: String = self
            .names
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            + if self.names.is_empty() { "" } else { "\n" };
        std::fs::write(&self.path, content).map_err(|e| ZolaError::io(&self.path, e))
    }
}

/// Path convention for a column's dictionary file: `<table_dir>/<col>.symd`.
pub fn dict_path(table_dir: &Path, col: &str) -> PathBuf {
    table_dir.join(format!("{col}.symd"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn get_or_insert_is_dense_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut dict = SymbolDictionary::new(dir.path().join("sym.symd"));
        assert_eq!(dict.get_or_insert("a"), 0);
        assert_eq!(dict.get_or_insert("b"), 1);
        assert_eq!(dict.get_or_insert("a"), 0);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn save_and_open_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sym.symd");
        let mut dict = SymbolDictionary::new(&path);
        dict.get_or_insert("a");
        dict.get_or_insert("b");
        dict.get_or_insert("c");
        dict.save().unwrap();

        let reopened = SymbolDictionary::open(&path).unwrap();
        assert_eq!(reopened.get("a"), Some(0));
        assert_eq!(reopened.get("b"), Some(1));
        assert_eq!(reopened.get("c"), Some(2));
        assert_eq!(reopened.name_of(1), Some("b"));
    }
}

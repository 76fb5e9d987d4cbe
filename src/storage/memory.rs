//! In-memory database
//!
//! Committed rows live behind one `RwLock`. Each session stages its writes
//! locally and publishes them atomically at top-level commit, re-checking
//! unique constraints against the state current at that moment.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::errors::{StorageError, StorageResult};
use super::{Database, DbSession, Record};

#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    data: Record,
}

#[derive(Debug, Clone, Default)]
struct Table {
    rows: HashMap<String, Row>,
}

impl Table {
    fn ordered(&self) -> Vec<(String, Record)> {
        let mut rows: Vec<(&String, &Row)> = self.rows.iter().collect();
        rows.sort_by_key(|(_, row)| row.seq);
        rows.into_iter()
            .map(|(id, row)| (id.clone(), row.data.clone()))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: HashMap<String, Table>,
    unique: HashMap<String, Vec<String>>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
enum Write {
    Put { model: String, id: String, row: Record },
    Delete { model: String, id: String },
}

impl Write {
    fn model(&self) -> &str {
        match self {
            Write::Put { model, .. } | Write::Delete { model, .. } => model,
        }
    }
}

/// In-memory [`Database`] with per-session staging and savepoints
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    shared: Arc<RwLock<Shared>>,
}

impl InMemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare unique fields for a model
    pub fn with_unique(self, model: &str, fields: &[&str]) -> Self {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.declare_unique(model, &fields);
        self
    }

    /// Committed rows of a model, in insertion order
    pub fn rows(&self, model: &str) -> Vec<Record> {
        self.shared
            .read()
            .map(|shared| {
                shared
                    .tables
                    .get(model)
                    .map(|t| t.ordered().into_iter().map(|(_, row)| row).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Number of committed rows of a model
    pub fn count(&self, model: &str) -> usize {
        self.shared
            .read()
            .map(|shared| shared.tables.get(model).map_or(0, |t| t.rows.len()))
            .unwrap_or(0)
    }
}

impl Database for InMemoryDatabase {
    fn session(&self) -> Box<dyn DbSession> {
        Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
            writes: Vec::new(),
            savepoints: Vec::new(),
            active: false,
        })
    }

    fn declare_unique(&self, model: &str, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        if let Ok(mut shared) = self.shared.write() {
            let entry = shared.unique.entry(model.to_string()).or_default();
            for field in fields {
                if !entry.contains(field) {
                    entry.push(field.clone());
                }
            }
        }
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("lock poisoned".to_string())
}

fn check_unique<'a>(
    model: &str,
    rows: impl Iterator<Item = &'a Record> + Clone,
    fields: &[String],
) -> StorageResult<()> {
    for field in fields {
        let mut seen = HashSet::new();
        for row in rows.clone() {
            match row.get(field) {
                None | Some(serde_json::Value::Null) => continue,
                Some(value) => {
                    if !seen.insert(value.to_string()) {
                        return Err(StorageError::UniqueViolation {
                            model: model.to_string(),
                            field: field.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

struct MemorySession {
    shared: Arc<RwLock<Shared>>,
    writes: Vec<Write>,
    /// Length of `writes` when each savepoint was pushed
    savepoints: Vec<usize>,
    active: bool,
}

impl MemorySession {
    /// Committed rows overlaid with this session's staged writes
    fn view(&self, model: &str) -> StorageResult<Vec<(String, Record)>> {
        let mut rows = {
            let shared = self.shared.read().map_err(poisoned)?;
            shared
                .tables
                .get(model)
                .map(Table::ordered)
                .unwrap_or_default()
        };

        for write in self.writes.iter().filter(|w| w.model() == model) {
            match write {
                Write::Put { id, row, .. } => {
                    match rows.iter_mut().find(|(existing, _)| existing == id) {
                        Some(slot) => slot.1 = row.clone(),
                        None => rows.push((id.clone(), row.clone())),
                    }
                }
                Write::Delete { id, .. } => rows.retain(|(existing, _)| existing != id),
            }
        }
        Ok(rows)
    }

    fn unique_fields(&self, model: &str) -> StorageResult<Vec<String>> {
        let shared = self.shared.read().map_err(poisoned)?;
        Ok(shared.unique.get(model).cloned().unwrap_or_default())
    }

    /// Apply writes to the committed state, all or nothing
    fn publish(&self, writes: &[Write]) -> StorageResult<()> {
        let mut guard = self.shared.write().map_err(poisoned)?;
        let shared = &mut *guard;

        let mut staged: HashMap<String, Table> = HashMap::new();
        for write in writes {
            if !staged.contains_key(write.model()) {
                let table = shared.tables.get(write.model()).cloned().unwrap_or_default();
                staged.insert(write.model().to_string(), table);
            }
        }

        let mut next_seq = shared.next_seq;
        for write in writes {
            let Some(table) = staged.get_mut(write.model()) else {
                continue;
            };
            match write {
                Write::Put { id, row, .. } => match table.rows.get_mut(id) {
                    Some(existing) => existing.data = row.clone(),
                    None => {
                        next_seq += 1;
                        table.rows.insert(
                            id.clone(),
                            Row {
                                seq: next_seq,
                                data: row.clone(),
                            },
                        );
                    }
                },
                Write::Delete { id, .. } => {
                    table.rows.remove(id);
                }
            }
        }

        for (model, table) in &staged {
            if let Some(fields) = shared.unique.get(model) {
                check_unique(model, table.rows.values().map(|r| &r.data), fields)?;
            }
        }

        shared.next_seq = next_seq;
        shared.tables.extend(staged);
        Ok(())
    }
}

#[async_trait]
impl DbSession for MemorySession {
    async fn begin(&mut self) -> StorageResult<()> {
        if self.active {
            self.savepoints.push(self.writes.len());
        } else {
            self.active = true;
        }
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<()> {
        if self.savepoints.pop().is_some() {
            return Ok(());
        }
        if !self.active {
            return Err(StorageError::NoTransaction);
        }

        // The transaction is over whether or not publishing succeeds.
        self.active = false;
        let writes = std::mem::take(&mut self.writes);
        if writes.is_empty() {
            return Ok(());
        }
        self.publish(&writes)
    }

    async fn rollback(&mut self) -> StorageResult<()> {
        if let Some(mark) = self.savepoints.pop() {
            self.writes.truncate(mark);
            return Ok(());
        }
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        self.active = false;
        self.writes.clear();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.active
    }

    fn depth(&self) -> usize {
        if self.active {
            1 + self.savepoints.len()
        } else {
            0
        }
    }

    async fn get(&self, model: &str, id: &str) -> StorageResult<Option<Record>> {
        for write in self.writes.iter().rev() {
            match write {
                Write::Put { model: m, id: i, row } if m == model && i == id => {
                    return Ok(Some(row.clone()))
                }
                Write::Delete { model: m, id: i } if m == model && i == id => return Ok(None),
                _ => {}
            }
        }

        let shared = self.shared.read().map_err(poisoned)?;
        Ok(shared
            .tables
            .get(model)
            .and_then(|t| t.rows.get(id))
            .map(|row| row.data.clone()))
    }

    async fn list(&self, model: &str, filters: &Record) -> StorageResult<Vec<Record>> {
        Ok(self
            .view(model)?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| filters.iter().all(|(k, v)| row.get(k) == Some(v)))
            .collect())
    }

    async fn add(&mut self, model: &str, id: &str, row: Record) -> StorageResult<()> {
        let fields = self.unique_fields(model)?;
        if !fields.is_empty() {
            let mut rows: Vec<Record> = self
                .view(model)?
                .into_iter()
                .filter(|(existing, _)| existing != id)
                .map(|(_, r)| r)
                .collect();
            rows.push(row.clone());
            check_unique(model, rows.iter(), &fields)?;
        }

        let write = Write::Put {
            model: model.to_string(),
            id: id.to_string(),
            row,
        };
        if self.active {
            self.writes.push(write);
            Ok(())
        } else {
            self.publish(std::slice::from_ref(&write))
        }
    }

    async fn delete(&mut self, model: &str, id: &str) -> StorageResult<bool> {
        let existed = self.get(model, id).await?.is_some();
        if !existed {
            return Ok(false);
        }

        let write = Write::Delete {
            model: model.to_string(),
            id: id.to_string(),
        };
        if self.active {
            self.writes.push(write);
        } else {
            self.publish(std::slice::from_ref(&write))?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let db = InMemoryDatabase::new();
        let mut session = db.session();

        session.begin().await.unwrap();
        session.add("Item", "1", row(json!({"name": "a"}))).await.unwrap();
        assert_eq!(db.count("Item"), 0);
        assert!(session.get("Item", "1").await.unwrap().is_some());

        session.commit().await.unwrap();
        assert_eq!(db.count("Item"), 1);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = InMemoryDatabase::new();
        let mut session = db.session();

        session.begin().await.unwrap();
        session.add("Item", "1", row(json!({"name": "a"}))).await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(db.count("Item"), 0);
        assert!(session.get("Item", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nested_begin_uses_savepoint() {
        let db = InMemoryDatabase::new();
        let mut session = db.session();

        session.begin().await.unwrap();
        session.add("Item", "1", row(json!({"name": "outer"}))).await.unwrap();

        session.begin().await.unwrap();
        assert_eq!(session.depth(), 2);
        session.add("Item", "2", row(json!({"name": "inner"}))).await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(session.depth(), 1);
        assert!(session.in_transaction());
        assert!(session.get("Item", "2").await.unwrap().is_none());

        session.commit().await.unwrap();
        let names: Vec<_> = db.rows("Item").iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("outer")]);
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let db = InMemoryDatabase::new();
        let mut session = db.session();

        session.begin().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(session.commit().await, Err(StorageError::NoTransaction));
    }

    #[tokio::test]
    async fn test_unique_checked_on_add_and_commit() {
        let db = InMemoryDatabase::new().with_unique("Item", &["name"]);

        let mut first = db.session();
        let mut second = db.session();
        first.begin().await.unwrap();
        second.begin().await.unwrap();

        first.add("Item", "1", row(json!({"name": "x"}))).await.unwrap();
        assert!(matches!(
            first.add("Item", "2", row(json!({"name": "x"}))).await,
            Err(StorageError::UniqueViolation { .. })
        ));

        second.add("Item", "3", row(json!({"name": "x"}))).await.unwrap();
        first.commit().await.unwrap();

        assert!(matches!(
            second.commit().await,
            Err(StorageError::UniqueViolation { .. })
        ));
        assert!(!second.in_transaction());
        assert_eq!(db.count("Item"), 1);
    }

    #[tokio::test]
    async fn test_list_filters_in_insertion_order() {
        let db = InMemoryDatabase::new();
        let mut session = db.session();

        for (id, tenant) in [("c", "t1"), ("a", "t2"), ("b", "t1")] {
            session
                .add("Item", id, row(json!({"id": id, "tenant_id": tenant})))
                .await
                .unwrap();
        }

        let filters = row(json!({"tenant_id": "t1"}));
        let ids: Vec<_> = session
            .list("Item", &filters)
            .await
            .unwrap()
            .iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("c"), json!("b")]);
    }

    #[tokio::test]
    async fn test_delete_staged_until_commit() {
        let db = InMemoryDatabase::new();
        let mut session = db.session();
        session.add("Item", "1", row(json!({"name": "a"}))).await.unwrap();

        session.begin().await.unwrap();
        assert!(session.delete("Item", "1").await.unwrap());
        assert!(!session.delete("Item", "1").await.unwrap());
        assert_eq!(db.count("Item"), 1);

        session.commit().await.unwrap();
        assert_eq!(db.count("Item"), 0);
    }
}

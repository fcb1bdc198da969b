// ⚖️ Reconciliation Engine - match-or-create by business key
//
// For every incoming row, in order:
//   key in snapshot (or created earlier in this batch) → full update
//   otherwise                                          → create
//
// The snapshot of existing keys is captured once, before the first write,
// and never refreshed from the store. Writes are sequential and not
// transactional: the first failure ends the batch and everything written
// before it stays written.

use crate::db::{Record, RecordStore};
use crate::error::ImportError;
use crate::materialize::CanonicalRow;
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::iter::FusedIterator;

// ============================================================================
// KEY SNAPSHOT
// ============================================================================

/// Key text → record id, as of batch start
#[derive(Debug, Clone, Default)]
pub struct KeySnapshot {
    ids: HashMap<String, String>,
}

impl KeySnapshot {
    /// Later records win when the store already holds duplicate keys
    pub fn from_records(records: &[Record], schema: &FieldSchema) -> Self {
        let mut ids = HashMap::new();
        for record in records {
            let key = schema.key_of(&record.fields);
            if !key.is_empty() {
                ids.insert(key, record.id.clone());
            }
        }
        KeySnapshot { ids }
    }

    pub fn capture<S: RecordStore + ?Sized>(store: &S, schema: &FieldSchema) -> Result<Self, ImportError> {
        let records = store.list_all().map_err(ImportError::Snapshot)?;
        Ok(Self::from_records(&records, schema))
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ============================================================================
// PROGRESS EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAction {
    Created { id: String },
    Updated { id: String },
}

impl WriteAction {
    pub fn id(&self) -> &str {
        match self {
            WriteAction::Created { id } | WriteAction::Updated { id } => id,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, WriteAction::Created { .. })
    }
}

/// Emitted after each committed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub line: usize,
    pub key: String,
    pub action: WriteAction,
}

impl Progress {
    /// round(processed / total * 100)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).round() as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,

    /// Rows dropped before reconciliation (blank or zero key)
    pub skipped: usize,
}

impl ImportSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} rows imported: {} created, {} updated, {} skipped",
            self.total, self.created, self.updated, self.skipped
        )
    }

    fn count(&mut self, action: &WriteAction) {
        if action.is_create() {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }
}

// ============================================================================
// IMPORT BATCH
// ============================================================================

/// Lazy write sequence: each `next()` performs exactly one store write
pub struct ImportBatch<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    snapshot: KeySnapshot,
    created: HashMap<String, String>,
    rows: std::vec::IntoIter<CanonicalRow>,
    key_field: String,
    processed: usize,
    total: usize,
    finished: bool,
}

impl<'a, S: RecordStore + ?Sized> ImportBatch<'a, S> {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn snapshot(&self) -> &KeySnapshot {
        &self.snapshot
    }

    /// Existing id for a key: batch-start snapshot first, then keys this batch created
    fn existing_id(&self, key: &str) -> Option<String> {
        self.snapshot
            .lookup(key)
            .or_else(|| self.created.get(key).map(String::as_str))
            .map(String::from)
    }
}

impl<'a, S: RecordStore + ?Sized> Iterator for ImportBatch<'a, S> {
    type Item = Result<Progress, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let row = match self.rows.next() {
            Some(row) => row,
            None => {
                self.finished = true;
                return None;
            }
        };

        let key = row
            .fields
            .get(&self.key_field)
            .map(|v| v.key())
            .unwrap_or_default();

        let result = match self.existing_id(&key) {
            Some(id) => self
                .store
                .update(&id, &row.fields)
                .map(|_| WriteAction::Updated { id }),
            None => self.store.create(&row.fields).map(|id| {
                self.created.insert(key.clone(), id.clone());
                WriteAction::Created { id }
            }),
        };

        match result {
            Ok(action) => {
                self.processed += 1;
                log::debug!("line {}: {:?} ({}/{})", row.line, action, self.processed, self.total);
                Some(Ok(Progress {
                    processed: self.processed,
                    total: self.total,
                    line: row.line,
                    key,
                    action,
                }))
            }
            Err(source) => {
                self.finished = true;
                log::warn!(
                    "import aborted at line {} after {} of {} writes: {}",
                    row.line,
                    self.processed,
                    self.total,
                    source
                );
                Some(Err(ImportError::Write {
                    processed: self.processed,
                    total: self.total,
                    line: row.line,
                    source,
                }))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.rows.len()))
        }
    }
}

impl<'a, S: RecordStore + ?Sized> FusedIterator for ImportBatch<'a, S> {}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine<'s> {
    schema: &'s FieldSchema,
}

impl<'s> ReconciliationEngine<'s> {
    pub fn new(schema: &'s FieldSchema) -> Self {
        ReconciliationEngine { schema }
    }

    /// Capture the key snapshot and prepare the write sequence
    ///
    /// Each row is written with exactly the schema's field set.
    pub fn begin<'a, S: RecordStore + ?Sized>(
        &self,
        store: &'a mut S,
        rows: Vec<CanonicalRow>,
    ) -> Result<ImportBatch<'a, S>, ImportError> {
        let snapshot = KeySnapshot::capture(&*store, self.schema)?;
        let rows: Vec<CanonicalRow> = rows
            .into_iter()
            .map(|row| CanonicalRow {
                fields: self.schema.complete(&row.fields),
                line: row.line,
            })
            .collect();

        log::info!(
            "reconciling {} rows against {} existing keys",
            rows.len(),
            snapshot.len()
        );

        Ok(ImportBatch {
            store,
            snapshot,
            created: HashMap::new(),
            total: rows.len(),
            rows: rows.into_iter(),
            key_field: self.schema.key_field().name.clone(),
            processed: 0,
            finished: false,
        })
    }

    /// Run a whole batch, reporting each committed write
    pub fn reconcile<S, F>(
        &self,
        store: &mut S,
        rows: Vec<CanonicalRow>,
        mut on_progress: F,
    ) -> Result<ImportSummary, ImportError>
    where
        S: RecordStore + ?Sized,
        F: FnMut(&Progress),
    {
        let mut summary = ImportSummary::default();

        for step in self.begin(store, rows)? {
            let progress = step?;
            summary.count(&progress.action);
            summary.total = progress.processed;
            on_progress(&progress);
        }

        Ok(summary)
    }
}

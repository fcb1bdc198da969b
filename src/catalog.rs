// 📚 Catalog - application layer over the engine
//
// Holds the loaded records with their view state and turns each user action
// (import, add, save, delete, delete-all, export) into store calls plus an
// `Outcome` a surface can show.

use crate::db::{Record, RecordStore};
use crate::error::ImportError;
use crate::export::{ExportProjector, ExportTable};
use crate::materialize::RowMaterializer;
use crate::normalize::{display_value, edit_value, Locale};
use crate::reconciliation::{ImportSummary, Progress, ReconciliationEngine};
use crate::schema::FieldSchema;
use crate::sheet::SheetCodec;
use crate::value::{FieldValue, Fields};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

// ============================================================================
// VIEW STATE
// ============================================================================

/// A record as shown in a table; `edit_mode` is never persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub record: Record,
    pub edit_mode: bool,
}

impl RecordView {
    fn new(record: Record) -> Self {
        RecordView {
            record,
            edit_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Import,
    Save,
    Add,
    Delete,
    DeleteAll,
}

/// User-facing result of one action (what a toast would say)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn of_import(result: &Result<ImportSummary, ImportError>) -> Self {
        match result {
            Ok(summary) => Outcome {
                kind: OutcomeKind::Import,
                success: true,
                message: format!("Import completed: {}", summary.summary()),
            },
            Err(ImportError::NoFile) => Outcome {
                kind: OutcomeKind::Import,
                success: false,
                message: "Select a valid spreadsheet".to_string(),
            },
            Err(e) => Outcome {
                kind: OutcomeKind::Import,
                success: false,
                message: format!("Import failed: {}", e),
            },
        }
    }

    pub fn of<T>(kind: OutcomeKind, result: &Result<T>) -> Self {
        let (done, failed) = match kind {
            OutcomeKind::Import => ("Import completed", "Import failed"),
            OutcomeKind::Save => ("Record updated", "Failed to update record"),
            OutcomeKind::Add => ("New record added", "Failed to add record"),
            OutcomeKind::Delete => ("Record deleted", "Failed to delete record"),
            OutcomeKind::DeleteAll => ("All records deleted", "Failed to delete all records"),
        };

        match result {
            Ok(_) => Outcome {
                kind,
                success: true,
                message: done.to_string(),
            },
            Err(e) => Outcome {
                kind,
                success: false,
                message: format!("{}: {:#}", failed, e),
            },
        }
    }
}

// ============================================================================
// CATALOG
// ============================================================================

pub struct Catalog<S: RecordStore> {
    store: S,
    schema: FieldSchema,
    locale: Locale,
    views: Vec<RecordView>,
}

impl<S: RecordStore> Catalog<S> {
    /// Empty view list; call `load` to read the store
    pub fn new(store: S, schema: FieldSchema, locale: Locale) -> Self {
        Catalog {
            store,
            schema,
            locale,
            views: Vec::new(),
        }
    }

    /// Open with the NCM schema and load every record
    pub fn open(store: S, locale: Locale) -> Result<Self> {
        let mut catalog = Self::new(store, FieldSchema::ncm(), locale);
        catalog.load()?;
        Ok(catalog)
    }

    /// Reload every record from the store; view state is reset
    pub fn load(&mut self) -> Result<()> {
        self.views = self
            .store
            .list_all()?
            .into_iter()
            .map(RecordView::new)
            .collect();
        Ok(())
    }

    pub fn records(&self) -> &[RecordView] {
        &self.views
    }

    pub fn get(&self, id: &str) -> Option<&RecordView> {
        self.views.iter().find(|v| v.record.id == id)
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records whose key text contains `search`, sorted by key text
    pub fn query(&self, search: &str, order: SortOrder) -> Vec<&RecordView> {
        let key_name = &self.schema.key_field().name;
        let key_text = |view: &RecordView| -> String {
            view.record
                .fields
                .get(key_name)
                .map(|v| v.as_text().into_owned())
                .unwrap_or_default()
        };

        let mut hits: Vec<&RecordView> = self
            .views
            .iter()
            .filter(|view| key_text(view).contains(search))
            .collect();

        hits.sort_by(|a, b| {
            let ord: Ordering = key_text(a).cmp(&key_text(b));
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        hits
    }

    // ------------------------------------------------------------------------
    // Import
    // ------------------------------------------------------------------------

    /// Decode, materialize and reconcile one spreadsheet
    ///
    /// Records are reloaded afterwards even when the batch failed part way,
    /// since earlier writes stay committed.
    pub fn import<F>(
        &mut self,
        bytes: Option<&[u8]>,
        codec: &dyn SheetCodec,
        on_progress: F,
    ) -> Result<ImportSummary, ImportError>
    where
        F: FnMut(&Progress),
    {
        let bytes = bytes.ok_or(ImportError::NoFile)?;
        let grid = codec.decode(bytes).map_err(ImportError::Decode)?;

        let materialized = RowMaterializer::new(&self.schema, &self.locale).materialize(&grid)?;
        let skipped = materialized.skipped;
        let batch_id = uuid::Uuid::new_v4().to_string();
        let digest = format!("{:x}", Sha256::digest(bytes));

        log::info!(
            "import {} ({}): {} rows, {} skipped",
            batch_id,
            codec.format().name(),
            materialized.rows.len(),
            skipped
        );

        let engine = ReconciliationEngine::new(&self.schema);
        let result = engine
            .reconcile(&mut self.store, materialized.rows, on_progress)
            .map(|summary| ImportSummary { skipped, ..summary });

        let details = match &result {
            Ok(summary) => serde_json::json!({
                "status": "completed",
                "format": codec.format().name(),
                "sha256": digest,
                "total": summary.total,
                "created": summary.created,
                "updated": summary.updated,
                "skipped": summary.skipped,
            }),
            Err(e) => serde_json::json!({
                "status": "aborted",
                "format": codec.format().name(),
                "sha256": digest,
                "committed": e.committed(),
                "error": e.to_string(),
            }),
        };
        self.store.record_batch(&batch_id, details);

        if let Err(e) = self.load() {
            log::warn!("could not reload records after import: {}", e);
        }

        result
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Flip edit mode; returns the new mode
    pub fn toggle_edit(&mut self, id: &str) -> Result<bool> {
        let view = self.view_mut(id)?;
        view.edit_mode = !view.edit_mode;
        Ok(view.edit_mode)
    }

    /// Change one field in memory (persisted by `save`)
    pub fn set_field(&mut self, id: &str, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        if self.schema.get(field).is_none() {
            bail!("unknown field: {}", field);
        }
        let view = self.view_mut(id)?;
        view.record.fields.insert(field.to_string(), value.into());
        Ok(())
    }

    /// Full overwrite of every schema field, then leave edit mode
    pub fn save(&mut self, id: &str) -> Result<()> {
        let fields = {
            let view = self.view(id)?;
            self.schema.complete(&view.record.fields)
        };

        self.store.update(id, &fields)?;

        let view = self.view_mut(id)?;
        view.record.fields = fields;
        view.edit_mode = false;
        Ok(())
    }

    /// Create a record from user input; missing fields become empty text
    pub fn add(&mut self, fields: &Fields) -> Result<String> {
        let fields = self.schema.complete(fields);
        let id = self.store.create(&fields)?;
        self.load()?;
        Ok(id)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        self.load()
    }

    /// Attempt every delete, then report once
    ///
    /// Returns the number of deleted records. When any delete fails the error
    /// carries the failure count and the first underlying error.
    pub fn delete_all(&mut self) -> Result<usize> {
        let ids: Vec<String> = self.store.list_all()?.into_iter().map(|r| r.id).collect();
        let total = ids.len();

        let mut failed = 0;
        let mut first_error = None;
        for id in &ids {
            if let Err(e) = self.store.delete(id) {
                log::warn!("delete {} failed: {}", id, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.load() {
            log::warn!("could not reload records after delete-all: {}", e);
        }

        match first_error {
            None => {
                log::info!("deleted all {} records", total);
                Ok(total)
            }
            Some(e) => Err(e.context(format!("{} of {} deletes failed", failed, total))),
        }
    }

    // ------------------------------------------------------------------------
    // Presentation + export
    // ------------------------------------------------------------------------

    /// Display form of every schema field, in schema order
    pub fn display_row(&self, record: &Record) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|field| {
                let value = record.fields.get(&field.name).cloned().unwrap_or_default();
                display_value(field.kind, &value, &self.locale)
            })
            .collect()
    }

    /// Form pre-filled into an edit control for one field
    pub fn edit_value(&self, record: &Record, field: &str) -> Option<String> {
        let definition = self.schema.get(field)?;
        let value = record.fields.get(field).cloned().unwrap_or_default();
        Some(edit_value(definition.kind, &value))
    }

    /// Header labels as shown above the table
    pub fn display_headers(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.export_label.as_str())
            .collect()
    }

    pub fn export_table(&self) -> ExportTable {
        let records: Vec<Record> = self.views.iter().map(|v| v.record.clone()).collect();
        ExportProjector::new(&self.schema).project(&records)
    }

    pub fn export_bytes(&self, codec: &dyn SheetCodec) -> Result<Vec<u8>> {
        codec.encode(&self.export_table())
    }

    fn view(&self, id: &str) -> Result<&RecordView> {
        self.get(id).ok_or_else(|| anyhow!("record not found: {}", id))
    }

    fn view_mut(&mut self, id: &str) -> Result<&mut RecordView> {
        self.views
            .iter_mut()
            .find(|v| v.record.id == id)
            .ok_or_else(|| anyhow!("record not found: {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, SqliteStore};
    use crate::sheet::CsvCodec;

    const SHEET: &str = "Tabela NCM\n\
NCM,ultima atualização,CEST,IPI,U$/KG\n\
01012100,3/15/2023,0100100,10,\"3,25\"\n\
0,,,,\n\
84713012,,,5,\n";

    fn catalog() -> Catalog<MemoryStore> {
        Catalog::open(MemoryStore::new(), Locale::default()).unwrap()
    }

    #[test]
    fn test_import_then_display() {
        let mut catalog = catalog();
        let mut percents = Vec::new();

        let summary = catalog
            .import(Some(SHEET.as_bytes()), &CsvCodec::new(), |p| percents.push(p.percent()))
            .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(percents, vec![50, 100]);
        assert_eq!(catalog.records().len(), 2);

        let first = &catalog.records()[0].record;
        let row = catalog.display_row(first);
        assert_eq!(row[0], "0101.21.00");
        assert_eq!(row[1], "15/03/2023");
        assert_eq!(row[2], "01.001.00");
        assert_eq!(row[5], "10%");
        assert_eq!(row[9], "US$ 3,25");
        assert_eq!(row[10], "0%");
        assert_eq!(catalog.edit_value(first, "ultima atualização").unwrap(), "2023-03-15");
    }

    #[test]
    fn test_reimport_updates_instead_of_duplicating() {
        let mut catalog = catalog();
        let codec = CsvCodec::new();
        catalog.import(Some(SHEET.as_bytes()), &codec, |_| {}).unwrap();
        let summary = catalog.import(Some(SHEET.as_bytes()), &codec, |_| {}).unwrap();

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.created, 0);
        assert_eq!(catalog.records().len(), 2);
    }

    #[test]
    fn test_import_without_file_or_header_writes_nothing() {
        let mut catalog = catalog();
        let codec = CsvCodec::new();

        let err = catalog.import(None, &codec, |_| {}).unwrap_err();
        assert!(matches!(err, ImportError::NoFile));

        let result = catalog.import(Some(&b"title\nfoo,bar\n1,2\n"[..]), &codec, |_| {});
        assert!(matches!(result, Err(ImportError::MissingHeader { .. })));
        assert_eq!(catalog.store().writes(), 0);

        let outcome = Outcome::of_import(&result);
        assert!(!outcome.success);
        assert_eq!(outcome.kind, OutcomeKind::Import);
    }

    #[test]
    fn test_partial_import_reloads_committed_rows() {
        let mut catalog = Catalog::open(MemoryStore::failing_after(1), Locale::default()).unwrap();

        let result = catalog.import(Some(SHEET.as_bytes()), &CsvCodec::new(), |_| {});

        assert_eq!(result.as_ref().unwrap_err().committed(), 1);
        assert_eq!(catalog.records().len(), 1);
        assert!(Outcome::of_import(&result).message.starts_with("Import failed"));
    }

    #[test]
    fn test_edit_save_is_full_overwrite() {
        let mut catalog = catalog();
        catalog.import(Some(SHEET.as_bytes()), &CsvCodec::new(), |_| {}).unwrap();
        let id = catalog.records()[0].record.id.clone();

        assert!(catalog.toggle_edit(&id).unwrap());
        catalog.set_field(&id, "IPI", "12%").unwrap();
        assert!(catalog.set_field(&id, "nope", "x").is_err());
        catalog.save(&id).unwrap();

        let view = catalog.get(&id).unwrap();
        assert!(!view.edit_mode);

        let stored = &catalog.store().records()[0];
        assert_eq!(stored.fields["IPI"], FieldValue::text("12%"));
        assert_eq!(stored.fields.len(), 12);
    }

    #[test]
    fn test_add_completes_missing_fields() {
        let mut catalog = catalog();
        let mut fields = Fields::new();
        fields.insert("NCM".to_string(), FieldValue::text("22030000"));

        let id = catalog.add(&fields).unwrap();
        let view = catalog.get(&id).unwrap();

        assert_eq!(view.record.fields.len(), 12);
        assert_eq!(view.record.fields["Santos"], FieldValue::text(""));
        assert!(Outcome::of(OutcomeKind::Add, &Ok::<_, anyhow::Error>(id)).success);
    }

    #[test]
    fn test_query_filters_and_sorts_by_key() {
        let mut catalog = catalog();
        for key in ["84713012", "01012100", "84714900"] {
            let mut fields = Fields::new();
            fields.insert("NCM".to_string(), FieldValue::text(key));
            catalog.add(&fields).unwrap();
        }

        let keys = |views: Vec<&RecordView>| -> Vec<String> {
            views.iter().map(|v| v.record.fields["NCM"].to_string()).collect()
        };

        assert_eq!(
            keys(catalog.query("", SortOrder::Asc)),
            vec!["01012100", "84713012", "84714900"]
        );
        assert_eq!(keys(catalog.query("8471", SortOrder::Desc)), vec!["84714900", "84713012"]);
        assert!(catalog.query("9999", SortOrder::Asc).is_empty());
    }

    #[test]
    fn test_delete_and_delete_all() {
        let mut catalog = Catalog::open(SqliteStore::open_in_memory().unwrap(), Locale::default()).unwrap();
        catalog.import(Some(SHEET.as_bytes()), &CsvCodec::new(), |_| {}).unwrap();

        let id = catalog.records()[0].record.id.clone();
        catalog.delete(&id).unwrap();
        assert_eq!(catalog.records().len(), 1);

        let result = catalog.delete(&id);
        assert!(!Outcome::of(OutcomeKind::Delete, &result).success);

        assert_eq!(catalog.delete_all().unwrap(), 1);
        assert!(catalog.records().is_empty());
        assert_eq!(catalog.delete_all().unwrap(), 0);
    }

    #[test]
    fn test_delete_all_attempts_every_delete() {
        let mut store = MemoryStore::failing_after(3);
        for key in ["1", "2", "3"] {
            let mut fields = Fields::new();
            fields.insert("NCM".to_string(), FieldValue::text(key));
            store.create(&fields).unwrap();
        }
        let mut catalog = Catalog::open(store, Locale::default()).unwrap();

        let err = catalog.delete_all().unwrap_err();

        assert!(err.to_string().contains("3 of 3 deletes failed"));
        assert_eq!(catalog.store().writes(), 3);
        assert_eq!(catalog.records().len(), 3);
    }

    #[test]
    fn test_export_table_follows_loaded_records() {
        let mut catalog = catalog();
        catalog.import(Some(SHEET.as_bytes()), &CsvCodec::new(), |_| {}).unwrap();

        let table = catalog.export_table();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.headers[9], "U$/KG");
        assert_eq!(catalog.display_headers()[9], "U$/KG");

        let bytes = catalog.export_bytes(&CsvCodec::new()).unwrap();
        assert!(String::from_utf8(bytes).unwrap().starts_with("NCM,"));
    }
}

// 🏗️ Row Materializer - spreadsheet rows → canonical rows
//
// Pipeline per cell: resolve column → schema default when blank →
// import normalization for the field kind → empty text when still absent.
// Rows whose key trims to "" or "0" are dropped (title, blank and
// sentinel rows).

use crate::error::ImportError;
use crate::header::{HeaderResolver, ResolvedHeaders};
use crate::normalize::{normalize_import, Locale};
use crate::schema::FieldSchema;
use crate::value::{Cell, FieldValue, Fields};
use serde::{Deserialize, Serialize};

/// One schema-shaped row ready for reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub fields: Fields,

    /// 1-based spreadsheet line, for diagnostics
    pub line: usize,
}

impl CanonicalRow {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// Output of materializing one grid
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    pub rows: Vec<CanonicalRow>,

    /// Data rows dropped by the acceptance filter
    pub skipped: usize,

    /// Schema fields with no column in this spreadsheet
    pub unresolved: Vec<String>,
}

pub struct RowMaterializer<'a> {
    schema: &'a FieldSchema,
    locale: &'a Locale,
}

impl<'a> RowMaterializer<'a> {
    pub fn new(schema: &'a FieldSchema, locale: &'a Locale) -> Self {
        RowMaterializer { schema, locale }
    }

    /// Resolve headers and materialize every data row below them
    pub fn materialize(&self, grid: &[Vec<Cell>]) -> Result<Materialized, ImportError> {
        let headers = HeaderResolver::new(self.schema).resolve(grid)?;
        let data_start = self.schema.header_row() + 1;

        let mut out = Materialized {
            unresolved: headers
                .unresolved(self.schema)
                .into_iter()
                .map(String::from)
                .collect(),
            ..Materialized::default()
        };

        for (offset, row) in grid.iter().enumerate().skip(data_start) {
            let canonical = self.materialize_row(&headers, row, offset + 1);
            if self.accepts(&canonical) {
                out.rows.push(canonical);
            } else {
                out.skipped += 1;
            }
        }

        log::debug!(
            "materialized {} rows ({} skipped, {} unresolved fields)",
            out.rows.len(),
            out.skipped,
            out.unresolved.len()
        );

        Ok(out)
    }

    /// Build one canonical row; every schema field gets a value
    pub fn materialize_row(&self, headers: &ResolvedHeaders, row: &[Cell], line: usize) -> CanonicalRow {
        let fields = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let mut value = headers.cell(row, idx).and_then(Cell::to_value);

                if value.as_ref().map_or(true, FieldValue::is_blank) {
                    if let Some(default) = &field.import_default {
                        value = Some(default.clone());
                    }
                }

                let value = value
                    .map(|v| normalize_import(field.kind, v, self.locale))
                    .unwrap_or_default();

                (field.name.clone(), value)
            })
            .collect();

        CanonicalRow { fields, line }
    }

    /// Row-acceptance filter: key must be present and not the zero sentinel
    pub fn accepts(&self, row: &CanonicalRow) -> bool {
        let key = self.schema.key_of(&row.fields);
        !key.is_empty() && key != "0"
    }
}

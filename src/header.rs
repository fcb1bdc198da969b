// 🧭 Header Resolver - canonical field → source column
//
// Spreadsheets arrive with a title row and a header row whose labels may be
// padded or spelled differently (aliases). Each field resolves on its own to
// the first column whose trimmed label matches exactly.

use crate::error::ImportError;
use crate::schema::FieldSchema;
use crate::value::Cell;

/// Column index per schema field (None = not present in this spreadsheet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHeaders {
    columns: Vec<Option<usize>>,
}

impl ResolvedHeaders {
    pub fn column(&self, field_idx: usize) -> Option<usize> {
        self.columns.get(field_idx).copied().flatten()
    }

    /// Cell for a field in one data row; None when unresolved or out of bounds
    pub fn cell<'r>(&self, row: &'r [Cell], field_idx: usize) -> Option<&'r Cell> {
        self.column(field_idx).and_then(|col| row.get(col))
    }

    pub fn resolved_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// Names of the fields with no matching column
    pub fn unresolved<'s>(&self, schema: &'s FieldSchema) -> Vec<&'s str> {
        schema
            .fields()
            .iter()
            .zip(&self.columns)
            .filter(|(_, col)| col.is_none())
            .map(|(f, _)| f.name.as_str())
            .collect()
    }
}

pub struct HeaderResolver<'a> {
    schema: &'a FieldSchema,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        HeaderResolver { schema }
    }

    /// Resolve every schema field against the grid's header row
    ///
    /// Fails when the header row is missing or matches no field at all.
    pub fn resolve(&self, grid: &[Vec<Cell>]) -> Result<ResolvedHeaders, ImportError> {
        let row = self.schema.header_row();
        let header = grid.get(row).ok_or(ImportError::MissingHeader { row })?;
        let labels: Vec<Option<String>> = header.iter().map(Cell::label).collect();

        let columns: Vec<Option<usize>> = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                labels
                    .iter()
                    .position(|label| label.as_deref() == Some(field.source_header.as_str()))
            })
            .collect();

        let resolved = ResolvedHeaders { columns };
        if resolved.resolved_count() == 0 {
            return Err(ImportError::MissingHeader { row });
        }

        for name in resolved.unresolved(self.schema) {
            log::warn!("header '{}' not found in spreadsheet; field will be empty", name);
        }

        Ok(resolved)
    }
}

// 📤 Export Projector - records → spreadsheet table
//
// Same field order as the schema, id and view state left out. The table
// carries a title and the schema's header offset so an exported file can be
// imported back as-is.

use crate::db::Record;
use crate::schema::FieldSchema;
use crate::value::FieldValue;
use serde::Serialize;

pub const DEFAULT_TITLE: &str = "NCM";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportTable {
    /// Written in the first cell of row 0
    pub title: String,

    /// 0-based row where the header labels go
    pub header_row: usize,

    pub headers: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

impl ExportTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct ExportProjector<'a> {
    schema: &'a FieldSchema,
    title: String,
}

impl<'a> ExportProjector<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        ExportProjector {
            schema,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn project(&self, records: &[Record]) -> ExportTable {
        let headers = self
            .schema
            .fields()
            .iter()
            .map(|f| f.export_label.clone())
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                self.schema
                    .names()
                    .map(|name| record.fields.get(name).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        ExportTable {
            title: self.title.clone(),
            header_row: self.schema.header_row(),
            headers,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Fields;

    #[test]
    fn test_projection_order_and_labels() {
        let schema = FieldSchema::ncm();
        let mut fields = Fields::new();
        fields.insert("NCM".to_string(), FieldValue::text("01012100"));
        fields.insert("USD_KG".to_string(), FieldValue::text("3.25"));
        fields.insert("ultima atualização".to_string(), FieldValue::Number(45000.0));

        let records = vec![Record {
            id: "abc".to_string(),
            fields,
        }];

        let table = ExportProjector::new(&schema).project(&records);

        assert_eq!(table.title, "NCM");
        assert_eq!(table.header_row, 1);
        assert_eq!(table.headers.len(), 12);
        assert_eq!(table.headers[0], "NCM");
        assert_eq!(table.headers[9], "U$/KG");
        assert!(!table.headers.iter().any(|h| h == "USD_KG"));

        let row = &table.rows[0];
        assert_eq!(row.len(), 12);
        assert_eq!(row[0], FieldValue::text("01012100"));
        assert_eq!(row[1], FieldValue::Number(45000.0));
        assert_eq!(row[9], FieldValue::text("3.25"));
        // Missing fields export as empty text
        assert_eq!(row[5], FieldValue::text(""));
    }

    #[test]
    fn test_empty_catalog_still_has_headers() {
        let schema = FieldSchema::ncm();
        let table = ExportProjector::new(&schema)
            .with_title("Tabela NCM")
            .project(&[]);

        assert!(table.is_empty());
        assert_eq!(table.headers.len(), schema.len());
        assert_eq!(table.title, "Tabela NCM");
    }
}

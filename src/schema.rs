// 🏛️ Field Schema - the catalog's fixed, ordered field set
//
// One immutable value describes every field: its kind, which spreadsheet
// header it is read from, what it defaults to on import and how it is
// labelled on export. Resolver, materializer, engine and projector all
// receive it explicitly.

use crate::value::{FieldValue, Fields};
use anyhow::{bail, Result};
use std::collections::HashSet;

// ============================================================================
// FIELD KINDS
// ============================================================================

/// Grouped numeric code layout (digits padded to `width`, split into `groups`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFormat {
    pub width: usize,
    pub groups: &'static [usize],
    pub separator: char,
}

impl CodeFormat {
    /// 8-digit commodity code: 0000.00.00
    pub const NCM: CodeFormat = CodeFormat {
        width: 8,
        groups: &[4, 2, 2],
        separator: '.',
    };

    /// 7-digit tax-substitution code: 00.000.00
    pub const CEST: CodeFormat = CodeFormat {
        width: 7,
        groups: &[2, 3, 2],
        separator: '.',
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Code(CodeFormat),
    Date,
    Percentage,
    Currency,
    Plain,
}

impl FieldKind {
    pub fn name(&self) -> &str {
        match self {
            FieldKind::Code(_) => "code",
            FieldKind::Date => "date",
            FieldKind::Percentage => "percentage",
            FieldKind::Currency => "currency",
            FieldKind::Plain => "plain",
        }
    }
}

// ============================================================================
// FIELD DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Canonical name (also the stored key)
    pub name: String,

    pub kind: FieldKind,

    /// Header label looked up in the source spreadsheet
    pub source_header: String,

    /// Value used on import when the source cell is missing or blank
    pub import_default: Option<FieldValue>,

    /// Header written on export
    pub export_label: String,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        FieldDefinition {
            source_header: name.clone(),
            export_label: name.clone(),
            name,
            kind,
            import_default: None,
        }
    }

    /// Builder: read this field from a differently spelled header
    pub fn with_alias(mut self, header: impl Into<String>) -> Self {
        self.source_header = header.into();
        self
    }

    /// Builder: default applied to missing or blank cells on import
    pub fn with_import_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.import_default = Some(value.into());
        self
    }

    /// Builder: friendlier label for the exported header
    pub fn with_export_label(mut self, label: impl Into<String>) -> Self {
        self.export_label = label.into();
        self
    }
}

// ============================================================================
// FIELD SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    fields: Vec<FieldDefinition>,
    key_index: usize,
    header_row: usize,
}

impl FieldSchema {
    /// Build a schema. Field names must be unique and the key must be one of them.
    pub fn new(fields: Vec<FieldDefinition>, key_field: &str, header_row: usize) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                bail!("duplicate field in schema: {}", field.name);
            }
        }

        let key_index = match fields.iter().position(|f| f.name == key_field) {
            Some(idx) => idx,
            None => bail!("key field '{}' is not part of the schema", key_field),
        };

        Ok(FieldSchema {
            fields,
            key_index,
            header_row,
        })
    }

    /// The NCM tariff catalog
    pub fn ncm() -> Self {
        FieldSchema {
            fields: vec![
                FieldDefinition::new("NCM", FieldKind::Code(CodeFormat::NCM)),
                FieldDefinition::new("ultima atualização", FieldKind::Date),
                FieldDefinition::new("CEST", FieldKind::Code(CodeFormat::CEST)),
                FieldDefinition::new("IVA", FieldKind::Percentage),
                FieldDefinition::new("II", FieldKind::Percentage),
                FieldDefinition::new("IPI", FieldKind::Percentage),
                FieldDefinition::new("PIS", FieldKind::Percentage),
                FieldDefinition::new("COFINS", FieldKind::Percentage),
                FieldDefinition::new("ICMS", FieldKind::Percentage),
                FieldDefinition::new("USD_KG", FieldKind::Currency)
                    .with_alias("U$/KG")
                    .with_export_label("U$/KG"),
                FieldDefinition::new("Santos", FieldKind::Percentage).with_import_default("0%"),
                FieldDefinition::new("Itajai", FieldKind::Percentage).with_import_default("0%"),
            ],
            key_index: 0,
            header_row: 1,
        }
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_field(&self) -> &FieldDefinition {
        &self.fields[self.key_index]
    }

    /// 0-based row holding the column labels; data starts right below it
    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Key text of a field map (trimmed, empty when missing)
    pub fn key_of(&self, fields: &Fields) -> String {
        fields
            .get(&self.key_field().name)
            .map(FieldValue::key)
            .unwrap_or_default()
    }

    /// Exactly the schema fields, missing ones as empty text, extras dropped
    pub fn complete(&self, fields: &Fields) -> Fields {
        self.fields
            .iter()
            .map(|f| {
                let value = fields.get(&f.name).cloned().unwrap_or_default();
                (f.name.clone(), value)
            })
            .collect()
    }

    /// A field map with every schema field set to empty text
    pub fn blank(&self) -> Fields {
        self.complete(&Fields::new())
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::ncm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ncm_schema_order() {
        let schema = FieldSchema::ncm();
        let names: Vec<&str> = schema.names().collect();

        assert_eq!(
            names,
            vec![
                "NCM",
                "ultima atualização",
                "CEST",
                "IVA",
                "II",
                "IPI",
                "PIS",
                "COFINS",
                "ICMS",
                "USD_KG",
                "Santos",
                "Itajai"
            ]
        );
        assert_eq!(schema.key_field().name, "NCM");
        assert_eq!(schema.header_row(), 1);
    }

    #[test]
    fn test_percent_default_table() {
        let schema = FieldSchema::ncm();
        let defaulted: Vec<&str> = schema
            .fields()
            .iter()
            .filter(|f| f.import_default.is_some())
            .map(|f| f.name.as_str())
            .collect();

        assert_eq!(defaulted, vec!["Santos", "Itajai"]);
        assert_eq!(
            schema.get("Santos").unwrap().import_default,
            Some(FieldValue::text("0%"))
        );
        assert_eq!(schema.get("IPI").unwrap().import_default, None);
    }

    #[test]
    fn test_alias_and_export_label() {
        let schema = FieldSchema::ncm();
        let usd = schema.get("USD_KG").unwrap();

        assert_eq!(usd.source_header, "U$/KG");
        assert_eq!(usd.export_label, "U$/KG");
        assert_eq!(schema.get("CEST").unwrap().source_header, "CEST");
    }

    #[test]
    fn test_new_rejects_bad_schemas() {
        let dup = vec![
            FieldDefinition::new("A", FieldKind::Plain),
            FieldDefinition::new("A", FieldKind::Plain),
        ];
        assert!(FieldSchema::new(dup, "A", 0).is_err());

        let no_key = vec![FieldDefinition::new("A", FieldKind::Plain)];
        assert!(FieldSchema::new(no_key, "B", 0).is_err());

        let ok = vec![FieldDefinition::new("A", FieldKind::Plain)];
        assert!(FieldSchema::new(ok, "A", 0).is_ok());
    }

    #[test]
    fn test_complete_fills_and_drops() {
        let schema = FieldSchema::ncm();
        let mut partial = Fields::new();
        partial.insert("NCM".to_string(), FieldValue::text("01012100"));
        partial.insert("extra".to_string(), FieldValue::text("x"));

        let full = schema.complete(&partial);

        assert_eq!(full.len(), schema.len());
        assert!(!full.contains_key("extra"));
        assert_eq!(full["IPI"], FieldValue::empty());
        assert_eq!(schema.key_of(&full), "01012100");
    }
}

// NCM Catalog - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod value;
pub mod schema;         // Field schema (names, kinds, aliases, defaults)
pub mod normalize;      // Value normalizers (codes, dates, percentages, currency)
pub mod error;
pub mod header;         // Header resolver
pub mod materialize;    // Row materializer
pub mod db;             // Record stores (SQLite + in-memory)
pub mod reconciliation; // Match-or-create engine
pub mod export;         // Export projector
pub mod sheet;          // XLSX / CSV codecs
pub mod catalog;        // Application layer
pub mod config;

// Re-export commonly used types
pub use value::{Cell, FieldValue, Fields, Grid};
pub use schema::{CodeFormat, FieldDefinition, FieldKind, FieldSchema};
pub use normalize::{
    Locale,
    display_value, edit_value, normalize_import,
    format_code, strip_code,
    serial_to_date, resolve_date, display_date, edit_date, parse_display_date, parse_edit_date,
    normalize_percentage, normalize_currency_input, display_currency,
};
pub use error::ImportError;
pub use header::{HeaderResolver, ResolvedHeaders};
pub use materialize::{CanonicalRow, Materialized, RowMaterializer};
pub use db::{
    Record, RecordStore, SqliteStore, MemoryStore, Event,
    setup_database, insert_event, get_events_for_entity,
};
pub use reconciliation::{
    ReconciliationEngine, ImportBatch, ImportSummary, KeySnapshot, Progress, WriteAction,
};
pub use export::{ExportProjector, ExportTable};
pub use sheet::{SheetCodec, SheetFormat, XlsxCodec, CsvCodec, detect_format, get_codec};
pub use catalog::{Catalog, RecordView, Outcome, OutcomeKind, SortOrder};
pub use config::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 📑 Sheet Codecs - spreadsheet bytes ⇄ cell grid
//
// The engine never touches a file format. A codec decodes the first
// worksheet into a grid (cells at their absolute positions) and encodes an
// export table back into bytes.

use crate::export::ExportTable;
use crate::value::{number_text, Cell, FieldValue, Grid};
use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

pub const DEFAULT_SHEET_NAME: &str = "NCM";

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetFormat {
    Xlsx,
    Csv,
}

impl SheetFormat {
    pub fn name(&self) -> &str {
        match self {
            SheetFormat::Xlsx => "xlsx",
            SheetFormat::Csv => "csv",
        }
    }

    /// Parse a format name as given on the command line or in a query string
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(SheetFormat::Xlsx),
            "csv" => Ok(SheetFormat::Csv),
            other => Err(anyhow!("unsupported spreadsheet format: {}", other)),
        }
    }
}

/// SheetCodec - one spreadsheet format
pub trait SheetCodec: Send + Sync {
    /// First worksheet as a grid; row 0 is the first spreadsheet row
    fn decode(&self, bytes: &[u8]) -> Result<Grid>;

    /// Title row, header row, then one row per record
    fn encode(&self, table: &ExportTable) -> Result<Vec<u8>>;

    fn format(&self) -> SheetFormat;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the format from the file extension
pub fn detect_format(file_path: &Path) -> Result<SheetFormat> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    SheetFormat::from_name(extension).with_context(|| {
        format!(
            "Could not detect spreadsheet format from filename: {}",
            file_path.display()
        )
    })
}

pub fn get_codec(format: SheetFormat) -> Box<dyn SheetCodec> {
    match format {
        SheetFormat::Xlsx => Box::new(XlsxCodec::new()),
        SheetFormat::Csv => Box::new(CsvCodec::new()),
    }
}

// ============================================================================
// XLSX
// ============================================================================

/// calamine reader (xlsx/xlsm/xls/ods), rust_xlsxwriter writer
pub struct XlsxCodec {
    sheet_name: String,
}

impl XlsxCodec {
    pub fn new() -> Self {
        XlsxCodec {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }
}

impl Default for XlsxCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::from(s.as_str()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Bool(*b),
        // Keep the serial; date normalization works on serials
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from(s.as_str()),
    }
}

impl SheetCodec for XlsxCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Grid> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .context("Failed to open spreadsheet")?;

        let first = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Spreadsheet contains no sheets"))?;

        let range = workbook
            .worksheet_range(&first)
            .with_context(|| format!("Failed to read sheet '{}'", first))?;

        // Range start offset (data may not begin at A1)
        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        let mut grid: Grid = vec![Vec::new(); start_row as usize];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; start_col as usize];
            cells.extend(row.iter().map(data_to_cell));
            grid.push(cells);
        }

        log::debug!("decoded sheet '{}': {} rows", first, grid.len());
        Ok(grid)
    }

    fn encode(&self, table: &ExportTable) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();

        {
            let worksheet = workbook
                .add_worksheet()
                .set_name(&self.sheet_name)
                .with_context(|| format!("Failed to create sheet '{}'", self.sheet_name))?;

            worksheet
                .write_string_with_format(0, 0, &table.title, &bold)
                .context("Failed to write title")?;

            let header_row = table.header_row as u32;
            for (col, label) in table.headers.iter().enumerate() {
                worksheet
                    .write_string_with_format(header_row, col as u16, label, &bold)
                    .with_context(|| format!("Failed to write header '{}'", label))?;
            }

            for (idx, row) in table.rows.iter().enumerate() {
                let row32 = header_row + 1 + idx as u32;
                for (col, value) in row.iter().enumerate() {
                    let col16 = col as u16;
                    match value {
                        FieldValue::Number(n) => {
                            worksheet.write_number(row32, col16, *n)?;
                        }
                        FieldValue::Text(s) if s.is_empty() => {}
                        FieldValue::Text(s) => {
                            worksheet.write_string(row32, col16, s)?;
                        }
                    }
                }
            }
        }

        workbook
            .save_to_buffer()
            .context("Failed to save XLSX workbook")
    }

    fn format(&self) -> SheetFormat {
        SheetFormat::Xlsx
    }
}

// ============================================================================
// CSV
// ============================================================================

const SNIFF_LINES: usize = 5;

/// Plain CSV. Cells are always text: inferring numbers would drop the
/// leading zeros of codes.
pub struct CsvCodec {
    delimiter: Option<u8>,
}

impl CsvCodec {
    /// Sniff `,` vs `;` from the leading lines
    pub fn new() -> Self {
        CsvCodec { delimiter: None }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        CsvCodec {
            delimiter: Some(delimiter),
        }
    }

    // A title row above the header often carries no delimiter at all
    fn sniff(bytes: &[u8]) -> u8 {
        let (commas, semicolons) = bytes
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .take(SNIFF_LINES)
            .fold((0, 0), |(commas, semicolons), line| {
                (
                    commas + line.iter().filter(|b| **b == b',').count(),
                    semicolons + line.iter().filter(|b| **b == b';').count(),
                )
            });
        if semicolons > commas {
            b';'
        } else {
            b','
        }
    }
}

impl Default for CsvCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetCodec for CsvCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Grid> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let delimiter = self.delimiter.unwrap_or_else(|| Self::sniff(bytes));

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let mut grid = Grid::new();
        for (line_num, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse CSV line {}", line_num + 1))?;
            grid.push(record.iter().map(Cell::from).collect());
        }

        Ok(grid)
    }

    fn encode(&self, table: &ExportTable) -> Result<Vec<u8>> {
        let width = table.headers.len().max(1);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter.unwrap_or(b','))
            .from_writer(Vec::new());

        let mut title = vec![String::new(); width];
        title[0] = table.title.clone();
        writer.write_record(&title)?;
        for _ in 1..table.header_row {
            writer.write_record(vec![""; width])?;
        }

        writer.write_record(&table.headers)?;
        for row in &table.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|value| match value {
                    FieldValue::Number(n) => number_text(*n),
                    FieldValue::Text(s) => s.clone(),
                })
                .collect();
            writer.write_record(&cells)?;
        }

        writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush CSV: {}", e.error()))
    }

    fn format(&self) -> SheetFormat {
        SheetFormat::Csv
    }
}

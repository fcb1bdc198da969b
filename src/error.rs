// 🚨 Import Errors - why a batch stopped (or never started)
//
// Input rejections happen before the first write. A write failure carries how
// far the batch got, since the rows before it stay committed.

use std::fmt;

/// Why an import batch stopped (or never started)
#[derive(Debug)]
pub enum ImportError {
    /// Nothing was handed to the importer.
    NoFile,
    /// The spreadsheet bytes could not be decoded.
    Decode(anyhow::Error),
    /// The header row is missing or none of its labels match a schema field.
    MissingHeader { row: usize },
    /// Reading the existing records before the batch failed.
    Snapshot(anyhow::Error),
    /// A create/update failed; writes before it stay committed.
    Write {
        processed: usize,
        total: usize,
        line: usize,
        source: anyhow::Error,
    },
}

impl ImportError {
    /// Raised before any write was attempted
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoFile | Self::Decode(_) | Self::MissingHeader { .. }
        )
    }

    /// Number of writes committed before the failure
    pub fn committed(&self) -> usize {
        match self {
            Self::Write { processed, .. } => *processed,
            _ => 0,
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFile => write!(f, "no spreadsheet selected"),
            Self::Decode(e) => write!(f, "could not read spreadsheet: {e}"),
            Self::MissingHeader { row } => {
                write!(f, "no recognizable header row at row {}", row + 1)
            }
            Self::Snapshot(e) => write!(f, "could not load existing records: {e}"),
            Self::Write {
                processed,
                total,
                line,
                source,
            } => write!(
                f,
                "write failed at spreadsheet line {line} after {processed} of {total} rows: {source}"
            ),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) | Self::Snapshot(e) => Some(&**e),
            Self::Write { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ImportError::NoFile.to_string(), "no spreadsheet selected");
        assert_eq!(
            ImportError::MissingHeader { row: 1 }.to_string(),
            "no recognizable header row at row 2"
        );

        let err = ImportError::Write {
            processed: 3,
            total: 10,
            line: 6,
            source: anyhow::anyhow!("disk full"),
        };
        assert_eq!(
            err.to_string(),
            "write failed at spreadsheet line 6 after 3 of 10 rows: disk full"
        );
        assert_eq!(err.committed(), 3);
        assert!(!err.is_input_rejection());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_input_rejections() {
        assert!(ImportError::NoFile.is_input_rejection());
        assert!(ImportError::MissingHeader { row: 1 }.is_input_rejection());
        assert!(!ImportError::Snapshot(anyhow::anyhow!("x")).is_input_rejection());
    }
}

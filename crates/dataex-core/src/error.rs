//! Error types shared across the exporter and remapper.
//!
//! A run either completes with a fully trimmed and aligned output file, or it
//! is abandoned: every variant here is fatal to the current run, raised
//! synchronously at the offending document, with enough context for the
//! caller to log and abort. There is no retry policy and no partial-success
//! mode.

use thiserror::Error;

/// Convenience alias for results using the shared error type.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Closed error set for document-stream processing.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The filename template references a field absent from the start
    /// document.
    #[error("filename template references missing start field '{field}'")]
    TemplateFieldMissing {
        /// Name of the placeholder that could not be resolved.
        field: String,
    },

    /// A resource document is missing or malforms its required fields.
    #[error("malformed resource document: {reason}")]
    MalformedResource {
        /// What was wrong with the document.
        reason: String,
    },

    /// A datum page references a resource uid never registered by a
    /// `resource` document.
    #[error("datum page references unknown resource '{uid}'")]
    UnknownResource {
        /// The unregistered resource uid.
        uid: String,
    },

    /// An event references a datum id that was never shadow-mapped. This is
    /// the referential-integrity check between datum pages and events.
    #[error("event references unknown datum id '{datum_id}'")]
    UnknownDatum {
        /// The unmapped datum id.
        datum_id: String,
    },

    /// Documents arrived in an order the state machine cannot accept, or an
    /// input violated a producer-side ordering contract.
    #[error("document sequencing violation: {reason}")]
    Sequencing {
        /// Description of the violated ordering rule.
        reason: String,
    },

    /// Opaque passthrough from the storage manager. Not retried.
    #[error("storage I/O failure")]
    Storage(#[from] std::io::Error),
}

impl ExportError {
    /// Shorthand for a [`ExportError::Sequencing`] with a formatted reason.
    pub fn sequencing(reason: impl Into<String>) -> Self {
        ExportError::Sequencing {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_field_context() {
        let err = ExportError::TemplateFieldMissing {
            field: "scan_id".to_string(),
        };
        assert!(err.to_string().contains("scan_id"));

        let err = ExportError::UnknownDatum {
            datum_id: "abc/0".to_string(),
        };
        assert!(err.to_string().contains("abc/0"));
    }

    #[test]
    fn io_errors_convert() {
        fn open_missing() -> Result<()> {
            let _ = std::fs::File::open("/nonexistent/dataex")?;
            Ok(())
        }
        assert!(matches!(open_missing(), Err(ExportError::Storage(_))));
    }
}

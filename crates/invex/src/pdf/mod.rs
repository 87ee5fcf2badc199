//! PDF page selection and splitting.

pub mod splitter;

use thiserror::Error;

pub use splitter::{
    count_invoices, page_count, page_groups, prepare_files, split_by_pages, FileSelection,
};

/// Errors from splitting a PDF into per-invoice documents.
#[derive(Error, Debug)]
pub enum SplitError {
    /// The source bytes are not a PDF lopdf can read.
    #[error("Failed to parse PDF '{name}': {reason}")]
    DocumentParse { name: String, reason: String },

    /// A derived document could not be serialized.
    #[error("Failed to write derived PDF '{name}': {reason}")]
    Write { name: String, reason: String },
}

//! Splits multi-invoice PDFs into one document per invoice.
//!
//! The user marks the first page of every invoice. Walking pages `1..=total`,
//! each marked page opens a new group and every unmarked page that follows it
//! trails onto that group. Unmarked pages before the first marker belong to no
//! group and are not emitted.

use std::collections::BTreeSet;

use lopdf::Document;
use tracing::info_span;

use super::SplitError;
use crate::document::InputFile;

/// A file together with the pages the user marked as invoice starts.
#[derive(Debug, Clone)]
pub struct FileSelection {
    pub file: InputFile,
    pub selected_pages: BTreeSet<u32>,
}

impl FileSelection {
    /// A selection with no marked pages; the file passes through untouched.
    pub fn whole(file: InputFile) -> Self {
        Self {
            file,
            selected_pages: BTreeSet::new(),
        }
    }

    pub fn new(file: InputFile, pages: impl IntoIterator<Item = u32>) -> Self {
        Self {
            file,
            selected_pages: pages.into_iter().collect(),
        }
    }
}

/// Groups 1-based page numbers using the selected pages as group-start markers.
pub fn page_groups(selected: &BTreeSet<u32>, total_pages: u32) -> Vec<Vec<u32>> {
    let mut groups: Vec<Vec<u32>> = Vec::new();
    let mut current: Option<Vec<u32>> = None;

    for page in 1..=total_pages {
        if selected.contains(&page) {
            if let Some(group) = current.take() {
                groups.push(group);
            }
            current = Some(vec![page]);
        } else if let Some(group) = current.as_mut() {
            group.push(page);
        }
    }

    if let Some(group) = current {
        groups.push(group);
    }

    groups
}

/// Number of invoices a selection produces, without building any PDFs.
pub fn count_invoices(selected: &BTreeSet<u32>, total_pages: u32) -> usize {
    page_groups(selected, total_pages).len()
}

/// Reads the page count of a PDF.
pub fn page_count(file: &InputFile) -> Result<u32, SplitError> {
    let doc = load(file)?;
    Ok(doc.get_pages().len() as u32)
}

/// Splits `file` into one derived PDF per page group.
///
/// An empty selection returns the original file unchanged. A file that
/// cannot be parsed fails with [`SplitError::DocumentParse`]; the original
/// is never substituted, since that would extract the wrong pages.
pub fn split_by_pages(
    file: &InputFile,
    selected: &BTreeSet<u32>,
) -> Result<Vec<InputFile>, SplitError> {
    if selected.is_empty() {
        return Ok(vec![file.clone()]);
    }

    let _span = info_span!("pdf.split", file = %file.name, selected = selected.len()).entered();

    let source = load(file)?;
    let total_pages = source.get_pages().len() as u32;
    let groups = page_groups(selected, total_pages);

    if groups.is_empty() {
        log::warn!(
            "Selection for '{}' does not mark any of its {} pages; nothing to extract",
            file.name,
            total_pages
        );
    }

    let mut derived = Vec::with_capacity(groups.len());
    for group in &groups {
        let name = derived_name(file, group);
        let bytes = extract_pages(&source, total_pages, group, &name)?;
        log::debug!("Derived '{}' with {} page(s)", name, group.len());
        derived.push(InputFile::with_mime_type(
            name,
            Some("application/pdf".to_string()),
            bytes,
        ));
    }

    Ok(derived)
}

/// Expands every selection into the files that go into a batch.
pub fn prepare_files(selections: Vec<FileSelection>) -> Result<Vec<InputFile>, SplitError> {
    let mut files = Vec::new();
    for selection in selections {
        files.extend(split_by_pages(&selection.file, &selection.selected_pages)?);
    }
    Ok(files)
}

fn load(file: &InputFile) -> Result<Document, SplitError> {
    Document::load_mem(file.bytes()).map_err(|e| SplitError::DocumentParse {
        name: file.name.clone(),
        reason: e.to_string(),
    })
}

fn extract_pages(
    source: &Document,
    total_pages: u32,
    group: &[u32],
    name: &str,
) -> Result<Vec<u8>, SplitError> {
    let mut doc = source.clone();
    let remove: Vec<u32> = (1..=total_pages).filter(|p| !group.contains(p)).collect();
    doc.delete_pages(&remove);
    doc.prune_objects();
    doc.renumber_objects();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| SplitError::Write {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(bytes)
}

fn derived_name(file: &InputFile, group: &[u32]) -> String {
    let (base, ext) = file.split_name();
    match group {
        [single] => format!("{}_page{}{}", base, single, ext),
        [first, .., last] => format!("{}_pages{}-{}{}", base, first, last, ext),
        [] => format!("{}{}", base, ext),
    }
}

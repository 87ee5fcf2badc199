//! Parsing of `path[:pages]` file arguments.

use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Invalid page '{0}': pages are numbered from 1")]
    InvalidPage(String),

    #[error("Invalid page range '{0}'")]
    InvalidRange(String),
}

/// A file argument with the pages that start a new invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArg {
    pub path: PathBuf,
    pub pages: BTreeSet<u32>,
}

/// Splits `invoices.pdf:1,3,5-7` into a path and its marker pages.
///
/// A suffix that is not made of digits, commas and dashes is treated as
/// part of the path.
pub fn parse_file_arg(raw: &str) -> Result<FileArg, SelectionError> {
    if let Some((path, pages)) = raw.rsplit_once(':') {
        let looks_like_pages = !pages.is_empty()
            && pages
                .chars()
                .all(|c| c.is_ascii_digit() || c == ',' || c == '-' || c == ' ');
        if looks_like_pages && !path.is_empty() {
            return Ok(FileArg {
                path: PathBuf::from(path),
                pages: parse_pages(pages)?,
            });
        }
    }

    Ok(FileArg {
        path: PathBuf::from(raw),
        pages: BTreeSet::new(),
    })
}

/// Parses `1,3,5-7` into page numbers.
pub fn parse_pages(raw: &str) -> Result<BTreeSet<u32>, SelectionError> {
    let mut pages = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_page(start.trim())?;
                let end = parse_page(end.trim())?;
                if end < start {
                    return Err(SelectionError::InvalidRange(part.to_string()));
                }
                pages.extend(start..=end);
            }
            None => {
                pages.insert(parse_page(part)?);
            }
        }
    }
    Ok(pages)
}

fn parse_page(raw: &str) -> Result<u32, SelectionError> {
    match raw.parse::<u32>() {
        Ok(page) if page >= 1 => Ok(page),
        _ => Err(SelectionError::InvalidPage(raw.to_string())),
    }
}

//! Price-sheet loading for the system prompt.
//!
//! `.pdf` files have their text extracted page by page; anything else is read
//! as UTF-8 text.

use std::path::{Path, PathBuf};

use lopdf::Document;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PriceSheetError {
    #[error("reading price sheet {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extracting text from {path}: {source}")]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn load_price_sheet(path: &Path) -> Result<String, PriceSheetError> {
    if !is_pdf(path) {
        return std::fs::read_to_string(path).map_err(|source| PriceSheetError::Io {
            path: path.to_owned(),
            source,
        });
    }

    let pdf_err = |source| PriceSheetError::Pdf {
        path: path.to_owned(),
        source,
    };
    let document = Document::load(path).map_err(pdf_err)?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    debug!(path = %path.display(), pages = pages.len(), "extracting price sheet text");
    let text = document.extract_text(&pages).map_err(pdf_err)?;
    info!(path = %path.display(), chars = text.len(), "price sheet loaded");
    Ok(text)
}

use redactor_core::RedactError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PdfError>;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to load PDF: {0}")]
    Load(String),

    #[error("page {0} out of range")]
    PageOutOfRange(usize),

    #[error("lopdf error: {0}")]
    Lopdf(#[from] lopdf::Error),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("pdfium unavailable: {0}")]
    Unavailable(String),

    #[error("pdfium error: {0}")]
    Pdfium(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PdfError> for RedactError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::Io(e) => RedactError::Io(e),
            other => RedactError::Pdf(other.to_string()),
        }
    }
}

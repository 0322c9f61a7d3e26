use lopdf::Document as LoDocument;
use lopdf::Object as LoObject;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

/// What the artifact checks need to know about a written PDF, extracted
/// with lopdf rather than trusted from the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// MediaBox of the first page, `[x0, y0, x1, y1]`.
    pub media_box: Option<[f32; 4]>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
}

impl PdfInspectReport {
    pub fn media_box_size(&self) -> Option<(f32, f32)> {
        self.media_box
            .map(|[x0, y0, x1, y1]| (x1 - x0, y1 - y0))
    }
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    let pages = pdf.get_pages();
    let media_box = pages
        .values()
        .next()
        .and_then(|page_id| pdf.get_object(*page_id).ok())
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| dict.get(b"MediaBox").ok())
        .and_then(|obj| obj.as_array().ok())
        .and_then(|array| {
            let values: Vec<f32> = array.iter().filter_map(number).collect();
            if values.len() == 4 {
                Some([values[0], values[1], values[2], values[3]])
            } else {
                None
            }
        });

    let info = pdf
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            LoObject::Reference(id) => pdf.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|obj| obj.as_dict().ok());
    let info_string = |key: &[u8]| -> Option<String> {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(|obj| obj.as_str().ok())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|s| !s.trim().is_empty())
    };

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        media_box,
        title: info_string(b"Title"),
        author: info_string(b"Author"),
        producer: info_string(b"Producer"),
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

fn number(object: &LoObject) -> Option<f32> {
    match object {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v),
        _ => None,
    }
}

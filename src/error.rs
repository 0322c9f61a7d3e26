use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum PressError {
    MissingMetadata(PathBuf),
    MalformedMetadata(String),
    MalformedFrontmatter { chapter: String, message: String },
    EmptyBook,
    MissingPageTemplate,
    UnplaceableFlowable(String),
    InvalidConfiguration(String),
    Asset(String),
    PdfWrite(String),
    Io(std::io::Error),
}

impl fmt::Display for PressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressError::MissingMetadata(path) => {
                write!(f, "book metadata not found at {}", path.display())
            }
            PressError::MalformedMetadata(message) => {
                write!(f, "malformed book metadata: {}", message)
            }
            PressError::MalformedFrontmatter { chapter, message } => {
                write!(f, "malformed frontmatter in {}: {}", chapter, message)
            }
            PressError::EmptyBook => write!(f, "no chapter files found"),
            PressError::MissingPageTemplate => write!(f, "no page template available"),
            PressError::UnplaceableFlowable(message) => {
                write!(f, "flowable cannot fit on any page: {}", message)
            }
            PressError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            PressError::Asset(message) => write!(f, "asset error: {}", message),
            PressError::PdfWrite(message) => write!(f, "pdf write error: {}", message),
            PressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PressError {
    fn from(value: std::io::Error) -> Self {
        PressError::Io(value)
    }
}

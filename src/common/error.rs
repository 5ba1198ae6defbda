use std::collections::TryReserveError;

#[cfg(feature = "python")]
use pyo3::create_exception;
#[cfg(feature = "python")]
use pyo3::exceptions::PyException;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Id3Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to open {path}: {source}")]
    UnableToOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ID3 no header found")]
    NoHeader,

    #[error("ID3 unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("memory allocation failed: {0}")]
    MemoryAllocation(#[from] TryReserveError),

    #[error("frame of ID3v2.{frame} cannot be added to an ID3v2.{tag} tag")]
    IncompatibleTag { frame: u8, tag: u8 },

    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("text encoding {encoding} is not allowed here (ID3v2.{version})")]
    WrongEncoding { encoding: u8, version: u8 },

    #[error("unknown picture MIME type")]
    UnknownMimeType,

    #[error("invalid data: {0}")]
    InvalidData(String),
}

// Python exception types, one per error family
#[cfg(feature = "python")]
create_exception!(id3v2lib, Id3PyError, PyException);
#[cfg(feature = "python")]
create_exception!(id3v2lib, Id3NoHeaderError, Id3PyError);
#[cfg(feature = "python")]
create_exception!(id3v2lib, Id3NotFoundError, Id3PyError);
#[cfg(feature = "python")]
create_exception!(id3v2lib, Id3EncodingError, Id3PyError);
#[cfg(feature = "python")]
create_exception!(id3v2lib, Id3UnsupportedError, Id3PyError);

#[cfg(feature = "python")]
impl From<Id3Error> for pyo3::PyErr {
    fn from(err: Id3Error) -> pyo3::PyErr {
        let msg = err.to_string();
        match err {
            Id3Error::Io(_) | Id3Error::UnableToOpen { .. } => {
                pyo3::exceptions::PyIOError::new_err(msg)
            }
            Id3Error::NoHeader | Id3Error::UnsupportedVersion(_) => Id3NoHeaderError::new_err(msg),
            Id3Error::NotFound(_) => Id3NotFoundError::new_err(msg),
            Id3Error::MemoryAllocation(_) => pyo3::exceptions::PyMemoryError::new_err(msg),
            Id3Error::WrongEncoding { .. } => Id3EncodingError::new_err(msg),
            Id3Error::Unsupported(_) | Id3Error::IncompatibleTag { .. } => {
                Id3UnsupportedError::new_err(msg)
            }
            Id3Error::UnknownMimeType
            | Id3Error::InsufficientData { .. }
            | Id3Error::InvalidData(_) => pyo3::exceptions::PyValueError::new_err(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Id3Error>;

pub mod common;
pub mod id3;

pub use common::error::{Id3Error, Result};
pub use id3::frames::{CommentContent, Frame, FrameKind, PictureContent, TextContent, TextRun};
pub use id3::specs::{Encoding, Field, PictureType};
pub use id3::{
    load_tag, load_tag_from_buffer, load_tag_from_buffer_at, load_tags, save_tag,
    scan_file_for_tags, scan_for_tags, ID3Tag, WriteOptions,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(feature = "python")]
mod python_bindings {
use super::*;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;

fn field_from_name(name: &str) -> PyResult<Field> {
    Field::from_name(name).ok_or_else(|| PyValueError::new_err(format!("unknown field: {}", name)))
}

#[pyclass(name = "ID3Tag")]
#[derive(Debug, Clone)]
struct PyID3Tag {
    inner: ID3Tag,
}

#[pymethods]
impl PyID3Tag {
    #[new]
    #[pyo3(signature = (version=3))]
    fn new(version: u8) -> PyResult<Self> {
        Ok(PyID3Tag { inner: ID3Tag::new(version)? })
    }

    #[staticmethod]
    fn from_bytes(data: &[u8]) -> PyResult<Option<Self>> {
        Ok(load_tag_from_buffer(data)?.map(|inner| PyID3Tag { inner }))
    }

    #[getter]
    fn version(&self) -> u8 {
        self.inner.version()
    }

    fn frame_ids(&self) -> Vec<String> {
        self.inner.frames().iter().map(|f| f.id().to_string()).collect()
    }

    /// Decoded text of a field such as "title", or None if absent.
    fn get(&self, field: &str) -> PyResult<Option<String>> {
        let field = field_from_name(field)?;
        let result = match field {
            Field::Comment => self.inner.comment().and_then(|c| c.text.decode()),
            _ => self.inner.text_field(field).and_then(|t| t.text.decode()),
        };
        match result {
            Ok(text) => Ok(Some(text)),
            Err(Id3Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[pyo3(signature = (field, text, encoding=0))]
    fn set(&mut self, field: &str, text: &str, encoding: u8) -> PyResult<()> {
        let field = field_from_name(field)?;
        let encoding = Encoding::for_version(encoding, self.inner.version())?;
        Ok(self.inner.set_text_field(field, text, encoding)?)
    }

    /// Front cover as (mime_type, data), or None if absent.
    fn cover<'py>(&self, py: Python<'py>) -> PyResult<Option<(String, Bound<'py, PyBytes>)>> {
        match self.inner.album_cover() {
            Ok(p) => Ok(Some((p.mime_type.into_owned(), PyBytes::new(py, p.data)))),
            Err(Id3Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_cover(&mut self, data: &[u8]) -> PyResult<()> {
        Ok(self.inner.set_album_cover_from_bytes(data)?)
    }

    #[pyo3(signature = (path, padding=id3::options::DEFAULT_PADDING))]
    fn save(&self, path: &str, padding: u32) -> PyResult<()> {
        Ok(save_tag(path, &self.inner, &WriteOptions::new().padding(padding))?)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!("ID3Tag(v2.{}, {} frames)", self.inner.version(), self.inner.len())
    }
}

/// Load the tag at the start of a file, or None.
#[pyfunction]
fn load(path: &str) -> PyResult<Option<PyID3Tag>> {
    Ok(load_tag(path)?.map(|inner| PyID3Tag { inner }))
}

#[pyfunction]
fn scan(path: &str) -> PyResult<Vec<u64>> {
    Ok(scan_file_for_tags(path)?)
}

#[pymodule]
fn id3v2lib(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyID3Tag>()?;
    m.add_function(wrap_pyfunction!(load, m)?)?;
    m.add_function(wrap_pyfunction!(scan, m)?)?;

    m.add("ID3Error", m.py().get_type::<common::error::Id3PyError>())?;
    m.add("ID3NoHeaderError", m.py().get_type::<common::error::Id3NoHeaderError>())?;
    m.add("ID3NotFoundError", m.py().get_type::<common::error::Id3NotFoundError>())?;
    m.add("ID3EncodingError", m.py().get_type::<common::error::Id3EncodingError>())?;
    m.add("ID3UnsupportedError", m.py().get_type::<common::error::Id3UnsupportedError>())?;

    Ok(())
}
} // mod python_bindings

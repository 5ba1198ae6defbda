use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use memmap2::Mmap;
use tempfile::NamedTempFile;

use crate::common::error::{Id3Error, Result};

/// Open a file for read-only access, reporting the path on failure.
pub fn open_ro(path: &str) -> Result<File> {
    File::open(path).map_err(|source| Id3Error::UnableToOpen {
        path: path.to_string(),
        source,
    })
}

/// Read up to `len` bytes from the current position.
/// Returns fewer bytes only when the file ends first.
pub fn read_up_to(file: &mut File, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Memory-map a whole file for scanning.
pub fn map_file(path: &str) -> Result<Mmap> {
    let file = open_ro(path)?;
    // SAFETY: the mapping is only read while the caller holds it, and the
    // library never writes through it.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

/// Replace the contents of `path` with `contents`.
///
/// The new contents are staged in a temporary file in the same directory and
/// only moved over the original once fully written, so a failure part-way
/// leaves the original untouched.
pub fn replace_file(path: &str, contents: &[u8]) -> Result<()> {
    let target = Path::new(path);
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let permissions = std::fs::metadata(target)
        .map_err(|source| Id3Error::UnableToOpen {
            path: path.to_string(),
            source,
        })?
        .permissions();

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents)?;
    staged.flush()?;
    staged.as_file().sync_all()?;
    std::fs::set_permissions(staged.path(), permissions)?;

    staged
        .persist(target)
        .map_err(|e| Id3Error::Io(e.error))?;

    log::debug!("replaced {} ({} bytes)", path, contents.len());
    Ok(())
}

/// Guess a picture MIME type from a file name.
/// Anything that does not end in `.png` is treated as JPEG.
pub fn mime_type_from_filename(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if ext.eq_ignore_ascii_case("png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_from_filename() {
        assert_eq!(mime_type_from_filename("cover.png"), "image/png");
        assert_eq!(mime_type_from_filename("dir.png/cover.PNG"), "image/png");
        assert_eq!(mime_type_from_filename("cover.jpg"), "image/jpeg");
        assert_eq!(mime_type_from_filename("cover"), "image/jpeg");
    }

    #[test]
    fn replace_file_keeps_only_new_contents() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"old contents that are longer").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        replace_file(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn open_missing_file_reports_path() {
        match open_ro("/nonexistent/dir/file.mp3") {
            Err(Id3Error::UnableToOpen { path, .. }) => {
                assert_eq!(path, "/nonexistent/dir/file.mp3")
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn read_up_to_stops_at_eof() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let mut f = File::open(file.path()).unwrap();
        assert_eq!(read_up_to(&mut f, 10).unwrap(), b"abc");
    }
}

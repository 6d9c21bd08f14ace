//! Firmware image loading.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Firmware path is empty")]
    EmptyPath,
    #[error("File {0} does not exist")]
    NotFound(PathBuf),
    #[error("Error reading file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Short read on {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Firmware image held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    path: PathBuf,
    data: Vec<u8>,
}

impl FirmwareImage {
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Largest firmware image a package header can describe.
const MAX_FIRMWARE_LEN: u64 = u32::MAX as u64;

/// Load a firmware image.
///
/// The length is taken from the end-of-file offset and exactly that many
/// bytes must be read back; anything less is an error.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<FirmwareImage, LoadError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LoadError::EmptyPath);
    }

    let read_err = |source: io::Error| LoadError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        _ => read_err(e),
    })?;
    if !file.metadata().map_err(read_err)?.is_file() {
        return Err(read_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let data = read_sized(&mut file, path)?;
    debug!(bytes = data.len(), "Firmware file loaded");
    Ok(FirmwareImage {
        path: path.to_path_buf(),
        data,
    })
}

/// Read exactly as many bytes as the end-of-stream offset reports.
fn read_sized<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<Vec<u8>, LoadError> {
    let read_err = |source: io::Error| LoadError::Read {
        path: path.to_path_buf(),
        source,
    };

    let end = reader.seek(SeekFrom::End(0)).map_err(read_err)?;
    reader.seek(SeekFrom::Start(0)).map_err(read_err)?;
    if end > MAX_FIRMWARE_LEN {
        return Err(read_err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} bytes exceeds the 4 GiB package limit", end),
        )));
    }
    let expected = usize::try_from(end).map_err(|_| {
        read_err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file too large for this platform",
        ))
    })?;

    let mut data = Vec::new();
    data.try_reserve_exact(expected)
        .map_err(|e| read_err(io::Error::new(io::ErrorKind::OutOfMemory, e.to_string())))?;
    reader.by_ref().take(end).read_to_end(&mut data).map_err(read_err)?;
    if data.len() != expected {
        return Err(LoadError::ShortRead {
            path: path.to_path_buf(),
            expected,
            actual: data.len(),
        });
    }
    Ok(data)
}

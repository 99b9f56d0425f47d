//! On-disk persistence of VM descriptors.
//!
//! Each descriptor is stored as `<name>.json` inside a single directory, so
//! a provisioned machine can be destroyed or queried from another process.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::debug;

use crate::descriptor::VmDescriptor;

const EXTENSION: &str = "json";

/// Errors raised while reading or writing stored descriptors.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when no descriptor is stored under the requested name.
    #[error("no descriptor stored at {path}")]
    Missing {
        /// Path that was looked up.
        path: Utf8PathBuf,
    },
    /// Raised when stored content is not a valid descriptor.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a machine name cannot be used as a file name.
    #[error("'{name}' cannot be used as a descriptor file name")]
    InvalidName {
        /// Rejected machine name.
        name: String,
    },
}

/// Directory of persisted descriptors keyed by machine name.
#[derive(Debug)]
pub struct DescriptorStore {
    root: Utf8PathBuf,
    dir: Dir,
}

impl DescriptorStore {
    /// Opens `root`, creating it when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Io`] when the directory cannot be created or
    /// opened.
    pub fn open(root: impl AsRef<Utf8Path>) -> Result<Self, StateStoreError> {
        let path = root.as_ref();
        Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|err| io_error(path, &err))?;
        let dir = Dir::open_ambient_dir(path, ambient_authority())
            .map_err(|err| io_error(path, &err))?;
        Ok(Self {
            root: path.to_path_buf(),
            dir,
        })
    }

    /// Directory holding the descriptor files.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Writes `descriptor` under its machine name, replacing any previous
    /// copy, and returns the file path.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::InvalidName`] for names that are not plain
    /// file names and [`StateStoreError::Io`] when writing fails.
    pub fn save(&self, descriptor: &VmDescriptor) -> Result<Utf8PathBuf, StateStoreError> {
        let file_name = file_name(&descriptor.config().name)?;
        let path = self.root.join(&file_name);
        let rendered =
            serde_json::to_string_pretty(descriptor).map_err(|err| StateStoreError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?;

        let staging = format!(".{file_name}.tmp");
        self.dir
            .write(&staging, rendered.as_bytes())
            .map_err(|err| io_error(&path, &err))?;
        self.dir
            .rename(&staging, &self.dir, &file_name)
            .map_err(|err| io_error(&path, &err))?;
        debug!(path = %path, "descriptor saved");
        Ok(path)
    }

    /// Reads the descriptor stored for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Missing`] when nothing is stored for
    /// `name`, [`StateStoreError::Parse`] for malformed content and
    /// [`StateStoreError::Io`] for other read failures.
    pub fn load(&self, name: &str) -> Result<VmDescriptor, StateStoreError> {
        let file_name = file_name(name)?;
        let path = self.root.join(&file_name);
        let contents = match self.dir.read_to_string(&file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StateStoreError::Missing { path });
            }
            Err(err) => return Err(io_error(&path, &err)),
        };
        serde_json::from_str(&contents).map_err(|err| StateStoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Deletes the descriptor stored for `name`. Removing a name with no
    /// stored descriptor succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::InvalidName`] for names that are not plain
    /// file names and [`StateStoreError::Io`] when removal fails.
    pub fn remove(&self, name: &str) -> Result<(), StateStoreError> {
        let file_name = file_name(name)?;
        match self.dir.remove_file(&file_name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.root.join(&file_name), &err)),
        }
    }
}

fn file_name(name: &str) -> Result<String, StateStoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\'])
        || trimmed.contains("..")
    {
        return Err(StateStoreError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(format!("{trimmed}.{EXTENSION}"))
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StateStoreError {
    StateStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

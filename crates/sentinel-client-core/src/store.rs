use std::convert::Infallible;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Name of the single durable slot holding the bearer token.
pub const TOKEN_SLOT: &str = "token";

/// Durable single-slot token storage.
///
/// Every write is an atomic replace: readers observe either the previous
/// token or the new one, never a partial value.
pub trait TokenStore {
    type Error: Display;

    fn load_token(&self) -> Result<Option<String>, Self::Error>;
    fn persist_token(&self, token: &str) -> Result<(), Self::Error>;
    fn clear_token(&self) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token store path has no parent directory: {path}")]
    NoParent { path: PathBuf },
}

/// Token slot backed by a file under the client state directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(TOKEN_SLOT),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    type Error = TokenStoreError;

    fn load_token(&self) -> Result<Option<String>, Self::Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.io_error(error)),
        }
    }

    fn persist_token(&self, token: &str) -> Result<(), Self::Error> {
        let Some(parent) = self.path.parent() else {
            return Err(TokenStoreError::NoParent {
                path: self.path.clone(),
            });
        };
        std::fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(parent).map_err(|error| self.io_error(error))?;
        staged
            .write_all(token.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|error| self.io_error(error))?;
        staged
            .persist(&self.path)
            .map_err(|error| self.io_error(error.error))?;
        Ok(())
    }

    fn clear_token(&self) -> Result<(), Self::Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error(error)),
        }
    }
}

/// In-process slot. Clones share the same slot, which lets tests simulate a
/// restart by handing a clone to a fresh session manager.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(token.into()))),
        }
    }

    #[must_use]
    pub fn peek(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TokenStore for MemoryTokenStore {
    type Error = Infallible;

    fn load_token(&self) -> Result<Option<String>, Self::Error> {
        Ok(self.peek())
    }

    fn persist_token(&self, token: &str) -> Result<(), Self::Error> {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<(), Self::Error> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Ok(())
    }
}

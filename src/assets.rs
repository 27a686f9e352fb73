//! Button image store. Assets are keyed by the button's immutable id,
//! so the stored path survives display-name edits.

use crate::error::{DeckError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    /// Open (creating if needed) the asset directory.
    ///
    /// # Errors
    /// Returns `DeckError::Io` if the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Where the asset for a button id lives, whether or not it exists.
    #[must_use]
    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    /// Validate and store image bytes for a button, returning the
    /// stored path. An existing asset for the id is replaced.
    ///
    /// # Errors
    /// Returns `DeckError::Asset` if the bytes do not decode as an
    /// image, `DeckError::Io` on write failure.
    pub async fn save(&self, id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(id);
        image::load_from_memory(bytes).map_err(|source| DeckError::Asset {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, bytes).await?;
        info!("saved image asset: {}", path.display());
        Ok(path)
    }

    /// Delete a button's asset. Missing files are fine (the button may
    /// never have had an image).
    ///
    /// # Errors
    /// Returns `DeckError::Io` on any failure other than not-found.
    pub async fn remove(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

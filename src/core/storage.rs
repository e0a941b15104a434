//! Disk-backed artifact storage
//!
//! [`FsStorage`] keeps downloaded artifacts under the data directory:
//!
//! ```text
//! <root>/<type>/<item>/<color>/picture.png
//! <root>/<type>/<item>/picture.png          (colorless items)
//! <root>/<type>/<item>/large.png
//! <root>/<type>/<item>/<color>/priceguide.txt
//! ```
//!
//! The file modification time is the artifact's fetch time.

use crate::artifact::{ArtifactKind, Locator};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub bytes: Vec<u8>,
    pub modified: DateTime<Utc>,
}

pub trait ArtifactStorage: Send + Sync {
    /// `Ok(None)` when nothing is stored for `locator`
    fn load(&self, kind: ArtifactKind, locator: &Locator) -> Result<Option<StoredArtifact>>;

    fn save(&self, kind: ArtifactKind, locator: &Locator, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        FsStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: ArtifactKind, locator: &Locator) -> PathBuf {
        let mut path = self.root.join(locator.item_type.to_string());
        path.push(sanitize(&locator.item_id));

        match kind {
            ArtifactKind::Picture if locator.large => path.push("large.png"),
            ArtifactKind::Picture => {
                if let Some(color) = locator.color_id {
                    path.push(color.to_string());
                }
                path.push("picture.png");
            }
            ArtifactKind::PriceGuide => {
                if let Some(color) = locator.color_id {
                    path.push(color.to_string());
                }
                path.push("priceguide.txt");
            }
        }
        path
    }
}

impl ArtifactStorage for FsStorage {
    fn load(&self, kind: ArtifactKind, locator: &Locator) -> Result<Option<StoredArtifact>> {
        let path = self.path_for(kind, locator);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = fs::metadata(&path)?.modified()?;

        trace!("Disk hit {}", path.display());
        Ok(Some(StoredArtifact {
            bytes,
            modified: DateTime::<Utc>::from(modified),
        }))
    }

    fn save(&self, kind: ArtifactKind, locator: &Locator, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(kind, locator);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("part");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Keep item ids from escaping their directory
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if cleaned == "." || cleaned == ".." {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

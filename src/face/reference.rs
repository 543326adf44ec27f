use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{codecs::png::PngEncoder, ColorType, GrayImage, ImageEncoder, ImageError};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::error::Result;
use crate::model::auth::IdentityHash;

/// Names the stored reference image of one identity. Restricted to
/// `[A-Za-z0-9_-]` so it is always a safe file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceKey(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("reference keys must be non-empty and contain only ASCII letters, digits, '-' or '_'")]
pub struct InvalidKey;

impl ReferenceKey {
    /// The single key shared by the admin role.
    pub fn admin() -> Self {
        Self("admin".to_string())
    }

    pub fn for_identity(identity_hash: &IdentityHash) -> Self {
        Self(format!("voter-{identity_hash}"))
    }

    fn file_name(&self) -> String {
        format!("{}.png", self.0)
    }
}

impl Display for ReferenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReferenceKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty()
            || !s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(InvalidKey);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ReferenceKey {
    type Error = InvalidKey;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ReferenceKey> for String {
    fn from(key: ReferenceKey) -> Self {
        key.0
    }
}

/// A normalised candidate face written to a temporary file beside the
/// references. Deleted on drop unless it is enrolled.
pub struct StagedFace {
    file: NamedTempFile,
}

/// Directory of reference images, one PNG per identity.
pub struct ReferenceStore {
    dir: PathBuf,
}

impl ReferenceStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &ReferenceKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// The reference image for `key`, if one has been enrolled.
    pub fn load(&self, key: &ReferenceKey) -> Result<Option<GrayImage>> {
        match image::open(self.path(key)) {
            Ok(image) => Ok(Some(image.into_luma8())),
            Err(ImageError::IoError(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a candidate face to a temporary file in the store directory.
    pub fn stage(&self, face: &GrayImage) -> Result<StagedFace> {
        let mut file = NamedTempFile::new_in(&self.dir)?;
        let (width, height) = face.dimensions();
        PngEncoder::new(&mut file).write_image(face.as_raw(), width, height, ColorType::L8)?;
        Ok(StagedFace { file })
    }

    /// Make a staged face the reference for `key`, unless one already exists.
    /// Returns whether it was enrolled; if not, the staged file is discarded.
    pub fn enroll(&self, key: &ReferenceKey, staged: StagedFace) -> Result<bool> {
        match staged.file.persist_noclobber(self.path(key)) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }
}

//! Saved container image archive loading for unbake.
//!
//! Unpacks a `docker save` / `podman save` archive into a scratch directory,
//! reads its `manifest.json` and image configuration, and returns the
//! [`ImageDescription`] the reconstruction engine works on.

#![allow(clippy::missing_docs_in_private_items)]

mod extract;
mod load;
mod scratch;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use extract::extract_archive;
pub use load::load;
pub use scratch::ScratchDir;
use unbake::ImageDescription;

/// Result type for unbake-image operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from archive and metadata handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The archive path does not exist or is not a file.
    #[error("archive not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The archive could not be opened or read.
    #[error("failed to extract {}", path.display())]
    Extraction {
        /// Archive path.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// `manifest.json` is missing, malformed, or lists no usable image.
    #[error("invalid manifest {}: {reason}", path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The selected image configuration is missing or malformed.
    #[error("invalid image config {}: {reason}", path.display())]
    Config {
        /// Config path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Filesystem I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which manifest entry to load when an archive holds several images.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Selector {
    /// Position in `manifest.json`.
    Index(usize),
    /// A repository tag listed for the entry (e.g. `nginx:1.25`).
    Tag(String),
}

impl Default for Selector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl FromStr for Selector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(s.parse::<usize>().map_or_else(|_| Self::Tag(s.to_owned()), Self::Index))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Tag(t) => f.write_str(t),
        }
    }
}

/// Extracts `archive` into a scratch directory and loads the selected image.
///
/// The scratch directory is removed before this function returns, whether
/// loading succeeded or not.
pub fn open(archive: impl AsRef<Path>, selector: &Selector) -> Result<ImageDescription> {
    let archive = archive.as_ref();
    if !archive.is_file() {
        return Err(Error::NotFound(archive.to_path_buf()));
    }

    let scratch = ScratchDir::new()?;
    let image = extract_archive(archive, scratch.path()).and_then(|()| load(scratch.path(), selector))?;
    if let Err(e) = scratch.close() {
        tracing::warn!(error = %e, "failed to remove scratch directory");
    }
    tracing::info!(
        archive = %archive.display(),
        id = %image.id,
        history = image.history.len(),
        layers = image.layers.len(),
        "loaded image"
    );
    Ok(image)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn selector_parses_index_or_tag() {
        assert_eq!("2".parse::<Selector>(), Ok(Selector::Index(2)));
        assert_eq!(
            "nginx:latest".parse::<Selector>(),
            Ok(Selector::Tag("nginx:latest".into()))
        );
        assert_eq!(Selector::default(), Selector::Index(0));
    }

    #[test]
    fn missing_archive_is_not_found() {
        let err = open("/nonexistent/image.tar", &Selector::default()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

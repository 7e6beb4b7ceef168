//! Image archive extraction.
//!
//! Unpacks a saved image archive (plain tar, or gzip-compressed tar as
//! produced by `docker save | gzip`) into a directory. Entries that could
//! escape the destination are skipped:
//! - absolute paths and paths with a `..` component;
//! - symlinks whose target resolves outside the destination.
//!
//! Device nodes, FIFOs and hard links are skipped as well; nothing the
//! loader reads is stored that way.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::EntryType;

/// First two bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extracts `archive` into `dest`, creating `dest` if needed.
///
/// Unsafe entries are skipped, not fatal. Files written before a read error
/// are left in place for the caller's scratch directory to clean up.
pub fn extract_archive(archive: &Path, dest: &Path) -> crate::Result<()> {
    let extraction = |source| crate::Error::Extraction {
        path: archive.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(archive).map_err(extraction)?);
    fs::create_dir_all(dest)?;
    let dest = fs::canonicalize(dest)?;

    let gzip = reader.fill_buf().map_err(extraction)?.starts_with(&GZIP_MAGIC);
    if gzip {
        tracing::debug!(archive = %archive.display(), "archive is gzip-compressed");
        unpack(GzDecoder::new(reader), &dest).map_err(extraction)
    } else {
        unpack(reader, &dest).map_err(extraction)
    }
}

/// Unpacks a tar stream into `dest`, skipping unsafe entries.
fn unpack(reader: impl Read, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);

    for raw_entry in archive.entries()? {
        let mut entry = raw_entry?;
        let rel = entry.path()?.into_owned();

        if !is_contained(&rel) {
            tracing::debug!(path = %rel.display(), "skipping entry outside archive root");
            continue;
        }

        match entry.header().entry_type() {
            EntryType::Directory | EntryType::Regular | EntryType::Continuous => {
                entry.unpack_in(dest)?;
            }
            EntryType::Symlink => {
                let Some(target) = entry.link_name()?.map(Cow::into_owned) else {
                    continue;
                };
                let link = dest.join(&rel);
                if !symlink_is_contained(dest, &link, &target)? {
                    tracing::debug!(
                        path = %rel.display(),
                        target = %target.display(),
                        "skipping symlink escaping archive root"
                    );
                    continue;
                }
                create_symlink(&target, &link);
            }
            other => {
                tracing::debug!(path = %rel.display(), kind = ?other, "skipping unsupported entry");
            }
        }
    }

    Ok(())
}

/// Returns `true` if `path` is relative and never climbs above its root.
pub(crate) fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Returns `true` if a symlink at `link` pointing at `target` resolves
/// inside `dest`.
///
/// The link's parent directory is resolved on disk first, so symlinks
/// extracted earlier cannot be used to shorten the path.
fn symlink_is_contained(dest: &Path, link: &Path, target: &Path) -> io::Result<bool> {
    let Some(parent) = link.parent() else {
        return Ok(false);
    };
    fs::create_dir_all(parent)?;
    let parent = fs::canonicalize(parent)?;
    let Ok(inside) = parent.strip_prefix(dest) else {
        return Ok(false);
    };
    Ok(target_stays_within(inside.components().count(), target))
}

/// Walks `target` from a directory `depth` levels below the root and
/// returns `false` if it ever leaves the root.
fn target_stays_within(mut depth: usize, target: &Path) -> bool {
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Creates a symlink; failures are logged and ignored.
#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) {
    if let Err(e) = std::os::unix::fs::symlink(target, link) {
        tracing::debug!(link = %link.display(), error = %e, "failed to create symlink");
    }
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) {
    tracing::debug!(
        link = %link.display(),
        target = %target.display(),
        "symlinks are not supported on this platform"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contained_paths() {
        assert!(is_contained(Path::new("manifest.json")));
        assert!(is_contained(Path::new("./abc/layer.tar")));
        assert!(!is_contained(Path::new("/etc/passwd")));
        assert!(!is_contained(Path::new("abc/../../evil")));
    }

    #[test]
    fn symlink_targets() {
        assert!(target_stays_within(2, Path::new("../c")));
        assert!(target_stays_within(1, Path::new("./layer.tar")));
        assert!(target_stays_within(1, Path::new("../manifest.json")));
        assert!(!target_stays_within(1, Path::new("../../etc/passwd")));
        assert!(!target_stays_within(0, Path::new("/etc/passwd")));
        assert!(!target_stays_within(0, Path::new("..")));
    }

    #[cfg(unix)]
    #[test]
    #[allow(clippy::unwrap_used)]
    fn symlink_through_earlier_symlink_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = fs::canonicalize(tmp.path()).unwrap();
        std::os::unix::fs::symlink(".", dest.join("up")).unwrap();

        let link = dest.join("up/link");
        assert!(!symlink_is_contained(&dest, &link, Path::new("../x")).unwrap());
        assert!(symlink_is_contained(&dest, &link, Path::new("x")).unwrap());
    }
}

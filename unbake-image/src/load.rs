//! Image descriptor loading from an extracted archive.
//!
//! A `docker save` archive carries a top-level `manifest.json`:
//!
//! ```json
//! [{"Config": "<hex>.json", "RepoTags": ["nginx:1.25"], "Layers": ["<dir>/layer.tar"]}]
//! ```
//!
//! `Config` names the image configuration JSON; each layer directory may
//! also hold a legacy `json` metadata file.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use unbake::{ImageDescription, LayerConfig};

use crate::extract::is_contained;
use crate::{Error, Result, Selector};

/// Archive manifest file name.
const MANIFEST_FILE: &str = "manifest.json";

/// Legacy per-layer metadata file name.
const LAYER_METADATA_FILE: &str = "json";

/// One image in `manifest.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    config: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    #[serde(default)]
    layers: Option<Vec<String>>,
}

/// Loads the selected image from an extracted archive rooted at `root`.
pub fn load(root: &Path, selector: &Selector) -> Result<ImageDescription> {
    let manifest_path = root.join(MANIFEST_FILE);
    let entries = read_manifest(&manifest_path)?;
    let manifest_err = |reason: String| Error::Manifest {
        path: manifest_path.clone(),
        reason,
    };

    if entries.is_empty() {
        return Err(manifest_err("manifest lists no images".into()));
    }
    let entry = select(entries, selector)
        .ok_or_else(|| manifest_err(format!("no image matches {selector}")))?;

    let config_path = root.join(&entry.config);
    let config_err = |reason: String| Error::Config {
        path: config_path.clone(),
        reason,
    };
    if !is_contained(Path::new(&entry.config)) {
        return Err(config_err("path escapes archive root".into()));
    }

    let bytes = fs::read(&config_path).map_err(|e| config_err(e.to_string()))?;
    let mut image: ImageDescription =
        serde_json::from_slice(&bytes).map_err(|e| config_err(e.to_string()))?;

    image.id = image_id(&bytes);
    image.repo_tags = entry.repo_tags.unwrap_or_default();
    image.layers = entry.layers.unwrap_or_default();
    image.layer_configs = load_layer_configs(root, &image.layers);

    let with_diff = image.layer_history_len();
    if with_diff != image.layers.len() {
        tracing::warn!(
            history = with_diff,
            layers = image.layers.len(),
            "non-empty history entries do not match layer count"
        );
    }

    Ok(image)
}

/// Reads and parses `manifest.json`.
fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let manifest_err = |reason: String| Error::Manifest {
        path: path.to_path_buf(),
        reason,
    };
    let data = fs::read(path).map_err(|e| manifest_err(e.to_string()))?;
    serde_json::from_slice(&data).map_err(|e| manifest_err(e.to_string()))
}

/// Picks the manifest entry named by `selector`.
///
/// A tag without an explicit tag part also matches `<name>:latest`.
fn select(entries: Vec<ManifestEntry>, selector: &Selector) -> Option<ManifestEntry> {
    match selector {
        Selector::Index(i) => entries.into_iter().nth(*i),
        Selector::Tag(tag) => {
            let latest = format!("{tag}:latest");
            entries.into_iter().find(|e| {
                e.repo_tags
                    .iter()
                    .flatten()
                    .any(|t| t == tag || *t == latest)
            })
        }
    }
}

/// Returns the Docker image ID for a configuration blob.
fn image_id(config: &[u8]) -> String {
    let digest = Sha256::digest(config);
    let mut id = String::with_capacity(7 + digest.len() * 2);
    id.push_str("sha256:");
    for byte in digest.iter() {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// Parses the legacy `json` file next to each layer, skipping any that are
/// absent or malformed.
fn load_layer_configs(root: &Path, layers: &[String]) -> BTreeMap<String, LayerConfig> {
    let mut configs = BTreeMap::new();
    for layer in layers {
        let Some(dir) = Path::new(layer).parent().filter(|d| is_contained(d)) else {
            continue;
        };
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let path = root.join(dir).join(LAYER_METADATA_FILE);
        let parsed = fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_slice::<LayerConfig>(&data).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => {
                configs.insert(name.to_owned(), config);
            }
            Err(reason) => {
                tracing::debug!(path = %path.display(), %reason, "skipping layer metadata");
            }
        }
    }
    configs
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "architecture": "arm64",
        "os": "linux",
        "config": {"Env": ["PATH=/usr/bin"], "Cmd": ["sh"]},
        "history": [
            {"created_by": "/bin/sh -c #(nop) ADD file:aa in / "},
            {"created_by": "/bin/sh -c #(nop)  CMD [\"sh\"]", "empty_layer": true}
        ],
        "rootfs": {"type": "layers", "diff_ids": ["sha256:aa"]}
    }"#;

    fn write_image(root: &Path, manifest: &str) {
        fs::write(root.join(MANIFEST_FILE), manifest).unwrap();
        fs::write(root.join("cfg.json"), CONFIG).unwrap();
        fs::create_dir_all(root.join("aa")).unwrap();
        fs::write(root.join("aa/json"), r#"{"id": "aa", "created": "2024-01-01T00:00:00Z"}"#)
            .unwrap();
    }

    #[test]
    fn loads_selected_image() {
        let dir = tempfile::tempdir().unwrap();
        write_image(
            dir.path(),
            r#"[{"Config": "cfg.json", "RepoTags": ["alpine:3.20"], "Layers": ["aa/layer.tar"]}]"#,
        );

        let image = load(dir.path(), &Selector::default()).unwrap();
        assert_eq!(image.architecture, "arm64");
        assert_eq!(image.repo_tags, vec!["alpine:3.20"]);
        assert_eq!(image.layers, vec!["aa/layer.tar"]);
        assert_eq!(image.layer_configs["aa"].id, "aa");
        assert_eq!(image.id, image_id(CONFIG.as_bytes()));
        assert!(image.id.starts_with("sha256:"));
        assert_eq!(image.id.len(), 7 + 64);
    }

    #[test]
    fn null_repo_tags_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_image(
            dir.path(),
            r#"[{"Config": "cfg.json", "RepoTags": null, "Layers": []}]"#,
        );
        let image = load(dir.path(), &Selector::default()).unwrap();
        assert!(image.repo_tags.is_empty());
        assert!(image.layer_configs.is_empty());
    }

    #[test]
    fn null_layers_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_image(
            dir.path(),
            r#"[{"Config": "cfg.json", "RepoTags": ["alpine:3.20"], "Layers": null}]"#,
        );
        let image = load(dir.path(), &Selector::default()).unwrap();
        assert!(image.layers.is_empty());
        assert!(image.layer_configs.is_empty());
    }

    #[test]
    fn empty_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "[]").unwrap();
        let err = load(dir.path(), &Selector::default()).unwrap_err();
        assert!(matches!(err, Error::Manifest { ref reason, .. } if reason.contains("no images")));
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path(), &Selector::default()).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), r#"[{"Config": "cfg.json", "Layers": []}]"#);
        let err = load(dir.path(), &Selector::Index(3)).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn escaping_config_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"[{"Config": "../cfg.json", "Layers": []}]"#,
        )
        .unwrap();
        let err = load(dir.path(), &Selector::default()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn selects_by_tag() {
        let entries = || {
            serde_json::from_str::<Vec<ManifestEntry>>(
                r#"[
                    {"Config": "a.json", "RepoTags": ["web:1.0"]},
                    {"Config": "b.json", "RepoTags": ["db:latest"]}
                ]"#,
            )
            .unwrap()
        };
        let pick = |s: &str| select(entries(), &s.parse().unwrap()).map(|e| e.config);
        assert_eq!(pick("web:1.0").as_deref(), Some("a.json"));
        assert_eq!(pick("db").as_deref(), Some("b.json"));
        assert_eq!(pick("1").as_deref(), Some("b.json"));
        assert_eq!(pick("cache"), None);
    }
}

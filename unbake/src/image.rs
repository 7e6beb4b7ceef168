//! In-memory description of a saved container image.
//!
//! Field names follow the Docker image configuration JSON so the loader can
//! deserialize a config blob straight into [`ImageDescription`] and the JSON
//! dump writes it back in the same shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Everything the reconstruction engine knows about an image.
///
/// Built once by the loader and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ImageDescription {
    /// Image ID (`sha256:` digest of the configuration file).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Repository tags listed in the archive manifest.
    #[serde(rename = "RepoTags", default, deserialize_with = "nullable")]
    pub repo_tags: Vec<String>,
    /// CPU architecture (e.g. `amd64`).
    #[serde(default, deserialize_with = "nullable")]
    pub architecture: String,
    /// Operating system (e.g. `linux`).
    #[serde(default, deserialize_with = "nullable")]
    pub os: String,
    /// Creation timestamp as recorded by the build tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Version of the engine that committed the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_version: Option<String>,
    /// Image author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Runtime configuration.
    #[serde(default, deserialize_with = "nullable")]
    pub config: ContainerConfig,
    /// Build steps in original build order.
    #[serde(default, deserialize_with = "nullable")]
    pub history: Vec<HistoryEntry>,
    /// Root filesystem diff list.
    #[serde(default, deserialize_with = "nullable")]
    pub rootfs: RootFs,
    /// Layer identifiers, one per non-empty history entry.
    #[serde(default, deserialize_with = "nullable")]
    pub layers: Vec<String>,
    /// Legacy per-layer metadata keyed by layer directory name.
    #[serde(skip)]
    pub layer_configs: BTreeMap<String, LayerConfig>,
}

impl ImageDescription {
    /// Creates a description holding only the given history.
    pub fn from_history(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    /// Number of history entries that produced a filesystem diff.
    pub fn layer_history_len(&self) -> usize {
        self.history.iter().filter(|h| !h.empty_layer).count()
    }
}

/// Runtime configuration of an image (`config` in the image JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ContainerConfig {
    /// Default user.
    #[serde(rename = "User", default, deserialize_with = "nullable")]
    pub user: String,
    /// Exposed ports (`80/tcp`).
    #[serde(
        rename = "ExposedPorts",
        default,
        with = "key_set",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub exposed_ports: BTreeSet<String>,
    /// Environment variables in `KEY=VALUE` form.
    #[serde(rename = "Env", default, deserialize_with = "nullable")]
    pub env: Vec<String>,
    /// Default command (`CMD`).
    #[serde(rename = "Cmd", default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    /// Default entrypoint (`ENTRYPOINT`).
    #[serde(rename = "Entrypoint", default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// Default working directory.
    #[serde(rename = "WorkingDir", default, deserialize_with = "nullable")]
    pub working_dir: String,
    /// Image labels.
    #[serde(
        rename = "Labels",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub labels: BTreeMap<String, String>,
    /// Signal sent to stop the container.
    #[serde(
        rename = "StopSignal",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub stop_signal: String,
    /// Declared volume mount points.
    #[serde(
        rename = "Volumes",
        default,
        with = "key_set",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub volumes: BTreeSet<String>,
}

/// One build step from the image history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct HistoryEntry {
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Author of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-form description of the instruction that produced the step.
    #[serde(default, deserialize_with = "nullable")]
    pub created_by: String,
    /// Optional human comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// `true` when the step produced no filesystem diff.
    #[serde(default, skip_serializing_if = "is_false")]
    pub empty_layer: bool,
}

impl HistoryEntry {
    /// Creates an entry with the given `created_by` text.
    pub fn new(created_by: impl Into<String>, empty_layer: bool) -> Self {
        Self {
            created_by: created_by.into(),
            empty_layer,
            ..Self::default()
        }
    }
}

/// Root filesystem description (`rootfs` in the image JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RootFs {
    /// Always `layers` for current images.
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
    /// Uncompressed layer digests, bottom to top.
    #[serde(default, deserialize_with = "nullable")]
    pub diff_ids: Vec<String>,
}

/// Legacy per-layer `json` file found next to each layer tarball.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct LayerConfig {
    /// Legacy layer ID.
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    /// Parent layer ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Container configuration at the time the layer was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,
}

/// Skips `empty_layer: false` when serializing.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

/// Deserializes `null` as the type's default value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Docker encodes sets as objects with empty values: `{"80/tcp": {}}`.
mod key_set {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes as `{}`.
    #[derive(Serialize)]
    struct Empty {}

    pub(super) fn serialize<S: Serializer>(set: &BTreeSet<String>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(set.iter().map(|key| (key, Empty {})))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
        let map = Option::<BTreeMap<String, IgnoredAny>>::deserialize(d)?;
        Ok(map.map(|m| m.into_keys().collect()).unwrap_or_default())
    }
}

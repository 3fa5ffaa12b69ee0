//! Runc/Docker/containerd runtime metadata provider (component C).
//!
//! Locates and parses runtime state files under the task directories a
//! runc-family runtime uses, resolving Kubernetes and Docker annotations
//! through their documented fallback chains.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// Standard task-root search order (containerd, microk8s, legacy runc,
/// Docker's moby shim). Rootless Docker bases are discovered separately
/// since they're keyed by uid.
const RUNC_TASK_DIRS: &[&str] = &[
    "/run/containerd/io.containerd.runtime.v2.task/k8s.io",
    "/run/containerd/io.containerd.runtime.v1.linux/k8s.io",
    "/run/containerd/runc/k8s.io",
    "/var/snap/microk8s/common/run/containerd/runc/k8s.io",
    "/var/snap/microk8s/common/run/containerd/io.containerd.runtime.v2.task/k8s.io",
    "/run/runc",
    "/run/docker/runtime-runc/moby",
];

const ROOTLESS_DOCKER_BASE: &str = "/run/user";

/// Metadata assembled from a runtime state/config file. All fields are
/// empty strings rather than `Option` when unresolved, mirroring the
/// provider's own "absence is a value" contract.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RuncMetadata {
    pub namespace: String,
    pub pod_name: String,
    pod_uid: String,
    pub image: String,
    pub container_id: String,
    pub labels: HashMap<String, String>,
}

impl RuncMetadata {
    pub fn pod_uid(&self) -> &str {
        &self.pod_uid
    }
}

#[derive(Deserialize)]
struct StateJson {
    #[serde(default)]
    id: String,
    #[serde(default)]
    bundle: String,
    #[serde(default)]
    config: StateConfig,
    /// Root-level labels, always an object in practice.
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct StateConfig {
    /// May be a JSON object OR an array of `key=value` strings.
    #[serde(default)]
    labels: Value,
    #[serde(default)]
    mounts: Vec<Mount>,
}

#[derive(Deserialize)]
struct Mount {
    source: String,
    #[allow(dead_code)]
    #[serde(default)]
    destination: String,
}

#[derive(Deserialize, Default)]
struct ConfigJson {
    #[serde(default)]
    annotations: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct BundleConfigJson {
    #[serde(default)]
    annotations: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct DockerConfigV2Inner {
    #[serde(rename = "Image", default)]
    image: String,
}

/// Docker's `config.v2.json` uses capitalized keys (`Config`, `Name`).
#[derive(Deserialize, Default)]
struct DockerConfigV2Outer {
    #[serde(rename = "Config", default)]
    config: DockerConfigV2Inner,
    #[serde(rename = "Name", default)]
    name: String,
}

/// Normalize `config.labels`'s polymorphic shape (object or
/// array-of-`key=value`) into a flat map. Malformed array entries (no `=`)
/// are silently skipped, matching the original behavior.
fn normalize_labels(value: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if let Some(s) = v.as_str() {
                    out.insert(k.clone(), s.to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    if let Some((k, v)) = s.split_once('=') {
                        out.insert(k.to_string(), v.to_string());
                    }
                }
            }
        }
        _ => {}
    }
    out
}

fn resolve_k8s_fields(annotations: &HashMap<String, String>) -> (String, String, String) {
    let namespace = annotations
        .get("io.kubernetes.pod.namespace")
        .or_else(|| annotations.get("io.kubernetes.cri.sandbox-namespace"))
        .cloned()
        .unwrap_or_default();
    let pod_name = annotations
        .get("io.kubernetes.pod.name")
        .or_else(|| annotations.get("io.kubernetes.cri.sandbox-name"))
        .cloned()
        .unwrap_or_default();
    let pod_uid = annotations
        .get("io.kubernetes.pod.uid")
        .or_else(|| annotations.get("io.kubernetes.cri.sandbox-uid"))
        .cloned()
        .unwrap_or_default();
    (namespace, pod_name, pod_uid)
}

fn resolve_image_from_annotations(annotations: &HashMap<String, String>) -> String {
    annotations
        .get("io.kubernetes.cri.image-name")
        .or_else(|| annotations.get("io.kubernetes.cri.image-ref"))
        .or_else(|| annotations.get("org.opencontainers.image.ref.name"))
        .cloned()
        .unwrap_or_default()
}

/// Reject ids attempting path traversal, regardless of upstream validation.
fn is_safe_id(id: &str) -> bool {
    !id.contains('/') && !id.contains('\\') && !id.contains("..")
}

/// Look up a uid's home directory via `/etc/passwd`, for the rootless
/// Docker path remap.
fn home_dir_for_uid(uid: &str) -> Option<String> {
    let content = fs::read_to_string("/etc/passwd").ok()?;
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 6 && fields[2] == uid {
            return Some(fields[5].to_string());
        }
    }
    None
}

/// Rewrite a `/var/lib/docker/...` container directory into its rootless
/// equivalent under `<home>/.local/share/docker/...` when `base_dir`
/// indicates a `/run/user/<uid>/` rootless task root.
fn remap_rootless_dir(container_dir: &str, base_dir: &str) -> String {
    if !container_dir.starts_with("/var/lib/docker") {
        return container_dir.to_string();
    }
    let Some(idx) = base_dir.find("/run/user/") else {
        return container_dir.to_string();
    };
    let rest = &base_dir[idx + "/run/user/".len()..];
    let uid = rest.split('/').next().unwrap_or("");
    if uid.is_empty() {
        return container_dir.to_string();
    }
    let Some(home) = home_dir_for_uid(uid) else {
        return container_dir.to_string();
    };
    let rel = container_dir.trim_start_matches("/var/lib/docker").trim_start_matches('/');
    format!("{home}/.local/share/docker/{rel}")
}

/// Open `<container_dir>/config.v2.json`, returning `(image, container_name)`.
fn read_docker_config_v2(container_dir: &str) -> Option<(String, String)> {
    let path = Path::new(container_dir).join("config.v2.json");
    let content = fs::read_to_string(path).ok()?;
    let parsed: DockerConfigV2Outer = serde_json::from_str(&content).ok()?;
    Some((parsed.config.image, parsed.name.trim_start_matches('/').to_string()))
}

/// Resolve the image by scanning `config.mounts` for a Docker container
/// directory, applying the rootless remap, then reading `config.v2.json`.
fn resolve_image_from_docker_config(
    mounts: &[Mount],
    base_dir: &str,
    container_id: &str,
    annotations: &mut HashMap<String, String>,
) -> String {
    for mount in mounts {
        if mount.source.contains("/containers/") && mount.source.contains(container_id) {
            let Some(idx) = mount.source.find(container_id) else {
                continue;
            };
            let container_dir = &mount.source[..idx + container_id.len()];
            let container_dir = remap_rootless_dir(container_dir, base_dir);

            if let Some((image, name)) = read_docker_config_v2(&container_dir) {
                if annotations.get("io.kubernetes.pod.name").map(String::as_str).unwrap_or("").is_empty()
                    && !name.is_empty()
                {
                    annotations.insert("container_name".to_string(), name);
                }
                return image;
            }
        }
    }
    String::new()
}

fn resolve_image_from_bundle(state: &StateJson) -> String {
    let bundle_path = if !state.bundle.is_empty() {
        state.bundle.clone()
    } else {
        state.labels.get("bundle").cloned().unwrap_or_default()
    };
    if bundle_path.is_empty() {
        return String::new();
    }
    let config_path = Path::new(&bundle_path).join("config.json");
    let Ok(content) = fs::read_to_string(config_path) else {
        return String::new();
    };
    let Ok(parsed) = serde_json::from_str::<BundleConfigJson>(&content) else {
        return String::new();
    };
    resolve_image_from_annotations(&parsed.annotations)
}

/// Parse `state.json`, resolving namespace/pod/image via the fallback
/// chains before falling back to the bundle config and Docker config.v2.
fn parse_state_json(path: &Path, base_dir: &str) -> Option<RuncMetadata> {
    let content = fs::read_to_string(path).ok()?;
    let state: StateJson = serde_json::from_str(&content).ok()?;

    let mut annotations = normalize_labels(&state.config.labels);
    for (k, v) in &state.labels {
        annotations.insert(k.clone(), v.clone());
    }

    let (namespace, pod_name, pod_uid) = resolve_k8s_fields(&annotations);
    let mut image = resolve_image_from_annotations(&annotations);
    if image.is_empty() {
        image = resolve_image_from_bundle(&state);
    }
    let container_id = state.id;
    if image.is_empty() && !container_id.is_empty() {
        image = resolve_image_from_docker_config(&state.config.mounts, base_dir, &container_id, &mut annotations);
    }

    Some(RuncMetadata {
        namespace,
        pod_name,
        pod_uid,
        image,
        container_id,
        labels: annotations,
    })
}

fn parse_config_json(path: &Path, container_id: &str) -> Option<RuncMetadata> {
    let content = fs::read_to_string(path).ok()?;
    let parsed: ConfigJson = serde_json::from_str(&content).ok()?;
    let (namespace, pod_name, pod_uid) = resolve_k8s_fields(&parsed.annotations);
    let image = resolve_image_from_annotations(&parsed.annotations);
    Some(RuncMetadata {
        namespace,
        pod_name,
        pod_uid,
        image,
        container_id: container_id.to_string(),
        labels: parsed.annotations,
    })
}

/// Try `state.json` then `config.json` under `<base>/<id>`, independently.
fn check_dir(base: &str, id: &str) -> Option<RuncMetadata> {
    let id = id.trim();
    if !is_safe_id(id) {
        return None;
    }

    let dir = Path::new(base).join(id);

    let state_path = dir.join("state.json");
    if state_path.exists() {
        if let Some(meta) = parse_state_json(&state_path, base) {
            return Some(meta);
        }
    }

    let config_path = dir.join("config.json");
    if config_path.exists() {
        if let Some(meta) = parse_config_json(&config_path, id) {
            return Some(meta);
        }
    }

    None
}

fn rootless_bases() -> Vec<PathBuf> {
    let mut bases = Vec::new();
    let Ok(entries) = fs::read_dir(ROOTLESS_DOCKER_BASE) else {
        return bases;
    };
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            bases.push(entry.path().join("docker/runtime-runc/moby"));
        }
    }
    bases
}

/// Resolve metadata for `container_id`, trying every configured base
/// directory plus rootless Docker bases in order; empty id -> empty
/// metadata.
pub fn get_metadata(container_id: &str) -> RuncMetadata {
    if container_id.is_empty() {
        return RuncMetadata::default();
    }

    for base in RUNC_TASK_DIRS {
        if let Some(meta) = check_dir(base, container_id) {
            return meta;
        }
    }

    for base in rootless_bases() {
        if let Some(meta) = check_dir(&base.to_string_lossy(), container_id) {
            return meta;
        }
    }

    RuncMetadata::default()
}

/// Linear scan of every configured base directory's children, returning the
/// first whose metadata reports a matching `pod_uid`.
pub fn find_container_by_uid(target_uid: &str) -> Option<(String, String, String)> {
    if target_uid.is_empty() {
        return None;
    }

    let scan = |base: &str| -> Option<(String, String, String)> {
        let entries = fs::read_dir(base).ok()?;
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            if let Some(meta) = check_dir(base, &id) {
                if meta.pod_uid() == target_uid {
                    return Some((meta.namespace, meta.pod_name, id));
                }
            }
        }
        None
    };

    for base in RUNC_TASK_DIRS {
        if let Some(found) = scan(base) {
            return Some(found);
        }
    }

    for base in rootless_bases() {
        if let Some(found) = scan(&base.to_string_lossy()) {
            return Some(found);
        }
    }

    None
}

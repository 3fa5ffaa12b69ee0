//! Event and resolved-metadata types shared across the pipeline.

use cgroup_sentinel_wire::{RawEvent, RawEventKind};

/// Kind of process event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Execve,
    Open,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Execve => "EXECVE",
            EventKind::Open => "OPEN",
        }
    }
}

/// Immutable process event as it flows through the dispatcher.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub pid: i32,
    pub cgroup_id: u64,
    pub comm: String,
    pub path: String,
}

impl Event {
    pub fn new(kind: EventKind, pid: i32, cgroup_id: u64, comm: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            pid,
            cgroup_id,
            comm: comm.into(),
            path: path.into(),
        }
    }

    /// Convert a fixed-size wire event (as a kernel-side producer would
    /// write into a ring buffer) into the owned, UTF-8 `Event`.
    pub fn from_raw(raw: &RawEvent) -> Self {
        let comm = bytes_to_string(&raw.comm);
        let path = bytes_to_string(&raw.path);
        let kind = match raw.kind {
            RawEventKind::Execve => EventKind::Execve,
            RawEventKind::Open => EventKind::Open,
        };
        Self::new(kind, raw.pid, raw.cgroup_id, comm, path)
    }

    /// The basename of `path`, or the full path if it has no separator.
    pub fn filename(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.path)
    }
}

fn bytes_to_string(buf: &[u8]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

/// A scalar or sequence value surfaced by [`ResolvedMetadata::field`] for the
/// filter evaluator to operate on.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    List(Vec<String>),
}

/// Cached classification produced by the cgroup resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedMetadata {
    Host {
        pid: i32,
        cgroup_paths: Vec<String>,
    },
    Docker {
        pid: i32,
        container_id: String,
        container_name: String,
        image: String,
        cgroup_paths: Vec<String>,
    },
    K8s {
        pid: i32,
        pod_uid: String,
        namespace: String,
        pod_name: String,
        image: String,
        container_id: String,
        cgroup_paths: Vec<String>,
    },
    Unknown,
}

impl ResolvedMetadata {
    /// Classification tag used both for filter matching (`type` field) and
    /// for the `[TYPE]` slot in text-mode log records.
    pub fn type_tag(&self) -> &'static str {
        match self {
            ResolvedMetadata::Host { .. } => "host",
            ResolvedMetadata::Docker { .. } => "docker",
            ResolvedMetadata::K8s { .. } => "k8s",
            ResolvedMetadata::Unknown => "unknown",
        }
    }

    pub fn cgroup_paths(&self) -> &[String] {
        match self {
            ResolvedMetadata::Host { cgroup_paths, .. } => cgroup_paths,
            ResolvedMetadata::Docker { cgroup_paths, .. } => cgroup_paths,
            ResolvedMetadata::K8s { cgroup_paths, .. } => cgroup_paths,
            ResolvedMetadata::Unknown => &[],
        }
    }

    /// Look up an arbitrary info-map field by name, as the filter evaluator's
    /// `resolve_field` fallback does for any key not handled specially.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "cgroup_paths" => Some(FieldValue::List(self.cgroup_paths().to_vec())),
            _ => match self {
                ResolvedMetadata::Host { pid, .. } => match name {
                    "pid" => Some(FieldValue::Int(*pid as i64)),
                    _ => None,
                },
                ResolvedMetadata::Docker {
                    pid,
                    container_id,
                    container_name,
                    image,
                    ..
                } => match name {
                    "pid" => Some(FieldValue::Int(*pid as i64)),
                    "container_id" => Some(FieldValue::Str(container_id.clone())),
                    "container_name" => Some(FieldValue::Str(container_name.clone())),
                    "image" => Some(FieldValue::Str(image.clone())),
                    _ => None,
                },
                ResolvedMetadata::K8s {
                    pid,
                    pod_uid,
                    namespace,
                    pod_name,
                    image,
                    container_id,
                    ..
                } => match name {
                    "pid" => Some(FieldValue::Int(*pid as i64)),
                    "pod_uid" => Some(FieldValue::Str(pod_uid.clone())),
                    "namespace" => Some(FieldValue::Str(namespace.clone())),
                    "pod_name" => Some(FieldValue::Str(pod_name.clone())),
                    "image" | "images" => Some(FieldValue::Str(image.clone())),
                    "container_id" => Some(FieldValue::Str(container_id.clone())),
                    _ => None,
                },
                ResolvedMetadata::Unknown => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_returns_basename() {
        let evt = Event::new(EventKind::Open, 1, 1, "nginx", "/usr/sbin/nginx");
        assert_eq!(evt.filename(), "nginx");
    }

    #[test]
    fn filename_falls_back_to_full_path_without_separator() {
        let evt = Event::new(EventKind::Open, 1, 1, "nginx", "nginx");
        assert_eq!(evt.filename(), "nginx");
    }

    #[test]
    fn from_raw_trims_nul_padding() {
        let mut comm = [0u8; 16];
        comm[..5].copy_from_slice(b"nginx");
        let mut path = [0u8; 256];
        let src = b"/usr/sbin/nginx";
        path[..src.len()].copy_from_slice(src);
        let raw = RawEvent {
            kind: RawEventKind::Execve,
            pid: 42,
            cgroup_id: 7,
            comm,
            path,
        };
        let evt = Event::from_raw(&raw);
        assert_eq!(evt.comm, "nginx");
        assert_eq!(evt.path, "/usr/sbin/nginx");
    }

    #[test]
    fn docker_metadata_exposes_fields() {
        let meta = ResolvedMetadata::Docker {
            pid: 5,
            container_id: "abc123".into(),
            container_name: "web".into(),
            image: "nginx:1.25".into(),
            cgroup_paths: vec!["/docker/abc123".into()],
        };
        assert_eq!(meta.type_tag(), "docker");
        assert_eq!(meta.field("image"), Some(FieldValue::Str("nginx:1.25".into())));
        assert_eq!(meta.field("namespace"), None);
    }
}

//! Log sink (component G): one append-only file per workload identity,
//! opened on first write and kept open for the life of the process.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde_json::json;
use tracing::warn;

use crate::model::{Event, ResolvedMetadata};
use crate::settings::OutputFormat;
use crate::telemetry;

/// Table of lazily-opened, append-only log writers keyed by log file name.
pub struct SinkTable {
    output_dir: PathBuf,
    format: OutputFormat,
    writers: Mutex<HashMap<String, File>>,
}

impl SinkTable {
    pub fn new(output_dir: PathBuf, format: OutputFormat) -> Self {
        Self {
            output_dir,
            format,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Format and append a record for `event`/`resolved`. `print_host_events`
    /// gates whether host-classified events are written at all.
    pub fn record(&self, event: &Event, resolved: &ResolvedMetadata, print_host_events: bool) {
        let Some(file_name) = log_file_name(resolved, print_host_events) else {
            return;
        };

        let line = match self.format {
            OutputFormat::Json => json_line(event, resolved),
            OutputFormat::Text => text_line(event, resolved),
        };

        if let Err(err) = self.write_line(&file_name, &line) {
            warn!(file = %file_name, error = %err, "failed to write detection log");
            telemetry::record_log_write_error();
        }
    }

    fn write_line(&self, file_name: &str, line: &str) -> std::io::Result<()> {
        let mut writers = self.writers.lock().unwrap();
        let file = match writers.get_mut(file_name) {
            Some(f) => f,
            None => {
                let file = open_writer(&self.output_dir, file_name)?;
                writers.entry(file_name.to_string()).or_insert(file)
            }
        };
        file.write_all(line.as_bytes())
    }
}

fn open_writer(output_dir: &Path, file_name: &str) -> std::io::Result<File> {
    OpenOptions::new().append(true).create(true).open(output_dir.join(file_name))
}

/// Replace path separators and colons with `_` so a container image
/// reference is always a valid single path component.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c == ':' || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

fn log_file_name(resolved: &ResolvedMetadata, print_host_events: bool) -> Option<String> {
    match resolved {
        ResolvedMetadata::Docker { image, .. } => {
            let image = if image.is_empty() { "unknown" } else { image };
            Some(format!("detect_{}.log", sanitize(image)))
        }
        ResolvedMetadata::K8s { image, .. } => {
            let image = if image.is_empty() { "unknown" } else { image };
            Some(format!("detect_{}.log", sanitize(image)))
        }
        ResolvedMetadata::Host { .. } => print_host_events.then(|| "detect_host.log".to_string()),
        ResolvedMetadata::Unknown => Some("detect_unknown.log".to_string()),
    }
}

fn json_line(event: &Event, resolved: &ResolvedMetadata) -> String {
    let mut entry = json!({
        "type": resolved.type_tag(),
        "event": event.kind.as_str(),
        "pid": event.pid,
        "comm": event.comm,
        "filename": event.filename(),
        "filepath": event.path,
        "timestamp": Local::now().to_rfc3339(),
    });
    let obj = entry.as_object_mut().unwrap();
    match resolved {
        ResolvedMetadata::Docker {
            container_id,
            container_name,
            image,
            ..
        } => {
            obj.insert("container_id".into(), json!(container_id));
            obj.insert("container_name".into(), json!(container_name));
            obj.insert("image".into(), json!(image));
        }
        ResolvedMetadata::K8s {
            pod_uid,
            namespace,
            pod_name,
            image,
            container_id,
            ..
        } => {
            obj.insert("pod_uid".into(), json!(pod_uid));
            obj.insert("namespace".into(), json!(namespace));
            obj.insert("pod_name".into(), json!(pod_name));
            obj.insert("images".into(), json!(image));
            obj.insert("container_id".into(), json!(container_id));
        }
        ResolvedMetadata::Host { cgroup_paths, .. } => {
            obj.insert("cgroup_paths".into(), json!(cgroup_paths));
        }
        ResolvedMetadata::Unknown => {
            obj.insert("cgroup_id".into(), json!(event.cgroup_id));
        }
    }
    format!("{entry}\n")
}

fn text_line(event: &Event, resolved: &ResolvedMetadata) -> String {
    let timestamp = Local::now().to_rfc3339();
    let prefix = format!("[{timestamp}][{}][{}]", resolved.type_tag().to_uppercase(), event.kind.as_str());
    let (pid, comm, filename, filepath) = (event.pid, &event.comm, event.filename(), &event.path);

    match resolved {
        ResolvedMetadata::Docker {
            container_name,
            image,
            container_id,
            ..
        } => format!(
            "{prefix} pid={pid} comm={comm} filename={filename} filepath={filepath} container={container_name} image={image} cid={container_id}\n"
        ),
        ResolvedMetadata::K8s {
            namespace,
            pod_name,
            image,
            pod_uid,
            container_id,
            ..
        } => format!(
            "{prefix} pid={pid} comm={comm} filename={filename} filepath={filepath} ns={namespace} pod={pod_name} images={image} pod_uid={pod_uid} cid={container_id}\n"
        ),
        ResolvedMetadata::Host { cgroup_paths, .. } => format!(
            "{prefix} pid={pid} comm={comm} filename={filename} filepath={filepath} cgroup_path={}\n",
            cgroup_paths.join(",")
        ),
        ResolvedMetadata::Unknown => format!(
            "{prefix} pid={pid} comm={comm} filename={filename} filepath={filepath} cgroup_id={}\n",
            event.cgroup_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventKind;

    fn sample_event() -> Event {
        Event::new(EventKind::Open, 123, 7, "nginx", "/usr/sbin/nginx")
    }

    #[test]
    fn docker_events_write_to_sanitized_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SinkTable::new(dir.path().to_path_buf(), OutputFormat::Text);
        let resolved = ResolvedMetadata::Docker {
            pid: 123,
            container_id: "abc123".into(),
            container_name: "web".into(),
            image: "registry.example.com/nginx:1.25".into(),
            cgroup_paths: vec![],
        };
        sink.record(&sample_event(), &resolved, false);
        let contents = std::fs::read_to_string(dir.path().join("detect_registry.example.com_nginx_1.25.log")).unwrap();
        assert!(!contents.contains("ns="));
        assert!(contents.contains("container=web"));
    }

    #[test]
    fn host_events_are_dropped_unless_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SinkTable::new(dir.path().to_path_buf(), OutputFormat::Text);
        let resolved = ResolvedMetadata::Host {
            pid: 1,
            cgroup_paths: vec!["/".to_string()],
        };
        sink.record(&sample_event(), &resolved, false);
        assert!(!dir.path().join("detect_host.log").exists());

        sink.record(&sample_event(), &resolved, true);
        assert!(dir.path().join("detect_host.log").exists());
    }

    #[test]
    fn json_format_emits_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SinkTable::new(dir.path().to_path_buf(), OutputFormat::Json);
        let resolved = ResolvedMetadata::K8s {
            pid: 123,
            pod_uid: "u-1".into(),
            namespace: "default".into(),
            pod_name: "web-0".into(),
            image: "nginx:1.25".into(),
            container_id: "c1".into(),
            cgroup_paths: vec![],
        };
        sink.record(&sample_event(), &resolved, false);
        let contents = std::fs::read_to_string(dir.path().join("detect_nginx_1.25.log")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(parsed["namespace"], "default");
        assert_eq!(parsed["pod_uid"], "u-1");
    }

    #[test]
    fn repeated_writes_reuse_the_same_open_handle() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SinkTable::new(dir.path().to_path_buf(), OutputFormat::Text);
        let resolved = ResolvedMetadata::Unknown;
        sink.record(&sample_event(), &resolved, false);
        sink.record(&sample_event(), &resolved, false);
        let contents = std::fs::read_to_string(dir.path().join("detect_unknown.log")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}

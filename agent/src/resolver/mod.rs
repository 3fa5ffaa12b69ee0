//! Cgroup → workload resolution pipeline (component D).
//!
//! Orchestrates the procfs/cgroupfs probes (A), the regex extractor (B) and
//! the runc metadata provider (C), owns the resolver cache, and produces
//! [`ResolvedMetadata`].

mod patterns;
mod procfs_probe;
mod runc;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::ResolvedMetadata;
use crate::settings::MetadataProvider;
use crate::telemetry;

pub struct CgroupResolver {
    cache: RwLock<HashMap<u64, ResolvedMetadata>>,
    metadata_provider: MetadataProvider,
    use_cgroupfs_scan: bool,
}

impl CgroupResolver {
    pub fn new(metadata_provider: MetadataProvider, use_cgroupfs_scan: bool) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            metadata_provider,
            use_cgroupfs_scan,
        }
    }

    /// Resolve `cgroup_id` to its workload classification, consulting (and
    /// maintaining) the shared cache.
    pub fn resolve(&self, cgroup_id: u64, hint_pid: i32) -> ResolvedMetadata {
        if let Some(cached) = self.cache.read().unwrap().get(&cgroup_id) {
            telemetry::record_cache_hit();
            return cached.clone();
        }
        telemetry::record_cache_miss();

        let (paths, pid) = self.find_cgroup_paths(cgroup_id, hint_pid);

        if paths.is_empty() {
            return self.handle_empty_paths(cgroup_id);
        }

        self.resolve_from_paths(cgroup_id, paths, pid)
    }

    /// Classify and (conditionally) cache `cgroup_id` once its cgroup paths
    /// are already known, factored out of [`Self::resolve`] so the
    /// id-extraction/container-resolution/caching logic can be exercised
    /// directly against synthetic paths in tests, without requiring a real
    /// `/proc`/`/sys/fs/cgroup` fixture.
    fn resolve_from_paths(&self, cgroup_id: u64, paths: Vec<String>, pid: i32) -> ResolvedMetadata {
        let (container_id, pod_uid) = patterns::extract_ids_from_paths(&paths);

        if let Some(meta) = self.resolve_container(&container_id, pod_uid, pid, &paths) {
            self.cache.write().unwrap().insert(cgroup_id, meta.clone());
            return meta;
        }

        // A container id was extracted but metadata could not be assembled:
        // this is a transient resolution race (state.json not written yet).
        // Do not cache; retry on the next event for this cgroup id.
        let fallback = ResolvedMetadata::Host {
            pid,
            cgroup_paths: paths,
        };
        if container_id.is_empty() {
            self.cache.write().unwrap().insert(cgroup_id, fallback.clone());
        }
        fallback
    }

    fn find_cgroup_paths(&self, cgroup_id: u64, hint_pid: i32) -> (Vec<String>, i32) {
        if hint_pid != 0 && self.pid_matches_cgroup(hint_pid, cgroup_id) {
            return (procfs_probe::cgroup_paths_for_pid(hint_pid), hint_pid);
        }

        if self.use_cgroupfs_scan {
            if let Some(path) = procfs_probe::scan_cgroupfs(cgroup_id) {
                return (vec![path], hint_pid);
            }
        }

        for pid in procfs_probe::all_pids(hint_pid) {
            if self.pid_matches_cgroup(pid, cgroup_id) {
                return (procfs_probe::cgroup_paths_for_pid(pid), pid);
            }
        }

        (Vec::new(), 0)
    }

    fn pid_matches_cgroup(&self, pid: i32, target_cgroup_id: u64) -> bool {
        for path in procfs_probe::cgroup_paths_for_pid(pid) {
            let rel = path.trim_start_matches('/');
            let full = std::path::Path::new("/sys/fs/cgroup").join(rel);
            if procfs_probe::stat_inode(&full) == Some(target_cgroup_id) {
                return true;
            }
        }
        false
    }

    fn handle_empty_paths(&self, cgroup_id: u64) -> ResolvedMetadata {
        if cgroup_id == 1 {
            let meta = ResolvedMetadata::Host {
                pid: 0,
                cgroup_paths: vec!["/".to_string()],
            };
            self.cache.write().unwrap().insert(cgroup_id, meta.clone());
            return meta;
        }
        ResolvedMetadata::Unknown
    }

    fn resolve_container(
        &self,
        container_id: &str,
        mut pod_uid: String,
        pid: i32,
        paths: &[String],
    ) -> Option<ResolvedMetadata> {
        let mut meta = runc::RuncMetadata::default();

        if !container_id.is_empty() && self.metadata_provider.queries_runc() {
            meta = runc::get_metadata(container_id);
            if !meta.pod_uid().is_empty() {
                pod_uid = meta.pod_uid().to_string();
            }
        }

        let mut container_id = container_id.to_string();

        if !pod_uid.is_empty() && meta.namespace.is_empty() {
            if let Some((ns, pod_name, found_cid)) = runc::find_container_by_uid(&pod_uid) {
                container_id = found_cid;
                meta = runc::get_metadata(&container_id);
                if meta.namespace.is_empty() {
                    meta.namespace = ns;
                    meta.pod_name = pod_name;
                }
            }
        }

        if !meta.namespace.is_empty() && !pod_uid.is_empty() {
            return Some(ResolvedMetadata::K8s {
                pid,
                pod_uid,
                namespace: meta.namespace,
                pod_name: meta.pod_name,
                image: meta.image,
                container_id,
                cgroup_paths: paths.to_vec(),
            });
        }

        if !container_id.is_empty() && (!meta.image.is_empty() || !meta.container_id.is_empty()) {
            let container_name = meta
                .labels
                .get("container_name")
                .cloned()
                .unwrap_or_else(|| meta.container_id.clone());
            return Some(ResolvedMetadata::Docker {
                pid,
                container_id,
                container_name,
                image: meta.image,
                cgroup_paths: paths.to_vec(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_cgroup_id_without_paths_is_unknown() {
        let resolver = CgroupResolver::new(MetadataProvider::All, false);
        // PID 0 has no /proc/0/cgroup and this id will not be found under
        // /sys/fs/cgroup nor /proc; with scanning disabled and no process
        // matching, resolution falls through to Unknown.
        let meta = resolver.resolve(0xDEAD_BEEF_u64, 0);
        assert!(matches!(meta, ResolvedMetadata::Unknown));
    }

    #[test]
    fn root_cgroup_id_resolves_to_synthetic_host_and_caches() {
        let resolver = CgroupResolver::new(MetadataProvider::All, false);
        let meta = resolver.resolve(1, 0);
        match meta {
            ResolvedMetadata::Host { cgroup_paths, .. } => assert_eq!(cgroup_paths, vec!["/".to_string()]),
            other => panic!("expected synthetic host, got {other:?}"),
        }
        assert!(resolver.cache.read().unwrap().contains_key(&1));
    }

    #[test]
    fn resolve_is_idempotent_for_cached_entries() {
        let resolver = CgroupResolver::new(MetadataProvider::All, false);
        let first = resolver.resolve(1, 0);
        let second = resolver.resolve(1, 0);
        assert_eq!(first, second);
    }

    /// A container id extracted from the cgroup path, but with no matching
    /// runc/Docker state file on disk (a transient resolution race), must
    /// fall back to `Host` and must NOT be cached — the next event for the
    /// same cgroup id should retry once the state file has appeared.
    #[test]
    fn host_fallback_with_extracted_container_id_is_not_cached() {
        let resolver = CgroupResolver::new(MetadataProvider::All, false);
        let cgroup_id = 0x1234_5678_u64;
        let path = format!("/docker/{}", "a".repeat(64));

        let meta = resolver.resolve_from_paths(cgroup_id, vec![path], 4242);

        assert!(matches!(meta, ResolvedMetadata::Host { .. }));
        assert!(!resolver.cache.read().unwrap().contains_key(&cgroup_id));
    }
}

//! Fixed regular expressions that extract a container id / pod uid from a
//! cgroup path string (component B).

use once_cell::sync::Lazy;
use regex::Regex;

/// Standard Docker cgroups: `/docker/<id>` or `.../docker-<id>.scope`.
static DOCKER_CGROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|/)docker[-/](?P<cid>[0-9a-f]{12,64})(?:\.scope)?").unwrap());

/// CRI-containerd cgroups: `.../cri-containerd-<id>.scope`.
static CRI_CGROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"cri-containerd-(?P<cid>[0-9a-f]{12,64})\.scope").unwrap());

/// Standard kubepods cgroups: `/kubepods/.../pod<uid>/<64-hex-id>`.
static K8S_CGROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/kubepods/(?:[^/]+/)?pod[0-9a-f\-_]{36}/(?P<cid>[0-9a-f]{64})").unwrap());

/// Pod UID embedded anywhere in a cgroup path.
static POD_UID: Lazy<Regex> = Lazy::new(|| Regex::new(r"pod(?P<uid>[0-9a-f\-_]{36})").unwrap());

/// Extract `(container_id, pod_uid)` from a single cgroup path.
///
/// Returns possibly-empty strings for either component; callers fold this
/// over every path for a cgroup id, with later non-empty matches
/// overwriting earlier ones (kubepods' full id wins over a docker short id).
pub fn extract_ids(path: &str) -> (Option<String>, Option<String>) {
    let mut container_id = None;
    let mut pod_uid = None;

    if let Some(caps) = DOCKER_CGROUP.captures(path) {
        container_id = caps.name("cid").map(|m| m.as_str().to_string());
    }
    if let Some(caps) = CRI_CGROUP.captures(path) {
        container_id = caps.name("cid").map(|m| m.as_str().to_string());
    }
    if let Some(caps) = K8S_CGROUP.captures(path) {
        container_id = caps.name("cid").map(|m| m.as_str().to_string());
    }
    if let Some(caps) = POD_UID.captures(path) {
        pod_uid = caps.name("uid").map(|m| m.as_str().replace('_', "-"));
    }

    (container_id, pod_uid)
}

/// Fold [`extract_ids`] over an ordered sequence of cgroup paths, with later
/// paths overwriting earlier assignments.
pub fn extract_ids_from_paths(paths: &[String]) -> (String, String) {
    let mut container_id = String::new();
    let mut pod_uid = String::new();

    for path in paths {
        let (cid, uid) = extract_ids(path);
        if let Some(cid) = cid {
            container_id = cid;
        }
        if let Some(uid) = uid {
            pod_uid = uid;
        }
    }

    (container_id, pod_uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_scope_extracts_hex_id() {
        let id = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2";
        let path = format!("/system.slice/docker-{id}.scope");
        let (cid, _) = extract_ids(&path);
        assert_eq!(cid.as_deref(), Some(id));
    }

    #[test]
    fn docker_plain_path_extracts_id() {
        let (cid, _) = extract_ids("/docker/abcdef012345");
        assert_eq!(cid.as_deref(), Some("abcdef012345"));
    }

    #[test]
    fn kubepods_extracts_container_id_and_normalized_uid() {
        let id = "f".repeat(64);
        let path = format!("/kubepods/burstable/pod11111111_2222_3333_4444_555555555555/{id}");
        let (cid, uid) = extract_ids(&path);
        assert_eq!(cid.as_deref(), Some(id.as_str()));
        assert_eq!(uid.as_deref(), Some("11111111-2222-3333-4444-555555555555"));
    }

    #[test]
    fn cri_containerd_scope_extracts_id() {
        let id = "b".repeat(64);
        let path = format!("/kubepods.slice/kubepods-besteffort.slice/cri-containerd-{id}.scope");
        let (cid, _) = extract_ids(&path);
        assert_eq!(cid.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn kubepods_overrides_docker_when_both_present_across_paths() {
        let docker_path = "/docker/abcdef012345abcdef012345";
        let k8s_id = "c".repeat(64);
        let k8s_path = format!("/kubepods/pod11111111-2222-3333-4444-555555555555/{k8s_id}");
        let (cid, _) = extract_ids_from_paths(&[docker_path.to_string(), k8s_path]);
        assert_eq!(cid, k8s_id);
    }

    #[test]
    fn non_container_path_yields_nothing() {
        let (cid, uid) = extract_ids("/user.slice/user-1000.slice/session-1.scope");
        assert!(cid.is_none());
        assert!(uid.is_none());
    }
}

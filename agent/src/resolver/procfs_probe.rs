//! Procfs / cgroupfs probes (component A).

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Parse `/proc/<pid>/cgroup` and return the third colon-separated field of
/// every line, in file order. A missing file or permission error yields an
/// empty sequence rather than an error — this is an expected, not
/// exceptional, outcome.
pub fn cgroup_paths_for_pid(pid: i32) -> Vec<String> {
    let path = format!("/proc/{pid}/cgroup");
    let Ok(content) = fs::read_to_string(&path) else {
        return Vec::new();
    };

    content
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2).map(|s| s.to_string()))
        .collect()
}

/// Return the inode of `path`, treating any I/O error as absence.
pub fn stat_inode(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.ino())
}

/// Walk `/sys/fs/cgroup` looking for the directory whose inode equals
/// `target_id`, returning its path relative to the cgroupfs root (with a
/// leading `/`). The root itself is checked first and matches the host
/// cgroup's id.
pub fn scan_cgroupfs(target_id: u64) -> Option<String> {
    let base = Path::new("/sys/fs/cgroup");

    if stat_inode(base) == Some(target_id) {
        return Some("/".to_string());
    }

    for entry in walkdir::WalkDir::new(base).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if stat_inode(entry.path()) == Some(target_id) {
            let rel = entry.path().strip_prefix(base).ok()?;
            let rel_str = rel.to_string_lossy();
            return Some(format!("/{rel_str}"));
        }
    }

    None
}

/// Enumerate numeric entries of `/proc`, skipping `exclude_pid`.
pub fn all_pids(exclude_pid: i32) -> Vec<i32> {
    let mut pids = Vec::new();
    if let Ok(procs) = procfs::process::all_processes() {
        for p in procs.flatten() {
            if p.pid != exclude_pid {
                pids.push(p.pid);
            }
        }
    }
    pids
}

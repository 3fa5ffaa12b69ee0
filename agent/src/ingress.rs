//! Legacy text-line ingress: parses `EXECVE`/`OPEN` lines from standard
//! input into [`Event`]s.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Event, EventKind};

static EXECVE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^EXECVE\s+pid=(?P<pid>-?\d+)\s+cgroup_id=(?P<cgroup_id>\d+)\s+comm=(?P<comm>\S+)\s+filepath=(?P<filepath>\S+)(?:\s+argv=(?P<argv>.*))?$").unwrap()
});

static OPEN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^OPEN\s+pid=(?P<pid>-?\d+)\s+cgroup_id=(?P<cgroup_id>\d+)\s+comm=(?P<comm>\S+)\s+filepath=(?P<filepath>\S+)$").unwrap()
});

/// Parse a single ingress line into an [`Event`]. Unrecognized lines
/// (including malformed field values) are ignored, returning `None`.
pub fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim();

    if let Some(caps) = EXECVE_LINE.captures(line) {
        return build_event(EventKind::Execve, &caps);
    }
    if let Some(caps) = OPEN_LINE.captures(line) {
        return build_event(EventKind::Open, &caps);
    }
    None
}

fn build_event(kind: EventKind, caps: &regex::Captures) -> Option<Event> {
    let pid: i32 = caps.name("pid")?.as_str().parse().ok()?;
    let cgroup_id: u64 = caps.name("cgroup_id")?.as_str().parse().ok()?;
    let comm = caps.name("comm")?.as_str();
    let filepath = caps.name("filepath")?.as_str();
    Some(Event::new(kind, pid, cgroup_id, comm, filepath))
}

//! Ties the resolver, filter evaluator and log sink together into the
//! per-event handler the dispatcher's worker pool runs.

use std::sync::Arc;

use tracing::debug;

use crate::filter;
use crate::model::Event;
use crate::resolver::CgroupResolver;
use crate::rules::FilterRule;
use crate::sink::SinkTable;
use crate::telemetry;

pub struct Pipeline {
    resolver: Arc<CgroupResolver>,
    sink: SinkTable,
    filters: Vec<FilterRule>,
    self_pid: i32,
    filter_system_events: bool,
    print_host_events: bool,
}

impl Pipeline {
    pub fn new(
        resolver: Arc<CgroupResolver>,
        sink: SinkTable,
        filters: Vec<FilterRule>,
        self_pid: i32,
        filter_system_events: bool,
        print_host_events: bool,
    ) -> Self {
        Self {
            resolver,
            sink,
            filters,
            self_pid,
            filter_system_events,
            print_host_events,
        }
    }

    /// Resolve, filter and (if not suppressed) log a single event.
    pub fn handle(&self, event: Event) {
        let resolved = self.resolver.resolve(event.cgroup_id, event.pid);

        if filter::should_suppress(&event, &resolved, self.self_pid, self.filter_system_events, &self.filters) {
            telemetry::record_event_suppressed();
            return;
        }

        telemetry::record_event_processed(event.kind.as_str());
        debug!(pid = event.pid, path = %event.path, kind = ?event.kind, "dispatching event to sink");
        self.sink.record(&event, &resolved, self.print_host_events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventKind;
    use crate::settings::{MetadataProvider, OutputFormat};

    #[test]
    fn self_events_never_reach_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            Arc::new(CgroupResolver::new(MetadataProvider::All, false)),
            SinkTable::new(dir.path().to_path_buf(), OutputFormat::Text),
            crate::rules::default_filters(),
            42,
            true,
            true,
        );
        pipeline.handle(Event::new(EventKind::Open, 42, 1, "agent", "/proc/self/status"));
        assert!(!dir.path().join("detect_host.log").exists());
    }
}

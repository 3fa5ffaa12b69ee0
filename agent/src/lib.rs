pub mod dispatcher;
pub mod filter;
pub mod ingress;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod rules;
pub mod settings;
pub mod sink;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Result;

use crate::dispatcher::Dispatcher;
use crate::model::Event;
use crate::pipeline::Pipeline;
use crate::resolver::CgroupResolver;
use crate::settings::AgentConfig;
use crate::sink::SinkTable;

/// Wires the resolver, filters and sink into a running dispatcher, and owns
/// the single [`CgroupResolver`] instance events are resolved against.
pub struct SentinelEngine {
    dispatcher: Dispatcher,
}

impl SentinelEngine {
    pub fn start(config: AgentConfig, self_pid: i32) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir)?;

        let resolver = Arc::new(CgroupResolver::new(config.metadata_provider, config.use_cgroupfs_scan));
        let sink = SinkTable::new(config.output_dir.clone(), config.output_format);
        let pipeline = Arc::new(Pipeline::new(
            resolver,
            sink,
            config.filters.clone(),
            self_pid,
            config.filter_system_events,
            config.print_host_events,
        ));

        let dispatcher = Dispatcher::spawn(config.workers, config.buffer_size, pipeline);
        Ok(Self { dispatcher })
    }

    /// Enqueue an event for asynchronous resolution and logging. Never
    /// blocks: a full queue drops the event.
    pub fn submit(&self, event: Event) {
        self.dispatcher.submit(event);
    }

    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }
}

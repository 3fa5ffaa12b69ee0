//! Bounded event dispatcher (component F): a fixed worker pool drains a
//! bounded channel and hands each event to the resolve/filter/sink pipeline,
//! dropping events when the channel is full rather than blocking the
//! producer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::Event;
use crate::pipeline::Pipeline;
use crate::telemetry;

/// Submits events into a bounded queue drained by a pool of worker tasks.
pub struct Dispatcher {
    sender: mpsc::Sender<Event>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn `worker_count` workers pulling from a channel of capacity
    /// `buffer_size`, each running `pipeline` against every event it reads.
    pub fn spawn(worker_count: usize, buffer_size: usize, pipeline: Arc<Pipeline>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    loop {
                        let event = {
                            let mut rx = receiver.lock().await;
                            rx.recv().await
                        };
                        match event {
                            Some(event) => pipeline.handle(event),
                            None => {
                                debug!(worker = id, "dispatcher worker shutting down");
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        Self { sender, workers }
    }

    /// Enqueue `event` without blocking; if the channel is full the event
    /// is dropped and counted rather than applying backpressure to the
    /// caller: losing an event beats blocking the submitter.
    pub fn submit(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dispatcher queue full, dropping event");
                telemetry::record_event_dropped();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("dispatcher channel closed, dropping event");
            }
        }
    }

    /// Close the channel and wait for every worker to drain and exit.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventKind;
    use crate::resolver::CgroupResolver;
    use crate::settings::{MetadataProvider, OutputFormat};
    use crate::sink::SinkTable;

    #[tokio::test]
    async fn dropped_events_are_counted_not_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(CgroupResolver::new(MetadataProvider::All, false)),
            SinkTable::new(dir.path().to_path_buf(), OutputFormat::Text),
            Vec::new(),
            std::process::id() as i32,
            false,
            false,
        ));
        let dispatcher = Dispatcher::spawn(1, 1, pipeline);
        for i in 0..50 {
            dispatcher.submit(Event::new(EventKind::Open, i, 1, "x", "/bin/x"));
        }
        dispatcher.shutdown().await;
    }
}

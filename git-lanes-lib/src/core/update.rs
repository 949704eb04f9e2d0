//! Applies reference moves to cached histories, one at a time.
//!
//! Producers (whoever diffs the references) call [`UpdatePipeline::submit`],
//! which never blocks: when the queue is full the update is dropped and
//! logged, and the affected history stays stale until it is next reloaded.
//! A single worker drains the queue, so two patches never touch the same
//! [`crate::core::commit_set::CommitSet`] at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, instrument, warn};

use crate::core::history::HistoryRegistry;
use crate::git::UpdatedReference;

/// How many pending updates the queue holds by default.
pub const DEFAULT_UPDATE_QUEUE_CAPACITY: usize = 256;

/// The producer half of the update pipeline.
#[derive(Debug)]
pub struct UpdatePipeline {
    sender: Mutex<Option<Sender<UpdatedReference>>>,
    capacity: usize,
    accepted: AtomicUsize,
    dropped: AtomicUsize,
}

/// The consumer half of the update pipeline. There is exactly one of these
/// per pipeline, and it is consumed by running it.
#[derive(Debug)]
pub struct UpdateQueue {
    receiver: Receiver<UpdatedReference>,
}

/// Create a pipeline whose queue holds at most `capacity` pending updates.
pub fn update_pipeline(capacity: usize) -> (UpdatePipeline, UpdateQueue) {
    let (sender, receiver) = bounded(capacity);
    (
        UpdatePipeline {
            sender: Mutex::new(Some(sender)),
            capacity,
            accepted: Default::default(),
            dropped: Default::default(),
        },
        UpdateQueue { receiver },
    )
}

impl UpdatePipeline {
    /// Queue an update for the worker. Returns whether it was accepted.
    pub fn submit(&self, update: UpdatedReference) -> bool {
        let sender = self
            .sender
            .lock()
            .expect("Poisoned mutex for UpdatePipeline");
        let sender = match sender.as_ref() {
            Some(sender) => sender,
            None => {
                warn!(reference = %update.get_name(), "Update pipeline is closed; dropping update");
                self.dropped.fetch_add(1, Ordering::SeqCst);
                return false;
            }
        };

        match sender.try_send(update) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(TrySendError::Full(update)) => {
                error!(
                    reference = %update.get_name(),
                    capacity = self.capacity,
                    "Update queue is full; dropping update, history will be stale until reloaded"
                );
                self.dropped.fetch_add(1, Ordering::SeqCst);
                false
            }
            Err(TrySendError::Disconnected(update)) => {
                warn!(reference = %update.get_name(), "Update worker has exited; dropping update");
                self.dropped.fetch_add(1, Ordering::SeqCst);
                false
            }
        }
    }

    #[allow(missing_docs)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many updates have been queued so far.
    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// How many updates have been dropped so far.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// How many updates are waiting for the worker.
    pub fn pending_count(&self) -> usize {
        self.sender
            .lock()
            .expect("Poisoned mutex for UpdatePipeline")
            .as_ref()
            .map(|sender| sender.len())
            .unwrap_or_default()
    }

    /// Stop accepting updates. The worker finishes whatever is already
    /// queued and then exits.
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .expect("Poisoned mutex for UpdatePipeline")
            .take();
        if sender.is_some() {
            debug!("Closed update pipeline");
        }
    }
}

impl UpdateQueue {
    /// Apply queued updates to `registry` until the pipeline is closed.
    /// Failed patches are logged and skipped.
    #[instrument(skip(self))]
    pub fn run(self, registry: &HistoryRegistry) {
        debug!("Update worker started");
        while let Ok(update) = self.receiver.recv() {
            debug!(reference = %update.get_name(), "Update worker accepted update");
            match registry.apply_update(&update) {
                Ok(Some(patch)) => {
                    debug!(reference = %update.get_name(), ?patch, "Update worker applied patch");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(reference = %update.get_name(), %err, "Could not patch history");
                }
            }
        }
        debug!("Update worker exiting");
    }

    /// Run the worker on its own thread.
    pub fn spawn_worker(self, registry: Arc<HistoryRegistry>) -> JoinHandle<()> {
        std::thread::spawn(move || self.run(&registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Reference;
    use crate::testing::fake_oid;

    fn make_update(id: u32) -> UpdatedReference {
        let name = format!("refs/heads/branch-{id}");
        UpdatedReference {
            old: Reference::local_branch(name.as_str(), fake_oid(id)),
            new: Reference::local_branch(name.as_str(), fake_oid(id + 1000)),
        }
    }

    #[test]
    fn test_closed_pipeline_drops_updates() {
        let (pipeline, queue) = update_pipeline(4);
        assert!(pipeline.submit(make_update(1)));
        pipeline.close();
        assert!(!pipeline.submit(make_update(2)));
        assert_eq!(pipeline.accepted_count(), 1);
        assert_eq!(pipeline.dropped_count(), 1);

        // The update queued before closing is still delivered.
        assert_eq!(queue.receiver.try_iter().count(), 1);
    }
}

use log::{debug, error, info, warn};

use super::Lifecycle;
use super::types::try_acquire;
use crate::common::errors::{AssetError, AssetResult, handle_error};
use crate::models::asset::{AssetId, AssetState};
use crate::models::job::{JobPayload, QueueKind};
use crate::queue::Message;
use crate::workflow::Transition;

/// What one `work_off` call did with the message it looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Nothing was waiting.
    Idle,
    Completed(AssetId),
    /// The record is gone; the message was acked.
    NotFound(AssetId),
    /// Staged on another host; left for that host's worker.
    Deferred(AssetId),
    /// Unreadable payload; acked so it stops coming back.
    Discarded,
    /// Left unacked for redelivery.
    Failed(Option<AssetId>),
    /// Another loop in this process holds the asset.
    Busy(AssetId),
}

impl WorkOutcome {
    /// Whether the queue may hold more work right behind this message.
    pub fn keep_going(&self) -> bool {
        matches!(
            self,
            WorkOutcome::Completed(_) | WorkOutcome::NotFound(_) | WorkOutcome::Discarded
        )
    }
}

/// Drains one message at a time from a kind's upload or process queue.
/// Errors end at this boundary: they are logged and the message is left for
/// redelivery.
#[derive(Clone)]
pub struct Worker {
    lifecycle: Lifecycle,
}

impl Worker {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn work_off(&self, kind: &str, queue: QueueKind) -> WorkOutcome {
        let config = match self.lifecycle.kind(kind) {
            Ok(config) => config,
            Err(err) => {
                report(err);
                return WorkOutcome::Failed(None);
            }
        };
        let queue_name = match queue {
            QueueKind::Upload => config.upload_queue(),
            QueueKind::Process => config.process_queue(),
        };

        let message = match self.lifecycle.queue.receive(queue_name) {
            Ok(Some(message)) => message,
            Ok(None) => return WorkOutcome::Idle,
            Err(err) => {
                handle_error(err.context(format!("failed to receive from {}", queue_name)));
                return WorkOutcome::Failed(None);
            }
        };

        let payload = match JobPayload::from_body(&message.body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Discarding message {} on {}: {:#}", message.receipt, queue_name, err);
                return match self.ack(queue_name, &message) {
                    Ok(()) => WorkOutcome::Discarded,
                    Err(()) => WorkOutcome::Failed(None),
                };
            }
        };
        let id = payload.id;

        if queue == QueueKind::Upload {
            if let Some(host) = payload.hostname.as_deref() {
                if host != self.lifecycle.hostname() {
                    debug!("Leaving upload of {} for host {}", id, host);
                    return WorkOutcome::Deferred(id);
                }
            }
        }

        let Some(_guard) = try_acquire(id) else {
            debug!("Asset {} is already being worked on", id);
            return WorkOutcome::Busy(id);
        };

        match self.run(&id, queue) {
            Ok(transition) => {
                if let Transition::Skipped { state } = transition {
                    info!("Asset {} was already {}, acking {}", id, state, queue_name);
                }
                match self.ack(queue_name, &message) {
                    Ok(()) => WorkOutcome::Completed(id),
                    Err(()) => WorkOutcome::Failed(Some(id)),
                }
            }
            Err(AssetError::NotFound(_)) => {
                warn!("Asset {} no longer exists, dropping job from {}", id, queue_name);
                match self.ack(queue_name, &message) {
                    Ok(()) => WorkOutcome::NotFound(id),
                    Err(()) => WorkOutcome::Failed(Some(id)),
                }
            }
            Err(err) => {
                report(err);
                WorkOutcome::Failed(Some(id))
            }
        }
    }

    /// Keep calling `work_off` until the queue is empty or a message is left
    /// behind.
    pub fn drain(&self, kind: &str, queue: QueueKind) -> Vec<WorkOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self.work_off(kind, queue);
            outcomes.push(outcome);
            if !outcome.keep_going() {
                return outcomes;
            }
        }
    }

    fn run(&self, id: &AssetId, queue: QueueKind) -> AssetResult<Transition> {
        let mut asset = self
            .lifecycle
            .load(id)?
            .ok_or(AssetError::NotFound(*id))?;
        match queue {
            QueueKind::Upload => {
                let transition = self.lifecycle.upload(&mut asset)?;
                // An earlier delivery may have stored the object and then
                // failed to queue `process`
                if transition == (Transition::Skipped { state: AssetState::Uploaded }) {
                    info!("Asset {} already uploaded, queueing process again", id);
                    self.lifecycle.requeue_process(&asset)?;
                }
                Ok(transition)
            }
            QueueKind::Process => self.lifecycle.process(&mut asset),
        }
    }

    fn ack(&self, queue_name: &str, message: &Message) -> Result<(), ()> {
        self.lifecycle.queue.ack(queue_name, message).map_err(|err| {
            handle_error(err.context(format!(
                "failed to ack {} on {}",
                message.receipt, queue_name
            )));
        })
    }
}

fn report(error: AssetError) {
    match error {
        AssetError::Transient(err) => {
            handle_error(err);
        }
        other => error!("{}", other),
    }
}

use anyhow::{Result, anyhow, bail};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{JobQueue, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCall {
    Push { queue: String, body: String },
    Receive { queue: String },
    Ack { queue: String, receipt: String },
}

#[derive(Debug, Default)]
struct Inner {
    visible: HashMap<String, VecDeque<Message>>,
    in_flight: HashMap<String, (String, Message)>,
}

/// In-process queue. Received messages stay in flight until acked or
/// handed back with [`MemoryQueue::redeliver`].
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    calls: Mutex<Vec<QueueCall>>,
    sequence: AtomicU64,
    failing_pushes: Mutex<HashMap<String, usize>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Refuse the next `count` pushes to `queue`.
    pub fn fail_pushes(&self, queue: &str, count: usize) {
        if let Ok(mut failing) = self.failing_pushes.lock() {
            failing.insert(queue.to_string(), count);
        }
    }

    fn take_push_failure(&self, queue: &str) -> bool {
        let Ok(mut failing) = self.failing_pushes.lock() else {
            return false;
        };
        match failing.get_mut(queue) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    /// Bodies still waiting on `queue`, oldest first.
    pub fn pending(&self, queue: &str) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .visible
                    .get(queue)
                    .map(|q| q.iter().map(|m| m.body.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().map(|i| i.in_flight.len()).unwrap_or(0)
    }

    /// Make every unacked message visible again, as a visibility timeout would.
    pub fn redeliver(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            let returned: Vec<(String, Message)> = inner.in_flight.drain().map(|(_, v)| v).collect();
            for (queue, message) in returned {
                inner.visible.entry(queue).or_default().push_front(message);
            }
        }
    }

    fn record(&self, call: QueueCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("queue call log poisoned"))?
            .push(call);
        Ok(())
    }
}

impl JobQueue for MemoryQueue {
    fn push(&self, queue: &str, body: &str) -> Result<()> {
        self.record(QueueCall::Push {
            queue: queue.to_string(),
            body: body.to_string(),
        })?;
        if self.take_push_failure(queue) {
            bail!("push to {} refused", queue);
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().map_err(|_| anyhow!("queue poisoned"))?;
        inner
            .visible
            .entry(queue.to_string())
            .or_default()
            .push_back(Message {
                receipt: seq.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }

    fn receive(&self, queue: &str) -> Result<Option<Message>> {
        self.record(QueueCall::Receive {
            queue: queue.to_string(),
        })?;
        let mut inner = self.inner.lock().map_err(|_| anyhow!("queue poisoned"))?;
        let message = inner.visible.get_mut(queue).and_then(|q| q.pop_front());
        if let Some(message) = &message {
            inner
                .in_flight
                .insert(message.receipt.clone(), (queue.to_string(), message.clone()));
        }
        Ok(message)
    }

    fn ack(&self, queue: &str, message: &Message) -> Result<()> {
        self.record(QueueCall::Ack {
            queue: queue.to_string(),
            receipt: message.receipt.clone(),
        })?;
        let mut inner = self.inner.lock().map_err(|_| anyhow!("queue poisoned"))?;
        inner.in_flight.remove(&message.receipt);
        Ok(())
    }
}

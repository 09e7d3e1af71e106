use anyhow::{Context, Result};
use redb::{Database, ReadableTable};
use std::sync::Arc;
use std::time::Duration;

use super::{JobQueue, Message};
use crate::database::{MESSAGE_TABLE, SEQUENCE_TABLE};

const SEQUENCE_KEY: &str = "message";

#[derive(Debug, Clone, bitcode::Encode, bitcode::Decode)]
struct StoredMessage {
    body: String,
    visible_at: i64,
    deliveries: u32,
}

/// Durable queue on a local redb file. A received message is hidden for
/// `visibility_timeout` and then handed out again unless acked.
pub struct RedbQueue {
    database: Arc<Database>,
    visibility_timeout: Duration,
}

impl RedbQueue {
    pub fn new(database: Arc<Database>, visibility_timeout: Duration) -> Self {
        Self {
            database,
            visibility_timeout,
        }
    }

    pub fn len(&self, queue: &str) -> Result<usize> {
        let txn = self.database.begin_read()?;
        let table = txn.open_table(MESSAGE_TABLE)?;
        Ok(table.range((queue, 0u64)..=(queue, u64::MAX))?.count())
    }

    pub fn is_empty(&self, queue: &str) -> Result<bool> {
        Ok(self.len(queue)? == 0)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl JobQueue for RedbQueue {
    fn push(&self, queue: &str, body: &str) -> Result<()> {
        let txn = self.database.begin_write()?;
        {
            let mut sequences = txn.open_table(SEQUENCE_TABLE)?;
            let seq = sequences
                .get(SEQUENCE_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            sequences.insert(SEQUENCE_KEY, seq)?;

            let stored = StoredMessage {
                body: body.to_string(),
                visible_at: now_ms(),
                deliveries: 0,
            };
            let mut messages = txn.open_table(MESSAGE_TABLE)?;
            messages.insert((queue, seq), bitcode::encode(&stored).as_slice())?;
        }
        txn.commit().context("failed to commit queued message")?;
        Ok(())
    }

    fn receive(&self, queue: &str) -> Result<Option<Message>> {
        let now = now_ms();
        let txn = self.database.begin_write()?;
        let delivered = {
            let mut messages = txn.open_table(MESSAGE_TABLE)?;
            let mut candidate = None;
            for item in messages.range((queue, 0u64)..=(queue, u64::MAX))? {
                let (key, value) = item?;
                let stored: StoredMessage =
                    bitcode::decode(value.value()).context("corrupt queued message")?;
                if stored.visible_at <= now {
                    candidate = Some((key.value().1, stored));
                    break;
                }
            }

            match candidate {
                Some((seq, mut stored)) => {
                    stored.visible_at = now + self.visibility_timeout.as_millis() as i64;
                    stored.deliveries += 1;
                    messages.insert((queue, seq), bitcode::encode(&stored).as_slice())?;
                    Some(Message {
                        receipt: seq.to_string(),
                        body: stored.body,
                    })
                }
                None => None,
            }
        };
        txn.commit().context("failed to commit message lease")?;
        Ok(delivered)
    }

    fn ack(&self, queue: &str, message: &Message) -> Result<()> {
        let seq: u64 = message
            .receipt
            .parse()
            .context(format!("invalid receipt {:?}", message.receipt))?;
        let txn = self.database.begin_write()?;
        {
            let mut messages = txn.open_table(MESSAGE_TABLE)?;
            messages.remove((queue, seq))?;
        }
        txn.commit().context("failed to commit ack")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_database;

    fn queue(timeout: Duration) -> (tempfile::TempDir, RedbQueue) {
        let dir = tempfile::tempdir().unwrap();
        let database = open_database(&dir.path().join("queue.redb")).unwrap();
        (dir, RedbQueue::new(database, timeout))
    }

    #[test]
    fn fifo_per_queue_with_ack() {
        let (_dir, queue) = queue(Duration::from_secs(60));
        queue.push("images", "a").unwrap();
        queue.push("images", "b").unwrap();
        queue.push("other", "c").unwrap();

        let first = queue.receive("images").unwrap().unwrap();
        assert_eq!(first.body, "a");
        let second = queue.receive("images").unwrap().unwrap();
        assert_eq!(second.body, "b");
        // both leased
        assert!(queue.receive("images").unwrap().is_none());

        queue.ack("images", &first).unwrap();
        queue.ack("images", &second).unwrap();
        assert!(queue.is_empty("images").unwrap());
        assert_eq!(queue.len("other").unwrap(), 1);
    }

    #[test]
    fn unacked_message_is_redelivered_after_timeout() {
        let (_dir, queue) = queue(Duration::ZERO);
        queue.push("images", "a").unwrap();

        let first = queue.receive("images").unwrap().unwrap();
        let again = queue.receive("images").unwrap().unwrap();
        assert_eq!(first.receipt, again.receipt);
        assert_eq!(again.body, "a");
    }
}

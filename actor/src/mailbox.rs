// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Ordered message buffer of a local actor. Messages are FIFO; the only exception is a
//! prioritized enqueue, which inserts at the head and is used for transfer control messages.
//! Every enqueue wakes the actor runner so it drains the new work.
//!

use crate::message::Message;

use tokio::sync::Notify;
use tracing::debug;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

struct MailboxInner {
    queue: Mutex<MailboxQueue>,
    notify: Notify,
}

struct MailboxQueue {
    messages: VecDeque<Message>,
    closed: bool,
}

/// Shared handle to an actor mailbox. Clones refer to the same queue.
#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        debug!("Creating new mailbox.");
        Self {
            inner: Arc::new(MailboxInner {
                queue: Mutex::new(MailboxQueue {
                    messages: VecDeque::new(),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxQueue> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `message`, or inserts it at the head when `prioritize` is set, and wakes the
    /// runner.
    ///
    /// # Errors
    ///
    /// Hands the message back if the mailbox is closed.
    ///
    pub fn enqueue(
        &self,
        message: Message,
        prioritize: bool,
    ) -> Result<(), Message> {
        {
            let mut queue = self.lock();
            if queue.closed {
                return Err(message);
            }
            if prioritize {
                queue.messages.push_front(message);
            } else {
                queue.messages.push_back(message);
            }
        }
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Takes the message at the head.
    pub fn dequeue(&self) -> Option<Message> {
        self.lock().messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closes the mailbox and returns whatever was still queued.
    pub fn close(&self) -> Vec<Message> {
        let leftover = {
            let mut queue = self.lock();
            queue.closed = true;
            queue.messages.drain(..).collect()
        };
        self.inner.notify.notify_one();
        leftover
    }

    /// Wakes the runner without enqueuing anything.
    pub(crate) fn wake(&self) {
        self.inner.notify.notify_one();
    }

    /// Waits until the mailbox is woken.
    pub(crate) async fn wait(&self) {
        self.inner.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::message::MessageKind;

    use serde_json::Value;

    fn message(n: i64) -> Message {
        Message::new(MessageKind::from("n"), Value::from(n))
    }

    fn drain(mailbox: &Mailbox) -> Vec<i64> {
        let mut out = vec![];
        while let Some(message) = mailbox.dequeue() {
            out.push(message.payload().as_i64().unwrap());
        }
        out
    }

    #[test]
    fn test_fifo_order() {
        let mailbox = Mailbox::new();
        for n in 0..5 {
            mailbox.enqueue(message(n), false).unwrap();
        }
        assert_eq!(mailbox.len(), 5);
        assert_eq!(drain(&mailbox), vec![0, 1, 2, 3, 4]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_prioritized_goes_to_head() {
        let mailbox = Mailbox::new();
        mailbox.enqueue(message(1), false).unwrap();
        mailbox.enqueue(message(2), false).unwrap();
        mailbox.enqueue(message(99), true).unwrap();
        mailbox.enqueue(message(3), false).unwrap();
        assert_eq!(drain(&mailbox), vec![99, 1, 2, 3]);
    }

    #[test]
    fn test_closed_mailbox_returns_message() {
        let mailbox = Mailbox::new();
        mailbox.enqueue(message(1), false).unwrap();
        let leftover = mailbox.close();
        assert_eq!(leftover.len(), 1);
        assert!(mailbox.is_closed());
        let rejected = mailbox.enqueue(message(2), false).unwrap_err();
        assert_eq!(rejected.payload().as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let mailbox = Mailbox::new();
        let waiter = mailbox.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
            waiter.dequeue().map(|m| m.payload().as_i64())
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        mailbox.enqueue(message(7), false).unwrap();
        assert_eq!(handle.await.unwrap(), Some(Some(7)));
    }
}

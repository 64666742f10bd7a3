//! Bounded per-connection outbound queue.
//!
//! `tokio::sync::mpsc` cannot evict from the sending side, so the queue is a
//! `VecDeque` behind a short `parking_lot` lock plus a `Notify` for the single
//! consumer. Pushing never waits: a full queue either drops its oldest entry
//! or closes itself, depending on the backpressure policy.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::{config::BackpressurePolicy, domain::Message};

/// The queue was closed by removal or by the disconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("outbound queue is closed")]
pub struct QueueClosed;

/// Result of a successful push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after discarding the oldest entry
    DroppedOldest,
    /// The queue was full and has been closed; nothing was queued
    Closed,
}

struct QueueState {
    buffer: VecDeque<Arc<Message>>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: BackpressurePolicy,
}

/// Producer side, owned by the registry
#[derive(Clone)]
pub struct OutboundSender {
    shared: Arc<Shared>,
}

/// Consumer side, owned by the connection's pusher task
pub struct OutboundReceiver {
    shared: Arc<Shared>,
}

pub fn outbound_queue(
    capacity: usize,
    policy: BackpressurePolicy,
) -> (OutboundSender, OutboundReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            buffer: VecDeque::with_capacity(capacity.min(1024)),
            closed: false,
        }),
        notify: Notify::new(),
        capacity: capacity.max(1),
        policy,
    });
    (
        OutboundSender {
            shared: shared.clone(),
        },
        OutboundReceiver { shared },
    )
}

impl OutboundSender {
    pub fn push(&self, message: Arc<Message>) -> Result<PushOutcome, QueueClosed> {
        let outcome = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(QueueClosed);
            }
            if state.buffer.len() < self.shared.capacity {
                state.buffer.push_back(message);
                PushOutcome::Queued
            } else {
                match self.shared.policy {
                    BackpressurePolicy::DropOldest => {
                        state.buffer.pop_front();
                        state.buffer.push_back(message);
                        PushOutcome::DroppedOldest
                    }
                    BackpressurePolicy::Disconnect => {
                        state.closed = true;
                        state.buffer.clear();
                        PushOutcome::Closed
                    }
                }
            }
        };
        self.shared.notify.notify_one();
        Ok(outcome)
    }

    /// Close the queue and discard anything still buffered. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.buffer.clear();
        }
        self.shared.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutboundReceiver {
    /// Wait for the next message; `None` once the queue is closed.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(message) = state.buffer.pop_front() {
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.shared.state.lock().buffer.pop_front()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageKind, RoomId, Sequence, Timestamp, UserId};
    use serde_json::json;

    fn message(seq: u64) -> Arc<Message> {
        Arc::new(Message::new(
            RoomId::new("lobby".to_string()).unwrap(),
            Sequence::new(seq),
            UserId::new("alice".to_string()).unwrap(),
            MessageKind::Chat,
            json!(seq),
            Timestamp::new(0),
        ))
    }

    #[tokio::test]
    async fn test_messages_are_received_in_push_order() {
        // テスト項目: push した順にメッセージを受信できる
        // given (前提条件):
        let (tx, mut rx) = outbound_queue(4, BackpressurePolicy::DropOldest);

        // when (操作):
        tx.push(message(1)).unwrap();
        tx.push(message(2)).unwrap();

        // then (期待する結果):
        assert_eq!(rx.recv().await.unwrap().sequence.value(), 1);
        assert_eq!(rx.recv().await.unwrap().sequence.value(), 2);
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest_messages() {
        // テスト項目: drop-oldest では満杯時に最も古いメッセージが捨てられる
        // given (前提条件):
        let (tx, mut rx) = outbound_queue(2, BackpressurePolicy::DropOldest);
        tx.push(message(1)).unwrap();
        tx.push(message(2)).unwrap();

        // when (操作):
        let outcome = tx.push(message(3)).unwrap();

        // then (期待する結果):
        assert_eq!(outcome, PushOutcome::DroppedOldest);
        assert_eq!(rx.try_recv().unwrap().sequence.value(), 2);
        assert_eq!(rx.try_recv().unwrap().sequence.value(), 3);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_policy_closes_full_queue() {
        // テスト項目: disconnect ポリシーでは満杯時にキューが閉じられる
        // given (前提条件):
        let (tx, mut rx) = outbound_queue(1, BackpressurePolicy::Disconnect);
        tx.push(message(1)).unwrap();

        // when (操作):
        let outcome = tx.push(message(2)).unwrap();

        // then (期待する結果):
        assert_eq!(outcome, PushOutcome::Closed);
        assert!(tx.is_closed());
        assert_eq!(tx.push(message(3)), Err(QueueClosed));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        // テスト項目: 待機中の受信側が close で起こされ None を受け取る
        // given (前提条件):
        let (tx, mut rx) = outbound_queue(4, BackpressurePolicy::DropOldest);
        let waiter = tokio::spawn(async move { rx.recv().await });

        // when (操作):
        tokio::task::yield_now().await;
        tx.close();

        // then (期待する結果):
        assert!(waiter.await.unwrap().is_none());
    }
}

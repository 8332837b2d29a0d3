// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

// In-Process Message Bus
//
// Topic/subscription transport for stage messages. Each subscription owns an
// unbounded tokio mpsc queue; publishing copies the message into every
// subscription whose topic and label match. Redelivery re-queues on the same
// subscription with an incremented delivery count.
//
// Messages are not persisted: a restart loses queued messages but not the
// monitors waiting on site creation, which live in the monitor repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::messaging::{Message, MessageError, MessagePublisher, Subscription};

struct SubscriptionQueue {
    subscription: Subscription,
    sender: mpsc::UnboundedSender<Message>,
}

/// A message that will not be delivered again.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub subscription: &'static str,
    pub message: Message,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct InProcessMessageBus {
    queues: Arc<RwLock<Vec<SubscriptionQueue>>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl InProcessMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription and return its delivery queue.
    pub fn subscribe(&self, subscription: Subscription) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.queues.write().push(SubscriptionQueue {
            subscription,
            sender,
        });
        debug!(
            subscription = subscription.name,
            topic = %subscription.topic,
            label = subscription.label,
            "Subscription registered"
        );
        receiver
    }

    /// Put a message back on one subscription for another delivery attempt.
    pub fn redeliver(&self, subscription: &Subscription, mut message: Message) -> Result<(), MessageError> {
        message.delivery_count += 1;
        let queues = self.queues.read();
        let queue = queues
            .iter()
            .find(|q| q.subscription.name == subscription.name)
            .ok_or(MessageError::Closed)?;
        queue.sender.send(message).map_err(|_| MessageError::Closed)
    }

    pub fn dead_letter(&self, subscription: &Subscription, message: Message, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            subscription = subscription.name,
            message_id = %message.id,
            label = %message.label,
            delivery_count = message.delivery_count,
            reason = %reason,
            "Message dead-lettered"
        );
        self.dead_letters.lock().push(DeadLetter {
            subscription: subscription.name,
            message,
            reason,
            dead_lettered_at: Utc::now(),
        });
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.queues.read().len()
    }
}

#[async_trait]
impl MessagePublisher for InProcessMessageBus {
    async fn publish(&self, message: Message) -> Result<(), MessageError> {
        let mut delivered = 0usize;
        let mut closed = Vec::new();
        {
            let queues = self.queues.read();
            for queue in queues.iter().filter(|q| q.subscription.accepts(&message)) {
                let mut copy = message.clone();
                copy.delivery_count = 1;
                if queue.sender.send(copy).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(queue.subscription.name);
                }
            }
        }

        if !closed.is_empty() {
            self.queues
                .write()
                .retain(|q| !closed.contains(&q.subscription.name));
        }

        debug!(
            message_id = %message.id,
            topic = %message.topic,
            label = %message.label,
            delivered,
            "Message published"
        );
        Ok(())
    }
}

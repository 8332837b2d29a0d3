// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline Coordinator
//!
//! Runs one worker task per stage. Each worker drains its subscription
//! queue and settles every delivery:
//!
//! | Handler result | Action |
//! |---|---|
//! | `Ok` | done |
//! | `Retryable`, deliveries left | redeliver |
//! | `Retryable`, no deliveries left | dead letter |
//! | `Decode` / `Permanent` | dead letter |
//!
//! Messages for different jobs are handled concurrently across stages;
//! within one stage they are handled in arrival order.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::stages::{StageError, StageHandler};
use crate::domain::events::PipelineEvent;
use crate::domain::messaging::Message;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::message_bus::InProcessMessageBus;

pub struct PipelineCoordinator {
    bus: InProcessMessageBus,
    event_bus: EventBus,
    max_delivery_count: u32,
    handlers: Vec<Arc<dyn StageHandler>>,
}

impl PipelineCoordinator {
    pub fn new(bus: InProcessMessageBus, event_bus: EventBus, max_delivery_count: u32) -> Self {
        Self {
            bus,
            event_bus,
            max_delivery_count: max_delivery_count.max(1),
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn StageHandler>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Subscribe every registered stage and spawn its worker.
    ///
    /// Subscriptions exist once this returns, so messages published
    /// afterwards are never lost to a worker that has not started yet.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.handlers
            .iter()
            .map(|handler| {
                let worker = StageWorker {
                    handler: handler.clone(),
                    bus: self.bus.clone(),
                    event_bus: self.event_bus.clone(),
                    max_delivery_count: self.max_delivery_count,
                };
                let receiver = self.bus.subscribe(handler.subscription());
                info!(stage = handler.name(), "Stage worker started");
                tokio::spawn(worker.run(receiver, cancel.clone()))
            })
            .collect()
    }
}

struct StageWorker {
    handler: Arc<dyn StageHandler>,
    bus: InProcessMessageBus,
    event_bus: EventBus,
    max_delivery_count: u32,
}

impl StageWorker {
    async fn run(
        self,
        mut receiver: tokio::sync::mpsc::UnboundedReceiver<Message>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Some(message) => self.process(message).await,
                    None => break,
                },
            }
        }
        debug!(stage = self.handler.name(), "Stage worker stopped");
    }

    async fn process(&self, message: Message) {
        let stage = self.handler.name();
        debug!(
            stage,
            message_id = %message.id,
            label = %message.label,
            delivery_count = message.delivery_count,
            "Message received"
        );

        match self.handler.handle(&message).await {
            Ok(()) => {
                metrics::counter!("provisioning_stage_messages_total", "stage" => stage, "outcome" => "handled")
                    .increment(1);
                self.event_bus.publish_pipeline_event(PipelineEvent::MessageHandled {
                    stage: stage.to_string(),
                    message_id: message.id,
                    label: message.label.clone(),
                    handled_at: Utc::now(),
                });
            }
            Err(StageError::Retryable(reason)) if message.delivery_count < self.max_delivery_count => {
                metrics::counter!("provisioning_stage_messages_total", "stage" => stage, "outcome" => "retried")
                    .increment(1);
                warn!(
                    stage,
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    "Stage failed, message will be redelivered: {}",
                    reason
                );
                self.event_bus.publish_pipeline_event(PipelineEvent::MessageFailed {
                    stage: stage.to_string(),
                    message_id: message.id,
                    delivery_count: message.delivery_count,
                    error: reason,
                    failed_at: Utc::now(),
                });
                if let Err(e) = self.bus.redeliver(&self.handler.subscription(), message.clone()) {
                    self.dead_letter(message, format!("redelivery failed: {}", e)).await;
                }
            }
            Err(StageError::Retryable(reason)) => {
                let reason = format!(
                    "gave up after {} deliveries: {}",
                    message.delivery_count, reason
                );
                self.dead_letter(message, reason).await;
            }
            Err(e) => self.dead_letter(message, e.to_string()).await,
        }
    }

    async fn dead_letter(&self, message: Message, reason: String) {
        let stage = self.handler.name();
        metrics::counter!("provisioning_stage_messages_total", "stage" => stage, "outcome" => "dead_lettered")
            .increment(1);
        metrics::counter!("provisioning_dead_letters_total", "stage" => stage).increment(1);
        self.event_bus.publish_pipeline_event(PipelineEvent::MessageDeadLettered {
            stage: stage.to_string(),
            message_id: message.id,
            reason: reason.clone(),
            dead_lettered_at: Utc::now(),
        });
        self.bus
            .dead_letter(&self.handler.subscription(), message.clone(), reason.clone());
        self.handler.on_dead_letter(&message, &reason).await;
    }
}

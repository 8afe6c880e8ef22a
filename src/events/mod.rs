use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{JobKind, OrderStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire and forget: a closed or full channel is logged, never propagated.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
            counter!("krushidoot.events.dropped", 1);
        }
    }
}

/// Domain events published after a transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        customer_id: Uuid,
        total_amount: Decimal,
    },
    OrderConfirmed {
        order_id: Uuid,
        vendor_id: Uuid,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderOutForDelivery {
        order_id: Uuid,
        assignment_id: Uuid,
    },
    OrderDelivered {
        order_id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    InventoryReserved {
        vendor_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    LowStock {
        vendor_id: Uuid,
        product_id: Uuid,
        available: i32,
    },
    EarningRecorded {
        earning_id: Uuid,
        user_id: Uuid,
        net_amount: Decimal,
    },
    DeliveryAssigned {
        order_id: Uuid,
        assignment_id: Uuid,
        partner_id: Uuid,
    },
    JobFailed {
        job_id: Uuid,
        kind: JobKind,
        error: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderConfirmed { .. } => "order_confirmed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderOutForDelivery { .. } => "order_out_for_delivery",
            Event::OrderDelivered { .. } => "order_delivered",
            Event::InventoryReserved { .. } => "inventory_reserved",
            Event::LowStock { .. } => "low_stock",
            Event::EarningRecorded { .. } => "earning_recorded",
            Event::DeliveryAssigned { .. } => "delivery_assigned",
            Event::JobFailed { .. } => "job_failed",
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("krushidoot.events.processed", 1, "event" => event.name());

        match &event {
            Event::JobFailed { job_id, kind, error } => {
                warn!(%job_id, %kind, %error, "scheduled job gave up");
            }
            Event::LowStock {
                vendor_id,
                product_id,
                available,
            } => {
                warn!(%vendor_id, %product_id, available, "inventory below minimum level");
            }
            other => {
                info!(event = other.name(), payload = ?other, "domain event");
            }
        }
    }

    info!("Event channel closed; event processing loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_once_the_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        drop(rx);

        let result = sender
            .send(Event::OrderCancelled {
                order_id: Uuid::new_v4(),
                reason: "test".into(),
            })
            .await;
        assert!(result.is_err());

        // emit swallows the same failure
        sender
            .emit(Event::OrderDelivered {
                order_id: Uuid::new_v4(),
                delivered_at: Utc::now(),
            })
            .await;
    }

    #[tokio::test]
    async fn processor_drains_until_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let handle = tokio::spawn(process_events(rx));

        sender
            .send(Event::OrderConfirmed {
                order_id: Uuid::new_v4(),
                vendor_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        drop(sender);

        handle.await.unwrap();
    }
}

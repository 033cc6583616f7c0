//! 信号总线
//!
//! 基于 broadcast 的发布/订阅，发布方永不等待消费方

use tokio::sync::broadcast;
use tracing::debug;

use crate::trading::model::SignalEvent;

#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<SignalEvent>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 返回收到该信号的订阅者数量，无订阅者时丢弃
    pub fn publish(&self, event: SignalEvent) -> usize {
        match self.sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!(
                    "信号无订阅者，已丢弃: asset_id={}, direction={}",
                    event.asset_id, event.direction
                );
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::Direction;

    fn event(asset_id: i64) -> SignalEvent {
        SignalEvent {
            asset_id,
            direction: Direction::Call,
            period: 60,
            produced_at: 0,
            candle_close_time: 0,
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = SignalBus::new(4);
        assert_eq!(bus.publish(event(1)), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = SignalBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(event(1)), 2);
        assert_eq!(a.recv().await.unwrap().asset_id, 1);
        assert_eq!(b.recv().await.unwrap().asset_id, 1);
    }
}

use log::warn;
use tokio::sync::broadcast::{self, error::RecvError};

use super::StreamMessage;

/// In-process fan-out of device stream messages. Every consumer (the dashboard
/// bridge, the attention session) holds its own subscription.
#[derive(Clone)]
pub struct FeedHub {
    sender: broadcast::Sender<StreamMessage>,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the message.
    pub fn publish(&self, message: StreamMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> FeedSubscription {
        FeedSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct FeedSubscription {
    receiver: broadcast::Receiver<StreamMessage>,
}

impl FeedSubscription {
    /// Waits for the next message. Returns `None` once the hub is gone;
    /// lagging subscribers skip what they missed.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("feed subscriber lagged, skipped {skipped} messages");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

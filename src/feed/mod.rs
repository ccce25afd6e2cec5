pub mod hub;
pub mod messages;

pub use hub::{FeedHub, FeedSubscription};
pub use messages::{EmotionsPayload, StatusEvent, StreamMessage};

//! Upstream post sources
//!
//! A [`PostSource`] opens one [`Subscription`] per feed. The subscription
//! carries two channels, one of posts and one of transport errors, and stops
//! its producer when it is dropped.

mod reddit;
mod traits;

pub use reddit::RedditClient;
pub use traits::{
    PostSource, SubscribeOptions, Subscription, SubscriptionEvent, SubscriptionSender,
};

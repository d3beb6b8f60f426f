//! Podcast feed subscriptions of a user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ext::DataMap;
use crate::utils::errors::{CastpodError, Result};

/// Key of the subscription list inside the user data
pub const SUBSCRIPTIONS_KEY: &str = "subscriptions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub feed_url: String,
    pub subscribed_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            subscribed_at: Utc::now(),
        }
    }
}

/// Ordered subscriptions, unique by feed URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionList(Vec<Subscription>);

impl SubscriptionList {
    /// Reads the list from user data. A missing entry is an empty list.
    pub fn load(data: &DataMap) -> Result<Self> {
        match data.get(SUBSCRIPTIONS_KEY) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Self::default()),
        }
    }

    pub fn store(&self, data: &mut DataMap) -> Result<()> {
        data.insert(SUBSCRIPTIONS_KEY.to_string(), serde_json::to_value(self)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.0.iter()
    }

    pub fn contains(&self, feed_url: &str) -> bool {
        self.0.iter().any(|s| s.feed_url == feed_url)
    }

    /// Adds `feed_url` unless already subscribed or `max` is reached.
    /// Returns whether the list changed.
    pub fn subscribe(&mut self, feed_url: &str, max: usize) -> Result<bool> {
        if self.contains(feed_url) {
            return Ok(false);
        }
        if self.0.len() >= max {
            return Err(CastpodError::InvalidInput(format!(
                "At most {} subscriptions are allowed",
                max
            )));
        }
        self.0.push(Subscription::new(feed_url));
        Ok(true)
    }

    pub fn unsubscribe(&mut self, feed_url: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s.feed_url != feed_url);
        self.0.len() != before
    }
}

/// Callback payload of an unsubscribe button
pub fn unsubscribe_payload(feed_url: &str) -> Value {
    serde_json::json!({ "action": "unsubscribe", "feed_url": feed_url })
}

/// Feed URL of an unsubscribe payload
pub fn parse_unsubscribe_payload(value: &Value) -> Option<&str> {
    if value.get("action")?.as_str()? != "unsubscribe" {
        return None;
    }
    value.get("feed_url")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_subscribe_is_unique_and_bounded() {
        let mut list = SubscriptionList::default();
        assert!(list.subscribe("https://a.example/feed", 2).unwrap());
        assert!(!list.subscribe("https://a.example/feed", 2).unwrap());
        assert!(list.subscribe("https://b.example/feed", 2).unwrap());
        assert_matches!(
            list.subscribe("https://c.example/feed", 2),
            Err(CastpodError::InvalidInput(_))
        );
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_load_and_store() {
        let mut data = DataMap::new();
        assert!(SubscriptionList::load(&data).unwrap().is_empty());

        let mut list = SubscriptionList::default();
        list.subscribe("https://a.example/feed", 10).unwrap();
        list.store(&mut data).unwrap();

        let loaded = SubscriptionList::load(&data).unwrap();
        assert!(loaded.contains("https://a.example/feed"));
        assert!(data[SUBSCRIPTIONS_KEY].is_array());
    }

    #[test]
    fn test_unsubscribe_payload() {
        let payload = unsubscribe_payload("https://a.example/feed");
        assert_eq!(parse_unsubscribe_payload(&payload), Some("https://a.example/feed"));
        assert_eq!(parse_unsubscribe_payload(&serde_json::json!({"action": "other"})), None);
    }
}

//! Scripted [`FeedService`] and [`ControlChannel`] used by the service tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ControlChannel, ControlError, ControlMessage, FeedError, FeedService, FeedValue};

#[derive(Default)]
struct FeedState {
    /// Queued answers for `latest`, consumed front to back; the last one sticks
    latest: HashMap<String, VecDeque<FeedValue>>,
    samples: HashMap<String, Vec<FeedValue>>,
    sent: Vec<(String, String)>,
    failing_reads: HashSet<String>,
    failing_sends: usize,
    failing_send_feeds: HashSet<String>,
}

#[derive(Default)]
pub struct FakeFeed {
    state: Mutex<FeedState>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_latest(&self, feed: &str, value: &str, at: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .latest
            .entry(feed.to_string())
            .or_default()
            .push_back(FeedValue::new(value, at));
    }

    pub fn add_sample(&self, feed: &str, value: &str, at: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .samples
            .entry(feed.to_string())
            .or_default()
            .push(FeedValue::new(value, at));
    }

    pub fn fail_reads(&self, feed: &str) {
        self.state.lock().unwrap().failing_reads.insert(feed.to_string());
    }

    /// Fail the next `count` sends
    pub fn fail_next_sends(&self, count: usize) {
        self.state.lock().unwrap().failing_sends = count;
    }

    /// Fail every send to this feed
    pub fn fail_sends_to(&self, feed: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_send_feeds
            .insert(feed.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, feed: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(f, _)| f == feed)
            .map(|(_, v)| v)
            .collect()
    }
}

#[async_trait]
impl FeedService for FakeFeed {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn latest(&self, feed: &str) -> Result<Option<FeedValue>, FeedError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads.contains(feed) {
            return Err(FeedError::Http("injected failure".to_string()));
        }
        let Some(queue) = state.latest.get_mut(feed) else {
            return Ok(None);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front())
        } else {
            Ok(queue.front().cloned())
        }
    }

    async fn range(
        &self,
        feed: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FeedValue>, FeedError> {
        let state = self.state.lock().unwrap();
        if state.failing_reads.contains(feed) {
            return Err(FeedError::Http("injected failure".to_string()));
        }
        Ok(state
            .samples
            .get(feed)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.created_at >= start && s.created_at <= end)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send(&self, feed: &str, value: &str) -> Result<(), FeedError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(FeedError::Status(503));
        }
        if state.failing_send_feeds.contains(feed) {
            return Err(FeedError::Status(503));
        }
        state.sent.push((feed.to_string(), value.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    messages: Mutex<Vec<ControlMessage>>,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<ControlMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlChannel for RecordingChannel {
    async fn publish_control(&self, message: &ControlMessage) -> Result<(), ControlError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

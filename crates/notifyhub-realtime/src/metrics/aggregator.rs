//! Per-notification and cross-notification delivery statistics.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use notifyhub_core::types::NotificationId;
use notifyhub_entity::notification::{DeliveryAttempt, DeliveryMethod};

/// Attempt statistics of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Attempts recorded.
    pub attempts: u64,
    /// Successful attempts.
    pub successes: u64,
    /// Failed attempts.
    pub failures: u64,
    /// Mean attempt duration in milliseconds.
    pub avg_duration_ms: f64,
}

impl ChannelStats {
    /// Fold one attempt into the running mean.
    fn record(&mut self, success: bool, duration_ms: u64) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        let n = self.attempts as f64;
        self.avg_duration_ms = (self.avg_duration_ms * (n - 1.0) + duration_ms as f64) / n;
    }

    /// Combine two stats, re-weighting the means by attempt count.
    fn merge(&mut self, other: &ChannelStats) {
        let total = self.attempts + other.attempts;
        if total > 0 {
            self.avg_duration_ms = (self.avg_duration_ms * self.attempts as f64
                + other.avg_duration_ms * other.attempts as f64)
                / total as f64;
        }
        self.attempts = total;
        self.successes += other.successes;
        self.failures += other.failures;
    }
}

/// Delivery statistics broken down by channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    /// Per-channel statistics; channels without attempts are absent.
    pub channels: BTreeMap<DeliveryMethod, ChannelStats>,
}

impl DeliveryMetrics {
    /// Stats of one channel, zeroed when it has no attempts.
    pub fn channel(&self, method: DeliveryMethod) -> ChannelStats {
        self.channels.get(&method).copied().unwrap_or_default()
    }

    /// Stats summed over every channel.
    pub fn totals(&self) -> ChannelStats {
        let mut total = ChannelStats::default();
        for stats in self.channels.values() {
            total.merge(stats);
        }
        total
    }

    fn merge(&mut self, other: &DeliveryMetrics) {
        for (method, stats) in &other.channels {
            self.channels.entry(*method).or_default().merge(stats);
        }
    }
}

/// Incremental delivery metrics, keyed by notification.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    by_notification: DashMap<NotificationId, DeliveryMetrics>,
}

impl MetricsAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of attempts into the metrics of `notification_id`.
    pub fn incorporate(&self, notification_id: NotificationId, attempts: &[DeliveryAttempt]) {
        let mut entry = self.by_notification.entry(notification_id).or_default();
        for attempt in attempts {
            entry
                .channels
                .entry(attempt.channel())
                .or_default()
                .record(attempt.success(), attempt.duration_ms());
        }
    }

    /// Metrics of one notification.
    pub fn get(&self, notification_id: &NotificationId) -> Option<DeliveryMetrics> {
        self.by_notification
            .get(notification_id)
            .map(|entry| entry.value().clone())
    }

    /// Combine the metrics of `ids`. Unknown ids are skipped.
    pub fn aggregate(&self, ids: &[NotificationId]) -> DeliveryMetrics {
        let mut out = DeliveryMetrics::default();
        for id in ids {
            if let Some(metrics) = self.by_notification.get(id) {
                out.merge(metrics.value());
            }
        }
        out
    }

    /// Combine the metrics of every recorded notification.
    pub fn global(&self) -> DeliveryMetrics {
        let mut out = DeliveryMetrics::default();
        for entry in self.by_notification.iter() {
            out.merge(entry.value());
        }
        out
    }

    /// Drop the metrics of one notification.
    pub fn forget(&self, notification_id: &NotificationId) -> bool {
        self.by_notification.remove(notification_id).is_some()
    }

    /// Number of notifications with metrics.
    pub fn len(&self) -> usize {
        self.by_notification.len()
    }

    /// Whether no metrics are recorded.
    pub fn is_empty(&self) -> bool {
        self.by_notification.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ok(id: NotificationId, channel: DeliveryMethod, ms: u64) -> DeliveryAttempt {
        DeliveryAttempt::succeeded(id, channel, None, Duration::from_millis(ms))
    }

    fn failed(id: NotificationId, channel: DeliveryMethod, ms: u64) -> DeliveryAttempt {
        DeliveryAttempt::failed(id, channel, None, Duration::from_millis(ms), "boom")
    }

    #[test]
    fn test_running_mean() {
        let agg = MetricsAggregator::new();
        let id = NotificationId::new();
        agg.incorporate(id, &[ok(id, DeliveryMethod::Websocket, 10)]);
        agg.incorporate(
            id,
            &[
                ok(id, DeliveryMethod::Websocket, 20),
                failed(id, DeliveryMethod::Websocket, 60),
            ],
        );

        let ws = agg.get(&id).unwrap().channel(DeliveryMethod::Websocket);
        assert_eq!(ws.attempts, 3);
        assert_eq!(ws.successes, 2);
        assert_eq!(ws.failures, 1);
        assert!((ws.avg_duration_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_skips_unknown_ids() {
        let agg = MetricsAggregator::new();
        let id = NotificationId::new();
        agg.incorporate(id, &[ok(id, DeliveryMethod::Email, 100)]);

        let combined = agg.aggregate(&[id, NotificationId::new()]);
        assert_eq!(combined.channel(DeliveryMethod::Email).attempts, 1);
        assert_eq!(combined.channel(DeliveryMethod::Websocket).attempts, 0);
    }

    #[test]
    fn test_aggregate_of_union_is_weighted_combination() {
        let agg = MetricsAggregator::new();
        let a: Vec<NotificationId> = (0..3).map(|_| NotificationId::new()).collect();
        let b: Vec<NotificationId> = (0..2).map(|_| NotificationId::new()).collect();

        agg.incorporate(a[0], &[ok(a[0], DeliveryMethod::Websocket, 10)]);
        agg.incorporate(a[1], &[failed(a[1], DeliveryMethod::Websocket, 10_000)]);
        agg.incorporate(
            a[2],
            &[
                ok(a[2], DeliveryMethod::Websocket, 40),
                ok(a[2], DeliveryMethod::Email, 300),
            ],
        );
        agg.incorporate(b[0], &[ok(b[0], DeliveryMethod::Websocket, 7)]);
        agg.incorporate(b[1], &[failed(b[1], DeliveryMethod::Email, 900)]);

        let left = agg.aggregate(&a);
        let right = agg.aggregate(&b);
        let union: Vec<NotificationId> = a.iter().chain(b.iter()).copied().collect();
        let both = agg.aggregate(&union);

        for method in [DeliveryMethod::Websocket, DeliveryMethod::Email] {
            let (l, r, u) = (left.channel(method), right.channel(method), both.channel(method));
            assert_eq!(u.attempts, l.attempts + r.attempts);
            assert_eq!(u.successes, l.successes + r.successes);
            assert_eq!(u.failures, l.failures + r.failures);
            let expected = (l.avg_duration_ms * l.attempts as f64
                + r.avg_duration_ms * r.attempts as f64)
                / u.attempts as f64;
            assert!((u.avg_duration_ms - expected).abs() < 1e-9);
        }
        assert_eq!(both.totals().attempts, agg.global().totals().attempts);
    }

    #[test]
    fn test_forget() {
        let agg = MetricsAggregator::new();
        let id = NotificationId::new();
        agg.incorporate(id, &[ok(id, DeliveryMethod::Email, 1)]);
        assert!(agg.forget(&id));
        assert!(!agg.forget(&id));
        assert!(agg.is_empty());
    }
}

//! Delivery orchestrator: admits, persists and fans out notifications.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use notifyhub_core::config::{DeliveryConfig, RateLimitConfig};
use notifyhub_core::result::AppResult;
use notifyhub_core::retry::RetryEngine;
use notifyhub_core::traits::{EmailMessage, EmailSender, Repository};
use notifyhub_core::types::{NotificationId, UserId};
use notifyhub_entity::notification::{
    CreateNotificationRequest, DeliveryAttempt, DeliveryMethod, Notification,
};

use crate::connection::ConnectionRegistry;
use crate::metrics::{EngineCounters, MetricsAggregator};
use crate::rate_limit::RateLimiter;

/// The external record store for notifications.
pub type NotificationStore = dyn Repository<Notification, NotificationId>;

/// Result of one create-and-dispatch call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// The notification with its final status.
    pub notification: Notification,
    /// Attempts made by this dispatch, across all channels.
    pub attempts: Vec<DeliveryAttempt>,
}

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct OrchestratorDeps {
    /// Notification record store.
    pub store: Arc<NotificationStore>,
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Admission control.
    pub limiter: Arc<RateLimiter>,
    /// Email channel.
    pub email: Arc<dyn EmailSender>,
    /// Delivery statistics.
    pub metrics: Arc<MetricsAggregator>,
    /// Engine counters.
    pub counters: Arc<EngineCounters>,
}

/// Creates notifications and dispatches them over every requested channel.
pub struct DeliveryOrchestrator {
    deps: OrchestratorDeps,
    config: DeliveryConfig,
    email_retry: RetryEngine,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for DeliveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryOrchestrator")
            .field("config", &self.config)
            .finish()
    }
}

impl DeliveryOrchestrator {
    /// Create an orchestrator. Email retries stop when `shutdown` fires.
    pub fn new(deps: OrchestratorDeps, config: DeliveryConfig, shutdown: CancellationToken) -> Self {
        let email_retry = RetryEngine::new("email", config.email.retry.clone());
        Self {
            deps,
            config,
            email_retry,
            shutdown,
        }
    }

    /// Validate, admit, persist and dispatch a notification.
    ///
    /// Fails only for validation, rate limiting, or a store failure at
    /// creation. Channel failures are recorded as attempts.
    pub async fn create_and_dispatch(
        &self,
        request: CreateNotificationRequest,
    ) -> AppResult<DispatchOutcome> {
        let notification = Notification::from_request(request)?;
        self.admit(notification.user_id)?;

        let created = self.deps.store.create(&notification).await.map_err(|e| {
            error!(notification_id = %notification.id, error = %e, "Failed to store notification");
            e
        })?;
        EngineCounters::inc(&self.deps.counters.notifications_created);

        Ok(self.dispatch(created).await)
    }

    /// Dispatch an already stored notification and write back its final state.
    pub async fn dispatch(&self, mut notification: Notification) -> DispatchOutcome {
        let (websocket, email) = tokio::join!(
            async {
                if notification.wants(DeliveryMethod::Websocket) {
                    self.deps.registry.broadcast(&notification).await
                } else {
                    Vec::new()
                }
            },
            async {
                if notification.wants(DeliveryMethod::Email) {
                    vec![self.deliver_email(&notification).await]
                } else {
                    Vec::new()
                }
            },
        );
        if notification.wants(DeliveryMethod::Push) {
            debug!(notification_id = %notification.id, "Push channel not implemented, skipped");
        }

        let attempts: Vec<DeliveryAttempt> = websocket.into_iter().chain(email).collect();
        notification.apply_delivery(attempts.clone(), self.config.archive_on_failure);
        self.deps.metrics.incorporate(notification.id, &attempts);

        let succeeded = attempts.iter().filter(|a| a.success()).count();
        info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            attempts = attempts.len(),
            succeeded,
            status = ?notification.status,
            "Notification dispatched"
        );

        let notification = match self.deps.store.update(&notification).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to write back delivery outcome"
                );
                notification
            }
        };

        DispatchOutcome {
            notification,
            attempts,
        }
    }

    /// Check the per-user minute and hour windows.
    ///
    /// A call refused by the hour window gives its minute slot back, so a
    /// user at the hourly cap does not drain the minute window. Slots are
    /// kept when a later step such as the store write fails.
    fn admit(&self, user_id: UserId) -> AppResult<()> {
        let limits = &self.config.rate_limit;
        let limiter = &self.deps.limiter;
        let minute_key = format!("notify:minute:{user_id}");
        let result = limiter
            .admit(&minute_key, limits.max_per_minute, RateLimitConfig::MINUTE)
            .and_then(|()| {
                limiter
                    .admit(
                        &format!("notify:hour:{user_id}"),
                        limits.max_per_hour,
                        RateLimitConfig::HOUR,
                    )
                    .inspect_err(|_| limiter.release(&minute_key))
            });

        if let Err(e) = &result {
            EngineCounters::inc(&self.deps.counters.notifications_rate_limited);
            warn!(user_id = %user_id, error = %e, "Notification refused by rate limit");
        }
        result
    }

    /// One email attempt, retries included.
    async fn deliver_email(&self, notification: &Notification) -> DeliveryAttempt {
        let started = Instant::now();
        let recipient = format!("email:{}", notification.user_id);
        let target = Some(recipient.clone());

        if let Err(e) = self.deps.limiter.admit(
            &recipient,
            self.config.rate_limit.email_per_recipient_per_hour,
            RateLimitConfig::HOUR,
        ) {
            EngineCounters::inc(&self.deps.counters.emails_failed);
            return DeliveryAttempt::failed(
                notification.id,
                DeliveryMethod::Email,
                target,
                started.elapsed(),
                e.to_string(),
            );
        }

        let message = self.render_email(notification);
        let sender = &self.deps.email;
        let message = &message;
        let result = self
            .email_retry
            .attempt_until_cancelled(&self.shutdown, move |_| sender.send(message))
            .await;

        match result {
            Ok(()) => {
                EngineCounters::inc(&self.deps.counters.emails_sent);
                DeliveryAttempt::succeeded(
                    notification.id,
                    DeliveryMethod::Email,
                    target,
                    started.elapsed(),
                )
            }
            Err(e) => {
                EngineCounters::inc(&self.deps.counters.emails_failed);
                warn!(notification_id = %notification.id, error = %e, "Email delivery failed");
                DeliveryAttempt::failed(
                    notification.id,
                    DeliveryMethod::Email,
                    target,
                    started.elapsed(),
                    e.to_string(),
                )
            }
        }
    }

    fn render_email(&self, notification: &Notification) -> EmailMessage {
        EmailMessage {
            to: notification.user_id,
            from: self.config.email.from_address.clone(),
            subject: notification.title.clone(),
            body: format!(
                "{}\n\n[{}]",
                notification.message, notification.notification_type
            ),
        }
    }

    /// Returns the delivery configuration.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use notifyhub_core::config::RealtimeConfig;
    use notifyhub_core::error::{AppError, ErrorKind};
    use notifyhub_core::retry::RetryPolicy;
    use notifyhub_core::traits::TokenVerifier;
    use notifyhub_entity::notification::{DeliveryState, NotificationStatus, Priority};
    use notifyhub_store::MemoryNotificationStore;

    use super::*;
    use crate::connection::HandshakeAuthenticator;

    #[derive(Debug)]
    struct DenyAll;

    #[async_trait]
    impl TokenVerifier for DenyAll {
        async fn verify(&self, _token: &str) -> AppResult<UserId> {
            Err(AppError::authentication("denied"))
        }
    }

    /// Fails the first `failures` sends, then succeeds.
    #[derive(Debug, Default)]
    struct FlakyEmail {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmailSender for FlakyEmail {
        async fn send(&self, _message: &EmailMessage) -> AppResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(AppError::external("relay returned HTTP 502"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl Repository<Notification, NotificationId> for BrokenStore {
        async fn find_by_id(&self, _id: &NotificationId) -> AppResult<Option<Notification>> {
            Ok(None)
        }
        async fn create(&self, _entity: &Notification) -> AppResult<Notification> {
            Err(AppError::database("store unavailable"))
        }
        async fn update(&self, entity: &Notification) -> AppResult<Notification> {
            Ok(entity.clone())
        }
        async fn delete(&self, _id: &NotificationId) -> AppResult<bool> {
            Ok(false)
        }
        async fn count(&self) -> AppResult<u64> {
            Ok(0)
        }
    }

    struct Harness {
        orchestrator: DeliveryOrchestrator,
        registry: Arc<ConnectionRegistry>,
        store: Arc<MemoryNotificationStore>,
        email: Arc<FlakyEmail>,
        metrics: Arc<MetricsAggregator>,
        limiter: Arc<RateLimiter>,
    }

    fn harness_with(config: DeliveryConfig, email_failures: u32) -> Harness {
        let counters = Arc::new(EngineCounters::new());
        let registry = Arc::new(ConnectionRegistry::new(
            RealtimeConfig::default(),
            HandshakeAuthenticator::new(Arc::new(DenyAll)),
            counters.clone(),
        ));
        let store = Arc::new(MemoryNotificationStore::new());
        let email = Arc::new(FlakyEmail {
            failures: email_failures,
            ..FlakyEmail::default()
        });
        let metrics = Arc::new(MetricsAggregator::new());
        let limiter = Arc::new(RateLimiter::new());
        let deps = OrchestratorDeps {
            store: store.clone(),
            registry: registry.clone(),
            limiter: limiter.clone(),
            email: email.clone(),
            metrics: metrics.clone(),
            counters,
        };
        Harness {
            orchestrator: DeliveryOrchestrator::new(deps, config, CancellationToken::new()),
            registry,
            store,
            email,
            metrics,
            limiter,
        }
    }

    fn harness() -> Harness {
        let mut config = DeliveryConfig::default();
        config.email.retry = RetryPolicy::immediate(3);
        harness_with(config, 0)
    }

    fn request(user_id: UserId, methods: Vec<DeliveryMethod>) -> CreateNotificationRequest {
        CreateNotificationRequest {
            user_id: Some(user_id),
            notification_type: "task.assigned".into(),
            title: "New task".into(),
            message: "You were assigned".into(),
            priority: Priority::Medium,
            delivery_methods: methods,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_offline_recipient_stays_unread() {
        let h = harness();
        let outcome = h
            .orchestrator
            .create_and_dispatch(request(UserId::new(), vec![DeliveryMethod::Websocket]))
            .await
            .unwrap();

        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.notification.status, NotificationStatus::Unread);
        assert_eq!(outcome.notification.delivery_state, DeliveryState::NoRecipient);

        let stored = h.store.find_by_id(&outcome.notification.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Unread);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_push_archives_after_window() {
        let h = harness();
        let user = UserId::new();
        let (_handle, _rx) = h.registry.admit(user).unwrap();
        let started = Instant::now();

        let outcome = h
            .orchestrator
            .create_and_dispatch(request(user, vec![DeliveryMethod::Websocket]))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(10_000));
        assert_eq!(outcome.attempts.len(), 1);
        assert!(!outcome.attempts[0].success());
        assert_eq!(outcome.attempts[0].duration_ms(), 10_000);
        assert_eq!(outcome.notification.status, NotificationStatus::Archived);

        let metrics = h.metrics.get(&outcome.notification.id).unwrap();
        assert_eq!(metrics.channel(DeliveryMethod::Websocket).failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_archive_switch_keeps_read_state() {
        let mut config = DeliveryConfig {
            archive_on_failure: false,
            ..DeliveryConfig::default()
        };
        config.email.retry = RetryPolicy::immediate(1);
        let h = harness_with(config, 0);
        let user = UserId::new();
        let (_handle, _rx) = h.registry.admit(user).unwrap();

        let outcome = h
            .orchestrator
            .create_and_dispatch(request(user, vec![DeliveryMethod::Websocket]))
            .await
            .unwrap();
        assert_eq!(outcome.notification.status, NotificationStatus::Unread);
        assert_eq!(outcome.notification.delivery_state, DeliveryState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_minute_limit_then_reset() {
        let h = harness();
        let user = UserId::new();

        for _ in 0..60 {
            h.orchestrator
                .create_and_dispatch(request(user, vec![DeliveryMethod::Push]))
                .await
                .unwrap();
        }
        let err = h
            .orchestrator
            .create_and_dispatch(request(user, vec![DeliveryMethod::Push]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert_eq!(h.store.count().await.unwrap(), 60);

        // Another user is unaffected.
        assert!(
            h.orchestrator
                .create_and_dispatch(request(UserId::new(), vec![DeliveryMethod::Push]))
                .await
                .is_ok()
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(
            h.orchestrator
                .create_and_dispatch(request(user, vec![DeliveryMethod::Push]))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hour_refusal_keeps_minute_window() {
        let mut config = DeliveryConfig::default();
        config.rate_limit.max_per_minute = 5;
        config.rate_limit.max_per_hour = 2;
        let h = harness_with(config, 0);
        let user = UserId::new();

        for _ in 0..2 {
            h.orchestrator
                .create_and_dispatch(request(user, vec![DeliveryMethod::Push]))
                .await
                .unwrap();
        }
        for _ in 0..4 {
            let err = h
                .orchestrator
                .create_and_dispatch(request(user, vec![DeliveryMethod::Push]))
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::RateLimit);
        }

        let minute_key = format!("notify:minute:{user}");
        assert_eq!(h.limiter.current(&minute_key), Some(2));
        assert_eq!(h.limiter.current(&format!("notify:hour:{user}")), Some(2));
        assert_eq!(h.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_side_effects() {
        let h = harness();
        let user = UserId::new();
        let err = h
            .orchestrator
            .create_and_dispatch(request(user, vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.details[0].code, "VAL_DELIVERY_METHOD_REQUIRED");
        assert_eq!(h.store.count().await.unwrap(), 0);
        assert!(h.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_email_retries_transient_failures() {
        let mut config = DeliveryConfig::default();
        config.email.retry = RetryPolicy::immediate(3);
        let h = harness_with(config, 2);

        let outcome = h
            .orchestrator
            .create_and_dispatch(request(UserId::new(), vec![DeliveryMethod::Email]))
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].success());
        assert_eq!(h.email.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.notification.status, NotificationStatus::Unread);
    }

    #[tokio::test]
    async fn test_email_exhaustion_is_a_failed_attempt() {
        let mut config = DeliveryConfig::default();
        config.email.retry = RetryPolicy::immediate(3);
        let h = harness_with(config, u32::MAX);

        let outcome = h
            .orchestrator
            .create_and_dispatch(request(UserId::new(), vec![DeliveryMethod::Email]))
            .await
            .unwrap();

        assert_eq!(outcome.attempts.len(), 1);
        let attempt = &outcome.attempts[0];
        assert!(!attempt.success());
        assert!(attempt.error().unwrap().contains("RETRY_EXHAUSTED"));
        assert_eq!(outcome.notification.status, NotificationStatus::Archived);
    }

    #[tokio::test]
    async fn test_email_recipient_limit_skips_sender() {
        let mut config = DeliveryConfig::default();
        config.email.retry = RetryPolicy::immediate(1);
        config.rate_limit.email_per_recipient_per_hour = 1;
        let h = harness_with(config, 0);
        let user = UserId::new();

        for expect_success in [true, false] {
            let outcome = h
                .orchestrator
                .create_and_dispatch(request(user, vec![DeliveryMethod::Email]))
                .await
                .unwrap();
            assert_eq!(outcome.attempts[0].success(), expect_success);
        }
        assert_eq!(h.email.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channels_dispatch_together() {
        let h = harness();
        let user = UserId::new();
        let (handle, mut rx) = h.registry.admit(user).unwrap();
        let registry = h.registry.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let notifyhub_entity::message::ServerFrame::Notification { message_id, .. } = frame {
                    let ack = format!(r#"{{"type":"ack","message_id":"{message_id}"}}"#);
                    registry.handle_inbound(&handle.id, &ack).await;
                }
            }
        });

        let outcome = h
            .orchestrator
            .create_and_dispatch(request(
                user,
                vec![DeliveryMethod::Websocket, DeliveryMethod::Email, DeliveryMethod::Push],
            ))
            .await
            .unwrap();

        let mut channels: Vec<DeliveryMethod> =
            outcome.attempts.iter().map(|a| a.channel()).collect();
        channels.sort();
        assert_eq!(channels, vec![DeliveryMethod::Websocket, DeliveryMethod::Email]);
        assert!(outcome.attempts.iter().all(|a| a.success()));
        assert_eq!(outcome.notification.delivery_state, DeliveryState::Delivered);
    }

    #[tokio::test]
    async fn test_store_failure_at_creation_is_fatal() {
        let h = harness();
        let deps = OrchestratorDeps {
            store: Arc::new(BrokenStore),
            ..h.orchestrator.deps.clone()
        };
        let orchestrator =
            DeliveryOrchestrator::new(deps, DeliveryConfig::default(), CancellationToken::new());

        let err = orchestrator
            .create_and_dispatch(request(UserId::new(), vec![DeliveryMethod::Websocket]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Database);
        assert!(h.metrics.is_empty());
    }
}

//! Notification delivery: orchestration and the email channel.

pub mod email;
pub mod orchestrator;

pub use email::{HttpEmailSender, LogEmailSender, build_email_sender};
pub use orchestrator::{DeliveryOrchestrator, DispatchOutcome, NotificationStore, OrchestratorDeps};

//! Collaborator traits consumed by the delivery engine and implemented elsewhere.

pub mod email;
pub mod repository;
pub mod token;

pub use email::{EmailMessage, EmailSender};
pub use repository::Repository;
pub use token::TokenVerifier;

//! Collaborator ports.
//!
//! The lifecycle core never talks to a concrete directory, secret store,
//! ledger or notification channel. It drives these traits instead:
//!
//! - [`DirectoryGateway`] -- identities and their access keys
//! - [`SecretStore`] -- current credential material per identity
//! - [`AuditLedger`] -- append-only rotation history
//! - [`Notifier`] -- fire-and-forget alerting
//!
//! All traits are `async_trait` and object-safe, suitable for use as
//! `Arc<dyn Trait>` behind dependency injection. Retries belong to the
//! driver: a port call either succeeds or returns its final [`PortError`].
//!
//! [`PortError`]: crate::error::PortError

pub mod audit;
pub mod directory;
pub mod notifier;
pub mod secrets;

pub use audit::AuditLedger;
pub use directory::DirectoryGateway;
pub use notifier::{ChannelId, Notification, Notifier};
pub use secrets::SecretStore;

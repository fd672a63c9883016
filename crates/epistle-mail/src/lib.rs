//! Mailbox access for Epistle.
//!
//! Defines the [`MailConnector`] trait plus two implementations: a
//! [`MockConnector`] for tests and a [`FixtureConnector`] that serves a
//! JSON mailbox from disk. Provider-specific connectors (IMAP, Gmail API)
//! implement the same trait out of tree.

pub mod connector;
pub mod error;
pub mod fixture;

pub use connector::{MailConnector, MockConnector, SharedConnector};
pub use error::{ConnectorError, Result};
pub use fixture::FixtureConnector;

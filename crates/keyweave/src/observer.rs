//! Observability hook.
//!
//! The engine reports access decisions and mutations to an
//! [`AccessObserver`]. The default, [`TracingObserver`], turns them into
//! `tracing` events; they go nowhere until the embedding application
//! installs a subscriber.

use keyweave_core::{ConsentId, DatatypeId, PrincipalId};
use keyweave_perms::DenialReason;

/// Something the engine decided or changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessEvent {
    /// A consent validation succeeded.
    ConsentGranted {
        caller: PrincipalId,
        datatype: DatatypeId,
        owner: PrincipalId,
        target: PrincipalId,
        consent: ConsentId,
    },
    /// A consent validation ended in a denial.
    ConsentDenied {
        caller: PrincipalId,
        datatype: DatatypeId,
        owner: PrincipalId,
        target: PrincipalId,
        reason: DenialReason,
    },
    /// A permission check or credential check refused the caller.
    Refused {
        caller: PrincipalId,
        operation: &'static str,
        reason: String,
    },
    /// A mutation was committed.
    Committed {
        caller: PrincipalId,
        operation: &'static str,
        subject: String,
    },
}

/// Receives [`AccessEvent`]s.
pub trait AccessObserver: Send + Sync {
    fn on_event(&self, event: &AccessEvent);
}

/// Emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AccessObserver for TracingObserver {
    fn on_event(&self, event: &AccessEvent) {
        match event {
            AccessEvent::ConsentGranted {
                caller,
                datatype,
                owner,
                target,
                consent,
            } => tracing::info!(%caller, %datatype, %owner, %target, %consent, "consent granted"),
            AccessEvent::ConsentDenied {
                caller,
                datatype,
                owner,
                target,
                reason,
            } => tracing::info!(%caller, %datatype, %owner, %target, %reason, "consent denied"),
            AccessEvent::Refused {
                caller,
                operation,
                reason,
            } => tracing::warn!(%caller, operation, %reason, "request refused"),
            AccessEvent::Committed {
                caller,
                operation,
                subject,
            } => tracing::debug!(%caller, operation, %subject, "mutation committed"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AccessObserver for NoopObserver {
    fn on_event(&self, _event: &AccessEvent) {}
}

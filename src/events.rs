//! Change notifications.
//!
//! Every mutation of a [`Repository`](crate::Repository) emits one
//! [`RuleEvent`]. Listeners run synchronously, in registration order, on
//! the caller's thread. A listener that fails or panics is logged and
//! skipped; the remaining listeners still run and the mutation itself is
//! unaffected.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Rule, RuleId, RuleKind};

/// What kind of change occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A rule was added.
    Created,
    /// A rule was changed in place.
    Modified,
    /// A rule was removed.
    Deleted,
    /// Every rule was removed.
    Cleared,
    /// The whole rule set was replaced by an import.
    Imported,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Cleared => "cleared",
            Self::Imported => "imported",
        })
    }
}

/// A change to the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvent {
    /// A rule was added; carries the new rule.
    Created(Rule),
    /// A rule was changed; carries the full updated rule.
    Modified(Rule),
    /// A rule was removed.
    Deleted {
        /// The removed rule's ID.
        id: RuleId,
        /// The removed rule's kind.
        kind: RuleKind,
    },
    /// Every rule was removed.
    Cleared,
    /// The rule set was replaced.
    Imported {
        /// Number of rules now held.
        count: usize,
    },
}

impl RuleEvent {
    /// The kind of change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Created(_) => ChangeKind::Created,
            Self::Modified(_) => ChangeKind::Modified,
            Self::Deleted { .. } => ChangeKind::Deleted,
            Self::Cleared => ChangeKind::Cleared,
            Self::Imported { .. } => ChangeKind::Imported,
        }
    }

    /// The affected rule's ID, for single-rule changes.
    #[must_use]
    pub const fn id(&self) -> Option<RuleId> {
        match self {
            Self::Created(rule) | Self::Modified(rule) => Some(rule.id()),
            Self::Deleted { id, .. } => Some(*id),
            Self::Cleared | Self::Imported { .. } => None,
        }
    }

    /// The affected rule as it now stands, for creations and modifications.
    #[must_use]
    pub const fn rule(&self) -> Option<&Rule> {
        match self {
            Self::Created(rule) | Self::Modified(rule) => Some(rule),
            _ => None,
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&RuleEvent) -> anyhow::Result<()>>;

/// A registry of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    /// Registers a listener for every event.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RuleEvent) -> anyhow::Result<()> + 'static,
    {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Registers a coarse "something changed" listener.
    pub fn on_change<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut() + 'static,
    {
        self.subscribe(move |_| {
            listener();
            Ok(())
        })
    }

    /// Registers a listener for newly created rules only.
    pub fn on_created<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut(&Rule) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(move |event| match event {
            RuleEvent::Created(rule) => listener(rule),
            _ => Ok(()),
        })
    }

    /// Removes a listener, returning whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to every listener.
    pub fn emit(&mut self, event: &RuleEvent) {
        debug!(kind = %event.kind(), listeners = self.listeners.len(), "emitting rule event");
        for (id, listener) in &mut self.listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(listener = id.0, kind = %event.kind(), "listener failed: {error:#}");
                }
                Err(_) => {
                    warn!(listener = id.0, kind = %event.kind(), "listener panicked");
                }
            }
        }
    }
}

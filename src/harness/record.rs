use std::time::Duration;

use crate::error::Error;
use crate::probe::{EventKind, Received};

/// Everything one probe observed during the window.
///
/// Owned by the coordinator. Once frozen at the window deadline, only
/// messages stamped at or before that deadline are still accepted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionRecord {
    pub index: usize,
    pub opened: bool,
    /// In arrival order.
    pub messages: Vec<Received>,
    /// First transport error seen on this connection, if any.
    pub error: Option<Error>,
    deadline: Option<Duration>,
}

impl ConnectionRecord {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// An opened connection that saw `messages`.
    #[must_use]
    pub fn from_messages(index: usize, messages: impl IntoIterator<Item = Received>) -> Self {
        Self {
            index,
            opened: true,
            messages: messages.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Fold a probe event into the record. Returns `false` if it was
    /// discarded because the record is frozen.
    pub fn apply(&mut self, event: EventKind) -> bool {
        match (self.deadline, &event) {
            (None, _) => {}
            (Some(deadline), EventKind::Message(received)) if received.at <= deadline => {}
            (Some(_), _) => return false,
        }
        match event {
            EventKind::Opened => self.opened = true,
            EventKind::Message(received) => self.messages.push(received),
            EventKind::Failed(e) => {
                self.error.get_or_insert(e);
            }
            EventKind::Closed => {}
        }
        true
    }

    /// Close the record at `deadline`, the end of the observation window.
    pub fn freeze(&mut self, deadline: Duration) {
        self.deadline = Some(deadline);
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.deadline.is_some()
    }

    /// Record a failure of the probe task itself. Unlike [`apply`], this
    /// works on a frozen record.
    ///
    /// [`apply`]: ConnectionRecord::apply
    pub fn fault(&mut self, error: Error) {
        self.error.get_or_insert(error);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.messages.len()
    }
}

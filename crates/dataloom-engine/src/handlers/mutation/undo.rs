//! Per-mutation confirm/cancel signal.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::types::MutationId;

/// The answer to an undoable mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoDecision {
    /// Go ahead with the provider call.
    Confirm,
    /// Roll back without calling the provider.
    Undo,
}

impl UndoDecision {
    pub fn from_is_undo(is_undo: bool) -> Self {
        if is_undo {
            UndoDecision::Undo
        } else {
            UndoDecision::Confirm
        }
    }
}

/// Single-shot signal owned by one undoable mutation.
///
/// Clones share the same channel, so a notification layer and the caller
/// can both hold one; the first emission wins and later ones return
/// `false`.
#[derive(Clone)]
pub struct UndoHandle {
    id: MutationId,
    sender: Arc<Mutex<Option<oneshot::Sender<UndoDecision>>>>,
}

impl std::fmt::Debug for UndoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoHandle")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl UndoHandle {
    pub(crate) fn channel(id: MutationId) -> (Self, oneshot::Receiver<UndoDecision>) {
        let (sender, receiver) = oneshot::channel();
        let handle = Self {
            id,
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        (handle, receiver)
    }

    /// The mutation this signal belongs to.
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Lets the provider call go ahead.
    pub fn confirm(&self) -> bool {
        self.send(UndoDecision::Confirm)
    }

    /// Reverts the mutation without calling the provider.
    pub fn cancel(&self) -> bool {
        self.send(UndoDecision::Undo)
    }

    /// Emits `{ is_undo }` the way a notification's undo button does.
    pub fn emit(&self, is_undo: bool) -> bool {
        self.send(UndoDecision::from_is_undo(is_undo))
    }

    /// Whether a decision was already emitted.
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn send(&self, decision: UndoDecision) -> bool {
        match self.sender.lock().take() {
            Some(sender) => sender.send(decision).is_ok(),
            None => false,
        }
    }
}

//! Ordered bookkeeping of submitted commands.

use std::collections::VecDeque;
use std::fmt;

use apdulink_frame::{Command, Response, StatusSet};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Result, SessionError};

/// Unique id of one `send` call.
///
/// Ids are handed out in the order commands enter the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(pub(crate) u64);

impl SubmissionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A submitted command that has not settled yet.
#[derive(Debug)]
pub(crate) struct PendingSend {
    pub id: SubmissionId,
    pub command: Command,
    pub allowed: StatusSet,
    pub result: oneshot::Sender<Result<Response>>,
    pub started: bool,
}

impl PendingSend {
    pub fn new(
        id: SubmissionId,
        command: Command,
        allowed: StatusSet,
        result: oneshot::Sender<Result<Response>>,
    ) -> Self {
        Self {
            id,
            command,
            allowed,
            result,
            started: false,
        }
    }
}

/// Work handed to the exchange runner.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub id: SubmissionId,
    pub command: Command,
    pub allowed: StatusSet,
}

/// Pending sends in submission order.
///
/// Only the oldest entry may run, and it stays in the queue until it
/// settles, so a command never reaches the wire before every command
/// submitted ahead of it has finished.
#[derive(Debug, Default)]
pub(crate) struct SendQueue {
    entries: VecDeque<PendingSend>,
}

impl SendQueue {
    pub fn push(&mut self, entry: PendingSend) {
        debug!(id = %entry.id, depth = self.entries.len() + 1, "send queued");
        self.entries.push_back(entry);
    }

    /// Start the oldest entry if nothing is running.
    pub fn start_next(&mut self) -> Option<Job> {
        let head = self.entries.front_mut()?;
        if head.started {
            return None;
        }
        head.started = true;
        Some(Job {
            id: head.id,
            command: head.command.clone(),
            allowed: head.allowed.clone(),
        })
    }

    /// Remove the entry with `id` and hand `result` to its caller.
    ///
    /// Returns false when no such entry exists.
    pub fn settle(&mut self, id: SubmissionId, result: Result<Response>) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let Some(entry) = self.entries.remove(index) else {
            return false;
        };
        if entry.result.send(result).is_err() {
            debug!(id = %id, "caller dropped response handle");
        }
        true
    }

    /// Settle every entry with [`SessionError::Closed`].
    pub fn close_all(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            let _ = entry.result.send(Err(SessionError::Closed));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The entry currently on the wire, if any.
    pub fn in_flight(&self) -> Option<SubmissionId> {
        self.entries
            .front()
            .filter(|entry| entry.started)
            .map(|entry| entry.id)
    }
}

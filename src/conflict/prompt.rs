//! Ask-user handoff between the conversion worker and the front end.

use super::{ConflictPolicy, FileConflictInfo};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

/// A user's decision for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictAnswer {
    pub policy: ConflictPolicy,
    /// Reuse this policy for the rest of the session.
    pub apply_to_all: bool,
}

impl ConflictAnswer {
    pub fn once(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            apply_to_all: false,
        }
    }
}

/// Something that can ask a human how to resolve a conflict.
///
/// Implementations block the calling (worker) thread for at most `timeout`.
/// `None` means no usable answer arrived in time.
pub trait ConflictPrompt: Send {
    fn ask(&self, info: &FileConflictInfo, timeout: Duration) -> Option<ConflictAnswer>;
}

/// A pending question delivered to the front end.
#[derive(Debug)]
pub struct ConflictRequest {
    pub info: FileConflictInfo,
    reply: Sender<ConflictAnswer>,
}

impl ConflictRequest {
    /// Sends the answer back. Returns false if the worker already gave up waiting.
    pub fn respond(self, answer: ConflictAnswer) -> bool {
        self.reply.send(answer).is_ok()
    }
}

/// Forwards questions over a channel and waits for the reply.
pub struct ChannelPrompt {
    requests: Sender<ConflictRequest>,
}

impl ChannelPrompt {
    /// Creates the prompt and the receiving end the front end should drain.
    pub fn new() -> (Self, Receiver<ConflictRequest>) {
        let (requests, receiver) = mpsc::channel();
        (Self { requests }, receiver)
    }
}

impl ConflictPrompt for ChannelPrompt {
    fn ask(&self, info: &FileConflictInfo, timeout: Duration) -> Option<ConflictAnswer> {
        let (reply, answer) = mpsc::channel();
        let request = ConflictRequest {
            info: info.clone(),
            reply,
        };
        if self.requests.send(request).is_err() {
            tracing::warn!("conflict prompt receiver is gone");
            return None;
        }
        match answer.recv_timeout(timeout) {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!(target = %info.target_path.display(), "no conflict answer: {e}");
                None
            }
        }
    }
}

/// Always gives the same answer, or none at all.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub Option<ConflictAnswer>);

impl ConflictPrompt for FixedPrompt {
    fn ask(&self, _info: &FileConflictInfo, _timeout: Duration) -> Option<ConflictAnswer> {
        self.0
    }
}

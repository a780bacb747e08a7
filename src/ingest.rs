//! Hand-off from decode workers to the thread that owns the atlas.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::error::DecodeError;
use crate::instance::WorldTransform;

/// Process-unique id of one admitted or injected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TicketCounter(Arc<AtomicU64>);

impl TicketCounter {
    pub(crate) fn next(&self) -> Ticket {
        Ticket(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A decoded resource waiting to be packed.
#[derive(Debug)]
pub struct PendingResource {
    pub ticket: Ticket,
    pub identity: String,
    /// RGBA8, tightly packed rows.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub world: WorldTransform,
}

#[derive(Debug)]
pub enum IngestMessage {
    Decoded(PendingResource),
    Failed {
        ticket: Ticket,
        identity: String,
        /// The file the worker tried to read.
        path: PathBuf,
        error: DecodeError,
    },
}

impl IngestMessage {
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::Decoded(resource) => resource.ticket,
            Self::Failed { ticket, .. } => *ticket,
        }
    }
}

/// Sending half. Cheap to clone and safe to move onto worker threads.
#[derive(Debug, Clone)]
pub struct IngestProducer {
    sender: Sender<IngestMessage>,
    tickets: TicketCounter,
}

impl IngestProducer {
    /// Never blocks. Messages sent after the queue is gone are dropped.
    pub fn enqueue(&self, message: IngestMessage) {
        if let Err(err) = self.sender.send(message) {
            log::debug!("Ingest queue closed, dropping {}", err.0.ticket());
        }
    }

    /// Hand over pixels that were decoded outside the worker pool.
    pub fn submit(
        &self,
        identity: impl Into<String>,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        world: WorldTransform,
    ) -> Ticket {
        let ticket = self.tickets.next();
        self.enqueue(IngestMessage::Decoded(PendingResource {
            ticket,
            identity: identity.into(),
            pixels,
            width,
            height,
            world,
        }));
        ticket
    }
}

#[derive(Debug)]
pub struct IngestQueue {
    sender: Sender<IngestMessage>,
    receiver: Receiver<IngestMessage>,
    tickets: TicketCounter,
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            tickets: TicketCounter::default(),
        }
    }

    pub fn producer(&self) -> IngestProducer {
        IngestProducer {
            sender: self.sender.clone(),
            tickets: self.tickets.clone(),
        }
    }

    pub(crate) fn next_ticket(&self) -> Ticket {
        self.tickets.next()
    }

    /// Take whatever is queued right now, up to `limit` items.
    ///
    /// Never waits for more work to arrive.
    pub fn drain(&self, limit: Option<usize>) -> impl Iterator<Item = IngestMessage> + '_ {
        self.receiver.try_iter().take(limit.unwrap_or(usize::MAX))
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

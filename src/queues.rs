//! Cross-thread request/response queues.
//!
//! Two independent FIFOs connect the I/O worker and the main-thread
//! dispatcher: parsed request lines flow inbound, serialized response lines
//! flow outbound. Each queue has its own mutex, held only for an append or a
//! drain; neither side ever blocks on the other. Growth is bounded in
//! practice by the read-buffer cap in the I/O loop.

use parking_lot::Mutex;

use crate::protocol::ParsedLine;

/// FIFO of parsed request lines, written by the I/O worker and drained by
/// the dispatcher once per frame.
#[derive(Default)]
pub struct InboundQueue {
    items: Mutex<Vec<ParsedLine>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: ParsedLine) {
        self.items.lock().push(line);
    }

    /// Take every queued line, preserving arrival order.
    pub fn drain(&self) -> Vec<ParsedLine> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// FIFO of serialized, newline-terminated response lines, written by the
/// dispatcher and drained by the I/O worker.
#[derive(Default)]
pub struct OutboundQueue {
    lines: Mutex<Vec<String>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        self.lines.lock().push(line);
    }

    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

//! Bounded diagnostic ring.
//!
//! Engine errors, warnings, script errors and shader errors land in a
//! fixed-capacity ring that clients poll incrementally through `get_errors`.
//! Indices are dense and strictly increasing so a client can hold
//! `next_index` as its cursor across polls; overflow drops the oldest entry
//! but never renumbers.
//!
//! [`DiagnosticLayer`] is the subscription: registered with the host's
//! `tracing` subscriber, it turns log events into ring entries for all five
//! kinds. An explicit `kind` event field (`script`, `shader`, `message`,
//! `error`, `warning`) classifies the entry at any level, so script errors,
//! shader errors and explicit print-style messages flow through the same
//! subscriber; without the field, WARN and ERROR events map to
//! `warning`/`error` and lower levels are ignored. The layer holds the ring
//! mutex only while pushing the finished entry, so an engine logger that
//! logs while logging cannot deadlock it.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Number of entries retained before the oldest is dropped.
pub const RING_CAPACITY: usize = 500;

/// Classification of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Error,
    Warning,
    Script,
    Shader,
    Message,
}

impl DiagnosticKind {
    /// Parse the `kind` field hosts attach to their log events.
    pub fn parse(value: &str) -> Option<DiagnosticKind> {
        match value {
            "error" => Some(DiagnosticKind::Error),
            "warning" => Some(DiagnosticKind::Warning),
            "script" => Some(DiagnosticKind::Script),
            "shader" => Some(DiagnosticKind::Shader),
            "message" => Some(DiagnosticKind::Message),
            _ => None,
        }
    }
}

/// One captured diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    /// Dense, strictly increasing cursor value.
    pub index: u64,
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: u32,
    pub function: String,
    /// The raw error or message text.
    pub code: String,
    /// The host's explanation, when it provides one.
    pub rationale: String,
    pub timestamp_ms: u64,
}

#[derive(Default)]
struct RingInner {
    entries: VecDeque<DiagnosticEntry>,
    next_index: u64,
    error_count: u64,
    warning_count: u64,
}

/// Thread-safe bounded ring of diagnostics.
///
/// Writers may be any thread the host logger calls from; the dispatcher
/// reads snapshots from the main thread. Both sides serialize on one mutex
/// held only for the push or the copy.
#[derive(Default)]
pub struct DiagnosticRing {
    inner: Mutex<RingInner>,
}

impl DiagnosticRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic. Script and shader errors count as errors in the
    /// running totals.
    pub fn report(
        &self,
        kind: DiagnosticKind,
        file: &str,
        line: u32,
        function: &str,
        code: &str,
        rationale: &str,
    ) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut inner = self.inner.lock();
        let index = inner.next_index;
        inner.next_index += 1;
        match kind {
            DiagnosticKind::Error | DiagnosticKind::Script | DiagnosticKind::Shader => {
                inner.error_count += 1;
            }
            DiagnosticKind::Warning => inner.warning_count += 1,
            DiagnosticKind::Message => {}
        }
        if inner.entries.len() >= RING_CAPACITY {
            inner.entries.pop_front();
        }
        inner.entries.push_back(DiagnosticEntry {
            index,
            kind,
            file: file.to_string(),
            line,
            function: function.to_string(),
            code: code.to_string(),
            rationale: rationale.to_string(),
            timestamp_ms,
        });
    }

    /// Snapshot every retained entry with `index >= since`, plus the next
    /// cursor value.
    pub fn since(&self, since: u64) -> (Vec<DiagnosticEntry>, u64) {
        let inner = self.inner.lock();
        let entries = inner
            .entries
            .iter()
            .filter(|entry| entry.index >= since)
            .cloned()
            .collect();
        (entries, inner.next_index)
    }

    /// Running `(error_count, warning_count)` totals since startup.
    pub fn totals(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.error_count, inner.warning_count)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Reset the ring and the totals. Test hook; clients never call this.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.next_index = 0;
        inner.error_count = 0;
        inner.warning_count = 0;
    }
}

struct MessageVisitor {
    message: String,
    rationale: String,
    kind: Option<DiagnosticKind>,
}

impl MessageVisitor {
    fn new() -> Self {
        Self {
            message: String::new(),
            rationale: String::new(),
            kind: None,
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "rationale" => self.rationale = value.to_string(),
            "kind" => self.kind = DiagnosticKind::parse(value),
            _ => {}
        }
    }
}

/// Tracing layer forwarding engine log events into a [`DiagnosticRing`].
///
/// Classification: an explicit `kind` field wins at any level
/// (`tracing::error!(kind = "script", ...)` produces a script-error entry,
/// `tracing::info!(kind = "message", ...)` an explicit message); events
/// without one become `error`/`warning` entries from their level, and
/// anything below WARN is dropped.
///
/// The host composes this into its own subscriber; the bridge never
/// installs a global default.
pub struct DiagnosticLayer {
    ring: Arc<DiagnosticRing>,
}

impl DiagnosticLayer {
    pub fn new(ring: Arc<DiagnosticRing>) -> Self {
        Self { ring }
    }
}

impl<S> Layer<S> for DiagnosticLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = MessageVisitor::new();
        event.record(&mut visitor);

        let kind = match visitor.kind {
            Some(kind) => kind,
            None => match *metadata.level() {
                Level::ERROR => DiagnosticKind::Error,
                Level::WARN => DiagnosticKind::Warning,
                _ => return,
            },
        };

        self.ring.report(
            kind,
            metadata.file().unwrap_or(""),
            metadata.line().unwrap_or(0),
            metadata.target(),
            &visitor.message,
            &visitor.rationale,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_n(ring: &DiagnosticRing, n: usize) {
        for i in 0..n {
            ring.report(
                DiagnosticKind::Error,
                "game.gd",
                i as u32,
                "_process",
                &format!("boom {i}"),
                "",
            );
        }
    }

    #[test]
    fn test_indices_are_dense_and_increasing() {
        let ring = DiagnosticRing::new();
        push_n(&ring, 5);
        let (entries, next) = ring.since(0);
        let indices: Vec<u64> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(next, 5);
    }

    #[test]
    fn test_cursor_filtering() {
        let ring = DiagnosticRing::new();
        push_n(&ring, 10);
        let (entries, next) = ring.since(7);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].index, 7);
        assert_eq!(next, 10);

        // The cursor from any read equals the cursor from a full read.
        let (_, next_full) = ring.since(0);
        assert_eq!(next, next_full);
    }

    #[test]
    fn test_incremental_poll_sees_exactly_new_entries() {
        let ring = DiagnosticRing::new();
        push_n(&ring, 3);
        let (_, cursor) = ring.since(0);
        push_n(&ring, 4);
        let (fresh, _) = ring.since(cursor);
        assert_eq!(fresh.len(), 4);
    }

    #[test]
    fn test_overflow_keeps_capacity_and_advances_cursor() {
        let ring = DiagnosticRing::new();
        push_n(&ring, RING_CAPACITY + 1);
        assert_eq!(ring.len(), RING_CAPACITY);
        let (entries, next) = ring.since(0);
        assert_eq!(entries.len(), RING_CAPACITY);
        assert_eq!(next, (RING_CAPACITY + 1) as u64);
        // Oldest entry was dropped, not renumbered.
        assert_eq!(entries[0].index, 1);
    }

    #[test]
    fn test_totals_by_kind() {
        let ring = DiagnosticRing::new();
        ring.report(DiagnosticKind::Error, "", 0, "", "e", "");
        ring.report(DiagnosticKind::Script, "", 0, "", "s", "");
        ring.report(DiagnosticKind::Shader, "", 0, "", "sh", "");
        ring.report(DiagnosticKind::Warning, "", 0, "", "w", "");
        ring.report(DiagnosticKind::Message, "", 0, "", "m", "");
        assert_eq!(ring.totals(), (3, 1));
    }

    #[test]
    fn test_clear_resets_everything() {
        let ring = DiagnosticRing::new();
        push_n(&ring, 3);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.totals(), (0, 0));
        let (_, next) = ring.since(0);
        assert_eq!(next, 0);
    }

    #[test]
    fn test_layer_captures_warn_and_error() {
        use tracing_subscriber::layer::SubscriberExt;

        let ring = Arc::new(DiagnosticRing::new());
        let subscriber =
            tracing_subscriber::registry().with(DiagnosticLayer::new(Arc::clone(&ring)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!("a warning");
            tracing::error!(rationale = "node was freed", "an error");
        });

        let (entries, next) = ring.since(0);
        assert_eq!(next, 2);
        assert_eq!(entries[0].kind, DiagnosticKind::Warning);
        assert_eq!(entries[0].code, "a warning");
        assert_eq!(entries[1].kind, DiagnosticKind::Error);
        assert_eq!(entries[1].rationale, "node was freed");
        assert_eq!(ring.totals(), (1, 1));
    }

    #[test]
    fn test_layer_discriminates_kind_from_field() {
        use tracing_subscriber::layer::SubscriberExt;

        let ring = Arc::new(DiagnosticRing::new());
        let subscriber =
            tracing_subscriber::registry().with(DiagnosticLayer::new(Arc::clone(&ring)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(kind = "script", "Invalid call to nonexistent function");
            tracing::error!(kind = "shader", "shader compilation failed");
            // An explicit message is recorded even below WARN.
            tracing::info!(kind = "message", "player spawned");
            tracing::info!("still ignored without a kind");
            // An unknown kind falls back to the event level.
            tracing::error!(kind = "mystery", "plain error after all");
        });

        let (entries, next) = ring.since(0);
        assert_eq!(next, 4);
        assert_eq!(entries[0].kind, DiagnosticKind::Script);
        assert_eq!(entries[1].kind, DiagnosticKind::Shader);
        assert_eq!(entries[2].kind, DiagnosticKind::Message);
        assert_eq!(entries[2].code, "player spawned");
        assert_eq!(entries[3].kind, DiagnosticKind::Error);
        // Script and shader errors count toward the error total.
        assert_eq!(ring.totals(), (3, 0));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(DiagnosticKind::parse("script"), Some(DiagnosticKind::Script));
        assert_eq!(DiagnosticKind::parse("shader"), Some(DiagnosticKind::Shader));
        assert_eq!(
            DiagnosticKind::parse("message"),
            Some(DiagnosticKind::Message)
        );
        assert_eq!(DiagnosticKind::parse("error"), Some(DiagnosticKind::Error));
        assert_eq!(
            DiagnosticKind::parse("warning"),
            Some(DiagnosticKind::Warning)
        );
        assert_eq!(DiagnosticKind::parse("verbose"), None);
    }
}

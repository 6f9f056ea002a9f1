//! Diagnostics sink injected into decoding and note connection.
//!
//! Decoding is a pure function of the input buffer; everything worth
//! tracing along the way is handed to a [`Diagnostics`] implementation
//! passed in by the caller. [`LogSink`] forwards to the `log` facade,
//! `Vec<Diagnostic>` collects events (handy in tests) and [`NullSink`]
//! drops them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ElementId;

/// Something noteworthy that happened while decoding or connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A known block tag was found at `offset`.
    Block { offset: usize, tag: String, size: u32 },
    /// Bytes were discarded while looking for the next known tag.
    Resync { from: usize, to: usize },
    /// A skip would have run past the end of the buffer and was cut short.
    SkipClamped { offset: usize, requested: usize, available: usize },
    /// The measure terminator appeared one byte early (type/voice byte 0xFF).
    AnomalousTerminator { offset: usize, measure: usize },
    /// The file has no instrument blocks; default parts were synthesized.
    MissingInstruments { synthesized: usize },
    /// A spanner start points at a measure that does not exist.
    SpannerTargetOutOfRange {
        measure: usize,
        target: usize,
        measure_count: usize,
    },
    /// A slur or wedge could not be attached to notes and was dropped.
    SpannerDropped { ornament: ElementId, reason: DropReason },
    /// Direction lookups are disabled for the big-endian file revision.
    DirectionsDisabled,
}

/// Why a spanner was dropped by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    NoStartNote,
    NoStopNote,
    SameStartAndStop,
    StartAlreadyClaimed,
    StopAlreadyClaimed,
    TargetOutOfRange,
}

impl Diagnostic {
    /// Whether this event indicates damaged or suspicious input.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Diagnostic::Resync { .. }
                | Diagnostic::SkipClamped { .. }
                | Diagnostic::SpannerTargetOutOfRange { .. }
                | Diagnostic::SpannerDropped { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Block { offset, tag, size } => {
                write!(f, "block {tag} at 0x{offset:x}, size {size}")
            }
            Diagnostic::Resync { from, to } => {
                write!(f, "resynchronized: skipped {} bytes (0x{from:x}..0x{to:x})", to - from)
            }
            Diagnostic::SkipClamped {
                offset,
                requested,
                available,
            } => write!(
                f,
                "skip of {requested} bytes at 0x{offset:x} clamped to {available}"
            ),
            Diagnostic::AnomalousTerminator { offset, measure } => write!(
                f,
                "measure {measure}: element terminator one byte early at 0x{offset:x}"
            ),
            Diagnostic::MissingInstruments { synthesized } => {
                write!(f, "no instrument blocks, synthesized {synthesized} parts")
            }
            Diagnostic::SpannerTargetOutOfRange {
                measure,
                target,
                measure_count,
            } => write!(
                f,
                "spanner in measure {measure} ends in measure {target}, but the score has {measure_count}"
            ),
            Diagnostic::SpannerDropped { ornament, reason } => {
                write!(f, "spanner {ornament} dropped: {reason:?}")
            }
            Diagnostic::DirectionsDisabled => {
                write!(f, "ornament fields unreliable for SCO5 files, directions disabled")
            }
        }
    }
}

/// Receiver for decode and connector diagnostics.
pub trait Diagnostics {
    fn report(&mut self, event: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Diagnostics for LogSink {
    fn report(&mut self, event: Diagnostic) {
        if event.is_warning() {
            log::warn!("{event}");
        } else {
            log::debug!("{event}");
        }
    }
}

/// Discards all diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Diagnostics for NullSink {
    fn report(&mut self, _event: Diagnostic) {}
}

impl Diagnostics for Vec<Diagnostic> {
    fn report(&mut self, event: Diagnostic) {
        self.push(event);
    }
}

//! encscore: Encore (.enc) notation file decoder and note connector.
//!
//! Decodes the binary score into a renderer-agnostic model and reconstructs
//! what the format only implies: slur and wedge ends, ties, tuplet brackets,
//! pitch spelling and voice timing.
//!
//! # Example
//! ```no_run
//! use encscore::DecodedScore;
//!
//! let data = std::fs::read("path/to/score.enc").unwrap();
//! let decoded = DecodedScore::decode(&data).unwrap();
//! println!("Title: {}", decoded.score().title.title);
//! println!("Parts: {}", decoded.instruments().len());
//! for note in decoded.notes(0) {
//!     let p = note.pitch();
//!     println!("{}{} ({} ticks)", p.step, p.octave, note.playable_ticks());
//! }
//! ```

pub mod connector;
pub mod decoder;
pub mod diagnostics;
pub mod duration;
pub mod error;
pub mod model;
pub mod pitch;
pub mod query;
pub mod reader;
pub mod scanner;
pub mod timemap;
pub mod tuplet;
pub mod unroller;

pub use connector::Connector;
pub use decoder::{decode, decode_with, DecodeOptions};
pub use diagnostics::{Diagnostic, Diagnostics, DropReason, LogSink, NullSink};
pub use error::{DecodeError, Result};
pub use model::*;
pub use pitch::{key_to_fifths, spell_pitch, Pitch};
pub use query::{DecodedScore, NoteView, VoiceEvent};
pub use timemap::{generate_timemap, TimemapEntry};
pub use tuplet::{TupletState, TupletTracker};
pub use unroller::{unroll, UnrolledMeasure};

/// Convert a decoded score to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn score_to_json(score: &ScoreFile) -> Result<String> {
    Ok(serde_json::to_string_pretty(score)?)
}

/// Decode an Encore buffer straight to JSON.
pub fn decode_to_json(data: &[u8]) -> Result<String> {
    score_to_json(&decode(data)?)
}

/// Play-order timing of a decoded buffer as JSON: one entry per unrolled
/// measure with its start time and duration.
pub fn timemap_to_json(data: &[u8]) -> Result<String> {
    let score = decode(data)?;
    let timemap = generate_timemap(&score, &unroll(&score));
    Ok(serde_json::to_string_pretty(&timemap)?)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::CString;
use std::os::raw::c_char;

fn into_c_string(result: Result<String>) -> *mut c_char {
    match result {
        Ok(json) => CString::new(json).unwrap_or_default().into_raw(),
        Err(e) => {
            log::warn!("encscore: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Decode an Encore buffer and return the score as a JSON C string, or null
/// if the buffer is not a valid Encore file.
/// The caller must free the returned string with `encscore_free_string`.
///
/// # Safety
/// `data` must point to `len` valid bytes.
#[no_mangle]
pub unsafe extern "C" fn encscore_decode_to_json(data: *const u8, len: usize) -> *mut c_char {
    if data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    into_c_string(decode_to_json(bytes))
}

/// Decode an Encore buffer and return its play-order timemap as a JSON
/// C string, or null on failure.
/// The caller must free the returned string with `encscore_free_string`.
///
/// # Safety
/// `data` must point to `len` valid bytes.
#[no_mangle]
pub unsafe extern "C" fn encscore_timemap_json(data: *const u8, len: usize) -> *mut c_char {
    if data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    into_c_string(timemap_to_json(bytes))
}

/// Free a string previously returned by encscore functions.
///
/// # Safety
/// `ptr` must be a string previously returned by an encscore function, or null.
#[no_mangle]
pub unsafe extern "C" fn encscore_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

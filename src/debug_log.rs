//! Opt-in file log for tracing generation and edits, plus geometry checks
//! worth logging alongside them.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use godot::prelude::*;

/// Log file name, relative to the working directory.
pub const DEBUG_LOG_FILE: &str = "debug_heightfield.log";

lazy_static::lazy_static! {
    static ref DEBUG_LOG: Mutex<Option<BufWriter<File>>> = Mutex::new(None);
}

/// Append one line to the debug log. Does nothing until `init_debug_log`.
pub fn debug_log(msg: &str) {
    let Ok(mut guard) = DEBUG_LOG.lock() else {
        return;
    };
    if let Some(out) = guard.as_mut() {
        // Write errors are ignored.
        let _ = writeln!(out, "{}", msg).and_then(|_| out.flush());
    }
}

/// Truncate the log file and start recording.
pub fn init_debug_log() {
    let Ok(mut guard) = DEBUG_LOG.lock() else {
        return;
    };
    *guard = File::create(DEBUG_LOG_FILE).ok().map(BufWriter::new);
    if let Some(out) = guard.as_mut() {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let _ = writeln!(out, "# pixy_heightfield {} started={}", env!("CARGO_PKG_VERSION"), started)
            .and_then(|_| out.flush());
    }
}

/// Length and orientation summary of a set of vertex normals.
#[derive(Debug, Default, PartialEq)]
pub struct NormalStats {
    pub min_len: f32,
    pub max_len: f32,
    /// Normals whose length is NaN or not within 0.01 of 1
    pub degenerate_count: usize,
    /// Normals pointing below the horizon
    pub downward_count: usize,
}

pub fn compute_normal_stats(normals: &[Vector3]) -> NormalStats {
    if normals.is_empty() {
        return NormalStats::default();
    }
    normals.iter().fold(
        NormalStats {
            min_len: f32::MAX,
            max_len: f32::MIN,
            ..NormalStats::default()
        },
        |mut stats, n| {
            let len = n.length();
            stats.min_len = stats.min_len.min(len);
            stats.max_len = stats.max_len.max(len);
            stats.degenerate_count += usize::from(len.is_nan() || (len - 1.0).abs() > 0.01);
            stats.downward_count += usize::from(n.y < 0.0);
            stats
        },
    )
}

//! # CSV Emitter
//!
//! Serializes the reading buffer to a fixed-schema CSV file:
//! `Timestamp,Channel,Value`, one row per reading in buffer order.
//! The target file is created or truncated — never appended to.

use std::path::Path;

use crate::capture::ReadingBuffer;
use crate::error::CaptureResult;

/// CSV header, in column order.
const HEADER: [&str; 3] = ["Timestamp", "Channel", "Value"];

/// Write the buffer to `path`, overwriting any existing file.
///
/// Timestamps are integer epoch milliseconds; values use the default `f64`
/// formatting, which round-trips losslessly through `parse::<f64>()`.
///
/// # Errors
/// Fails with an I/O or CSV error on filesystem failure (permissions, disk
/// full, unwritable path). This is terminal for the run: the capture has
/// already completed, so the caller must surface the loss loudly rather
/// than treat a partial file as success.
pub fn flush(buffer: &ReadingBuffer, path: &Path) -> CaptureResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(HEADER)?;
    for reading in buffer.readings() {
        writer.write_record([
            reading.timestamp_ms.to_string(),
            reading.channel.clone(),
            reading.value.to_string(),
        ])?;
    }
    writer.flush()?;

    tracing::info!(rows = buffer.len(), path = %path.display(), "capture flushed to CSV");
    Ok(())
}

//! Raw brainwave stream event and sample batch types.

use serde::Deserialize;

/// Payload of a `"raw"` stream event from the gateway.
///
/// `data` holds one row of samples per EEG channel; `info.channel_names`
/// names the channel each row belongs to, in the same order. A typical
/// event for an 8-channel Crown carries 16 samples per row:
///
/// ```json
/// {
///   "raw": {
///     "data": [[4.57, 4.82, ...], [1.21, 1.08, ...], ...],
///     "info": {
///       "channelNames": ["CP3", "C3", "F5", "PO3", "PO4", "F6", "C4", "CP4"],
///       "startTime": 1678901234.5
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// Per-channel sample rows, aligned with `info.channel_names`.
    pub data: Vec<Vec<serde_json::Value>>,

    /// Batch metadata.
    pub info: RawInfo,
}

/// Metadata attached to a raw brainwave event.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInfo {
    /// Channel name per `data` row, in row order.
    #[serde(rename = "channelNames")]
    pub channel_names: Vec<String>,

    /// Device-reported batch start time (Unix seconds). Informational only;
    /// readings are stamped at receipt time, not device time.
    #[serde(rename = "startTime", default)]
    pub start_time: Option<f64>,
}

/// One stream tick's worth of channel readings, consumed immediately by
/// the accumulator. Rows are kept in wire shape so that malformed elements
/// (a row without a channel name, a non-numeric value) can be reported
/// individually at ingest time instead of rejecting the whole batch.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// Channel name per sample row.
    pub channel_names: Vec<String>,

    /// Per-channel sample rows, aligned with `channel_names`.
    pub samples: Vec<Vec<serde_json::Value>>,
}

impl SampleBatch {
    /// Convert a parsed wire event into a batch.
    #[must_use]
    pub fn from_raw_event(event: RawEvent) -> Self {
        Self {
            channel_names: event.info.channel_names,
            samples: event.data,
        }
    }

    /// Total number of sample elements across all rows.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.samples.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }
}

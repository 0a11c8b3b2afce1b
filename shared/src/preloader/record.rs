use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::{MediaContainer, PreloadReceipt};

/// Completion marker for a URL that finished preloading successfully.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct PreloadRecord {
    pub buffered_bytes: u64,

    pub container: Option<MediaContainer>,

    pub preloaded_at: DateTime<Utc>,
}

impl PreloadRecord {
    pub fn from_receipt(receipt: PreloadReceipt) -> Self {
        Self {
            buffered_bytes: receipt.buffered_bytes,
            container: receipt.container,
            preloaded_at: Utc::now(),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize, Debug)]
pub struct PreloadSummary {
    /// URLs accepted into the pending list (duplicates are not counted).
    pub total_queued: usize,

    /// URLs dropped at submission time because they were preloaded, pending or in flight.
    pub total_skipped: usize,

    pub total_attempts: usize,

    pub total_failures: usize,

    /// Distinct URLs currently in the preloaded record.
    pub total_preloaded: usize,

    pub total_buffered_bytes: u64,
}

impl PreloadSummary {
    pub(super) fn trace_attempt(&mut self, outcome: Option<&PreloadRecord>) {
        self.total_attempts += 1;

        match outcome {
            Some(record) => {
                self.total_preloaded += 1;
                self.total_buffered_bytes += record.buffered_bytes;
            }
            None => self.total_failures += 1,
        }
    }
}

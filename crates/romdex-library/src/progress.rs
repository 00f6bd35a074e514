//! Scan progress reporting
//!
//! A full scan emits stage milestones with a percent, one event per scanned
//! system, and exactly one terminal `Completed` or `Failed` event.

use crate::scanner::FullScanSummary;
use tokio::sync::mpsc::UnboundedSender;

/// Channel end a full scan reports into
pub type ProgressSender = UnboundedSender<ScanEvent>;

/// Milestones of a full scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Started,
    CatalogParsed,
    SnapshotsComplete,
    SystemScanned,
    Done,
}

/// Progress update sent during a full scan.
///
/// Every scan that starts ends with exactly one `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Progress {
        stage: ScanStage,
        /// 0 to 100, never decreasing within a scan
        percent: u8,
        /// System id for `SystemScanned`
        detail: Option<String>,
    },

    /// Scan finished and both tiers are populated
    Completed(FullScanSummary),

    /// Scan aborted
    Failed {
        /// Error message
        error: String,
    },
}

impl ScanEvent {
    pub fn progress(stage: ScanStage, percent: u8) -> Self {
        Self::Progress {
            stage,
            percent,
            detail: None,
        }
    }

    pub fn system_scanned(system_id: impl Into<String>, percent: u8) -> Self {
        Self::Progress {
            stage: ScanStage::SystemScanned,
            percent,
            detail: Some(system_id.into()),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    /// Percentage for display; -1 marks a failed scan
    pub fn percent(&self) -> i16 {
        match self {
            Self::Progress { percent, .. } => i16::from(*percent),
            Self::Completed(_) => 100,
            Self::Failed { .. } => -1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed { .. })
    }
}

/// Percent after `done` of `total` systems have been published.
///
/// Systems share the 20..95 band; 100 is reserved for the final event.
pub fn system_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 95;
    }
    let share = 75 * done.min(total) / total;
    (20 + share) as u8
}

/// Send an event if anyone is listening. A dropped receiver is not an error.
pub(crate) fn emit(sender: Option<&ProgressSender>, event: ScanEvent) {
    if let Some(tx) = sender {
        if tx.send(event).is_err() {
            tracing::debug!("Scan progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(ScanEvent::progress(ScanStage::Started, 0).percent(), 0);
        assert_eq!(ScanEvent::system_scanned("nes", 57).percent(), 57);
        assert_eq!(ScanEvent::failed("boom").percent(), -1);
        assert!(ScanEvent::failed("boom").is_terminal());
        assert!(!ScanEvent::progress(ScanStage::Done, 100).is_terminal());
    }

    #[test]
    fn test_system_percent_band() {
        assert_eq!(system_percent(0, 4), 20);
        assert_eq!(system_percent(2, 4), 57);
        assert_eq!(system_percent(4, 4), 95);
        assert_eq!(system_percent(9, 4), 95);
        assert_eq!(system_percent(0, 0), 95);
    }
}

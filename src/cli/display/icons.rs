//! Status icons for CLI output

use crate::domain::cluster::ClusterOutcome;

/// Status icons for different states
pub struct StatusIcon;

impl StatusIcon {
    /// Success icon (all nodes ready)
    pub const SUCCESS: &'static str = "✓";

    /// Warning icon (some nodes ready)
    pub const WARNING: &'static str = "⚠";

    /// Error icon (no nodes ready)
    pub const ERROR: &'static str = "✗";

    /// Skipped icon
    pub const SKIPPED: &'static str = "⏭";

    pub const UNKNOWN: &'static str = "?";

    /// Get status icon based on ready/total nodes
    pub fn get_ready_icon(ready: usize, total: usize) -> &'static str {
        if total == 0 {
            Self::UNKNOWN
        } else if ready == total {
            Self::SUCCESS
        } else if ready > 0 {
            Self::WARNING
        } else {
            Self::ERROR
        }
    }

    /// Get status text based on ready/total nodes
    pub fn get_status_text(ready: usize, total: usize) -> &'static str {
        if total == 0 {
            "Unknown"
        } else if ready == total {
            "Ready"
        } else if ready > 0 {
            "Degraded"
        } else {
            "NotReady"
        }
    }

    pub fn get_outcome_icon(outcome: &ClusterOutcome) -> &'static str {
        match outcome {
            ClusterOutcome::Ready => Self::SUCCESS,
            ClusterOutcome::Failed { .. } => Self::ERROR,
            ClusterOutcome::Skipped { .. } => Self::SKIPPED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_ready_icon() {
        assert_eq!(StatusIcon::get_ready_icon(3, 3), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::get_ready_icon(2, 3), StatusIcon::WARNING);
        assert_eq!(StatusIcon::get_ready_icon(0, 3), StatusIcon::ERROR);
        assert_eq!(StatusIcon::get_ready_icon(0, 0), StatusIcon::UNKNOWN);
    }

    #[test]
    fn test_get_status_text() {
        assert_eq!(StatusIcon::get_status_text(3, 3), "Ready");
        assert_eq!(StatusIcon::get_status_text(2, 3), "Degraded");
        assert_eq!(StatusIcon::get_status_text(0, 3), "NotReady");
        assert_eq!(StatusIcon::get_status_text(0, 0), "Unknown");
    }

    #[test]
    fn test_get_outcome_icon() {
        let failed = ClusterOutcome::Failed {
            stage: "install".to_string(),
            error: "exit 2".to_string(),
        };
        assert_eq!(StatusIcon::get_outcome_icon(&ClusterOutcome::Ready), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::get_outcome_icon(&failed), StatusIcon::ERROR);
    }
}

use crate::error::WorkflowError;
use serde::{Deserialize, Serialize};

/// Where a workflow run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Nothing selected
    Idle,
    /// An image is chosen but not uploaded
    ImageSelected,
    /// Upload in flight
    Uploading,
    /// Image stored remotely, locator known
    Uploaded,
    /// Diagnosis requested and not yet answered
    Scanning,
    /// A report is held and can be downloaded
    ReportReady,
    /// The last diagnosis attempt failed; the locator is kept for a retry
    Failed,
}

impl WorkflowState {
    /// All states, in lifecycle order
    pub const ALL: [WorkflowState; 7] = [
        WorkflowState::Idle,
        WorkflowState::ImageSelected,
        WorkflowState::Uploading,
        WorkflowState::Uploaded,
        WorkflowState::Scanning,
        WorkflowState::ReportReady,
        WorkflowState::Failed,
    ];

    /// A request is in flight; the upload control must be disabled
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, WorkflowState::Uploading | WorkflowState::Scanning)
    }

    /// A new image may be selected by the user
    ///
    /// `Uploading -> ImageSelected` exists only as the upload rollback.
    #[must_use]
    pub fn accepts_new_image(self) -> bool {
        !self.is_busy()
    }
}

/// Validates a state transition.
///
/// `reset` is not routed through here: it is accepted from every state.
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<(), WorkflowError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(WorkflowError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
pub fn allowed_transitions(from: WorkflowState) -> Vec<WorkflowState> {
    use WorkflowState::*;
    match from {
        Idle => vec![ImageSelected],
        ImageSelected => vec![Uploading, ImageSelected, Idle],
        Uploading => vec![Uploaded, ImageSelected, Idle],
        Uploaded => vec![Scanning, ImageSelected, Idle],
        Scanning => vec![ReportReady, Failed, Idle],
        ReportReady => vec![ImageSelected, Idle],
        Failed => vec![Scanning, ImageSelected, Idle],
    }
}

fn allowed(from: WorkflowState, to: WorkflowState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowState::*;

    #[test]
    fn idle_only_selects() {
        assert_eq!(allowed_transitions(Idle), vec![ImageSelected]);
        assert!(validate_transition(Idle, Uploading).is_err());
        assert!(validate_transition(Idle, Scanning).is_err());
    }

    #[test]
    fn upload_failure_rolls_back_to_selected() {
        assert!(validate_transition(Uploading, ImageSelected).is_ok());
        assert!(validate_transition(Uploading, Failed).is_err());
    }

    #[test]
    fn scan_requires_upload_or_retry() {
        assert!(validate_transition(Uploaded, Scanning).is_ok());
        assert!(validate_transition(Failed, Scanning).is_ok());
        assert!(validate_transition(ImageSelected, Scanning).is_err());
        assert!(validate_transition(ReportReady, Scanning).is_err());
    }

    #[test]
    fn busy_states_reject_new_images() {
        assert!(!Uploading.accepts_new_image());
        assert!(Idle.accepts_new_image());
        assert!(!Scanning.accepts_new_image());
        assert!(ReportReady.accepts_new_image());
        assert!(Failed.accepts_new_image());
        assert!(Scanning.is_busy());
    }

    #[test]
    fn illegal_transition_names_both_states() {
        let err = validate_transition(Scanning, Uploading).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::IllegalTransition {
                from: Scanning,
                to: Uploading
            }
        ));
    }
}

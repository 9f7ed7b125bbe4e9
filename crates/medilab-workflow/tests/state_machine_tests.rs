use medilab_workflow::state_machine::allowed_transitions;
use medilab_workflow::{validate_transition, WorkflowError, WorkflowState};
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = WorkflowState> {
    prop::sample::select(WorkflowState::ALL.to_vec())
}

proptest! {
    #[test]
    fn test_validation_agrees_with_table(from in any_state(), to in any_state()) {
        let listed = allowed_transitions(from).contains(&to);
        match validate_transition(from, to) {
            Ok(()) => prop_assert!(listed),
            Err(WorkflowError::IllegalTransition { from: f, to: t }) => {
                prop_assert!(!listed);
                prop_assert_eq!((f, t), (from, to));
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn test_every_state_can_return_to_idle_except_idle(from in any_state()) {
        prop_assume!(from != WorkflowState::Idle);
        prop_assert!(validate_transition(from, WorkflowState::Idle).is_ok());
    }

    #[test]
    fn test_busy_states_refuse_new_images(from in any_state()) {
        prop_assert_eq!(from.accepts_new_image(), !from.is_busy());
    }
}

#[test]
fn test_scan_requires_a_prior_upload() {
    for from in WorkflowState::ALL {
        let allowed = validate_transition(from, WorkflowState::Scanning).is_ok();
        let expected = matches!(from, WorkflowState::Uploaded | WorkflowState::Failed);
        assert_eq!(allowed, expected, "{from:?} -> Scanning");
    }
}

#[test]
fn test_each_state_lists_its_documented_successors() {
    use WorkflowState::*;
    assert_eq!(allowed_transitions(Idle), vec![ImageSelected]);
    assert!(allowed_transitions(Scanning).contains(&ReportReady));
    assert!(allowed_transitions(Scanning).contains(&Failed));
    assert!(allowed_transitions(Failed).contains(&Scanning));
    assert!(!allowed_transitions(ReportReady).contains(&Scanning));
}

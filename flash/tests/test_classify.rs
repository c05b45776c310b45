use anvil_flash::classify::{MarkerClassifier, OutcomeClassifier, ToolOutcome};

fn classifier() -> MarkerClassifier {
    MarkerClassifier::new(vec![2])
}

#[test]
fn test_error_marker_beats_zero_exit_code() {
    let outcome = classifier().classify(Some(0), "ERROR: EEPROM write rejected\n");
    match outcome {
        ToolOutcome::Failure(reason) => assert!(reason.contains("EEPROM write rejected")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_done_marker_beats_nonzero_exit_code() {
    let outcome = classifier().classify(Some(1), "programming nic 0 ... done\n");
    assert_eq!(outcome, ToolOutcome::Success);
}

#[test]
fn test_success_marker_is_recognized() {
    let outcome = classifier().classify(Some(1), "write SUCCESS\n");
    assert_eq!(outcome, ToolOutcome::Success);
}

#[test]
fn test_zero_exit_without_markers_is_success() {
    let outcome = classifier().classify(Some(0), "");
    assert_eq!(outcome, ToolOutcome::Success);
}

#[test]
fn test_allow_listed_exit_code_means_driver_absent() {
    let outcome = classifier().classify(Some(2), "");
    assert_eq!(outcome, ToolOutcome::DriverAbsent);
}

#[test]
fn test_exit_code_outside_the_allow_list_fails() {
    let outcome = MarkerClassifier::new(vec![77]).classify(Some(2), "");
    assert!(matches!(outcome, ToolOutcome::Failure(_)));
}

#[test]
fn test_substantial_output_resolves_ambiguous_signal_as_success() {
    let chatty = "register dump:\n".repeat(10);
    assert!(chatty.len() >= 80);
    let outcome = classifier().classify(Some(1), &chatty);
    assert_eq!(outcome, ToolOutcome::Success);
}

#[test]
fn test_short_output_with_bad_exit_code_fails() {
    let outcome = classifier().classify(Some(1), "nothing here");
    assert!(matches!(outcome, ToolOutcome::Failure(_)));
}

//! Task state machine with validated transitions.
//!
//! Created -> Running -> Done/Failed/Cancelled

use crate::error::TaskError;
use crate::types::TaskState;

/// Validate that a state transition is allowed.
///
/// Valid transitions:
/// - Created -> Running
/// - Running -> Done
/// - Running -> Failed
/// - Running -> Cancelled
pub fn validate_transition(from: TaskState, to: TaskState) -> Result<(), TaskError> {
    let valid = matches!(
        (from, to),
        (TaskState::Created, TaskState::Running)
            | (TaskState::Running, TaskState::Done)
            | (TaskState::Running, TaskState::Failed)
            | (TaskState::Running, TaskState::Cancelled)
    );

    if valid {
        Ok(())
    } else {
        Err(TaskError::InvalidTransition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [TaskState; 5] = [
        TaskState::Created,
        TaskState::Running,
        TaskState::Done,
        TaskState::Failed,
        TaskState::Cancelled,
    ];

    #[test]
    fn test_created_to_running() {
        assert!(validate_transition(TaskState::Created, TaskState::Running).is_ok());
    }

    #[test]
    fn test_running_to_terminal_states() {
        assert!(validate_transition(TaskState::Running, TaskState::Done).is_ok());
        assert!(validate_transition(TaskState::Running, TaskState::Failed).is_ok());
        assert!(validate_transition(TaskState::Running, TaskState::Cancelled).is_ok());
    }

    #[test]
    fn test_created_cannot_skip_running() {
        assert!(validate_transition(TaskState::Created, TaskState::Done).is_err());
        assert!(validate_transition(TaskState::Created, TaskState::Failed).is_err());
        assert!(validate_transition(TaskState::Created, TaskState::Cancelled).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [TaskState::Done, TaskState::Failed, TaskState::Cancelled] {
            for to in ALL_STATES {
                assert!(validate_transition(from, to).is_err(), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_invalid_transition_error_message() {
        let err = validate_transition(TaskState::Done, TaskState::Running).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("done"));
        assert!(msg.contains("running"));
    }

    #[test]
    fn test_all_valid_transitions_count() {
        let mut valid_count = 0;
        for from in ALL_STATES {
            for to in ALL_STATES {
                if validate_transition(from, to).is_ok() {
                    valid_count += 1;
                }
            }
        }
        assert_eq!(valid_count, 4);
    }
}

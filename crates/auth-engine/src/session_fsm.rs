//! Session state machine using rust-fsm.
//!
//! The machine makes the session lifecycle explicit instead of deriving it
//! from storage checks:
//!
//! ```text
//! Unauthenticated --SignUpRequested--> Registering --SignUpAccepted--> AwaitingConfirmation
//! AwaitingConfirmation --ConfirmRequested--> Confirming --ConfirmAccepted--> Unauthenticated
//! Unauthenticated --SignInRequested--> Authenticating --SignInAccepted--> Authenticated
//! Unauthenticated --RestoreRequested--> Restoring --RestoreHit--> Authenticated
//! Authenticated --RefreshRequested--> Refreshing --RefreshAccepted/RefreshRejected--> Authenticated
//! Authenticated --SignOutRequested--> SigningOut --SignOutComplete--> Unauthenticated
//! ```
//!
//! A rejected refresh returns to `Authenticated`: the existing tokens are
//! left in place and the caller decides whether to force re-authentication.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro.
// This generates a module `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        SignUpRequested => Registering,
        SignInRequested => Authenticating,
        RestoreRequested => Restoring,
        // Confirmation can arrive in a fresh process that never saw the
        // sign-up happen.
        ConfirmRequested => Confirming
    },
    Registering => {
        SignUpAccepted => AwaitingConfirmation,
        SignUpRejected => Unauthenticated
    },
    AwaitingConfirmation => {
        ConfirmRequested => Confirming,
        // Re-registration resends the confirmation code.
        SignUpRequested => Registering,
        SignInRequested => Authenticating
    },
    Confirming => {
        ConfirmAccepted => Unauthenticated,
        ConfirmRejected => AwaitingConfirmation
    },
    Authenticating => {
        SignInAccepted => Authenticated,
        SignInRejected => Unauthenticated
    },
    Restoring => {
        RestoreHit => Authenticated,
        RestoreMiss => Unauthenticated
    },
    Authenticated => {
        RefreshRequested => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshAccepted => Authenticated,
        RefreshRejected => Authenticated
    },
    SigningOut => {
        SignOutComplete => Unauthenticated
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session state for external consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No credential state.
    Unauthenticated,
    /// Registration request in flight.
    Registering,
    /// Registered, waiting for the confirmation code to be submitted.
    AwaitingConfirmation,
    /// Confirmation request in flight.
    Confirming,
    /// Sign-in request in flight.
    Authenticating,
    /// Reading persisted credential state.
    Restoring,
    /// Holding a credential set.
    Authenticated,
    /// Token refresh in flight.
    Refreshing,
    /// Sign-out in progress.
    SigningOut,
}

impl SessionState {
    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::Registering
                | SessionState::Confirming
                | SessionState::Authenticating
                | SessionState::Restoring
                | SessionState::Refreshing
                | SessionState::SigningOut
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
            SessionMachineState::Registering => SessionState::Registering,
            SessionMachineState::AwaitingConfirmation => SessionState::AwaitingConfirmation,
            SessionMachineState::Confirming => SessionState::Confirming,
            SessionMachineState::Authenticating => SessionState::Authenticating,
            SessionMachineState::Restoring => SessionState::Restoring,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Refreshing => SessionState::Refreshing,
            SessionMachineState::SigningOut => SessionState::SigningOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_unauthenticated() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_sign_up_flow() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::SignUpRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Registering);

        machine
            .consume(&SessionMachineInput::SignUpAccepted)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::AwaitingConfirmation);

        machine
            .consume(&SessionMachineInput::ConfirmRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Confirming);

        machine
            .consume(&SessionMachineInput::ConfirmAccepted)
            .unwrap();
        // Confirmation creates no token state; the user still has to sign in.
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_rejected_confirmation_returns_to_awaiting() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::SignUpRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::SignUpAccepted)
            .unwrap();
        machine
            .consume(&SessionMachineInput::ConfirmRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::ConfirmRejected)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::AwaitingConfirmation);
    }

    #[test]
    fn test_sign_in_flow() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::SignInRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticating);

        machine
            .consume(&SessionMachineInput::SignInAccepted)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_sign_in_failure_returns_to_unauthenticated() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::SignInRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::SignInRejected)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_restore_flow() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::RestoreRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Restoring);

        machine.consume(&SessionMachineInput::RestoreHit).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_restore_miss() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::RestoreRequested)
            .unwrap();
        machine.consume(&SessionMachineInput::RestoreMiss).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_refresh_rejection_keeps_authenticated() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::SignInRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::SignInAccepted)
            .unwrap();
        machine
            .consume(&SessionMachineInput::RefreshRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);

        // Tokens stay in place after a failed refresh; the caller decides
        // whether to force re-authentication.
        machine
            .consume(&SessionMachineInput::RefreshRejected)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Authenticated);
    }

    #[test]
    fn test_sign_out_flow() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::SignInRequested)
            .unwrap();
        machine
            .consume(&SessionMachineInput::SignInAccepted)
            .unwrap();

        machine
            .consume(&SessionMachineInput::SignOutRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SigningOut);

        machine
            .consume(&SessionMachineInput::SignOutComplete)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
    }

    #[test]
    fn test_invalid_transition_returns_error() {
        let mut machine = SessionMachine::new();

        // Can't refresh without being authenticated.
        assert!(machine
            .consume(&SessionMachineInput::RefreshRequested)
            .is_err());

        // Can't claim a sign-in succeeded without one in flight.
        assert!(machine
            .consume(&SessionMachineInput::SignInAccepted)
            .is_err());
    }

    #[test]
    fn test_confirm_allowed_from_fresh_process() {
        let mut machine = SessionMachine::new();

        machine
            .consume(&SessionMachineInput::ConfirmRequested)
            .unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Confirming);
    }

    #[test]
    fn test_session_state_conversion() {
        assert_eq!(
            SessionState::from(&SessionMachineState::Unauthenticated),
            SessionState::Unauthenticated
        );
        assert_eq!(
            SessionState::from(&SessionMachineState::Authenticated),
            SessionState::Authenticated
        );
        assert_eq!(
            SessionState::from(&SessionMachineState::Refreshing),
            SessionState::Refreshing
        );
    }

    #[test]
    fn test_session_state_is_transient() {
        assert!(!SessionState::Unauthenticated.is_transient());
        assert!(!SessionState::AwaitingConfirmation.is_transient());
        assert!(!SessionState::Authenticated.is_transient());
        assert!(SessionState::Registering.is_transient());
        assert!(SessionState::Confirming.is_transient());
        assert!(SessionState::Authenticating.is_transient());
        assert!(SessionState::Restoring.is_transient());
        assert!(SessionState::Refreshing.is_transient());
        assert!(SessionState::SigningOut.is_transient());
    }
}

//! Validated state transitions for the three pairing procedures.
//!
//! Each procedure is a strictly linear exchange of numbered messages;
//! any parsed inbound TLV carrying the wrong state, or an `kError`
//! tag, aborts the procedure from wherever it was.

use hap_core::{Error, Result};

/// Pair-Setup progress. `AwaitingM5` only occurs when the Transient
/// flag was not set; a transient-only exchange moves straight from
/// `AwaitingM4` to `Completed` without emitting M5/M6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSetupState {
    Start,
    AwaitingM2,
    AwaitingM4,
    AwaitingM6,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSetupEvent {
    SentM1,
    ReceivedM2,
    SentM3,
    ReceivedM4Transient,
    ReceivedM4Full,
    SentM5,
    ReceivedM6,
    AccessoryRejected,
}

#[derive(Debug)]
pub struct PairSetupMachine {
    state: PairSetupState,
}

impl PairSetupMachine {
    pub fn new() -> Self {
        Self { state: PairSetupState::Start }
    }

    pub fn state(&self) -> PairSetupState {
        self.state
    }

    pub fn transition(&mut self, event: PairSetupEvent) -> Result<PairSetupState> {
        use PairSetupEvent as E;
        use PairSetupState as S;

        let next = match (self.state, event) {
            (S::Start, E::SentM1) => S::AwaitingM2,
            (S::AwaitingM2, E::ReceivedM2) => S::AwaitingM2,
            (S::AwaitingM2, E::SentM3) => S::AwaitingM4,
            (S::AwaitingM4, E::ReceivedM4Transient) => S::Completed,
            (S::AwaitingM4, E::ReceivedM4Full) => S::AwaitingM4,
            (S::AwaitingM4, E::SentM5) => S::AwaitingM6,
            (S::AwaitingM6, E::ReceivedM6) => S::Completed,
            (_, E::AccessoryRejected) => S::Aborted,
            (from, event) => {
                return Err(Error::protocol(format!(
                    "invalid pair-setup transition: {event:?} from {from:?}"
                )))
            }
        };

        self.state = next;
        Ok(next)
    }
}

impl Default for PairSetupMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Pair-Verify progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairVerifyState {
    Start,
    AwaitingM2,
    AwaitingM4,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairVerifyEvent {
    SentM1,
    ReceivedM2,
    SentM3,
    ReceivedM4,
    AccessoryRejected,
}

#[derive(Debug)]
pub struct PairVerifyMachine {
    state: PairVerifyState,
}

impl PairVerifyMachine {
    pub fn new() -> Self {
        Self { state: PairVerifyState::Start }
    }

    pub fn state(&self) -> PairVerifyState {
        self.state
    }

    pub fn transition(&mut self, event: PairVerifyEvent) -> Result<PairVerifyState> {
        use PairVerifyEvent as E;
        use PairVerifyState as S;

        let next = match (self.state, event) {
            (S::Start, E::SentM1) => S::AwaitingM2,
            (S::AwaitingM2, E::ReceivedM2) => S::AwaitingM2,
            (S::AwaitingM2, E::SentM3) => S::AwaitingM4,
            (S::AwaitingM4, E::ReceivedM4) => S::Completed,
            (_, E::AccessoryRejected) => S::Aborted,
            (from, event) => {
                return Err(Error::protocol(format!(
                    "invalid pair-verify transition: {event:?} from {from:?}"
                )))
            }
        };

        self.state = next;
        Ok(next)
    }
}

impl Default for PairVerifyMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Pair-Resume progress. A failed decrypt on M2 falls back to a full
/// verify rather than aborting the connection outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairResumeState {
    Start,
    AwaitingM2,
    Completed,
    FellBackToVerify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairResumeEvent {
    SentM1,
    ReceivedM2,
    DecryptionFailed,
}

#[derive(Debug)]
pub struct PairResumeMachine {
    state: PairResumeState,
}

impl PairResumeMachine {
    pub fn new() -> Self {
        Self { state: PairResumeState::Start }
    }

    pub fn state(&self) -> PairResumeState {
        self.state
    }

    pub fn transition(&mut self, event: PairResumeEvent) -> Result<PairResumeState> {
        use PairResumeEvent as E;
        use PairResumeState as S;

        let next = match (self.state, event) {
            (S::Start, E::SentM1) => S::AwaitingM2,
            (S::AwaitingM2, E::ReceivedM2) => S::Completed,
            (S::AwaitingM2, E::DecryptionFailed) => S::FellBackToVerify,
            (from, event) => {
                return Err(Error::protocol(format!(
                    "invalid pair-resume transition: {event:?} from {from:?}"
                )))
            }
        };

        self.state = next;
        Ok(next)
    }
}

impl Default for PairResumeMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_setup_full_happy_path() {
        let mut m = PairSetupMachine::new();
        assert_eq!(m.transition(PairSetupEvent::SentM1).unwrap(), PairSetupState::AwaitingM2);
        assert_eq!(m.transition(PairSetupEvent::ReceivedM2).unwrap(), PairSetupState::AwaitingM2);
        assert_eq!(m.transition(PairSetupEvent::SentM3).unwrap(), PairSetupState::AwaitingM4);
        assert_eq!(m.transition(PairSetupEvent::ReceivedM4Full).unwrap(), PairSetupState::AwaitingM4);
        assert_eq!(m.transition(PairSetupEvent::SentM5).unwrap(), PairSetupState::AwaitingM6);
        assert_eq!(m.transition(PairSetupEvent::ReceivedM6).unwrap(), PairSetupState::Completed);
    }

    #[test]
    fn pair_setup_transient_skips_m5_m6() {
        let mut m = PairSetupMachine::new();
        m.transition(PairSetupEvent::SentM1).unwrap();
        m.transition(PairSetupEvent::ReceivedM2).unwrap();
        m.transition(PairSetupEvent::SentM3).unwrap();
        assert_eq!(
            m.transition(PairSetupEvent::ReceivedM4Transient).unwrap(),
            PairSetupState::Completed
        );
    }

    #[test]
    fn pair_setup_rejects_out_of_order_event() {
        let mut m = PairSetupMachine::new();
        assert!(m.transition(PairSetupEvent::ReceivedM2).is_err());
    }

    #[test]
    fn accessory_rejection_aborts_from_any_state() {
        let mut m = PairSetupMachine::new();
        m.transition(PairSetupEvent::SentM1).unwrap();
        assert_eq!(
            m.transition(PairSetupEvent::AccessoryRejected).unwrap(),
            PairSetupState::Aborted
        );
    }

    #[test]
    fn pair_verify_happy_path() {
        let mut m = PairVerifyMachine::new();
        m.transition(PairVerifyEvent::SentM1).unwrap();
        m.transition(PairVerifyEvent::ReceivedM2).unwrap();
        m.transition(PairVerifyEvent::SentM3).unwrap();
        assert_eq!(m.transition(PairVerifyEvent::ReceivedM4).unwrap(), PairVerifyState::Completed);
    }

    #[test]
    fn pair_resume_falls_back_on_decrypt_failure() {
        let mut m = PairResumeMachine::new();
        m.transition(PairResumeEvent::SentM1).unwrap();
        assert_eq!(
            m.transition(PairResumeEvent::DecryptionFailed).unwrap(),
            PairResumeState::FellBackToVerify
        );
    }
}

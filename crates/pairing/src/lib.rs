//! Pair-Setup, Pair-Verify, Pair-Resume and pairings management for
//! the HomeKit Accessory Protocol controller.
//!
//! Each procedure is driven by feeding it the accessory's messages in
//! order; the state machines in [`state_machine`] reject anything out
//! of sequence. None of this module talks to a socket directly — that
//! is `hap-transport-ip`/`hap-transport-ble`'s job.

pub mod error_code;
pub mod message;
pub mod pairings;
pub mod pin;
pub mod resume;
pub mod setup;
pub mod state_machine;
pub mod tag;
pub mod types;
pub mod verify;

pub use error_code::ErrorCode;
pub use resume::{AfterM2 as AfterPairResumeM2, PairResume};
pub use setup::{AfterM4 as AfterPairSetupM4, PairSetup};
pub use tag::{Method, Permission};
pub use types::{FrameCounters, PairingData, PairingDataHex, ResumeState, SessionKeys};
pub use verify::PairVerify;

//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Images arrive base64-encoded.

mod admin;
pub use admin::{
    AdminCredentials, CredentialError, EnrolledVoter, VoterEnrollment, MIN_PASSWORD_LENGTH,
};

mod auth;
pub use auth::{CodeSubmission, FaceSubmission, VoterLogin};

mod ballot;
pub use ballot::{BallotChoice, BallotView};

mod outcome;
pub use outcome::{NextStep, StepOutcome};

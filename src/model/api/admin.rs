use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::db::{NewAdmin, Voter};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("admin username must not be empty")]
    EmptyUsername,
    #[error("admin password must be at least {MIN_PASSWORD_LENGTH} characters")]
    ShortPassword,
    #[error(transparent)]
    Hash(#[from] argon2::Error),
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = CredentialError;

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    /// This enforces that the username is non-empty, and the password meets minimum length.
    fn try_from(cred: AdminCredentials) -> Result<Self, Self::Error> {
        if cred.username.trim().is_empty() {
            return Err(CredentialError::EmptyUsername);
        }
        if cred.password.len() < MIN_PASSWORD_LENGTH {
            return Err(CredentialError::ShortPassword);
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default())?;
        Ok(Self {
            username: cred.username,
            password_hash,
        })
    }
}

/// A voter to enroll, as typed in by an admin.
#[derive(Clone, Deserialize, Serialize)]
pub struct VoterEnrollment {
    pub aadhaar: String,
    pub mobile: String,
}

/// Confirmation of an enrollment. The identity number is not echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnrolledVoter {
    pub voter_id: String,
    pub mobile: String,
}

impl From<Voter> for EnrolledVoter {
    fn from(voter: Voter) -> Self {
        Self {
            voter_id: voter.id.to_string(),
            mobile: voter.mobile.to_string(),
        }
    }
}

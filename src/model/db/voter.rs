use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{auth::IdentityHash, mobile::Mobile, mongodb::Id};

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// Keyed digest of the voter's identity number; the number itself is
    /// never stored.
    pub identity_hash: IdentityHash,
    pub mobile: Mobile,
    /// Flips to true exactly once, alongside the vote being recorded.
    pub has_voted: bool,
}

impl VoterCore {
    /// Create a new voter who has not yet voted.
    pub fn new(identity_hash: IdentityHash, mobile: Mobile) -> Self {
        Self {
            identity_hash,
            mobile,
            has_voted: false,
        }
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

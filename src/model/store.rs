use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    auth::IdentityHash,
    ballot::{CandidateSet, ResetSummary, Tally},
    db::{Admin, NewAdmin, NewVoter, Vote, Voter},
    mobile::Mobile,
    mongodb::Id,
};

/// Persistent voter and admin records.
#[rocket::async_trait]
pub trait IdentityStore: Send + Sync {
    /// The voter with this identity hash, provided the mobile number matches too.
    async fn find_voter(
        &self,
        identity_hash: &IdentityHash,
        mobile: &Mobile,
    ) -> Result<Option<Voter>>;

    async fn find_admin(&self, username: &str) -> Result<Option<Admin>>;

    /// Enroll a voter. Fails with [`Rejection::DuplicateIdentity`] if the
    /// identity hash is already registered.
    ///
    /// [`Rejection::DuplicateIdentity`]: crate::error::Rejection::DuplicateIdentity
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter>;

    /// Insert the admin if no admin exists yet. Returns whether it was inserted.
    async fn ensure_admin(&self, admin: NewAdmin) -> Result<bool>;

    async fn count_voters(&self) -> Result<u64>;
}

/// The record of votes cast.
#[rocket::async_trait]
pub trait BallotLedger: Send + Sync {
    /// Record a vote and flip the voter's `has_voted` flag as one atomic
    /// unit. Fails with [`Rejection::AlreadyVoted`] if the flag is already
    /// set, in which case nothing changes.
    ///
    /// The candidate must already have been validated against the ballot.
    ///
    /// [`Rejection::AlreadyVoted`]: crate::error::Rejection::AlreadyVoted
    async fn cast_vote(&self, voter_id: Id, candidate: &str) -> Result<Vote>;

    /// Count the votes for every candidate.
    async fn tally(&self, candidates: &CandidateSet) -> Result<Tally>;

    /// Delete every vote and clear every `has_voted` flag, atomically.
    async fn reset(&self) -> Result<ResetSummary>;
}

/// A complete backend: identities plus the ledger that refers to them.
pub trait Store: IdentityStore + BallotLedger {}

impl<T: IdentityStore + BallotLedger> Store for T {}

/// The store as held in Rocket's managed state.
pub type SharedStore = Arc<dyn Store>;

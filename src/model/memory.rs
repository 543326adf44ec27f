use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Rejection, Result};
use crate::model::{
    auth::IdentityHash,
    ballot::{CandidateSet, ResetSummary, Tally},
    db::{Admin, NewAdmin, NewVote, NewVoter, Vote, Voter},
    mobile::Mobile,
    mongodb::Id,
    store::{BallotLedger, IdentityStore},
};

/// A volatile store for development and tests. Every operation runs under
/// one lock, so each is trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    voters: Vec<Voter>,
    admins: Vec<Admin>,
    votes: Vec<Vote>,
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Corrupt("in-memory store lock poisoned".to_string()))
    }
}

#[rocket::async_trait]
impl IdentityStore for MemoryStore {
    async fn find_voter(
        &self,
        identity_hash: &IdentityHash,
        mobile: &Mobile,
    ) -> Result<Option<Voter>> {
        let tables = self.lock()?;
        Ok(tables
            .voters
            .iter()
            .find(|v| v.identity_hash == *identity_hash && v.mobile == *mobile)
            .cloned())
    }

    async fn find_admin(&self, username: &str) -> Result<Option<Admin>> {
        let tables = self.lock()?;
        Ok(tables.admins.iter().find(|a| a.username == username).cloned())
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let mut tables = self.lock()?;
        if tables
            .voters
            .iter()
            .any(|v| v.identity_hash == voter.identity_hash)
        {
            return Err(Rejection::DuplicateIdentity.into());
        }
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        tables.voters.push(voter.clone());
        Ok(voter)
    }

    async fn ensure_admin(&self, admin: NewAdmin) -> Result<bool> {
        let mut tables = self.lock()?;
        if !tables.admins.is_empty() {
            return Ok(false);
        }
        tables.admins.push(Admin {
            id: Id::new(),
            admin,
        });
        Ok(true)
    }

    async fn count_voters(&self) -> Result<u64> {
        Ok(self.lock()?.voters.len() as u64)
    }
}

#[rocket::async_trait]
impl BallotLedger for MemoryStore {
    async fn cast_vote(&self, voter_id: Id, candidate: &str) -> Result<Vote> {
        let mut tables = self.lock()?;
        let voter = tables
            .voters
            .iter_mut()
            .find(|v| v.id == voter_id)
            .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
        if voter.has_voted {
            return Err(Rejection::AlreadyVoted.into());
        }
        voter.has_voted = true;

        let vote = Vote {
            id: Id::new(),
            vote: NewVote::new(voter_id, candidate.to_string()),
        };
        tables.votes.push(vote.clone());
        Ok(vote)
    }

    async fn tally(&self, candidates: &CandidateSet) -> Result<Tally> {
        let tables = self.lock()?;
        let mut counts = HashMap::new();
        for vote in &tables.votes {
            *counts.entry(vote.candidate.clone()).or_insert(0) += 1;
        }
        Ok(Tally::from_counts(
            candidates,
            counts,
            tables.voters.len() as u64,
        ))
    }

    async fn reset(&self) -> Result<ResetSummary> {
        let mut tables = self.lock()?;
        let votes_deleted = tables.votes.len() as u64;
        tables.votes.clear();
        let mut voters_reset = 0;
        for voter in tables.voters.iter_mut().filter(|v| v.has_voted) {
            voter.has_voted = false;
            voters_reset += 1;
        }
        Ok(ResetSummary {
            votes_deleted,
            voters_reset,
        })
    }
}

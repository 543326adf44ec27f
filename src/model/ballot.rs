use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Rejection;

/// The closed, ordered set of candidates on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CandidateSet(Vec<String>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateSetError {
    #[error("at least one candidate is required")]
    Empty,
    #[error("candidate names must not be blank")]
    BlankName,
    #[error("candidate '{0}' is listed more than once")]
    Duplicate(String),
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Look up a submitted choice, returning the canonical name.
    pub fn resolve(&self, choice: &str) -> Result<&str, Rejection> {
        let choice = choice.trim();
        self.iter()
            .find(|name| *name == choice)
            .ok_or_else(|| Rejection::InvalidCandidate(choice.to_string()))
    }
}

impl TryFrom<Vec<String>> for CandidateSet {
    type Error = CandidateSetError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        if names.is_empty() {
            return Err(CandidateSetError::Empty);
        }
        let mut seen = HashSet::with_capacity(names.len());
        let mut candidates = Vec::with_capacity(names.len());
        for name in names {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CandidateSetError::BlankName);
            }
            if !seen.insert(name.clone()) {
                return Err(CandidateSetError::Duplicate(name));
            }
            candidates.push(name);
        }
        Ok(Self(candidates))
    }
}

impl From<CandidateSet> for Vec<String> {
    fn from(set: CandidateSet) -> Self {
        set.0
    }
}

/// One row of the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate: String,
    pub votes: u64,
    /// Share of all votes cast, in percent, to one decimal place.
    pub pct: f64,
}

/// Aggregated results, as shown on the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Ordered by votes descending, then name.
    pub results: Vec<CandidateResult>,
    pub total_votes: u64,
    /// Registered voters, whether or not they have voted.
    pub voters_count: u64,
}

impl Tally {
    /// Build the tally from raw per-candidate counts. Every configured
    /// candidate is listed, including those with no votes; counts for any
    /// other name are listed too rather than silently dropped.
    pub fn from_counts(
        candidates: &CandidateSet,
        mut counts: HashMap<String, u64>,
        voters_count: u64,
    ) -> Self {
        let total_votes: u64 = counts.values().sum();
        let mut rows = candidates
            .iter()
            .map(|name| (name.to_string(), counts.remove(name).unwrap_or(0)))
            .collect::<Vec<_>>();
        rows.extend(counts);
        let mut results = rows
            .into_iter()
            .map(|(candidate, votes)| CandidateResult {
                candidate,
                votes,
                pct: percentage(votes, total_votes),
            })
            .collect::<Vec<_>>();
        results.sort_by(|a, b| match b.votes.cmp(&a.votes) {
            Ordering::Equal => a.candidate.cmp(&b.candidate),
            ordering => ordering,
        });

        Self {
            results,
            total_votes,
            voters_count,
        }
    }

    pub fn votes_for(&self, candidate: &str) -> Option<&CandidateResult> {
        self.results.iter().find(|r| r.candidate == candidate)
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (votes as f64 * 1000.0 / total as f64).round() / 10.0
}

/// What an administrative reset removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub votes_deleted: u64,
    pub voters_reset: u64,
}

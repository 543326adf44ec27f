//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

mod admin;
pub use admin::{Admin, AdminCore, NewAdmin};

mod vote;
pub use vote::{NewVote, Vote, VoteCore};

mod voter;
pub use voter::{NewVoter, Voter, VoterCore};

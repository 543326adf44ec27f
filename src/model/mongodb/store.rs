use std::collections::HashMap;

use log::{debug, warn};
use mongodb::{
    bson::{doc, Bson},
    error::{Error as DbError, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::SessionOptions,
    Client, ClientSession, Database,
};

use crate::error::{Error, Rejection, Result};
use crate::model::{
    auth::IdentityHash,
    ballot::{CandidateSet, ResetSummary, Tally},
    db::{Admin, NewAdmin, NewVote, NewVoter, Vote, Voter},
    mobile::Mobile,
    store::{BallotLedger, IdentityStore},
};

use super::{ensure_indexes_exist, is_duplicate_key_error, is_transient, Coll, Id};

/// How many times a transaction is attempted before a transient failure is
/// reported.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// The production store. Multi-document transactions require the server to
/// be a replica set member.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect to the server and make sure the indexes are in place.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Self::with_client(client, db_name).await
    }

    pub async fn with_client(client: Client, db_name: &str) -> Result<Self> {
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        Ok(Self { client, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Flip the voter's flag and record the vote inside the session's open
    /// transaction.
    async fn cast_in_transaction(
        &self,
        session: &mut ClientSession,
        voter_id: Id,
        candidate: &str,
    ) -> Result<Vote> {
        let voters = Coll::<Voter>::from_db(&self.db);
        let filter = doc! {
            "_id": voter_id,
            "has_voted": false,
        };
        let update = doc! {
            "$set": { "has_voted": true }
        };
        let flipped = voters
            .update_one_with_session(filter, update, None, session)
            .await?;
        if flipped.matched_count == 0 {
            return match voters
                .find_one_with_session(voter_id.as_doc(), None, session)
                .await?
            {
                Some(_) => Err(Rejection::AlreadyVoted.into()),
                None => Err(Error::not_found(format!("Voter {voter_id}"))),
            };
        }

        let vote = NewVote::new(voter_id, candidate.to_string());
        let inserted = Coll::<NewVote>::from_db(&self.db)
            .insert_one_with_session(&vote, None, session)
            .await;
        if is_duplicate_key_error(inserted.as_ref()) {
            return Err(Rejection::AlreadyVoted.into());
        }
        let id = inserted?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Corrupt("vote inserted without an ObjectId".to_string()))?;

        Ok(Vote {
            id: id.into(),
            vote,
        })
    }
}

/// Commit the session's transaction, retrying while the outcome is unknown.
async fn commit(session: &mut ClientSession) -> std::result::Result<(), DbError> {
    let mut attempts = 1;
    loop {
        match session.commit_transaction().await {
            Err(e)
                if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempts < MAX_TRANSACTION_ATTEMPTS =>
            {
                debug!("Commit outcome unknown, retrying: {e}");
                attempts += 1;
            }
            result => return result,
        }
    }
}

/// Abort the session's transaction. The server may already have aborted it,
/// so failure here is not interesting.
async fn abort(session: &mut ClientSession) {
    if let Err(e) = session.abort_transaction().await {
        debug!("Abort failed: {e}");
    }
}

#[rocket::async_trait]
impl IdentityStore for MongoStore {
    async fn find_voter(
        &self,
        identity_hash: &IdentityHash,
        mobile: &Mobile,
    ) -> Result<Option<Voter>> {
        let filter = doc! {
            "identity_hash": identity_hash.as_str(),
            "mobile": mobile.to_string(),
        };
        Ok(Coll::<Voter>::from_db(&self.db)
            .find_one(filter, None)
            .await?)
    }

    async fn find_admin(&self, username: &str) -> Result<Option<Admin>> {
        let filter = doc! {
            "username": username,
        };
        Ok(Coll::<Admin>::from_db(&self.db)
            .find_one(filter, None)
            .await?)
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let inserted = Coll::<NewVoter>::from_db(&self.db)
            .insert_one(&voter, None)
            .await;
        if is_duplicate_key_error(inserted.as_ref()) {
            return Err(Rejection::DuplicateIdentity.into());
        }
        let id = inserted?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Corrupt("voter inserted without an ObjectId".to_string()))?;
        Ok(Voter {
            id: id.into(),
            voter,
        })
    }

    async fn ensure_admin(&self, admin: NewAdmin) -> Result<bool> {
        let admins = Coll::<NewAdmin>::from_db(&self.db);
        if admins.count_documents(None, None).await? > 0 {
            return Ok(false);
        }
        let inserted = admins.insert_one(&admin, None).await;
        if is_duplicate_key_error(inserted.as_ref()) {
            // Another instance seeded it first.
            return Ok(false);
        }
        inserted?;
        Ok(true)
    }

    async fn count_voters(&self) -> Result<u64> {
        Ok(Coll::<Voter>::from_db(&self.db)
            .count_documents(None, None)
            .await?)
    }
}

#[rocket::async_trait]
impl BallotLedger for MongoStore {
    async fn cast_vote(&self, voter_id: Id, candidate: &str) -> Result<Vote> {
        let mut session = self.client.start_session(None).await?;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let retry = attempts < MAX_TRANSACTION_ATTEMPTS;
            session.start_transaction(None).await?;

            let vote = match self
                .cast_in_transaction(&mut session, voter_id, candidate)
                .await
            {
                Ok(vote) => vote,
                Err(Error::Db(e)) if retry && is_transient(&e) => {
                    abort(&mut session).await;
                    warn!("Vote transaction for voter {voter_id} conflicted, retrying: {e}");
                    continue;
                }
                Err(e) => {
                    abort(&mut session).await;
                    return Err(e);
                }
            };

            match commit(&mut session).await {
                Ok(()) => return Ok(vote),
                Err(e) if retry && is_transient(&e) => {
                    warn!("Vote commit for voter {voter_id} failed, retrying: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn tally(&self, candidates: &CandidateSet) -> Result<Tally> {
        // Read the votes and the voter count from one consistent snapshot.
        let options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(options)).await?;

        let pipeline = [doc! {
            "$group": { "_id": "$candidate", "count": { "$sum": 1 } }
        }];
        let mut cursor = Coll::<Vote>::from_db(&self.db)
            .aggregate_with_session(pipeline, None, &mut session)
            .await?;
        let mut counts = HashMap::new();
        while let Some(row) = cursor.next(&mut session).await {
            let row = row?;
            let candidate = row
                .get_str("_id")
                .map_err(|e| Error::Corrupt(format!("vote tally row: {e}")))?;
            let count = match row.get("count") {
                Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
                Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
                other => {
                    return Err(Error::Corrupt(format!("vote tally count: {other:?}")));
                }
            };
            counts.insert(candidate.to_string(), count);
        }

        let voters_count = Coll::<Voter>::from_db(&self.db)
            .count_documents_with_session(None, None, &mut session)
            .await?;

        Ok(Tally::from_counts(candidates, counts, voters_count))
    }

    async fn reset(&self) -> Result<ResetSummary> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let deleted = Coll::<Vote>::from_db(&self.db)
            .delete_many_with_session(doc! {}, None, &mut session)
            .await;
        let deleted = match deleted {
            Ok(deleted) => deleted,
            Err(e) => {
                abort(&mut session).await;
                return Err(e.into());
            }
        };
        let filter = doc! { "has_voted": true };
        let update = doc! { "$set": { "has_voted": false } };
        let updated = Coll::<Voter>::from_db(&self.db)
            .update_many_with_session(filter, update, None, &mut session)
            .await;
        let updated = match updated {
            Ok(updated) => updated,
            Err(e) => {
                abort(&mut session).await;
                return Err(e.into());
            }
        };
        commit(&mut session).await?;

        Ok(ResetSummary {
            votes_deleted: deleted.deleted_count,
            voters_reset: updated.modified_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::Database;
    use rocket::tokio::sync::Barrier;

    use super::*;
    use crate::model::{api::AdminCredentials, auth::IdentityHasher, db::AdminCore};

    fn rejection<T: std::fmt::Debug>(result: Result<T>) -> Rejection {
        match result {
            Err(Error::Rejected(rejection)) => rejection,
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[mongo_test]
    async fn voters_round_trip(store: MongoStore, voters: Coll<Voter>) {
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        let stored = voters.find_one(voter.id.as_doc(), None).await.unwrap().unwrap();
        assert_eq!(stored, voter);

        let found = store
            .find_voter(&IdentityHash::example(), &Mobile::example())
            .await
            .unwrap();
        assert_eq!(found, Some(voter));
        let wrong_mobile = store
            .find_voter(&IdentityHash::example(), &Mobile::example2())
            .await
            .unwrap();
        assert_eq!(wrong_mobile, None);

        let mut duplicate = NewVoter::example();
        duplicate.mobile = Mobile::example2();
        assert_eq!(
            rejection(store.insert_voter(duplicate).await),
            Rejection::DuplicateIdentity
        );
        assert_eq!(store.count_voters().await.unwrap(), 1);
    }

    #[mongo_test]
    async fn admin_seeded_once(store: MongoStore) {
        assert!(store.ensure_admin(AdminCore::example()).await.unwrap());
        assert!(!store.ensure_admin(AdminCore::example()).await.unwrap());
        let admin = store.find_admin("coordinator").await.unwrap().unwrap();
        assert!(admin.verify_password(AdminCredentials::example().password));
        assert!(store.find_admin("nobody").await.unwrap().is_none());
    }

    #[mongo_test]
    async fn second_vote_is_refused(store: MongoStore, votes: Coll<Vote>) {
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        store.cast_vote(voter.id, "Alice").await.unwrap();
        assert_eq!(
            rejection(store.cast_vote(voter.id, "Bob").await),
            Rejection::AlreadyVoted
        );
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);

        let result = store.cast_vote(Id::new(), "Alice").await;
        assert!(matches!(result, Err(Error::Status(_, _))));
    }

    #[mongo_test]
    async fn concurrent_votes_only_one_lands(store: MongoStore, votes: Coll<Vote>) {
        const TASKS: usize = 4;

        let voter_id = store.insert_voter(NewVoter::example()).await.unwrap().id;
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(TASKS));
        let handles = (0..TASKS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                rocket::tokio::spawn(async move {
                    barrier.wait().await;
                    store.cast_vote(voter_id, "Bob").await
                })
            })
            .collect::<Vec<_>>();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.into_iter().filter(Result::is_err) {
            assert_eq!(rejection(result), Rejection::AlreadyVoted);
        }
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
    }

    #[mongo_test]
    async fn tally_and_reset(store: MongoStore, db: Database) {
        let hasher = IdentityHasher::example();
        let mut voters = Vec::new();
        for n in 0..10_u64 {
            let voter = NewVoter::new(
                hasher.hash(&format!("{:012}", 200_000_000_000 + n)),
                Mobile::parse(&format!("96000{:05}", n), 91).unwrap(),
            );
            voters.push(store.insert_voter(voter).await.unwrap());
        }

        let empty = store.tally(&CandidateSet::example()).await.unwrap();
        assert_eq!(empty.total_votes, 0);
        assert!(empty.results.iter().all(|r| r.pct == 0.0));

        for (voter, candidate) in voters.iter().zip(["Alice", "Bob", "Alice", "Alice"]) {
            store.cast_vote(voter.id, candidate).await.unwrap();
        }
        let tally = store.tally(&CandidateSet::example()).await.unwrap();
        assert_eq!(tally.total_votes, 4);
        assert_eq!(tally.voters_count, 10);
        assert_eq!(tally.results[0].candidate, "Alice");
        assert_eq!(tally.results[0].pct, 75.0);
        assert_eq!(tally.votes_for("Bob").unwrap().pct, 25.0);

        let summary = store.reset().await.unwrap();
        assert_eq!(
            summary,
            ResetSummary {
                votes_deleted: 4,
                voters_reset: 4
            }
        );
        let voted = Coll::<Voter>::from_db(&db)
            .count_documents(doc! { "has_voted": true }, None)
            .await
            .unwrap();
        assert_eq!(voted, 0);
    }
}

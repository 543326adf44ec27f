use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use data_encoding::HEXLOWER;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Random name of a server-side session record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Self(HEXLOWER.encode(&bytes))
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live sessions, each with the revision of the one cookie that may still
/// act for it. A cookie naming a closed or expired session, or carrying any
/// other revision, is stale.
#[derive(Default)]
pub struct SessionRegistry {
    live: Mutex<HashMap<SessionId, Record>>,
}

#[derive(Debug)]
struct Record {
    revision: u32,
    expires_at: DateTime<Utc>,
}

impl SessionRegistry {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, Record>>> {
        self.live
            .lock()
            .map_err(|_| Error::Corrupt("session registry lock poisoned".to_string()))
    }

    /// Record a new session at revision 0, dropping any that have expired.
    pub fn open(&self, sid: &SessionId, now: DateTime<Utc>, ttl: Duration) -> Result<()> {
        let mut live = self.lock()?;
        live.retain(|_, record| record.expires_at > now);
        live.insert(
            sid.clone(),
            Record {
                revision: 0,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    pub fn is_current(&self, sid: &SessionId, revision: u32, now: DateTime<Utc>) -> Result<bool> {
        let live = self.lock()?;
        Ok(matches!(
            live.get(sid),
            Some(record) if record.revision == revision && record.expires_at > now
        ))
    }

    /// Move a session on from revision `seen` to the next one and extend its
    /// life. Returns `false`, changing nothing, if `seen` is no longer current.
    pub fn advance(
        &self,
        sid: &SessionId,
        seen: u32,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut live = self.lock()?;
        match live.get_mut(sid) {
            Some(record) if record.revision == seen && record.expires_at > now => {
                record.revision = seen + 1;
                record.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn close(&self, sid: &SessionId) -> Result<()> {
        self.lock()?.remove(sid);
        Ok(())
    }

    /// Number of sessions on record, expired or not.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Duration {
        Duration::minutes(15)
    }

    #[test]
    fn ids_are_distinct() {
        let first = SessionId::random();
        assert_eq!(first.to_string().len(), 32);
        assert_ne!(first, SessionId::random());
    }

    #[test]
    fn only_the_latest_revision_is_current() {
        let registry = SessionRegistry::default();
        let sid = SessionId::random();
        let now = Utc::now();
        registry.open(&sid, now, ttl()).unwrap();
        assert!(registry.is_current(&sid, 0, now).unwrap());

        assert!(registry.advance(&sid, 0, now, ttl()).unwrap());
        assert!(!registry.is_current(&sid, 0, now).unwrap());
        assert!(registry.is_current(&sid, 1, now).unwrap());

        // A second writer holding revision 0 loses.
        assert!(!registry.advance(&sid, 0, now, ttl()).unwrap());
        assert!(registry.is_current(&sid, 1, now).unwrap());
    }

    #[test]
    fn closed_sessions_stay_closed() {
        let registry = SessionRegistry::default();
        let sid = SessionId::random();
        let now = Utc::now();
        registry.open(&sid, now, ttl()).unwrap();
        registry.close(&sid).unwrap();
        assert!(!registry.is_current(&sid, 0, now).unwrap());
        assert!(!registry.advance(&sid, 0, now, ttl()).unwrap());
        // Closing twice is harmless.
        registry.close(&sid).unwrap();
    }

    #[test]
    fn expiry() {
        let registry = SessionRegistry::default();
        let old = SessionId::random();
        let now = Utc::now();
        registry.open(&old, now, ttl()).unwrap();

        let later = now + ttl() + Duration::seconds(1);
        assert!(!registry.is_current(&old, 0, later).unwrap());
        assert!(!registry.advance(&old, 0, later, ttl()).unwrap());

        // Expired records are swept when the next session opens.
        registry.open(&SessionId::random(), later, ttl()).unwrap();
        assert_eq!(registry.count().unwrap(), 1);
    }
}

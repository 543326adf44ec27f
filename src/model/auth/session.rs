use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use jsonwebtoken::{
    errors::Error as JwtError, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use rocket::{
    http::{Cookie, SameSite},
    time,
};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    config::Config,
    error::{self, Rejection},
    face::ReferenceKey,
    model::{mongodb::Id, otp::Code},
};

use super::{Role, SessionId};

pub const SESSION_COOKIE: &str = "session";

/// Position in the ordered authentication sequence. A session with no cookie
/// at all is anonymous.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Stage {
    /// First factor passed; a one-time code is outstanding.
    Identified = 0,
    /// Second factor passed; waiting on a face.
    Challenged = 1,
    /// All three factors passed.
    Verified = 2,
}

/// Who is being authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Record ID of the admin or voter.
    pub id: Id,
    /// Key of the biometric reference this subject is checked against.
    #[serde(rename = "ref")]
    pub reference: ReferenceKey,
}

/// Per-attempt authentication state. All transitions are pure functions of
/// the current state, the submitted factor and the current time; the state
/// travels to and from the client in a signed, encrypted cookie. Each write
/// bumps `revision`, and only the latest revision of a session on record with
/// the [`SessionRegistry`](super::SessionRegistry) is honoured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    sid: SessionId,
    #[serde(rename = "rev")]
    revision: u32,
    #[serde(rename = "rol")]
    role: Role,
    #[serde(rename = "sbj")]
    subject: Subject,
    #[serde(rename = "stg")]
    stage: Stage,
    #[serde(rename = "cod")]
    code: Option<Code>,
    #[serde(rename = "cxp", with = "ts_seconds")]
    code_expires_at: DateTime<Utc>,
    #[serde(rename = "att")]
    failed_attempts: u32,
    #[serde(rename = "fce")]
    face_verified: bool,
}

impl SessionState {
    /// Start a fresh session for a subject that has passed the first factor,
    /// issuing its one-time code.
    pub fn identified(
        role: Role,
        subject: Subject,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> (Self, Code) {
        let code = Code::random();
        let state = Self {
            sid: SessionId::random(),
            revision: 0,
            role,
            subject,
            stage: Stage::Identified,
            code: Some(code),
            code_expires_at: now + ttl,
            failed_attempts: 0,
            face_verified: false,
        };
        (state, code)
    }

    pub fn id(&self) -> &SessionId {
        &self.sid
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Mark this state as the successor of the one it was read as.
    pub fn revise(&mut self) {
        self.revision += 1;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Replace the outstanding code with a fresh one, resetting its expiry
    /// and the attempt counter.
    pub fn reissue(
        &mut self,
        role: Role,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Code, Rejection> {
        self.expect(role, Stage::Identified)?;
        let code = Code::random();
        self.code = Some(code);
        self.code_expires_at = now + ttl;
        self.failed_attempts = 0;
        Ok(code)
    }

    /// Check a submitted one-time code. On success the session advances to
    /// [`Stage::Challenged`]; on failure it stays put. The guess that uses up
    /// the last attempt burns the code.
    pub fn submit_code(
        &mut self,
        role: Role,
        guess: &Code,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<(), Rejection> {
        self.expect(role, Stage::Identified)?;
        let Some(code) = self.code else {
            return Err(Rejection::TooManyAttempts);
        };
        if now > self.code_expires_at {
            return Err(Rejection::CodeExpired);
        }
        if code != *guess {
            self.failed_attempts += 1;
            if self.failed_attempts >= max_attempts {
                self.code = None;
                return Err(Rejection::TooManyAttempts);
            }
            return Err(Rejection::InvalidCode);
        }

        self.code = None;
        self.failed_attempts = 0;
        self.stage = Stage::Challenged;
        Ok(())
    }

    /// The subject whose face is due, if the session is at the biometric stage.
    pub fn biometric_subject(&self, role: Role) -> Result<&Subject, Rejection> {
        self.expect(role, Stage::Challenged)?;
        Ok(&self.subject)
    }

    /// Record a passed face check.
    pub fn mark_verified(&mut self, role: Role) -> Result<(), Rejection> {
        self.expect(role, Stage::Challenged)?;
        self.face_verified = true;
        self.stage = Stage::Verified;
        Ok(())
    }

    /// Guard for protected actions: the session must belong to `role` and
    /// have passed every factor.
    pub fn authorize(&self, role: Role) -> Result<&Subject, Rejection> {
        self.expect(role, Stage::Verified)?;
        if !self.face_verified {
            return Err(Rejection::UnauthorizedStageAccess);
        }
        Ok(&self.subject)
    }

    fn expect(&self, role: Role, stage: Stage) -> Result<(), Rejection> {
        if self.role == role && self.stage == stage {
            Ok(())
        } else {
            Err(Rejection::UnauthorizedStageAccess)
        }
    }

    /// Serialize this session into a cookie, valid for `session_ttl` from now.
    pub fn into_cookie(self, config: &Config) -> error::Result<Cookie<'static>> {
        let ttl = config.session_ttl();
        let claims = Claims {
            state: self,
            expire_at: Utc::now() + ttl,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build((SESSION_COOKIE, token))
            .max_age(time::Duration::seconds(ttl.num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .build())
    }

    /// Deserialize a session from a cookie. Expired or tampered tokens fail.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, JwtError> {
        jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.state)
    }
}

/// Cookie claims: the session itself plus an expiry datetime.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    state: SessionState,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Subject {
        pub fn example() -> Self {
            Self {
                id: Id::new(),
                reference: ReferenceKey::admin(),
            }
        }
    }

    impl SessionState {
        /// An admin session whose outstanding code is known.
        pub fn example(now: DateTime<Utc>) -> Self {
            Self {
                sid: SessionId::random(),
                revision: 0,
                role: Role::Admin,
                subject: Subject::example(),
                stage: Stage::Identified,
                code: Some(Code::example()),
                code_expires_at: now + Duration::minutes(5),
                failed_attempts: 0,
                face_verified: false,
            }
        }
    }
}

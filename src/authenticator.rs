use std::any::type_name;

use chrono::Utc;
use log::{debug, error, info};
use rocket::{
    http::{CookieJar, Status},
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    tokio::task,
    Request,
};

use crate::{
    config::Config,
    error::{Error, Rejection, Result},
    face::{BiometricMatch, FacePipeline, ReferenceKey},
    model::{
        api::{
            AdminCredentials, BallotChoice, BallotView, EnrolledVoter, FaceSubmission, NextStep,
            StepOutcome, VoterEnrollment, VoterLogin,
        },
        auth::{Role, SessionRegistry, SessionState, Subject, SESSION_COOKIE},
        ballot::Tally,
        db::{AdminCore, NewVoter},
        mobile::Mobile,
        otp::Code,
        store::{BallotLedger, IdentityStore, SharedStore},
    },
};

/// Drives one request's step through the authentication sequence. Holds the
/// managed services and the request's cookies, where the session lives.
pub struct Authenticator<'r> {
    config: &'r Config,
    store: &'r SharedStore,
    faces: &'r FacePipeline,
    sessions: &'r SessionRegistry,
    cookies: &'r CookieJar<'r>,
}

fn managed<'r, T: Send + Sync + 'static>(req: &'r Request<'_>) -> Outcome<&'r T, Error> {
    match req.rocket().state::<T>() {
        Some(state) => Outcome::Success(state),
        None => {
            let what = type_name::<T>();
            error!("{what} is not in managed state");
            Outcome::Error((
                Status::InternalServerError,
                Error::Status(Status::InternalServerError, format!("{what} not managed")),
            ))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Authenticator<'r> {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(managed::<Config>(req));
        let store = try_outcome!(managed::<SharedStore>(req));
        let faces = try_outcome!(managed::<FacePipeline>(req));
        let sessions = try_outcome!(managed::<SessionRegistry>(req));
        Outcome::Success(Self {
            config,
            store,
            faces,
            sessions,
            cookies: req.cookies(),
        })
    }
}

impl<'r> Authenticator<'r> {
    fn cookie_state(&self) -> Option<SessionState> {
        let cookie = self.cookies.get_private(SESSION_COOKIE)?;
        match SessionState::from_cookie(&cookie, self.config) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!("Ignoring unusable session cookie: {e}");
                None
            }
        }
    }

    /// The current session, if there is a valid one. Tampered or expired
    /// cookies read as no session at all, as do superseded copies of a live
    /// session and copies of one that has ended.
    pub fn session(&self) -> Result<Option<SessionState>> {
        let Some(state) = self.cookie_state() else {
            return Ok(None);
        };
        if self
            .sessions
            .is_current(state.id(), state.revision(), Utc::now())?
        {
            Ok(Some(state))
        } else {
            debug!("Ignoring stale cookie for session {}", state.id());
            Ok(None)
        }
    }

    fn require_session(&self) -> Result<SessionState> {
        self.session()?
            .ok_or_else(|| Rejection::UnauthorizedStageAccess.into())
    }

    /// Write back a session read by [`Self::require_session`]. Refused if
    /// another request has written it in the meantime.
    fn save(&self, mut state: SessionState) -> Result<()> {
        let seen = state.revision();
        if !self
            .sessions
            .advance(state.id(), seen, Utc::now(), self.config.session_ttl())?
        {
            debug!("Session {} moved on from revision {seen}", state.id());
            return Err(Rejection::UnauthorizedStageAccess.into());
        }
        state.revise();
        self.cookies.add_private(state.into_cookie(self.config)?);
        Ok(())
    }

    /// Tear down the session, on the server as well as in the browser.
    pub fn logout(&self) -> Result<()> {
        if let Some(state) = self.cookie_state() {
            self.sessions.close(state.id())?;
        }
        self.cookies.remove_private(SESSION_COOKIE);
        Ok(())
    }

    fn begin(&self, role: Role, subject: Subject) -> Result<StepOutcome> {
        let now = Utc::now();
        let (state, code) = SessionState::identified(role, subject, now, self.config.otp_ttl());
        self.sessions
            .open(state.id(), now, self.config.session_ttl())?;
        self.cookies.add_private(state.into_cookie(self.config)?);
        Ok(self.issued(code))
    }

    fn issued(&self, code: Code) -> StepOutcome {
        let outcome = StepOutcome::advanced(NextStep::Code);
        if self.config.display_codes() {
            debug!("Issued one-time code {code}");
            outcome.with_code(code)
        } else {
            outcome
        }
    }

    /// First factor for the admin role. Any previous session is abandoned.
    pub async fn identify_admin(&self, credentials: &AdminCredentials) -> Result<StepOutcome> {
        self.logout()?;
        let admin = match self.store.find_admin(&credentials.username).await? {
            Some(admin) if admin.verify_password(&credentials.password) => admin,
            Some(_) => return Err(Rejection::InvalidCredentials.into()),
            None => {
                // Same hashing work as a wrong password.
                AdminCore::verify_absent(&credentials.password);
                return Err(Rejection::InvalidCredentials.into());
            }
        };

        let subject = Subject {
            id: admin.id,
            reference: ReferenceKey::admin(),
        };
        self.begin(Role::Admin, subject)
    }

    /// First factor for a voter. Any previous session is abandoned.
    pub async fn identify_voter(&self, login: &VoterLogin) -> Result<StepOutcome> {
        self.logout()?;
        // An unparseable number cannot belong to anyone; say no more than that.
        let mobile = Mobile::parse(&login.mobile, self.config.default_country_code())
            .map_err(|_| Rejection::InvalidCredentials)?;
        let identity_hash = self.config.identity_hasher().hash(&login.aadhaar);
        let voter = self
            .store
            .find_voter(&identity_hash, &mobile)
            .await?
            .ok_or(Rejection::InvalidCredentials)?;
        if voter.has_voted {
            return Err(Rejection::AlreadyVoted.into());
        }

        let subject = Subject {
            id: voter.id,
            reference: ReferenceKey::for_identity(&voter.identity_hash),
        };
        self.begin(Role::Voter, subject)
    }

    /// Replace the outstanding one-time code.
    pub fn reissue_code(&self, role: Role) -> Result<StepOutcome> {
        let mut state = self.require_session()?;
        let code = state.reissue(role, Utc::now(), self.config.otp_ttl())?;
        self.save(state)?;
        Ok(self.issued(code))
    }

    /// Second factor.
    pub fn submit_code(&self, role: Role, code: &Code) -> Result<StepOutcome> {
        let mut state = self.require_session()?;
        let result = state.submit_code(role, code, Utc::now(), self.config.otp_max_attempts());
        // Failed guesses are counted in the session, so it must be written
        // back. A write that loses to a concurrent request voids the guess.
        if !matches!(result, Err(Rejection::UnauthorizedStageAccess)) {
            self.save(state)?;
        }
        result?;
        Ok(StepOutcome::advanced(NextStep::Face))
    }

    /// Third factor. The first face submitted for a subject is enrolled as
    /// its reference; later ones must match it.
    pub async fn submit_face(&self, role: Role, submission: &FaceSubmission) -> Result<StepOutcome> {
        let mut state = self.require_session()?;
        let reference = state.biometric_subject(role)?.reference.clone();
        let frame = submission.decode()?;

        let faces = self.faces.clone();
        let matched =
            task::spawn_blocking(move || faces.enroll_or_verify(&reference, &frame)).await??;

        state.mark_verified(role)?;
        self.save(state)?;

        let next = match role {
            Role::Admin => NextStep::Dashboard,
            Role::Voter => NextStep::Ballot,
        };
        let outcome = StepOutcome::advanced(next);
        Ok(match matched {
            BiometricMatch::Enrolled => outcome.with_enrolled(true),
            BiometricMatch::Verified { score } if self.config.disclose_scores() => {
                outcome.with_enrolled(false).with_score(score)
            }
            BiometricMatch::Verified { .. } => outcome.with_enrolled(false),
        })
    }

    fn authorize(&self, role: Role) -> Result<Subject> {
        let state = self.require_session()?;
        Ok(state.authorize(role)?.clone())
    }

    /// Current results. Admin only; may be viewed any number of times.
    pub async fn dashboard(&self) -> Result<Tally> {
        self.authorize(Role::Admin)?;
        self.store.tally(self.config.candidates()).await
    }

    /// Register a new voter. Admin only.
    pub async fn enroll_voter(&self, enrollment: &VoterEnrollment) -> Result<EnrolledVoter> {
        self.authorize(Role::Admin)?;

        let digits = enrollment
            .aadhaar
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Status(
                Status::UnprocessableEntity,
                "Identity number must be digits".to_string(),
            ));
        }
        let mobile = Mobile::parse(&enrollment.mobile, self.config.default_country_code())
            .map_err(|e| {
                Error::Status(
                    Status::UnprocessableEntity,
                    format!("Invalid mobile number: {e}"),
                )
            })?;

        let identity_hash = self.config.identity_hasher().hash(&digits);
        let voter = self
            .store
            .insert_voter(NewVoter::new(identity_hash, mobile))
            .await?;
        info!("Enrolled voter {}", voter.id);
        Ok(voter.into())
    }

    /// The ballot. Voter only.
    pub fn ballot(&self) -> Result<BallotView> {
        self.authorize(Role::Voter)?;
        Ok(BallotView {
            candidates: self
                .config
                .candidates()
                .iter()
                .map(str::to_string)
                .collect(),
        })
    }

    /// Cast the voter's single vote. The session ends once the voter has a
    /// vote on record, whether or not this request placed it.
    pub async fn cast_vote(&self, choice: &BallotChoice) -> Result<StepOutcome> {
        let subject = self.authorize(Role::Voter)?;
        let candidate = self.config.candidates().resolve(&choice.candidate)?;

        let result = self.store.cast_vote(subject.id, candidate).await;
        let finished = match &result {
            Ok(_) => true,
            Err(e) => e.rejection() == Some(&Rejection::AlreadyVoted),
        };
        if finished {
            self.logout()?;
        }
        result?;
        info!("Recorded vote from {}", subject.id);
        Ok(StepOutcome::advanced(NextStep::Done))
    }
}

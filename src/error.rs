use argon2::Error as Argon2Error;
use image::ImageError;
use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    tokio::task::JoinError,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use thiserror::Error;

use crate::{config::Config, logging::RequestId, model::api::StepOutcome};

pub type Result<T> = std::result::Result<T, Error>;

/// Expected outcomes of an authentication or ballot step that refuse the
/// request. These are reported back to the client as-is and never abort it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// Deliberately silent about which half of the credential was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid one-time code")]
    InvalidCode,
    #[error("One-time code has expired; request a new one")]
    CodeExpired,
    #[error("Too many incorrect codes; request a new one")]
    TooManyAttempts,
    #[error("No face detected")]
    NoFaceDetected,
    #[error("Face mismatch")]
    FaceMismatch { score: f32 },
    #[error("Already voted")]
    AlreadyVoted,
    #[error("Identity already registered")]
    DuplicateIdentity,
    #[error("Malformed image: {0}")]
    MalformedImage(String),
    #[error("This step is not available at the current stage")]
    UnauthorizedStageAccess,
    #[error("Unknown candidate: {0}")]
    InvalidCandidate(String),
}

impl Rejection {
    /// Stable machine-readable name of this rejection.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidCode => "invalid_code",
            Self::CodeExpired => "code_expired",
            Self::TooManyAttempts => "too_many_attempts",
            Self::NoFaceDetected => "no_face_detected",
            Self::FaceMismatch { .. } => "face_mismatch",
            Self::AlreadyVoted => "already_voted",
            Self::DuplicateIdentity => "duplicate_identity",
            Self::MalformedImage(_) => "malformed_image",
            Self::UnauthorizedStageAccess => "unauthorized_stage_access",
            Self::InvalidCandidate(_) => "invalid_candidate",
        }
    }

    /// The HTTP status this rejection is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidCredentials | Self::InvalidCode | Self::CodeExpired => Status::Unauthorized,
            Self::FaceMismatch { .. } => Status::Unauthorized,
            Self::TooManyAttempts => Status::TooManyRequests,
            Self::NoFaceDetected | Self::InvalidCandidate(_) => Status::UnprocessableEntity,
            Self::AlreadyVoted | Self::DuplicateIdentity => Status::Conflict,
            Self::MalformedImage(_) => Status::BadRequest,
            Self::UnauthorizedStageAccess => Status::Forbidden,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Background task failed: {0}")]
    Task(#[from] JoinError),
    #[error("Corrupt stored state: {0}")]
    Corrupt(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: String) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {}", what))
    }

    /// The rejection carried by this error, if it is an expected outcome.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let id = req.local_cache(RequestId::next);
        match self {
            Self::Rejected(rejection) => {
                warn!("  req{id} rejected: {rejection}");
                let disclose_scores = req
                    .rocket()
                    .state::<Config>()
                    .map_or(false, Config::disclose_scores);
                let body = StepOutcome::rejected(&rejection, disclose_scores);
                (rejection.status(), Json(body)).respond_to(req)
            }
            Self::Status(status, message) => {
                warn!("  req{id} {status}: {message}");
                Err(status)
            }
            // Faults never leak detail to the client.
            err => {
                error!("  req{id} failed: {err}");
                Err(Status::InternalServerError)
            }
        }
    }
}

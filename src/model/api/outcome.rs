use serde::{Deserialize, Serialize};

use crate::error::Rejection;
use crate::model::otp::Code;

/// What the client should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Submit the one-time code.
    Code,
    /// Submit a face frame.
    Face,
    /// Admin: the dashboard is open.
    Dashboard,
    /// Voter: the ballot is open.
    Ballot,
    /// Nothing left to do in this session.
    Done,
}

/// The structured result of every authentication or ballot step.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<NextStep>,
    /// Machine-readable rejection kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Face similarity score, when disclosure is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Whether the face step enrolled a new reference rather than verifying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled: Option<bool>,
    /// The issued one-time code, when codes are displayed rather than sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
}

impl StepOutcome {
    pub fn advanced(next: NextStep) -> Self {
        Self {
            success: true,
            next: Some(next),
            error: None,
            reason: None,
            score: None,
            enrolled: None,
            code: None,
        }
    }

    pub fn rejected(rejection: &Rejection, disclose_scores: bool) -> Self {
        let score = match rejection {
            Rejection::FaceMismatch { score } if disclose_scores => Some(*score),
            _ => None,
        };
        Self {
            success: false,
            next: None,
            error: Some(rejection.kind().to_string()),
            reason: Some(rejection.to_string()),
            score,
            enrolled: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_enrolled(mut self, enrolled: bool) -> Self {
        self.enrolled = Some(enrolled);
        self
    }
}

use serde::{Deserialize, Serialize};

/// A voter's single choice.
#[derive(Clone, Deserialize, Serialize)]
pub struct BallotChoice {
    pub candidate: String,
}

/// The ballot as shown to a verified voter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BallotView {
    pub candidates: Vec<String>,
}

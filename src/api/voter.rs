use rocket::{serde::json::Json, Route};

use crate::{
    authenticator::Authenticator,
    error::Result,
    model::api::{BallotChoice, BallotView, StepOutcome},
};

pub fn routes() -> Vec<Route> {
    routes![ballot, cast_vote]
}

#[get("/voter/ballot")]
pub fn ballot(auth: Authenticator<'_>) -> Result<Json<BallotView>> {
    auth.ballot().map(Json)
}

#[post("/voter/ballot", data = "<choice>", format = "json")]
pub async fn cast_vote(
    choice: Json<BallotChoice>,
    auth: Authenticator<'_>,
) -> Result<Json<StepOutcome>> {
    auth.cast_vote(&choice).await.map(Json)
}

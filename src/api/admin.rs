use rocket::{serde::json::Json, Route};

use crate::{
    authenticator::Authenticator,
    error::Result,
    model::{
        api::{EnrolledVoter, VoterEnrollment},
        ballot::Tally,
    },
};

pub fn routes() -> Vec<Route> {
    routes![dashboard, enroll_voter]
}

#[get("/admin/dashboard")]
pub async fn dashboard(auth: Authenticator<'_>) -> Result<Json<Tally>> {
    auth.dashboard().await.map(Json)
}

#[post("/admin/voters", data = "<enrollment>", format = "json")]
pub async fn enroll_voter(
    enrollment: Json<VoterEnrollment>,
    auth: Authenticator<'_>,
) -> Result<Json<EnrolledVoter>> {
    auth.enroll_voter(&enrollment).await.map(Json)
}

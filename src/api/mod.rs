use rocket::Route;

mod admin;
mod auth;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(admin::routes());
    routes.extend(voter::routes());
    routes
}

/// Scripted walks through the authentication sequence, for endpoint tests.
#[cfg(test)]
mod flows {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json::json,
    };

    use crate::{
        config::Config,
        model::{
            api::{
                AdminCredentials, CodeSubmission, EnrolledVoter, FaceSubmission, NextStep,
                StepOutcome, VoterEnrollment, VoterLogin,
            },
            auth::{Role, SessionState, SESSION_COOKIE},
            otp::Code,
        },
    };

    /// Status and body of a step, whether it advanced or was rejected.
    pub async fn outcome(response: LocalResponse<'_>) -> (Status, StepOutcome) {
        let status = response.status();
        let body = response.into_json::<StepOutcome>().await.unwrap();
        (status, body)
    }

    /// The session as it currently stands in the client's cookie jar.
    pub fn session(client: &Client) -> Option<SessionState> {
        let cookie = client.cookies().get_private(SESSION_COOKIE)?;
        let config = client.rocket().state::<Config>().unwrap();
        SessionState::from_cookie(&cookie, config).ok()
    }

    pub async fn post_json(client: &Client, uri: String, body: String) -> LocalResponse<'_> {
        client
            .post(uri)
            .header(ContentType::JSON)
            .body(body)
            .dispatch()
            .await
    }

    pub async fn identify_admin(client: &Client, credentials: AdminCredentials) -> (Status, StepOutcome) {
        outcome(post_json(client, "/auth/admin".into(), json!(credentials).to_string()).await).await
    }

    pub async fn identify_voter(client: &Client, login: VoterLogin) -> (Status, StepOutcome) {
        outcome(post_json(client, "/auth/voter".into(), json!(login).to_string()).await).await
    }

    pub async fn submit_code(client: &Client, role: Role, code: Code) -> (Status, StepOutcome) {
        let body = json!(CodeSubmission { code }).to_string();
        outcome(post_json(client, format!("/auth/{role}/code"), body).await).await
    }

    pub async fn reissue_code(client: &Client, role: Role) -> (Status, StepOutcome) {
        outcome(
            client
                .post(format!("/auth/{role}/code/reissue"))
                .dispatch()
                .await,
        )
        .await
    }

    pub async fn submit_face(client: &Client, role: Role, frame: &[u8]) -> (Status, StepOutcome) {
        let body = json!(FaceSubmission::from_bytes(frame)).to_string();
        outcome(post_json(client, format!("/auth/{role}/face"), body).await).await
    }

    /// Pass the first two factors, leaving the session waiting on a face.
    async fn challenged(client: &Client, role: Role, identified: (Status, StepOutcome)) {
        let (status, identified) = identified;
        assert_eq!(status, Status::Ok, "{identified:?}");
        let code = identified.code.unwrap();
        let (status, outcome) = submit_code(client, role, code).await;
        assert_eq!(status, Status::Ok, "{outcome:?}");
        assert_eq!(outcome.next, Some(NextStep::Face));
    }

    /// Take the example admin through all three factors with `frame`.
    pub async fn verified_admin(client: &Client, frame: &[u8]) -> StepOutcome {
        challenged(
            client,
            Role::Admin,
            identify_admin(client, AdminCredentials::example()).await,
        )
        .await;
        let (status, outcome) = submit_face(client, Role::Admin, frame).await;
        assert_eq!(status, Status::Ok, "{outcome:?}");
        outcome
    }

    /// Take a voter through all three factors with `frame`.
    pub async fn verified_voter(client: &Client, login: VoterLogin, frame: &[u8]) -> StepOutcome {
        challenged(client, Role::Voter, identify_voter(client, login).await).await;
        let (status, outcome) = submit_face(client, Role::Voter, frame).await;
        assert_eq!(status, Status::Ok, "{outcome:?}");
        outcome
    }

    /// Enroll a voter. The session must be a verified admin's.
    pub async fn enroll(client: &Client, enrollment: VoterEnrollment) -> EnrolledVoter {
        let response = post_json(client, "/admin/voters".into(), json!(enrollment).to_string()).await;
        assert_eq!(response.status(), Status::Ok);
        response.into_json().await.unwrap()
    }
}

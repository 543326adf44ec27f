use rocket::{http::Status, serde::json::Json, Route};

use crate::{
    authenticator::Authenticator,
    error::Result,
    model::{
        api::{AdminCredentials, CodeSubmission, FaceSubmission, StepOutcome, VoterLogin},
        auth::Role,
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        identify_admin,
        identify_voter,
        submit_code,
        reissue_code,
        submit_face,
        logout
    ]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn identify_admin(
    credentials: Json<AdminCredentials>,
    auth: Authenticator<'_>,
) -> Result<Json<StepOutcome>> {
    auth.identify_admin(&credentials).await.map(Json)
}

#[post("/auth/voter", data = "<login>", format = "json")]
pub async fn identify_voter(
    login: Json<VoterLogin>,
    auth: Authenticator<'_>,
) -> Result<Json<StepOutcome>> {
    auth.identify_voter(&login).await.map(Json)
}

#[post("/auth/<role>/code", data = "<submission>", format = "json")]
pub fn submit_code(
    role: Role,
    submission: Json<CodeSubmission>,
    auth: Authenticator<'_>,
) -> Result<Json<StepOutcome>> {
    auth.submit_code(role, &submission.code).map(Json)
}

#[post("/auth/<role>/code/reissue")]
pub fn reissue_code(role: Role, auth: Authenticator<'_>) -> Result<Json<StepOutcome>> {
    auth.reissue_code(role).map(Json)
}

#[post("/auth/<role>/face", data = "<submission>", format = "json")]
pub async fn submit_face(
    role: Role,
    submission: Json<FaceSubmission>,
    auth: Authenticator<'_>,
) -> Result<Json<StepOutcome>> {
    auth.submit_face(role, &submission).await.map(Json)
}

#[delete("/auth")]
pub fn logout(auth: Authenticator<'_>) -> Result<Status> {
    auth.logout()?;
    Ok(Status::Ok)
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Cookie, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::{
        api::flows::*,
        face::examples::{empty_frame, face_a, face_b},
        model::{
            api::{AdminCredentials, CodeSubmission, NextStep, StepOutcome},
            auth::{Role, Stage, SESSION_COOKIE},
            otp::Code,
        },
    };

    async fn client(dir: &tempfile::TempDir) -> Client {
        crate::client_for(dir.path()).await
    }

    /// The client's session cookie as it stands now.
    fn saved_cookie(client: &Client) -> Cookie<'static> {
        client.cookies().get_private(SESSION_COOKIE).unwrap()
    }

    /// Submit an admin code with `cookie` in place of the client's own.
    async fn submit_code_as(
        client: &Client,
        cookie: &Cookie<'static>,
        code: Code,
    ) -> (Status, StepOutcome) {
        let response = client
            .post("/auth/admin/code")
            .header(ContentType::JSON)
            .private_cookie(cookie.clone())
            .body(json!(CodeSubmission { code }).to_string())
            .dispatch()
            .await;
        outcome(response).await
    }

    #[rocket::async_test]
    async fn admin_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        let (status, identified) = identify_admin(&client, AdminCredentials::example()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(identified.next, Some(NextStep::Code));
        let code = identified.code.unwrap();

        // A wrong code leaves the session where it was.
        let (status, rejected) = submit_code(&client, Role::Admin, code.other_than()).await;
        assert_eq!(status, Status::Unauthorized);
        assert_eq!(rejected.error.as_deref(), Some("invalid_code"));
        let state = session(&client).unwrap();
        assert_eq!(state.stage(), Stage::Identified);
        assert_eq!(state.failed_attempts(), 1);

        let (status, challenged) = submit_code(&client, Role::Admin, code).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(challenged.next, Some(NextStep::Face));

        let (status, verified) = submit_face(&client, Role::Admin, &face_a()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(verified.next, Some(NextStep::Dashboard));
        assert_eq!(verified.enrolled, Some(true));

        for _ in 0..2 {
            let response = client.get("/admin/dashboard").dispatch().await;
            assert_eq!(response.status(), Status::Ok);
        }
    }

    #[rocket::async_test]
    async fn bad_credentials_are_indistinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        let wrong_password = AdminCredentials {
            password: "not the password".into(),
            ..AdminCredentials::example()
        };
        let wrong_username = AdminCredentials {
            username: "nobody".into(),
            ..AdminCredentials::example()
        };
        let (status, first) = identify_admin(&client, wrong_password).await;
        let (_, second) = identify_admin(&client, wrong_username).await;
        assert_eq!(status, Status::Unauthorized);
        assert_eq!(first, second);
        assert_eq!(first.error.as_deref(), Some("invalid_credentials"));
        assert!(session(&client).is_none());
    }

    #[rocket::async_test]
    async fn steps_cannot_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        // Nothing works without a session.
        let (status, rejected) = submit_code(&client, Role::Admin, Code::example()).await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(rejected.error.as_deref(), Some("unauthorized_stage_access"));

        identify_admin(&client, AdminCredentials::example()).await;

        // The face is not due yet.
        let (status, _) = submit_face(&client, Role::Admin, &face_a()).await;
        assert_eq!(status, Status::Forbidden);
        // Nor is the code the voter's to submit.
        let code = Code::example();
        let (status, _) = submit_code(&client, Role::Voter, code).await;
        assert_eq!(status, Status::Forbidden);
        let response = client.get("/admin/dashboard").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        // No reference was created by the refused face.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[rocket::async_test]
    async fn too_many_attempts_burns_the_code() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        let (_, identified) = identify_admin(&client, AdminCredentials::example()).await;
        let code = identified.code.unwrap();
        let wrong = code.other_than();

        // `Config::example` allows three attempts.
        for _ in 0..2 {
            let (status, _) = submit_code(&client, Role::Admin, wrong).await;
            assert_eq!(status, Status::Unauthorized);
        }
        let (status, rejected) = submit_code(&client, Role::Admin, wrong).await;
        assert_eq!(status, Status::TooManyRequests);
        assert_eq!(rejected.error.as_deref(), Some("too_many_attempts"));

        let (status, _) = submit_code(&client, Role::Admin, code).await;
        assert_eq!(status, Status::TooManyRequests);

        let (status, reissued) = reissue_code(&client, Role::Admin).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(session(&client).unwrap().failed_attempts(), 0);
        let (status, _) = submit_code(&client, Role::Admin, reissued.code.unwrap()).await;
        assert_eq!(status, Status::Ok);

        // Reissuing is only possible before the code is accepted.
        let (status, _) = reissue_code(&client, Role::Admin).await;
        assert_eq!(status, Status::Forbidden);
    }

    #[rocket::async_test]
    async fn face_failures_stay_challenged() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;
        verified_admin(&client, &face_a()).await;

        let (_, identified) = identify_admin(&client, AdminCredentials::example()).await;
        submit_code(&client, Role::Admin, identified.code.unwrap()).await;

        let (status, rejected) = submit_face(&client, Role::Admin, &empty_frame()).await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert_eq!(rejected.error.as_deref(), Some("no_face_detected"));

        let (status, rejected) = submit_face(&client, Role::Admin, &face_b()).await;
        assert_eq!(status, Status::Unauthorized);
        assert_eq!(rejected.error.as_deref(), Some("face_mismatch"));
        assert!(rejected.score.is_some());
        assert_eq!(session(&client).unwrap().stage(), Stage::Challenged);

        let (status, verified) = submit_face(&client, Role::Admin, &face_a()).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(verified.enrolled, Some(false));
        assert!(verified.score.unwrap() >= 0.65);
    }

    #[rocket::async_test]
    async fn malformed_frame() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;
        let (_, identified) = identify_admin(&client, AdminCredentials::example()).await;
        submit_code(&client, Role::Admin, identified.code.unwrap()).await;

        let (status, rejected) = submit_face(&client, Role::Admin, b"GIF89a?").await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(rejected.error.as_deref(), Some("malformed_image"));
    }

    #[rocket::async_test]
    async fn logout_and_reidentify_end_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        verified_admin(&client, &face_a()).await;
        let response = client.delete("/auth").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.get("/admin/dashboard").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        verified_admin(&client, &face_a()).await;
        identify_admin(&client, AdminCredentials::example()).await;
        let response = client.get("/admin/dashboard").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn superseded_cookies_cannot_reset_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        let (_, identified) = identify_admin(&client, AdminCredentials::example()).await;
        let code = identified.code.unwrap();
        let wrong = code.other_than();
        let unused = saved_cookie(&client);

        let (status, _) = submit_code(&client, Role::Admin, wrong).await;
        assert_eq!(status, Status::Unauthorized);

        // The cookie from before the failed guess is dead, right code or not.
        for guess in [wrong, code] {
            let (status, rejected) = submit_code_as(&client, &unused, guess).await;
            assert_eq!(status, Status::Forbidden);
            assert_eq!(rejected.error.as_deref(), Some("unauthorized_stage_access"));
        }
        assert_eq!(session(&client).unwrap().failed_attempts(), 1);

        // So is every copy taken along the way.
        let (status, _) = submit_code(&client, Role::Admin, wrong).await;
        assert_eq!(status, Status::Unauthorized);
        let second_to_last = saved_cookie(&client);
        let (status, _) = submit_code(&client, Role::Admin, wrong).await;
        assert_eq!(status, Status::TooManyRequests);
        let (status, _) = submit_code_as(&client, &second_to_last, code).await;
        assert_eq!(status, Status::Forbidden);
        let (status, _) = submit_code(&client, Role::Admin, code).await;
        assert_eq!(status, Status::TooManyRequests);
    }

    #[rocket::async_test]
    async fn logout_ends_every_copy_of_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(&dir).await;

        verified_admin(&client, &face_a()).await;
        let verified = saved_cookie(&client);
        let response = client.delete("/auth").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get("/admin/dashboard")
            .private_cookie(verified.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        // Identifying again starts a new session rather than reviving the old.
        identify_admin(&client, AdminCredentials::example()).await;
        let response = client
            .get("/admin/dashboard")
            .private_cookie(verified)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

#[cfg(feature = "seeta")]
use crate::face::SeetaDetector;
use crate::{
    face::{FaceDetector, FacePipeline, Selection, Strategy},
    model::{
        api::AdminCredentials,
        auth::IdentityHasher,
        ballot::CandidateSet,
        db::NewAdmin,
        memory::MemoryStore,
        mongodb::MongoStore,
        store::{IdentityStore, SharedStore},
    },
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    otp_ttl: u32,
    otp_max_attempts: u32,
    session_ttl: u32,
    display_codes: bool,
    disclose_scores: bool,
    default_country_code: u16,
    candidates: CandidateSet,
    admin_username: String,
    // secrets
    admin_password: String,
    jwt_secret: String,
    hmac_secret: String,
}

impl Config {
    /// Valid lifetime of a one-time code.
    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl.into())
    }

    /// Wrong guesses allowed before the outstanding code is burned.
    pub fn otp_max_attempts(&self) -> u32 {
        self.otp_max_attempts
    }

    /// Valid lifetime of the session cookie, renewed on every step.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Whether issued codes are handed back to the client. There is no SMS
    /// gateway, so this is the only way a code reaches the user.
    pub fn display_codes(&self) -> bool {
        self.display_codes
    }

    /// Whether face mismatch scores are included in rejections.
    pub fn disclose_scores(&self) -> bool {
        self.disclose_scores
    }

    /// Country calling code assumed for mobile numbers given without `+`.
    pub fn default_country_code(&self) -> u16 {
        self.default_country_code
    }

    /// The closed set of candidates on the ballot.
    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    /// Credentials for the admin seeded into an empty store.
    pub fn seed_admin(&self) -> AdminCredentials {
        AdminCredentials {
            username: self.admin_username.clone(),
            password: self.admin_password.clone(),
        }
    }

    /// Secret key used to sign session tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Hasher for national identity numbers, keyed with the HMAC secret.
    pub fn identity_hasher(&self) -> IdentityHasher {
        IdentityHasher::new(self.hmac_secret.as_bytes())
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        match rocket.figment().extract::<Config>() {
            Ok(config) => Ok(rocket.manage(config)),
            Err(e) => {
                error!("Failed to load application config: {e}");
                Err(rocket)
            }
        }
    }
}

/// Configuration for the identity store and ballot ledger.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: Option<String>,
    // non-secrets
    db_name: Option<String>,
}

/// A fairing that connects to MongoDB (or falls back to an in-memory store
/// when no `db_uri` is configured), seeds the admin account, and places a
/// [`SharedStore`] into managed state.
///
/// Must be attached after [`ConfigFairing`].
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let db_config = match rocket.figment().extract::<DbConfig>() {
            Ok(db_config) => db_config,
            Err(e) => {
                error!("Failed to load database config: {e}");
                return Err(rocket);
            }
        };
        let seed = match rocket.state::<Config>() {
            Some(config) => config.seed_admin(),
            None => {
                error!("Store fairing requires the application config");
                return Err(rocket);
            }
        };

        let store: SharedStore = match db_config.db_uri {
            Some(uri) => {
                let name = db_config.db_name.unwrap_or_else(|| "ballot".to_string());
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&uri, &name).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
            None => {
                warn!("No `db_uri` configured; using a volatile in-memory store");
                Arc::new(MemoryStore::default())
            }
        };

        // Ensure there is at least one admin to log in as.
        let username = seed.username.clone();
        let admin = match NewAdmin::try_from(seed) {
            Ok(admin) => admin,
            Err(e) => {
                error!("Illegal seed admin credentials: {e}");
                return Err(rocket);
            }
        };
        match store.ensure_admin(admin).await {
            Ok(true) => info!("Seeded admin account '{username}'"),
            Ok(false) => {}
            Err(e) => {
                error!("Failed to seed admin account: {e}");
                return Err(rocket);
            }
        }
        info!("...store online!");

        Ok(rocket.manage(store))
    }
}

/// Configuration for the face pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct FaceConfig {
    /// Directory holding one reference image per enrolled identity.
    pub face_dir: PathBuf,
    /// Scoring strategy; each has its own default threshold.
    pub face_strategy: Strategy,
    /// Overrides the strategy's default pass threshold.
    pub face_threshold: Option<f32>,
    /// Which detection wins when several faces are found.
    pub face_selection: Selection,
    /// Gaussian blur sigma applied after normalisation, if any.
    pub face_blur: Option<f32>,
    /// Equalise the histogram after normalisation.
    pub face_equalize: bool,
    /// Smallest face, in pixels, the detector will report.
    pub face_min_size: u32,
    /// Path to the SeetaFace frontal detector model.
    pub detector_model: PathBuf,
}

impl FaceConfig {
    pub fn face_dir(&self) -> &Path {
        &self.face_dir
    }
}

/// A fairing that loads the face pipeline config, starts the detector and
/// places a [`FacePipeline`] into managed state.
pub struct FaceFairing;

#[rocket::async_trait]
impl Fairing for FaceFairing {
    fn info(&self) -> Info {
        Info {
            name: "Face pipeline",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<FaceConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load face pipeline config: {e}");
                return Err(rocket);
            }
        };

        let detector = match start_detector(&config) {
            Ok(detector) => detector,
            Err(e) => {
                error!("Failed to start face detector: {e}");
                return Err(rocket);
            }
        };

        match FacePipeline::new(detector, &config) {
            Ok(pipeline) => {
                info!("Face references stored in {}", config.face_dir().display());
                Ok(rocket.manage(pipeline))
            }
            Err(e) => {
                error!("Failed to open face reference directory: {e}");
                Err(rocket)
            }
        }
    }
}

#[cfg(feature = "seeta")]
fn start_detector(config: &FaceConfig) -> Result<Box<dyn FaceDetector>, String> {
    SeetaDetector::spawn(&config.detector_model, config.face_min_size)
        .map(|detector| Box::new(detector) as Box<dyn FaceDetector>)
        .map_err(|e| format!("{} ({})", e, config.detector_model.display()))
}

#[cfg(not(feature = "seeta"))]
fn start_detector(_config: &FaceConfig) -> Result<Box<dyn FaceDetector>, String> {
    Err("no face detector compiled in; rebuild with the `seeta` feature".to_string())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                otp_ttl: 300,
                otp_max_attempts: 3,
                session_ttl: 900,
                display_codes: true,
                disclose_scores: true,
                default_country_code: 91,
                candidates: CandidateSet::example(),
                admin_username: "coordinator".to_string(),
                admin_password: "admin12345".to_string(),
                jwt_secret: "test-jwt-secret".to_string(),
                hmac_secret: "test-hmac-secret".to_string(),
            }
        }
    }

    impl FaceConfig {
        pub fn example(face_dir: &Path) -> Self {
            Self {
                face_dir: face_dir.to_path_buf(),
                face_strategy: Strategy::Template,
                face_threshold: None,
                face_selection: Selection::Largest,
                face_blur: None,
                face_equalize: false,
                face_min_size: 20,
                detector_model: PathBuf::from("unused"),
            }
        }
    }
}

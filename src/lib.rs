#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate mongo_test;

use rocket::{Build, Rocket};

use crate::{
    config::{Config, ConfigFairing, FaceFairing, StoreFairing},
    face::FacePipeline,
    logging::LoggerFairing,
    model::{auth::SessionRegistry, store::SharedStore},
};

pub mod api;
pub mod authenticator;
pub mod config;
pub mod error;
pub mod face;
pub mod logging;
pub mod model;

/// The server as configured by `Rocket.toml`, with every service started by
/// a fairing at ignition.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .manage(SessionRegistry::default())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(FaceFairing)
}

/// The server around services that have already been constructed.
pub fn rocket_for_services(
    config: Config,
    store: SharedStore,
    faces: FacePipeline,
) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(config)
        .manage(store)
        .manage(faces)
        .manage(SessionRegistry::default())
}

/// A client for a server backed by a fresh in-memory store holding the
/// example admin, with face references kept under `face_dir`.
#[cfg(test)]
async fn client_for(face_dir: &std::path::Path) -> rocket::local::asynchronous::Client {
    use std::sync::Arc;

    use crate::model::{
        api::AdminCredentials, db::NewAdmin, memory::MemoryStore, store::IdentityStore,
    };

    log4rs_test_utils::test_logging::init_logging_once_for(["secure_ballot"], None, None);

    let store: SharedStore = Arc::new(MemoryStore::default());
    let admin = NewAdmin::try_from(AdminCredentials::example()).unwrap();
    store.ensure_admin(admin).await.unwrap();

    let rocket = rocket_for_services(Config::example(), store, FacePipeline::example(face_dir));
    rocket::local::asynchronous::Client::tracked(rocket)
        .await
        .unwrap()
}

use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core admin user data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct. A malformed stored hash
    /// never matches.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }

    /// Do the work of [`Self::verify_password`] for a username with no
    /// admin behind it, against a hash made with the same parameters. Always
    /// `false`.
    pub fn verify_absent<T: AsRef<[u8]>>(password: T) -> bool {
        if let Some(decoy) = decoy_hash() {
            let _ = argon2::verify_encoded(decoy, password.as_ref());
        }
        false
    }
}

/// Hash of a random password nobody knows, made on first use.
fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| {
            let mut password = [0_u8; 32];
            let mut salt = [0_u8; 16];
            rand::thread_rng().fill(&mut password);
            rand::thread_rng().fill(&mut salt);
            argon2::hash_encoded(&password, &salt, &argon2::Config::default()).ok()
        })
        .as_deref()
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl DerefMut for Admin {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.admin
    }
}

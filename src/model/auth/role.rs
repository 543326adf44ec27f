use std::fmt::Display;

use rocket::request::FromParam;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Which kind of principal a session is authenticating.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    Voter = 0,
    Admin = 1,
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

impl<'a> FromParam<'a> for Role {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        match param {
            "voter" => Ok(Self::Voter),
            "admin" => Ok(Self::Admin),
            _ => Err(param),
        }
    }
}

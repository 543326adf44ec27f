use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LENGTH: usize = 6;

/// A one-time-password code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Code {
    code: [u8; LENGTH],
}

impl Code {
    /// Generate a random code, uniform over all `10^LENGTH` values.
    pub fn random() -> Self {
        let mut code = [0; LENGTH];
        let digit_dist = Uniform::from(0..=9);
        let mut rng = rand::thread_rng();
        for digit in &mut code {
            *digit = digit_dist.sample(&mut rng);
        }
        Self { code }
    }
}

impl Deref for Code {
    type Target = [u8; LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.code
    }
}

impl Display for Code {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for digit in self.code {
            write!(formatter, "{digit}")?;
        }
        Ok(())
    }
}

impl FromStr for Code {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let string = string.trim();
        let len = string.chars().count();
        if len != LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        let mut code = [0; LENGTH];
        for (digit, c) in code.iter_mut().zip(string.chars()) {
            *digit = c
                .to_digit(10)
                .ok_or(Self::Err::InvalidChar(c))? as u8;
        }
        Ok(Self { code })
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.to_string()
    }
}

impl TryFrom<String> for Code {
    type Error = ParseError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        string.parse()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("code must contain exactly 6 characters, found {0}")]
    InvalidLength(usize),
    #[error("code must contain only digits, found '{0}'")]
    InvalidChar(char),
}

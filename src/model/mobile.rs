use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use phonenumber::{Mode, PhoneNumber};
use serde::{Deserialize, Serialize};

/// A mobile number, held in canonical E.164 form so that lookups are
/// insensitive to how the number was typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mobile {
    inner: PhoneNumber,
}

impl Mobile {
    /// Parse a number as a user would type it. Spaces, dashes and brackets
    /// are ignored; a number without a leading `+` is taken to be national,
    /// in the region with the given calling code. Letters are not accepted.
    pub fn parse(raw: &str, default_country_code: u16) -> Result<Self, phonenumber::ParseError> {
        let compact = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
            .collect::<String>();
        let digits = compact.strip_prefix('+').unwrap_or(&compact);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(phonenumber::ParseError::NoNumber);
        }
        let international = if compact.starts_with('+') {
            compact
        } else {
            format!("+{default_country_code}{}", compact.trim_start_matches('0'))
        };
        international.parse()
    }
}

impl Deref for Mobile {
    type Target = PhoneNumber;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Display for Mobile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.format().mode(Mode::E164))
    }
}

impl FromStr for Mobile {
    type Err = phonenumber::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            inner: phonenumber::parse(None, s)?,
        })
    }
}

impl TryFrom<String> for Mobile {
    type Error = phonenumber::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Mobile> for String {
    fn from(mobile: Mobile) -> Self {
        mobile.to_string()
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Mobile {
        pub fn example() -> Self {
            Self::parse("98765 43210", 91).unwrap()
        }

        pub fn example2() -> Self {
            Self::parse("91234 56789", 91).unwrap()
        }
    }
}

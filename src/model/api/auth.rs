use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use crate::error::Rejection;
use crate::model::otp::Code;

/// First factor for a voter: identity number plus registered mobile number.
#[derive(Clone, Deserialize, Serialize)]
pub struct VoterLogin {
    pub aadhaar: String,
    pub mobile: String,
}

/// Second factor: the one-time code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodeSubmission {
    pub code: Code,
}

/// Third factor: one still frame, base64-encoded. A `data:` URL, as produced
/// by a browser canvas, is also accepted.
#[derive(Clone, Deserialize, Serialize)]
pub struct FaceSubmission {
    pub frame: String,
}

impl FaceSubmission {
    /// Decode the frame into the raw bytes of an encoded image.
    pub fn decode(&self) -> Result<Vec<u8>, Rejection> {
        let frame = self.frame.trim();
        let payload = match frame.strip_prefix("data:") {
            Some(url) => url
                .split_once(',')
                .map(|(_, payload)| payload)
                .ok_or_else(|| Rejection::MalformedImage("data URL has no payload".into()))?,
            None => frame,
        };
        let payload = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect::<String>();
        if payload.is_empty() {
            return Err(Rejection::MalformedImage("empty frame".into()));
        }
        BASE64
            .decode(payload.as_bytes())
            .map_err(|e| Rejection::MalformedImage(e.to_string()))
    }
}

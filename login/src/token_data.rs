use base64::Engine;
use serde::Deserialize;
use serde::Serialize;

/// Access/refresh token pair for one signed-in session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "TokenDataDe")]
pub struct TokenData {
    /// Flat info parsed from the access token (not serialized).
    #[serde(skip)]
    pub claims: ClaimsInfo,
    /// Short-lived credential attached to each API request. A JWT in
    /// practice, but the session layer treats it as opaque.
    pub access_token: String,
    /// Longer-lived credential exchanged for a new pair once the access
    /// token expires.
    pub refresh_token: String,
}

impl PartialEq for TokenData {
    fn eq(&self, other: &Self) -> bool {
        self.access_token == other.access_token && self.refresh_token == other.refresh_token
    }
}

impl Eq for TokenData {}

impl TokenData {
    pub fn from_raw(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let claims = parse_claims(&access_token);
        Self {
            claims,
            access_token,
            refresh_token: refresh_token.into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenDataDe {
    access_token: String,
    refresh_token: String,
}

impl From<TokenDataDe> for TokenData {
    fn from(de: TokenDataDe) -> Self {
        Self::from_raw(de.access_token, de.refresh_token)
    }
}

/// Flat subset of useful claims in the access token issued by the backend
/// (`sub`/`email`/`role`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClaimsInfo {
    pub email: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRole {
    Known(KnownRole),
    Unknown(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownRole {
    User,
    Instructor,
    Advisor,
    Admin,
}

#[derive(Default, Deserialize)]
struct AccessClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<UserRole>,
}

/// Best-effort claim extraction. Tokens that do not look like a JWT yield
/// empty claims rather than an error; the pair must round-trip either way.
pub(crate) fn parse_claims(access_token: &str) -> ClaimsInfo {
    let Some(payload) = decode_jwt_payload(access_token) else {
        return ClaimsInfo::default();
    };
    let claims: AccessClaims = match serde_json::from_slice(&payload) {
        Ok(claims) => claims,
        Err(_) => return ClaimsInfo::default(),
    };
    ClaimsInfo {
        email: claims.email,
        role: claims.role,
    }
}

fn decode_jwt_payload(token: &str) -> Option<Vec<u8>> {
    let mut parts = token.split('.');
    let _header = parts.next();
    let payload_b64 = parts.next();
    let _sig = parts.next();
    payload_b64.and_then(|p| {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(p)
            .ok()
    })
}

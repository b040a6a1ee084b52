//! Per-request signing for the Jimeng web API.
//!
//! Every call carries a fresh set of values derived from the session id:
//! a cookie, an `msToken`, a signature over the API path and timestamp,
//! an `a_bogus` value and the device time.

use md5::{Digest, Md5};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::JimengError;

/// Web app version the signature is bound to.
pub const APP_VERSION: &str = "5.8.0";

/// Path used for the signature suffix when none is given.
const DEFAULT_SIGN_PATH: &str = "/mweb/v1/aigc_draft/generate";

/// Cookie lifetime advertised in `sid_guard` (60 days).
const COOKIE_LIFETIME_SECS: i64 = 60 * 24 * 60 * 60;

/// Signed values attached to one request.
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub cookie: String,
    pub ms_token: String,
    pub sign: String,
    pub a_bogus: String,
    pub device_time: String,
}

/// Holds the session credentials and device identity of one account.
pub struct TokenManager {
    session_id: String,
    account_label: String,
    web_id: String,
    user_id: String,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("session_id", &"<redacted>")
            .field("account_label", &self.account_label)
            .field("web_id", &self.web_id)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a manager for a session id. Fails if the session id is blank.
    pub fn new(session_id: &str, account_label: Option<&str>) -> Result<Self, JimengError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(JimengError::InvalidCredentials(
                "session id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            session_id: session_id.to_string(),
            account_label: account_label
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("default")
                .to_string(),
            web_id: random_digits(19),
            user_id: random_digits(19),
        })
    }

    pub fn account_label(&self) -> &str {
        &self.account_label
    }

    pub fn web_id(&self) -> &str {
        &self.web_id
    }

    /// Produce the signed values for a call to `api_path` at `timestamp`
    /// (epoch seconds).
    pub fn token_for(&self, api_path: &str, timestamp: i64) -> RequestToken {
        let ts = timestamp.to_string();
        RequestToken {
            cookie: self.cookie(timestamp),
            ms_token: random_alphanumeric(107),
            sign: sign(api_path, &ts),
            a_bogus: random_alphanumeric(32),
            device_time: ts,
        }
    }

    fn cookie(&self, timestamp: i64) -> String {
        let expire_date = chrono::DateTime::from_timestamp(timestamp + COOKIE_LIFETIME_SECS, 0)
            .map(|d| d.format("%a, %d-%b-%Y %H:%M:%S GMT").to_string())
            .unwrap_or_default();
        let hashed = md5_hex(&format!("{}{timestamp}", self.session_id));
        let sid = &self.session_id;
        let web_id = &self.web_id;
        let user_id = &self.user_id;

        [
            format!("sessionid={sid}"),
            format!("sessionid_ss={sid}"),
            format!("_tea_web_id={web_id}"),
            format!("web_id={web_id}"),
            format!("_v2_spipe_web_id={web_id}"),
            format!("uid_tt={user_id}"),
            format!("uid_tt_ss={user_id}"),
            format!("sid_tt={sid}"),
            format!("sid_guard={sid}%7C{timestamp}%7C5184000%7C{expire_date}"),
            format!("ssid_ucp_v1=1.0.0-{hashed}"),
            format!("sid_ucp_v1=1.0.0-{hashed}"),
            "store-region=cn-gd".to_string(),
            "store-region-src=uid".to_string(),
            "is_staff_user=false".to_string(),
        ]
        .join("; ")
    }
}

/// Request signature: md5 over the last 7 characters of the path, the app
/// version and the timestamp.
pub fn sign(api_path: &str, timestamp: &str) -> String {
    let path = if api_path.is_empty() {
        DEFAULT_SIGN_PATH
    } else {
        api_path
    };
    let suffix = &path[path.len().saturating_sub(7)..];
    md5_hex(&format!("9e2c|{suffix}|7|{APP_VERSION}|{timestamp}||11ac"))
}

fn md5_hex(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    format!("{digest:x}")
}

fn random_digits(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

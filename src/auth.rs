//! Credentials and request signing for the two API generations.
//!
//! The management API is served by two generations side by side:
//!
//! - **Legacy** (`api/v1/` on the shared management host): HTTP Basic
//!   authentication with the API key id and secret.
//! - **Current** (`crux/v1/` on the tenant's own host): every request is
//!   signed with an `EG1-HMAC-SHA256` authorization header derived from the
//!   client secret, a timestamp and a per-request nonce.
//!
//! The generation is a property of the [`Endpoint`] being called, not of the
//! client, so one client can talk to both.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Method, Url};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Host serving the legacy API generation.
pub const LEGACY_HOST: &str = "manage.akamai-access.com";

/// Name of the signing algorithm for current-generation requests.
const SIGNING_ALGORITHM: &str = "EG1-HMAC-SHA256";

/// Immutable signing material, owned by [`crate::client::EaaClient`].
///
/// `Debug` redacts the secret so credentials can safely appear in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API host of the tenant (current generation), without scheme.
    pub host: String,
    /// Key identifier: the API key for legacy calls, the client token for
    /// signed calls.
    pub key_id: String,
    /// Shared secret paired with `key_id`.
    pub secret: String,
    /// Access token, only used by signed (current-generation) requests.
    pub access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// API generation an endpoint belongs to.
///
/// Adding a generation means adding a variant here; the compiler then
/// points at every place that needs a base path or a signing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    /// `api/v1/` with HTTP Basic authentication.
    Legacy,
    /// `crux/v1/` with HMAC request signing.
    Current,
}

impl ApiGeneration {
    /// Path prefix prepended to every endpoint of this generation.
    pub fn base_path(self) -> &'static str {
        match self {
            ApiGeneration::Legacy => "api/v1/",
            ApiGeneration::Current => "crux/v1/",
        }
    }

    /// Production origin (scheme + host) for this generation.
    pub fn origin(self, credentials: &Credentials) -> String {
        match self {
            ApiGeneration::Legacy => format!("https://{LEGACY_HOST}/"),
            ApiGeneration::Current => format!("https://{}/", credentials.host),
        }
    }
}

/// A relative API path tagged with the generation that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path relative to the generation's base path, without leading slash.
    pub path: String,
    /// Selects base path and signing scheme.
    pub generation: ApiGeneration,
}

impl Endpoint {
    /// An endpoint served by the legacy generation.
    pub fn legacy(path: impl Into<String>) -> Self {
        Endpoint {
            path: path.into(),
            generation: ApiGeneration::Legacy,
        }
    }

    /// An endpoint served by the current generation.
    pub fn current(path: impl Into<String>) -> Self {
        Endpoint {
            path: path.into(),
            generation: ApiGeneration::Current,
        }
    }

    /// Path relative to an origin: generation base path plus endpoint path.
    pub fn relative_url(&self) -> String {
        format!(
            "{}{}",
            self.generation.base_path(),
            self.path.trim_start_matches('/')
        )
    }
}

/// What gets attached to an outgoing request to authenticate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// HTTP Basic with the given user and password.
    Basic {
        /// Basic-auth user (the key id).
        user: String,
        /// Basic-auth password (the secret).
        password: String,
    },
    /// A ready-made `Authorization` header value.
    Header(String),
}

impl Authorization {
    /// Renders the value of the `Authorization` request header.
    pub fn header_value(&self) -> String {
        match self {
            Authorization::Basic { user, password } => {
                format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
            }
            Authorization::Header(value) => value.clone(),
        }
    }
}

/// Computes the authorization for a fully-built request.
///
/// `url` must already carry the final query string: the signature of
/// current-generation requests covers path and query.
pub fn authorize(
    generation: ApiGeneration,
    credentials: &Credentials,
    method: &Method,
    url: &Url,
    body: &[u8],
) -> Authorization {
    match generation {
        ApiGeneration::Legacy => Authorization::Basic {
            user: credentials.key_id.clone(),
            password: credentials.secret.clone(),
        },
        ApiGeneration::Current => {
            let timestamp = chrono::Utc::now().format("%Y%m%dT%H:%M:%S+0000").to_string();
            let nonce = generate_nonce();
            Authorization::Header(sign_request(
                credentials,
                method,
                url,
                body,
                &timestamp,
                &nonce,
            ))
        }
    }
}

/// 16 random bytes, hex encoded.
fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hmac_base64(key: &[u8], data: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any size");
    mac.update(data);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Builds the `EG1-HMAC-SHA256` authorization header value.
///
/// The signing key is the HMAC of the timestamp under the client secret;
/// the signature is the HMAC of the tab-joined request description under
/// that key. Only POST bodies contribute a content hash.
pub fn sign_request(
    credentials: &Credentials,
    method: &Method,
    url: &Url,
    body: &[u8],
    timestamp: &str,
    nonce: &str,
) -> String {
    let auth_header = format!(
        "{SIGNING_ALGORITHM} client_token={};access_token={};timestamp={timestamp};nonce={nonce};",
        credentials.key_id, credentials.access_token
    );

    let mut path_and_query = url.path().to_string();
    if let Some(query) = url.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let content_hash = if *method == Method::POST && !body.is_empty() {
        BASE64.encode(Sha256::digest(body))
    } else {
        String::new()
    };

    let host = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_string(),
    };

    let data_to_sign = [
        method.as_str(),
        url.scheme(),
        host.as_str(),
        path_and_query.as_str(),
        "",
        content_hash.as_str(),
        auth_header.as_str(),
    ]
    .join("\t");

    let signing_key = hmac_base64(credentials.secret.as_bytes(), timestamp.as_bytes());
    let signature = hmac_base64(signing_key.as_bytes(), data_to_sign.as_bytes());

    format!("{auth_header}signature={signature}")
}

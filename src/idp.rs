//! Identity provider listing.
//!
//! - [`list_idps`] reads every identity provider of the tenant through the
//!   paginated `mgmt-pop/idp` endpoint.
//! - [`format_idp`] renders one provider as a CSV line for the `idp list`
//!   command, under [`IDP_HEADER`].

use serde::Deserialize;

use crate::auth::Endpoint;
use crate::client::EaaClient;
use crate::pagination::{MAX_PAGE_LIMIT, pages};

/// Header line printed before the list.
pub const IDP_HEADER: &str = "#IdP-id,name,status,certificate,client,dp";

/// An identity provider as returned by `mgmt-pop/idp`.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProvider {
    /// Opaque identifier used in URLs.
    pub uuid_url: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Numeric deployment status.
    #[serde(default)]
    pub idp_status: Option<u8>,

    /// Identifier of the signing certificate, if one is attached.
    #[serde(default)]
    pub cert: Option<String>,

    /// Whether the access client is enabled for this provider.
    #[serde(default)]
    pub enable_access_client: bool,

    /// Whether device posture is enabled for this provider.
    #[serde(default)]
    pub enable_device_posture: bool,
}

/// Human-readable name of a deployment status code.
pub fn status_name(status: Option<u8>) -> String {
    match status {
        Some(1) => "New".to_string(),
        Some(2) => "Pending".to_string(),
        Some(3) => "Deployed".to_string(),
        Some(4) => "Failed".to_string(),
        Some(5) => "PendingDelete".to_string(),
        Some(6) => "Deleted".to_string(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

/// Renders one provider as `idp://<id>,<name>,<status>,<cert>,<client>,<dp>`.
pub fn format_idp(idp: &IdentityProvider) -> String {
    let cert = idp
        .cert
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(|c| format!("crt://{c}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "idp://{},{},{},{},{},{}",
        idp.uuid_url,
        idp.name,
        status_name(idp.idp_status),
        cert,
        yes_no(idp.enable_access_client),
        yes_no(idp.enable_device_posture),
    )
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag { "Y" } else { "N" }
}

/// Retrieves every identity provider, following pagination to the end.
///
/// # Errors
///
/// - `EaaError::Api`: the API returned a non-success status.
/// - `EaaError::Network`: transport-level failure.
/// - `EaaError::Parse`: a page did not match the list envelope.
pub async fn list_idps(client: &EaaClient) -> crate::error::Result<Vec<IdentityProvider>> {
    pages(client, Endpoint::current("mgmt-pop/idp"), Vec::new(), MAX_PAGE_LIMIT)
        .collect()
        .await
}

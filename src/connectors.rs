//! Connector listing.
//!
//! [`list_connectors`] reads every connector registered in the tenant
//! through the paginated `mgmt-pop/agents` endpoint; [`format_connector`]
//! renders one as a CSV line under [`CONNECTOR_HEADER`].

use serde::Deserialize;

use crate::auth::Endpoint;
use crate::client::EaaClient;
use crate::idp::yes_no;
use crate::pagination::{MAX_PAGE_LIMIT, pages};

/// Header line printed before the list.
pub const CONNECTOR_HEADER: &str =
    "#Connector-id,name,reachable,status,version,privateip,publicip,debug";

/// A connector (agent) as returned by `mgmt-pop/agents`.
#[derive(Debug, Clone, Deserialize)]
pub struct Connector {
    /// Opaque identifier used in URLs.
    pub uuid_url: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Reachability code reported by the service.
    #[serde(default)]
    pub reach: Option<serde_json::Value>,

    /// Status code reported by the service.
    #[serde(default)]
    pub status: Option<serde_json::Value>,

    /// Agent version, e.g. `AGENT-21.1.0`.
    #[serde(default)]
    pub agent_version: Option<String>,

    /// Address of the connector inside the private network.
    #[serde(default)]
    pub private_ip: Option<String>,

    /// Address the connector dials out from.
    #[serde(default)]
    pub public_ip: Option<String>,

    /// Whether support may open a debug channel to this connector.
    #[serde(default)]
    pub debug_channel_permitted: bool,
}

fn scalar(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "-".to_string(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Renders one connector as
/// `con://<id>,<name>,<reachable>,<status>,<version>,<private_ip>,<public_ip>,<debug>`.
pub fn format_connector(connector: &Connector) -> String {
    let version = connector
        .agent_version
        .as_deref()
        .map(|v| v.replace("AGENT-", "").trim().to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "con://{},{},{},{},{},{},{},{}",
        connector.uuid_url,
        connector.name,
        scalar(connector.reach.as_ref()),
        scalar(connector.status.as_ref()),
        version,
        connector.private_ip.as_deref().unwrap_or("-"),
        connector.public_ip.as_deref().unwrap_or("-"),
        yes_no(connector.debug_channel_permitted),
    )
}

/// Retrieves every connector, following pagination to the end.
///
/// # Errors
///
/// - `EaaError::Api`: the API returned a non-success status.
/// - `EaaError::Network`: transport-level failure.
/// - `EaaError::Parse`: a page did not match the list envelope.
pub async fn list_connectors(client: &EaaClient) -> crate::error::Result<Vec<Connector>> {
    let params = vec![("expand".to_string(), "true".to_string())];
    pages(client, Endpoint::current("mgmt-pop/agents"), params, MAX_PAGE_LIMIT)
        .collect()
        .await
}

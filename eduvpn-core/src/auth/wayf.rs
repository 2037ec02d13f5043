//! Skipping the "Where Are You From" page
//!
//! Secure Internet servers publish an authentication URL template. Filling it
//! with the organization id sends the browser straight to the user's identity
//! provider instead of the chooser page.

use url::Url;

use crate::error::ConnectionError;
use crate::types::WayfSkippingInfo;

const RETURN_TO_PLACEHOLDER: &str = "@RETURN_TO@";
const ORG_ID_PLACEHOLDER: &str = "@ORG_ID@";

/// Percent-encode a value for use inside a query string
fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Build the URL the browser should open for `authorization_url`
pub fn apply_wayf_skip(
    info: &WayfSkippingInfo,
    authorization_url: &Url,
) -> Result<Url, ConnectionError> {
    let filled = info
        .auth_url_template
        .replace(RETURN_TO_PLACEHOLDER, &encode_component(authorization_url.as_str()))
        .replace(ORG_ID_PLACEHOLDER, &encode_component(&info.org_id));

    Url::parse(&filled).map_err(|e| ConnectionError::AuthorizationFailed {
        reason: format!("Invalid authentication URL template: {}", e),
    })
}

use tracing::debug;

use super::CapabilityDocument;
use crate::dns::ServiceEndpoint;
use crate::http::HttpClient;
use crate::Result;

/// Fetch and parse the capability document of a service endpoint.
#[tracing::instrument(skip_all, fields(host = %endpoint.host, port = endpoint.port))]
pub async fn fetch_capabilities(
    http: &HttpClient,
    endpoint: &ServiceEndpoint,
) -> Result<CapabilityDocument> {
    let url = endpoint.well_known_url();
    let body = http.get_text(&url).await?;
    let document = CapabilityDocument::parse(&body)?;
    debug!(
        version = %document.version,
        capabilities = document.capabilities.len(),
        "fetched capability document"
    );
    Ok(document)
}

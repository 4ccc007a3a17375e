//! Solr Transport
//!
//! The transport seam the query layer talks through, plus the default
//! HTTP implementation against a Solr select handler.

use async_trait::async_trait;
use url::Url;

use crate::config::SolrConfig;
use crate::error::{Result, SolrError};
use crate::solr::params::QueryParams;
use crate::solr::response::QueryResponse;

/// Select handler path under the collection URL.
const SELECT_HANDLER: &str = "select";

// ============================================================================
// Transport Seam
// ============================================================================

/// Issues one compiled parameter map against a search backend.
///
/// Implementations report failures as [`SolrError`]; the query layer
/// absorbs those and degrades to empty results.
#[async_trait]
pub trait SolrTransport: Send + Sync {
    async fn query(&self, params: &QueryParams) -> Result<QueryResponse>;
}

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client for a single Solr core or collection.
pub struct SolrClient {
    http: reqwest::Client,
    config: SolrConfig,
}

impl SolrClient {
    pub fn new(config: SolrConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("solrkit/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// URL of the select handler: `<base>/<collection>/select`.
    fn select_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.url)?;
        url.path_segments_mut()
            .map_err(|_| SolrError::Config(format!("Solr URL cannot be a base: {}", self.config.url)))?
            .pop_if_empty()
            .push(&self.config.collection)
            .push(SELECT_HANDLER);
        Ok(url)
    }
}

#[async_trait]
impl SolrTransport for SolrClient {
    /// POST the parameters form-encoded, repeating multi-valued keys.
    async fn query(&self, params: &QueryParams) -> Result<QueryResponse> {
        let url = self.select_url()?;
        let mut pairs = params.to_pairs();
        pairs.push(("wt".to_string(), "json".to_string()));

        tracing::debug!(collection = %self.config.collection, params = pairs.len(), "querying select handler");
        let response = self.http.post(url).form(&pairs).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), %body, "Solr query failed");
            return Err(SolrError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str::<QueryResponse>(&body)?)
    }
}

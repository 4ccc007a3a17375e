//! Chainable query construction and search client for Apache Solr.
//!
//! The central type is [`SolrQuerySet`]: filter, search, sort, facet,
//! stats, and highlighting directives chain without side effects, and
//! execution against the select handler happens only when results are
//! asked for. [`AliasedSolrQuerySet`] adds readable field names on top,
//! useful with dynamic field types.
//!
//! ```no_run
//! use std::sync::Arc;
//! use solrkit::{SolrClient, SolrConfig, SolrQuerySet};
//!
//! # async fn demo() -> solrkit::Result<()> {
//! let solr = Arc::new(SolrClient::new(SolrConfig::load())?);
//! let queryset = SolrQuerySet::new(solr)
//!     .filter_by([("item_type_s", "person")])
//!     .order_by(["sort_name"])
//!     .facet(["birth_country_s"]);
//!
//! let docs = queryset.get_results().await;
//! let total = queryset.count().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod query;
pub mod solr;

pub use config::SolrConfig;
pub use error::{Result, SolrError};
pub use query::{AliasedSolrQuerySet, LookupValue, SolrQuerySet, SolrValue};
pub use solr::{
    FacetCounts, ParamValue, QueryParams, QueryResponse, SolrClient, SolrDocument, SolrTransport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

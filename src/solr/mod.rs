//! Solr transport: parameter map, response model, and HTTP client.

pub mod client;
pub mod params;
pub mod response;

pub use client::{SolrClient, SolrTransport};
pub use params::{ParamValue, QueryParams};
pub use response::{
    DocumentList, FacetCounts, Group, GroupedField, PairedCounts, QueryResponse, RangeFacet,
    ResponseHeader, SolrDocument,
};

//! Select Handler Response Model
//!
//! Typed view of Solr's JSON response envelope. Facet field and range
//! counts arrive as flat alternating `[value, count, ...]` arrays; they
//! are rebuilt here into order-preserving value→count maps.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A result document as a plain field→value record.
pub type SolrDocument = serde_json::Map<String, Value>;

// ============================================================================
// Facet Counts
// ============================================================================

/// Order-preserving value→count map, deserialized from Solr's flat
/// alternating array form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedCounts(pub IndexMap<String, u64>);

impl<'de> Deserialize<'de> for PairedCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flat: Vec<Value> = Vec::deserialize(deserializer)?;
        let mut counts = IndexMap::with_capacity(flat.len() / 2);
        for pair in flat.chunks(2) {
            if pair.len() < 2 {
                // odd trailing element; nothing to pair it with
                continue;
            }
            let value = match &pair[0] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            counts.insert(value, pair[1].as_u64().unwrap_or_default());
        }
        Ok(PairedCounts(counts))
    }
}

impl std::ops::Deref for PairedCounts {
    type Target = IndexMap<String, u64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Range facet buckets for one field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RangeFacet {
    pub counts: PairedCounts,
    pub gap: Value,
    pub start: Value,
    pub end: Value,
}

/// The `facet_counts` section of a response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FacetCounts {
    #[serde(rename = "facet_queries")]
    pub queries: IndexMap<String, Value>,
    #[serde(rename = "facet_fields")]
    pub fields: IndexMap<String, PairedCounts>,
    #[serde(rename = "facet_ranges")]
    pub ranges: IndexMap<String, RangeFacet>,
}

impl FacetCounts {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.fields.is_empty() && self.ranges.is_empty()
    }
}

// ============================================================================
// Documents and Groups
// ============================================================================

/// The flat `response` section: total hits plus one page of documents.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocumentList {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    pub start: u64,
    pub docs: Vec<SolrDocument>,
}

/// One group of documents in a grouped response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Group {
    #[serde(rename = "groupValue")]
    pub group_value: Value,
    pub doclist: DocumentList,
}

/// Per-field grouping results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroupedField {
    pub matches: u64,
    pub groups: Vec<Group>,
}

// ============================================================================
// Response Envelope
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseHeader {
    pub status: i64,
    #[serde(rename = "QTime")]
    pub qtime: i64,
    /// Request parameters echoed back by Solr.
    pub params: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct StatsSection {
    stats_fields: IndexMap<String, Value>,
}

/// A parsed select-handler response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryResponse {
    #[serde(rename = "responseHeader")]
    pub header: ResponseHeader,
    pub response: DocumentList,
    pub facet_counts: FacetCounts,
    stats: StatsSection,
    pub highlighting: IndexMap<String, IndexMap<String, Vec<String>>>,
    pub expanded: IndexMap<String, Value>,
    pub grouped: IndexMap<String, GroupedField>,
}

impl QueryResponse {
    /// Documents for the current page. Empty for grouped responses, which
    /// carry their documents inside [`QueryResponse::grouped`].
    pub fn docs(&self) -> &Vec<SolrDocument> {
        &self.response.docs
    }

    /// Total number of matches. Grouped responses report the match count
    /// of the grouping field (taken from the echoed `group.field` request
    /// parameter, falling back to the first grouped entry).
    pub fn num_found(&self) -> u64 {
        if self.grouped.is_empty() {
            return self.response.num_found;
        }
        let by_param = self
            .header
            .params
            .get("group.field")
            .and_then(Value::as_str)
            .and_then(|field| self.grouped.get(field));
        match by_param {
            Some(grouped) => grouped.matches,
            None => self.grouped.values().next().map_or(0, |g| g.matches),
        }
    }

    /// Per-field aggregate statistics (`stats.stats_fields`).
    pub fn stats(&self) -> &IndexMap<String, Value> {
        &self.stats.stats_fields
    }
}

//! Solr QuerySet
//!
//! Chainable, immutable query construction over a [`SolrTransport`].
//! Every directive method copies the current state into a new queryset
//! and returns it, so intermediate querysets can be reused and forked:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use solrkit::config::SolrConfig;
//! # use solrkit::query::SolrQuerySet;
//! # use solrkit::solr::SolrClient;
//! # async fn demo() {
//! let solr = Arc::new(SolrClient::new(SolrConfig::new("http://localhost:8983/solr", "catalog")).unwrap());
//! let people = SolrQuerySet::new(solr)
//!     .filter_by([("item_type_s", "person")])
//!     .search(["name:hem*"])
//!     .order_by(["sort_name"]);
//! let docs = people.get_results().await;
//! # }
//! ```
//!
//! Execution is explicit: only `get_results`, `count`, the section
//! accessors, `query`, `get`, `slice_stepped` and the emptiness
//! predicates talk to the backend. Transport failures degrade to empty
//! results rather than propagating.

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;

use crate::query::lookup::{lookup_to_filter, LookupValue};
use crate::solr::client::SolrTransport;
use crate::solr::params::{ParamValue, QueryParams};
use crate::solr::response::{FacetCounts, QueryResponse, SolrDocument};

/// Query matching every document.
pub const MATCH_ALL: &str = "*:*";
/// Query matching no documents.
pub const MATCH_NONE: &str = "NOT *:*";

/// Default operator between accumulated search terms.
const DEFAULT_SEARCH_OPERATOR: &str = "AND";

// ============================================================================
// Query State
// ============================================================================

/// Accumulated query directives. Owned by exactly one queryset and
/// deep-copied on every directive call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryState {
    start: usize,
    stop: Option<usize>,
    sort_options: Vec<String>,
    search_qs: Vec<String>,
    filter_qs: Vec<String>,
    field_list: Vec<String>,
    highlight_fields: Vec<String>,
    highlight_opts: IndexMap<String, ParamValue>,
    facet_field_list: Vec<String>,
    range_facet_fields: Vec<String>,
    facet_opts: IndexMap<String, ParamValue>,
    stats_field_list: Vec<String>,
    stats_opts: IndexMap<String, ParamValue>,
    group_field: Option<String>,
    group_opts: IndexMap<String, ParamValue>,
    raw_params: IndexMap<String, ParamValue>,
    search_op: String,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            start: 0,
            stop: None,
            sort_options: Vec::new(),
            search_qs: Vec::new(),
            filter_qs: Vec::new(),
            field_list: Vec::new(),
            highlight_fields: Vec::new(),
            highlight_opts: IndexMap::new(),
            facet_field_list: Vec::new(),
            range_facet_fields: Vec::new(),
            facet_opts: IndexMap::new(),
            stats_field_list: Vec::new(),
            stats_opts: IndexMap::new(),
            group_field: None,
            group_opts: IndexMap::new(),
            raw_params: IndexMap::new(),
            search_op: DEFAULT_SEARCH_OPERATOR.to_string(),
        }
    }
}

// ============================================================================
// QuerySet
// ============================================================================

/// An immutable, chainable Solr query.
///
/// The only mutable cell is the per-instance result cache, populated by
/// execution methods on this instance and never shared with clones.
pub struct SolrQuerySet {
    solr: Arc<dyn SolrTransport>,
    state: QueryState,
    result_cache: Mutex<Option<QueryResponse>>,
}

impl Clone for SolrQuerySet {
    /// Clones share the transport but never the cache: a clone must
    /// execute for itself to observe results for its own state.
    fn clone(&self) -> Self {
        Self {
            solr: Arc::clone(&self.solr),
            state: self.state.clone(),
            result_cache: Mutex::new(None),
        }
    }
}

impl fmt::Debug for SolrQuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolrQuerySet")
            .field("state", &self.state)
            .field("cached", &self.cache().is_some())
            .finish()
    }
}

impl SolrQuerySet {
    pub fn new(solr: Arc<dyn SolrTransport>) -> Self {
        Self {
            solr,
            state: QueryState::default(),
            result_cache: Mutex::new(None),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<QueryResponse>> {
        self.result_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // State accessors
    // ------------------------------------------------------------------

    pub fn start(&self) -> usize {
        self.state.start
    }

    pub fn stop(&self) -> Option<usize> {
        self.state.stop
    }

    pub fn search_terms(&self) -> &[String] {
        &self.state.search_qs
    }

    pub fn filter_terms(&self) -> &[String] {
        &self.state.filter_qs
    }

    pub fn field_list(&self) -> &[String] {
        &self.state.field_list
    }

    pub fn sort_options(&self) -> &[String] {
        &self.state.sort_options
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    /// Append raw filter queries, passed through to `fq` unmodified.
    pub fn filter<I>(&self, terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut qs = self.clone();
        qs.state.filter_qs.extend(terms.into_iter().map(Into::into));
        qs
    }

    /// Append filter queries built from `field`/`field__lookup` keys.
    /// See [`lookup_to_filter`] for the supported lookups.
    pub fn filter_by<I, K, V>(&self, lookups: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        self.filter_by_tagged(lookups, "")
    }

    /// Like [`SolrQuerySet::filter_by`], with a tag usable for facet
    /// field exclusions.
    pub fn filter_by_tagged<I, K, V>(&self, lookups: I, tag: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        let mut qs = self.clone();
        for (key, value) in lookups {
            qs.state
                .filter_qs
                .push(lookup_to_filter(key.as_ref(), &value.into(), tag));
        }
        qs
    }

    /// Append raw search queries. All accumulated search queries are
    /// combined with the search operator into the `q` parameter.
    pub fn search<I>(&self, terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut qs = self.clone();
        qs.state.search_qs.extend(terms.into_iter().map(Into::into));
        qs
    }

    /// Append search queries built from `field`/`field__lookup` keys.
    pub fn search_by<I, K, V>(&self, lookups: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        let mut qs = self.clone();
        for (key, value) in lookups {
            qs.state
                .search_qs
                .push(lookup_to_filter(key.as_ref(), &value.into(), ""));
        }
        qs
    }

    /// Append sort fields. A `-` prefix sorts descending, otherwise
    /// ascending.
    pub fn order_by<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut qs = self.clone();
        for field in fields {
            let field = field.as_ref();
            let entry = match field.strip_prefix('-') {
                Some(name) => format!("{name} desc"),
                None => format!("{field} asc"),
            };
            qs.state.sort_options.push(entry);
        }
        qs
    }

    /// Replace the field limit with the given fields. Entries may be
    /// plain field names or `alias:field` projections.
    pub fn only<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut qs = self.clone();
        qs.state.field_list = fields.into_iter().map(Into::into).collect();
        qs
    }

    /// Append to the field limit without replacing earlier entries.
    pub fn also<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut qs = self.clone();
        qs.state.field_list.extend(fields.into_iter().map(Into::into));
        qs
    }

    /// Request facets for the given fields. Replaces the facet field
    /// list of any earlier `facet` call in the chain.
    pub fn facet<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut qs = self.clone();
        qs.state.facet_field_list = fields.into_iter().map(Into::into).collect();
        qs
    }

    /// Like [`SolrQuerySet::facet`], merging additional facet options.
    /// Option keys get a `facet.` prefix at compile time unless they are
    /// already field-qualified (`f.<field>...`).
    pub fn facet_with<I, O, K, V>(&self, fields: I, opts: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.facet(fields);
        for (key, value) in opts {
            qs.state.facet_opts.insert(key.into(), value.into());
        }
        qs
    }

    /// Add a single facet field to the facet field list.
    pub fn facet_field(&self, field: &str) -> Self {
        self.facet_field_with(field, "", no_opts())
    }

    /// Add a single facet field with field-specific facet options.
    /// `exclude` names a filter tag to ignore when counting.
    pub fn facet_field_with<O, K, V>(&self, field: &str, exclude: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.clone();
        let entry = if exclude.is_empty() {
            field.to_string()
        } else {
            format!("{{!ex={exclude}}}{field}")
        };
        qs.state.facet_field_list.push(entry);
        for (key, value) in opts {
            qs.state
                .facet_opts
                .insert(format!("f.{field}.facet.{}", key.into()), value.into());
        }
        qs
    }

    /// Add a range facet for a field. Solr requires `start`, `end`, and
    /// `gap` options; they are stored field-qualified.
    pub fn facet_range<O, K, V>(&self, field: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.clone();
        qs.state.range_facet_fields.push(field.to_string());
        for (key, value) in opts {
            qs.state
                .facet_opts
                .insert(format!("f.{field}.facet.range.{}", key.into()), value.into());
        }
        qs
    }

    /// Request stats for the given fields. Replaces the stats field list
    /// of any earlier `stats` call in the chain. Fields may carry local
    /// parameters, e.g. `{!ex=filterA}account_start_i`.
    pub fn stats<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut qs = self.clone();
        qs.state.stats_field_list = fields.into_iter().map(Into::into).collect();
        qs
    }

    /// Like [`SolrQuerySet::stats`], merging additional stats options.
    /// Option keys get a `stats.` prefix at compile time unless they
    /// already start with `stats`.
    pub fn stats_with<I, O, K, V>(&self, fields: I, opts: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.stats(fields);
        for (key, value) in opts {
            qs.state.stats_opts.insert(key.into(), value.into());
        }
        qs
    }

    /// Request highlighting for a field.
    pub fn highlight(&self, field: &str) -> Self {
        self.highlight_with(field, no_opts())
    }

    /// Request highlighting for a field with field-specific options,
    /// stored as `f.<field>.hl.<option>` so multiple highlighted fields
    /// keep independent settings.
    pub fn highlight_with<O, K, V>(&self, field: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.clone();
        qs.state.highlight_fields.push(field.to_string());
        for (key, value) in opts {
            qs.state
                .highlight_opts
                .insert(format!("f.{field}.hl.{}", key.into()), value.into());
        }
        qs
    }

    /// Group results by a field.
    pub fn group(&self, field: &str) -> Self {
        self.group_with(field, no_opts())
    }

    /// Group results by a field with grouping options (`limit`, `sort`,
    /// ...), stored with a `group.` prefix.
    pub fn group_with<O, K, V>(&self, field: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.clone();
        qs.state.group_field = Some(field.to_string());
        for (key, value) in opts {
            let key = key.into();
            let key = if key.starts_with("group") {
                key
            } else {
                format!("group.{key}")
            };
            qs.state.group_opts.insert(key, value.into());
        }
        qs
    }

    /// Add arbitrary raw request parameters, e.g. variables referenced
    /// in join or field queries. Merged last at compile time; raw
    /// parameters win over computed ones.
    pub fn raw_query_parameters<O, K, V>(&self, params: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut qs = self.clone();
        for (key, value) in params {
            qs.state.raw_params.insert(key.into(), value.into());
        }
        qs
    }

    /// Use a different operator between search terms (default `AND`).
    pub fn with_search_operator(&self, operator: &str) -> Self {
        let mut qs = self.clone();
        qs.state.search_op = operator.to_string();
        qs
    }

    /// A copy of this queryset.
    pub fn all(&self) -> Self {
        self.clone()
    }

    /// A queryset that matches nothing: search terms are replaced with
    /// a single always-false query; filters, sort, and the rest of the
    /// state are kept.
    pub fn none(&self) -> Self {
        let mut qs = self.clone();
        qs.state.search_qs = vec![MATCH_NONE.to_string()];
        qs
    }

    /// Set the pagination window. A missing `start` means 0.
    pub fn set_limits(&self, start: Option<usize>, stop: Option<usize>) -> Self {
        let mut qs = self.clone();
        qs.state.start = start.unwrap_or(0);
        qs.state.stop = stop;
        qs
    }

    /// Restrict to a subsection of the results. Returns an unexecuted
    /// queryset, so slices stay lazy and chainable.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let start = match range.start_bound() {
            Bound::Included(&s) => Some(s),
            Bound::Excluded(&s) => Some(s + 1),
            Bound::Unbounded => None,
        };
        let stop = match range.end_bound() {
            Bound::Included(&e) => Some(e + 1),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => None,
        };
        self.set_limits(start, stop)
    }

    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    /// Compile the current state into request parameters for the select
    /// handler. Pure: no side effects, and the same state always
    /// compiles to the same map.
    pub fn query_opts(&self) -> QueryParams {
        let state = &self.state;
        let mut opts = QueryParams::new();

        opts.insert("start", state.start);
        opts.insert("fq", ParamValue::List(state.filter_qs.clone()));
        if let Some(stop) = state.stop {
            opts.insert("rows", stop.saturating_sub(state.start));
        }
        opts.insert("sort", state.sort_options.join(","));
        // main query; find everything when no search terms are set
        let q = if state.search_qs.is_empty() {
            MATCH_ALL.to_string()
        } else {
            state.search_qs.join(&format!(" {} ", state.search_op))
        };
        opts.insert("q", q);
        opts.insert("fl", state.field_list.join(","));

        if !state.highlight_fields.is_empty() {
            opts.insert("hl", true);
            opts.insert("hl.fl", state.highlight_fields.join(","));
            // highlight options are stored field-qualified; add as-is
            for (key, value) in &state.highlight_opts {
                opts.insert(key.clone(), value.clone());
            }
        }

        if !state.facet_field_list.is_empty()
            || !state.range_facet_fields.is_empty()
            || !state.facet_opts.is_empty()
        {
            opts.insert("facet", true);
            opts.insert("facet.field", ParamValue::List(state.facet_field_list.clone()));
            opts.insert("facet.range", ParamValue::List(state.range_facet_fields.clone()));
            for (key, value) in &state.facet_opts {
                // field-specific options (`f.<field>...`) pass through
                let key = if key.starts_with("f.") {
                    key.clone()
                } else {
                    format!("facet.{key}")
                };
                opts.insert(key, value.clone());
            }
        }

        if !state.stats_field_list.is_empty() {
            opts.insert("stats", true);
            opts.insert("stats.field", ParamValue::List(state.stats_field_list.clone()));
            for (key, value) in &state.stats_opts {
                let key = if key.starts_with("stats") {
                    key.clone()
                } else {
                    format!("stats.{key}")
                };
                opts.insert(key, value.clone());
            }
        }

        if let Some(group_field) = &state.group_field {
            opts.insert("group", true);
            opts.insert("group.field", group_field.as_str());
            for (key, value) in &state.group_opts {
                opts.insert(key.clone(), value.clone());
            }
        }

        // raw parameters merge last and win over computed keys
        for (key, value) in &state.raw_params {
            opts.insert(key.clone(), value.clone());
        }

        opts.strip_empty();
        opts
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Query Solr with the current options, populate this instance's
    /// result cache, and return the documents portion of the response.
    /// Transport failures clear the cache and return no documents.
    pub async fn get_results(&self) -> Vec<SolrDocument> {
        self.get_results_with(QueryParams::new()).await
    }

    /// Like [`SolrQuerySet::get_results`], with per-key overrides that
    /// take precedence over the compiled options.
    pub async fn get_results_with(&self, overrides: QueryParams) -> Vec<SolrDocument> {
        let mut opts = self.query_opts();
        opts.merge(overrides);
        match self.solr.query(&opts).await {
            Ok(response) => {
                let docs = response.docs().clone();
                *self.cache() = Some(response);
                docs
            }
            Err(err) => {
                tracing::warn!(error = %err, "query failed; returning no results");
                *self.cache() = None;
                Vec::new()
            }
        }
    }

    /// Total number of results for the current query. Reads the cached
    /// response when one is present; otherwise issues a zero-row query
    /// with faceting and highlighting disabled, without populating the
    /// cache. Returns 0 on transport failure.
    pub async fn count(&self) -> u64 {
        {
            let cache = self.cache();
            if let Some(response) = cache.as_ref() {
                return response.num_found();
            }
        }

        let mut opts = self.query_opts();
        opts.insert("rows", 0);
        opts.insert("facet", false);
        opts.insert("hl", false);
        match self.solr.query(&opts).await {
            Ok(response) => response.num_found(),
            Err(err) => {
                tracing::warn!(error = %err, "count query failed");
                0
            }
        }
    }

    /// Facet counts for the current query, as order-preserving
    /// value→count maps per field.
    pub async fn get_facets(&self) -> FacetCounts {
        {
            let cache = self.cache();
            if let Some(response) = cache.as_ref() {
                return response.facet_counts.clone();
            }
        }
        match self.fetch_section(true).await {
            Some(response) => response.facet_counts,
            None => FacetCounts::default(),
        }
    }

    /// Per-field stats from the current query.
    pub async fn get_stats(&self) -> IndexMap<String, Value> {
        {
            let cache = self.cache();
            if let Some(response) = cache.as_ref() {
                return response.stats().clone();
            }
        }
        match self.fetch_section(true).await {
            Some(response) => response.stats().clone(),
            None => IndexMap::new(),
        }
    }

    /// The highlighting portion of the response, keyed by document id.
    pub async fn get_highlighting(&self) -> IndexMap<String, IndexMap<String, Vec<String>>> {
        {
            let cache = self.cache();
            if let Some(response) = cache.as_ref() {
                return response.highlighting.clone();
            }
        }
        match self.fetch_section(false).await {
            Some(response) => response.highlighting,
            None => IndexMap::new(),
        }
    }

    /// Expanded records from a collapsed query.
    pub async fn get_expanded(&self) -> IndexMap<String, Value> {
        {
            let cache = self.cache();
            if let Some(response) = cache.as_ref() {
                return response.expanded.clone();
            }
        }
        match self.fetch_section(true).await {
            Some(response) => response.expanded,
            None => IndexMap::new(),
        }
    }

    /// Zero-row query for one response section, without touching the
    /// cache.
    async fn fetch_section(&self, disable_highlighting: bool) -> Option<QueryResponse> {
        let mut opts = self.query_opts();
        opts.insert("rows", 0);
        if disable_highlighting {
            opts.insert("hl", false);
        }
        match self.solr.query(&opts).await {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(error = %err, "section query failed");
                None
            }
        }
    }

    /// Return a new queryset with results populated from Solr. The only
    /// directive-style method that performs I/O: the returned clone
    /// carries its own populated cache, the receiver stays untouched.
    pub async fn query(&self) -> Self {
        self.query_with(QueryParams::new()).await
    }

    /// Like [`SolrQuerySet::query`], with per-key parameter overrides.
    pub async fn query_with(&self, overrides: QueryParams) -> Self {
        let populated = self.clone();
        populated.get_results_with(overrides).await;
        populated
    }

    /// Whether the current query has no results. Executes the query when
    /// the cache is cold; use instead of any implicit boolean check.
    pub async fn is_empty(&self) -> bool {
        !self.has_results().await
    }

    /// Whether the current query has at least one result document.
    pub async fn has_results(&self) -> bool {
        {
            let cache = self.cache();
            if let Some(response) = cache.as_ref() {
                return !response.docs().is_empty();
            }
        }
        !self.get_results().await.is_empty()
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// A single result document. Reads the cached document list when
    /// populated; otherwise executes a one-row query for the requested
    /// position. `None` when the position is beyond the result set.
    pub async fn get(&self, index: usize) -> Option<SolrDocument> {
        if let Some(docs) = self.cached_docs() {
            return docs.get(index).cloned();
        }
        let qs = self.set_limits(Some(index), Some(index + 1));
        qs.get_results().await.into_iter().next()
    }

    /// A stepped subsection of the results. Cached results are sliced
    /// and stepped in place; otherwise the range is fetched eagerly and
    /// stepped afterwards, losing laziness for this one case.
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    pub async fn slice_stepped(
        &self,
        range: impl RangeBounds<usize>,
        step: usize,
    ) -> Vec<SolrDocument> {
        assert!(step > 0, "slice step must be positive");
        if let Some(docs) = self.cached_docs() {
            let (start, stop) = resolve_bounds(&range, docs.len());
            if start >= stop {
                return Vec::new();
            }
            return docs[start..stop].iter().step_by(step).cloned().collect();
        }
        self.slice(range)
            .get_results()
            .await
            .into_iter()
            .step_by(step)
            .collect()
    }

    /// The cached response's document list, if this instance has
    /// executed. Useful for native slicing without another round trip.
    pub fn cached_docs(&self) -> Option<Vec<SolrDocument>> {
        self.cache().as_ref().map(|response| response.docs().clone())
    }

    /// The cached response, if this instance has executed. Grouped
    /// sections are reached through this after calling
    /// [`SolrQuerySet::query`].
    pub fn cached_response(&self) -> Option<QueryResponse> {
        self.cache().clone()
    }
}

fn resolve_bounds<R: RangeBounds<usize>>(range: &R, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s + 1,
        Bound::Unbounded => 0,
    };
    let stop = match range.end_bound() {
        Bound::Included(&e) => e + 1,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    (start.min(len), stop.min(len))
}

/// Empty options for the `*_with` helpers.
fn no_opts() -> std::iter::Empty<(String, ParamValue)> {
    std::iter::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SolrError};
    use async_trait::async_trait;
    use serde_json::json;

    // ------------------------------------------------------------------
    // Stub transport
    // ------------------------------------------------------------------

    /// Records every parameter map it receives and replays a canned
    /// response (or a failure).
    struct StubTransport {
        response: QueryResponse,
        fail: bool,
        calls: Mutex<Vec<QueryParams>>,
    }

    impl StubTransport {
        fn new(response: QueryResponse) -> Self {
            Self {
                response,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: QueryResponse::default(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_docs(count: usize) -> Self {
            let docs: Vec<Value> = (0..count)
                .map(|i| json!({"id": format!("doc{i}"), "position": i}))
                .collect();
            Self::new(
                serde_json::from_value(json!({
                    "response": {"numFound": count, "start": 0, "docs": docs},
                }))
                .unwrap(),
            )
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_call(&self) -> QueryParams {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SolrTransport for StubTransport {
        async fn query(&self, params: &QueryParams) -> Result<QueryResponse> {
            self.calls.lock().unwrap().push(params.clone());
            if self.fail {
                return Err(SolrError::Http {
                    status: 500,
                    body: "mock failure".to_string(),
                });
            }
            Ok(self.response.clone())
        }
    }

    fn queryset_with(transport: Arc<StubTransport>) -> SolrQuerySet {
        SolrQuerySet::new(transport)
    }

    fn queryset() -> SolrQuerySet {
        queryset_with(Arc::new(StubTransport::with_docs(0)))
    }

    fn get_str(params: &QueryParams, key: &str) -> String {
        params.get(key).expect(key).render()
    }

    // ------------------------------------------------------------------
    // Chain purity
    // ------------------------------------------------------------------

    #[test]
    fn test_directives_leave_receiver_unchanged() {
        let qs = queryset()
            .filter(["item_type_s:work"])
            .search(["title:hamlet"]);
        let snapshot = qs.state.clone();

        let _ = qs.filter(["a:b"]);
        let _ = qs.filter_by([("year__range", LookupValue::span(Some(1500), Some(1600)))]);
        let _ = qs.search(["c:d"]);
        let _ = qs.order_by(["-year"]);
        let _ = qs.only(["title"]);
        let _ = qs.also(["author"]);
        let _ = qs.facet_with(["color"], [("limit", 5)]);
        let _ = qs.facet_field("color");
        let _ = qs.facet_range("year", [("start", 1500), ("end", 1700), ("gap", 50)]);
        let _ = qs.stats_with(["year"], [("calcdistinct", true)]);
        let _ = qs.highlight_with("content", [("snippets", 3)]);
        let _ = qs.group("item_type_s");
        let _ = qs.raw_query_parameters([("defType", "edismax")]);
        let _ = qs.none();
        let _ = qs.all();
        let _ = qs.set_limits(Some(10), Some(20));
        let _ = qs.slice(5..15);

        assert_eq!(qs.state, snapshot);
    }

    #[test]
    fn test_clone_copies_collections() {
        let qs = queryset().filter(["a:b"]);
        let forked = qs.filter(["c:d"]);
        assert_eq!(qs.filter_terms(), ["a:b"]);
        assert_eq!(forked.filter_terms(), ["a:b", "c:d"]);
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    #[test]
    fn test_filter_by_translates_lookups() {
        let qs = queryset().filter_by([("item_type_s", "person")]);
        assert_eq!(qs.filter_terms(), ["item_type_s:person"]);
    }

    #[test]
    fn test_filter_by_tagged() {
        let qs = queryset().filter_by_tagged([("item_type_s", "person")], "type");
        assert_eq!(qs.filter_terms(), ["{!tag=type}item_type_s:person"]);
    }

    #[test]
    fn test_filters_accumulate_across_calls() {
        let qs = queryset()
            .filter(["birth_year:[1800 TO *]"])
            .filter_by([("item_type_s", "person")]);
        assert_eq!(
            qs.filter_terms(),
            ["birth_year:[1800 TO *]", "item_type_s:person"]
        );
    }

    #[test]
    fn test_search_by_translates_lookups() {
        let qs = queryset().search_by([("name", "hem*")]);
        assert_eq!(qs.search_terms(), ["name:hem*"]);
    }

    #[test]
    fn test_order_by_directions_append() {
        let qs = queryset().order_by(["sort_name"]).order_by(["-year", "id"]);
        assert_eq!(qs.sort_options(), ["sort_name asc", "year desc", "id asc"]);
    }

    #[test]
    fn test_only_replaces_field_list() {
        let qs = queryset().only(["title"]).only(["author"]);
        assert_eq!(qs.field_list(), ["author"]);
    }

    #[test]
    fn test_also_appends_field_list() {
        let qs = queryset().also(["title"]).also(["author"]);
        assert_eq!(qs.field_list(), ["title", "author"]);
    }

    #[test]
    fn test_only_supports_alias_projections() {
        let qs = queryset().only(["title:title_t", "date:pubyear_i"]);
        assert_eq!(qs.field_list(), ["title:title_t", "date:pubyear_i"]);
    }

    #[test]
    fn test_none_replaces_search_terms_only() {
        let qs = queryset().search(["title:hamlet"]).filter(["a:b"]);
        let empty = qs.none();
        assert_eq!(empty.search_terms(), [MATCH_NONE]);
        assert_eq!(empty.filter_terms(), ["a:b"]);
        // the original keeps its search terms
        assert_eq!(qs.search_terms(), ["title:hamlet"]);
    }

    #[test]
    fn test_facet_replaces_fields_and_merges_opts() {
        let qs = queryset()
            .facet_with(["person_type", "age"], [("limit", 5)])
            .facet_with(["item_type_s"], [("mincount", 1)]);
        let opts = qs.query_opts();
        assert_eq!(
            opts.get("facet.field"),
            Some(&ParamValue::List(vec!["item_type_s".to_string()]))
        );
        // options accumulate even though the field list was replaced
        assert_eq!(opts.get("facet.limit"), Some(&ParamValue::Int(5)));
        assert_eq!(opts.get("facet.mincount"), Some(&ParamValue::Int(1)));
    }

    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    #[test]
    fn test_query_opts_defaults() {
        let opts = queryset().query_opts();
        assert_eq!(opts.get("start"), Some(&ParamValue::Int(0)));
        assert_eq!(get_str(&opts, "q"), MATCH_ALL);
        for absent in ["fq", "rows", "sort", "fl", "hl", "facet", "stats", "group"] {
            assert!(!opts.contains_key(absent), "{absent} should be omitted");
        }
    }

    #[test]
    fn test_query_opts_is_deterministic() {
        let qs = queryset()
            .filter_by([("item_type_s", "work")])
            .search(["title:hamlet"])
            .order_by(["-year"])
            .facet_with(["color"], [("limit", 5)])
            .highlight_with("content", [("snippets", 3)])
            .stats(["year"])
            .group("item_type_s")
            .slice(10..30);
        assert_eq!(qs.query_opts(), qs.query_opts());
    }

    #[test]
    fn test_query_opts_search_joining() {
        let qs = queryset().search(["title:hamlet", "author:shakespeare"]);
        assert_eq!(
            get_str(&qs.query_opts(), "q"),
            "title:hamlet AND author:shakespeare"
        );

        let qs = qs.with_search_operator("OR");
        assert_eq!(
            get_str(&qs.query_opts(), "q"),
            "title:hamlet OR author:shakespeare"
        );
    }

    #[test]
    fn test_query_opts_rows_from_limits() {
        let opts = queryset().set_limits(Some(10), Some(30)).query_opts();
        assert_eq!(opts.get("start"), Some(&ParamValue::Int(10)));
        assert_eq!(opts.get("rows"), Some(&ParamValue::Int(20)));
    }

    #[test]
    fn test_query_opts_rows_for_zero_stop() {
        let opts = queryset().set_limits(None, Some(0)).query_opts();
        assert_eq!(opts.get("rows"), Some(&ParamValue::Int(0)));
    }

    #[test]
    fn test_query_opts_no_rows_without_stop() {
        let opts = queryset().set_limits(Some(5), None).query_opts();
        assert_eq!(opts.get("start"), Some(&ParamValue::Int(5)));
        assert!(!opts.contains_key("rows"));
    }

    #[test]
    fn test_query_opts_highlight_block() {
        let qs = queryset()
            .highlight_with(
                "content",
                [
                    ("snippets", ParamValue::Int(3)),
                    ("method", ParamValue::from("unified")),
                ],
            )
            .highlight("summary");
        let opts = qs.query_opts();
        assert_eq!(opts.get("hl"), Some(&ParamValue::Bool(true)));
        assert_eq!(get_str(&opts, "hl.fl"), "content,summary");
        assert_eq!(opts.get("f.content.hl.snippets"), Some(&ParamValue::Int(3)));
        assert_eq!(
            get_str(&opts, "f.content.hl.method"),
            "unified"
        );
    }

    #[test]
    fn test_query_opts_facet_prefixing() {
        let qs = queryset()
            .facet_with(["color"], [("limit", 5)])
            .facet_field_with("status", "statusfilter", [("missing", true)])
            .facet_range("year", [("start", 1500), ("end", 1900), ("gap", 100)]);
        let opts = qs.query_opts();
        assert_eq!(opts.get("facet"), Some(&ParamValue::Bool(true)));
        assert_eq!(
            opts.get("facet.field"),
            Some(&ParamValue::List(vec![
                "color".to_string(),
                "{!ex=statusfilter}status".to_string(),
            ]))
        );
        assert_eq!(
            opts.get("facet.range"),
            Some(&ParamValue::List(vec!["year".to_string()]))
        );
        // plain options get the facet. prefix, field-qualified pass through
        assert_eq!(opts.get("facet.limit"), Some(&ParamValue::Int(5)));
        assert_eq!(opts.get("f.status.facet.missing"), Some(&ParamValue::Bool(true)));
        assert_eq!(opts.get("f.year.facet.range.start"), Some(&ParamValue::Int(1500)));
        assert_eq!(opts.get("f.year.facet.range.gap"), Some(&ParamValue::Int(100)));
    }

    #[test]
    fn test_query_opts_facet_block_from_opts_only() {
        let qs = queryset().facet_with(Vec::<String>::new(), [("limit", 5)]);
        let opts = qs.query_opts();
        assert_eq!(opts.get("facet"), Some(&ParamValue::Bool(true)));
        // empty field lists are stripped
        assert!(!opts.contains_key("facet.field"));
        assert!(!opts.contains_key("facet.range"));
    }

    #[test]
    fn test_query_opts_stats_prefixing() {
        let qs = queryset().stats_with(
            ["year", "{!ex=filterA}account_start_i"],
            [
                ("calcdistinct", ParamValue::Bool(true)),
                ("stats.facet", ParamValue::from("item_type_s")),
            ],
        );
        let opts = qs.query_opts();
        assert_eq!(opts.get("stats"), Some(&ParamValue::Bool(true)));
        assert_eq!(
            opts.get("stats.field"),
            Some(&ParamValue::List(vec![
                "year".to_string(),
                "{!ex=filterA}account_start_i".to_string(),
            ]))
        );
        assert_eq!(opts.get("stats.calcdistinct"), Some(&ParamValue::Bool(true)));
        // keys already starting with "stats" pass through
        assert_eq!(get_str(&opts, "stats.facet"), "item_type_s");
    }

    #[test]
    fn test_query_opts_group_block() {
        let qs = queryset().group_with(
            "item_type_s",
            [
                ("limit", ParamValue::Int(3)),
                ("group.format", ParamValue::from("simple")),
            ],
        );
        let opts = qs.query_opts();
        assert_eq!(opts.get("group"), Some(&ParamValue::Bool(true)));
        assert_eq!(get_str(&opts, "group.field"), "item_type_s");
        assert_eq!(opts.get("group.limit"), Some(&ParamValue::Int(3)));
        assert_eq!(get_str(&opts, "group.format"), "simple");
    }

    #[test]
    fn test_query_opts_raw_params_win() {
        let qs = queryset()
            .search(["title:hamlet"])
            .raw_query_parameters([("q", "overridden:yes")]);
        assert_eq!(get_str(&qs.query_opts(), "q"), "overridden:yes");
    }

    // ------------------------------------------------------------------
    // Execution and caching
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_results_populates_cache() {
        let transport = Arc::new(StubTransport::with_docs(3));
        let qs = queryset_with(Arc::clone(&transport));

        let docs = qs.get_results().await;
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0]["id"], "doc0");
        assert_eq!(transport.call_count(), 1);

        // count now reads the cache, no further round trip
        assert_eq!(qs.count().await, 3);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_count_cold_requests_zero_rows() {
        let transport = Arc::new(StubTransport::with_docs(5));
        let qs = queryset_with(Arc::clone(&transport)).facet(["color"]).highlight("content");

        assert_eq!(qs.count().await, 5);
        let params = transport.last_call();
        assert_eq!(params.get("rows"), Some(&ParamValue::Int(0)));
        assert_eq!(params.get("facet"), Some(&ParamValue::Bool(false)));
        assert_eq!(params.get("hl"), Some(&ParamValue::Bool(false)));

        // the count query must not populate the cache
        assert!(qs.cached_docs().is_none());
        assert_eq!(qs.count().await, 5);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_gracefully() {
        let transport = Arc::new(StubTransport::failing());
        let qs = queryset_with(Arc::clone(&transport));

        assert!(qs.get_results().await.is_empty());
        assert!(qs.cached_docs().is_none());
        assert_eq!(qs.count().await, 0);
        assert_eq!(qs.get_facets().await, FacetCounts::default());
        assert!(qs.get_stats().await.is_empty());
        assert!(qs.get_highlighting().await.is_empty());
        assert!(qs.get_expanded().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_facets_cold_does_not_cache() {
        let transport = Arc::new(StubTransport::new(
            serde_json::from_value(json!({
                "response": {"numFound": 2, "start": 0, "docs": []},
                "facet_counts": {"facet_fields": {"color": ["red", 2, "blue", 1]}},
            }))
            .unwrap(),
        ));
        let qs = queryset_with(Arc::clone(&transport)).facet(["color"]);

        let facets = qs.get_facets().await;
        let ordered: Vec<_> = facets.fields["color"]
            .iter()
            .map(|(value, count)| (value.as_str(), *count))
            .collect();
        assert_eq!(ordered, vec![("red", 2), ("blue", 1)]);

        let params = transport.last_call();
        assert_eq!(params.get("rows"), Some(&ParamValue::Int(0)));
        assert_eq!(params.get("hl"), Some(&ParamValue::Bool(false)));
        assert_eq!(params.get("facet"), Some(&ParamValue::Bool(true)));
        assert!(qs.cached_docs().is_none());
    }

    #[tokio::test]
    async fn test_get_highlighting_cold_keeps_highlighting_enabled() {
        let transport = Arc::new(StubTransport::with_docs(1));
        let qs = queryset_with(Arc::clone(&transport)).highlight("content");

        let _ = qs.get_highlighting().await;
        let params = transport.last_call();
        assert_eq!(params.get("rows"), Some(&ParamValue::Int(0)));
        assert_eq!(params.get("hl"), Some(&ParamValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_get_results_overrides_win() {
        let transport = Arc::new(StubTransport::with_docs(1));
        let qs = queryset_with(Arc::clone(&transport)).slice(0..50);

        let mut overrides = QueryParams::new();
        overrides.insert("rows", 5);
        let _ = qs.get_results_with(overrides).await;
        assert_eq!(transport.last_call().get("rows"), Some(&ParamValue::Int(5)));
    }

    #[tokio::test]
    async fn test_query_populates_clone_not_original() {
        let transport = Arc::new(StubTransport::with_docs(2));
        let qs = queryset_with(Arc::clone(&transport));

        let populated = qs.query().await;
        assert!(populated.cached_docs().is_some());
        assert!(qs.cached_docs().is_none());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_is_empty() {
        assert!(queryset_with(Arc::new(StubTransport::with_docs(0))).is_empty().await);
        assert!(queryset_with(Arc::new(StubTransport::with_docs(1))).has_results().await);
    }

    // ------------------------------------------------------------------
    // Slicing and indexing
    // ------------------------------------------------------------------

    #[test]
    fn test_slice_is_lazy() {
        let transport = Arc::new(StubTransport::with_docs(0));
        let qs = queryset_with(Arc::clone(&transport));

        let page = qs.slice(10..20);
        assert_eq!(page.start(), 10);
        assert_eq!(page.stop(), Some(20));
        assert_eq!(transport.call_count(), 0);

        let open_end = qs.slice(5..);
        assert_eq!(open_end.start(), 5);
        assert_eq!(open_end.stop(), None);

        let open_start = qs.slice(..10);
        assert_eq!(open_start.start(), 0);
        assert_eq!(open_start.stop(), Some(10));
    }

    #[tokio::test]
    async fn test_get_cold_requests_single_row() {
        let transport = Arc::new(StubTransport::with_docs(1));
        let qs = queryset_with(Arc::clone(&transport));

        let doc = qs.get(4).await;
        assert!(doc.is_some());
        let params = transport.last_call();
        assert_eq!(params.get("start"), Some(&ParamValue::Int(4)));
        assert_eq!(params.get("rows"), Some(&ParamValue::Int(1)));
        // executed on a clone; this queryset stays cold
        assert!(qs.cached_docs().is_none());
    }

    #[tokio::test]
    async fn test_get_reads_populated_cache() {
        let transport = Arc::new(StubTransport::with_docs(5));
        let qs = queryset_with(Arc::clone(&transport)).query().await;
        assert_eq!(transport.call_count(), 1);

        let doc = qs.get(2).await.unwrap();
        assert_eq!(doc["id"], "doc2");
        assert!(qs.get(99).await.is_none());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slice_stepped_on_cached_results() {
        let transport = Arc::new(StubTransport::with_docs(5));
        let qs = queryset_with(Arc::clone(&transport)).query().await;

        let stepped = qs.slice_stepped(1..5, 2).await;
        let ids: Vec<_> = stepped.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["doc1", "doc3"]);
        // bounds past the end clamp instead of panicking
        assert!(qs.slice_stepped(7..9, 1).await.is_empty());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slice_stepped_cold_materializes() {
        let transport = Arc::new(StubTransport::with_docs(4));
        let qs = queryset_with(Arc::clone(&transport));

        let stepped = qs.slice_stepped(0..4, 3).await;
        let ids: Vec<_> = stepped.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["doc0", "doc3"]);
        let params = transport.last_call();
        assert_eq!(params.get("rows"), Some(&ParamValue::Int(4)));
    }

    #[tokio::test]
    #[should_panic(expected = "slice step must be positive")]
    async fn test_slice_stepped_zero_step_panics() {
        let qs = queryset();
        let _ = qs.slice_stepped(0..4, 0).await;
    }
}

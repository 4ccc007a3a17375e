//! Aliased QuerySet
//!
//! Decorates [`SolrQuerySet`] with a map of readable field names to the
//! actual Solr fields (useful with dynamic field types like `title_t`).
//! Aliases are rewritten to Solr fields on the way in, and Solr fields
//! back to aliases in facet, stats, and highlighting results.

use std::collections::HashMap;
use std::ops::RangeBounds;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::query::lookup::{LookupValue, LOOKUP_SEP};
use crate::query::queryset::SolrQuerySet;
use crate::solr::client::SolrTransport;
use crate::solr::params::{ParamValue, QueryParams};
use crate::solr::response::{FacetCounts, QueryResponse, SolrDocument};

#[derive(Debug)]
struct AliasMap {
    /// logical name → Solr field
    forward: IndexMap<String, String>,
    /// Solr field → logical name, for result-side translation
    reverse: HashMap<String, String>,
}

/// A [`SolrQuerySet`] whose directive methods accept logical field names
/// and whose field-keyed results are returned under those names.
///
/// Unknown names pass through untouched, so raw Solr fields can be mixed
/// in freely.
#[derive(Debug, Clone)]
pub struct AliasedSolrQuerySet {
    inner: SolrQuerySet,
    aliases: Arc<AliasMap>,
}

impl AliasedSolrQuerySet {
    /// Build an aliased queryset over `field_aliases` pairs of
    /// `(logical name, solr field)`. The field limit starts out as the
    /// full set of `alias:field` projections, so results come back keyed
    /// by logical name.
    pub fn new<I, K, V>(solr: Arc<dyn SolrTransport>, field_aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let forward: IndexMap<String, String> = field_aliases
            .into_iter()
            .map(|(alias, field)| (alias.into(), field.into()))
            .collect();
        let reverse = forward
            .iter()
            .map(|(alias, field)| (field.clone(), alias.clone()))
            .collect();
        let projections: Vec<String> = forward
            .iter()
            .map(|(alias, field)| format!("{alias}:{field}"))
            .collect();
        let inner = SolrQuerySet::new(solr).only(projections);
        Self {
            inner,
            aliases: Arc::new(AliasMap { forward, reverse }),
        }
    }

    /// The underlying queryset, for anything not covered here.
    pub fn as_queryset(&self) -> &SolrQuerySet {
        &self.inner
    }

    fn wrap(&self, inner: SolrQuerySet) -> Self {
        Self {
            inner,
            aliases: Arc::clone(&self.aliases),
        }
    }

    /// Solr field for a logical name; unknown names pass through.
    fn unalias(&self, field: &str) -> String {
        self.aliases
            .forward
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }

    /// Unalias the field portion of a `field__lookup` key, keeping the
    /// lookup suffix attached.
    fn unalias_lookup(&self, key: &str) -> String {
        match key.split_once(LOOKUP_SEP) {
            Some((field, lookup)) => format!("{}{LOOKUP_SEP}{lookup}", self.unalias(field)),
            None => self.unalias(key),
        }
    }

    /// Unalias a sort field, preserving a `-` direction prefix.
    fn unalias_sort(&self, field: &str) -> String {
        match field.strip_prefix('-') {
            Some(name) => format!("-{}", self.unalias(name)),
            None => self.unalias(field),
        }
    }

    fn unalias_all<I>(&self, fields: I) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        fields
            .into_iter()
            .map(|field| self.unalias(field.as_ref()))
            .collect()
    }

    /// `alias:field` projection entries for the field limit; names
    /// without an alias pass through as-is.
    fn project<I>(&self, fields: I) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        fields
            .into_iter()
            .map(|field| {
                let field = field.as_ref();
                match self.aliases.forward.get(field) {
                    Some(solr_field) => format!("{field}:{solr_field}"),
                    None => field.to_string(),
                }
            })
            .collect()
    }

    /// Logical name for a Solr field; unmapped fields pass through.
    fn realias(&self, field: &str) -> String {
        self.aliases
            .reverse
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }

    fn realias_keys<V>(&self, map: IndexMap<String, V>) -> IndexMap<String, V> {
        map.into_iter()
            .map(|(field, value)| (self.realias(&field), value))
            .collect()
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    /// Append raw filter queries, passed through unmodified.
    pub fn filter<I>(&self, terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.wrap(self.inner.filter(terms))
    }

    /// Append filter lookups using logical field names.
    pub fn filter_by<I, K, V>(&self, lookups: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        self.filter_by_tagged(lookups, "")
    }

    /// Append tagged filter lookups using logical field names.
    pub fn filter_by_tagged<I, K, V>(&self, lookups: I, tag: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        let unaliased: Vec<(String, LookupValue)> = lookups
            .into_iter()
            .map(|(key, value)| (self.unalias_lookup(key.as_ref()), value.into()))
            .collect();
        self.wrap(self.inner.filter_by_tagged(unaliased, tag))
    }

    /// Append raw search queries, passed through unmodified.
    pub fn search<I>(&self, terms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.wrap(self.inner.search(terms))
    }

    /// Append search lookups using logical field names.
    pub fn search_by<I, K, V>(&self, lookups: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        let unaliased: Vec<(String, LookupValue)> = lookups
            .into_iter()
            .map(|(key, value)| (self.unalias_lookup(key.as_ref()), value.into()))
            .collect();
        self.wrap(self.inner.search_by(unaliased))
    }

    /// Append sort fields by logical name; `-` still sorts descending.
    pub fn order_by<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let unaliased: Vec<String> = fields
            .into_iter()
            .map(|field| self.unalias_sort(field.as_ref()))
            .collect();
        self.wrap(self.inner.order_by(unaliased))
    }

    /// Replace the field limit. Logical names become `alias:field`
    /// projections so the documents keep their logical keys.
    pub fn only<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.wrap(self.inner.only(self.project(fields)))
    }

    /// Append to the field limit, projecting logical names.
    pub fn also<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.wrap(self.inner.also(self.project(fields)))
    }

    /// Request facets for logical field names.
    pub fn facet<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.wrap(self.inner.facet(self.unalias_all(fields)))
    }

    /// Request facets for logical field names with facet options.
    pub fn facet_with<I, O, K, V>(&self, fields: I, opts: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.facet_with(self.unalias_all(fields), opts))
    }

    /// Add a single facet field by logical name.
    pub fn facet_field(&self, field: &str) -> Self {
        self.wrap(self.inner.facet_field(&self.unalias(field)))
    }

    /// Add a single facet field by logical name, with an exclude tag and
    /// field-specific options.
    pub fn facet_field_with<O, K, V>(&self, field: &str, exclude: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.facet_field_with(&self.unalias(field), exclude, opts))
    }

    /// Add a range facet by logical name.
    pub fn facet_range<O, K, V>(&self, field: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.facet_range(&self.unalias(field), opts))
    }

    /// Request stats for logical field names.
    pub fn stats<I>(&self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.wrap(self.inner.stats(self.unalias_all(fields)))
    }

    /// Request stats for logical field names with stats options.
    pub fn stats_with<I, O, K, V>(&self, fields: I, opts: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.stats_with(self.unalias_all(fields), opts))
    }

    /// Request highlighting for a logical field name.
    pub fn highlight(&self, field: &str) -> Self {
        self.wrap(self.inner.highlight(&self.unalias(field)))
    }

    /// Request highlighting for a logical field name with options.
    pub fn highlight_with<O, K, V>(&self, field: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.highlight_with(&self.unalias(field), opts))
    }

    /// Group results by a logical field name.
    pub fn group(&self, field: &str) -> Self {
        self.wrap(self.inner.group(&self.unalias(field)))
    }

    /// Group results by a logical field name with grouping options.
    pub fn group_with<O, K, V>(&self, field: &str, opts: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.group_with(&self.unalias(field), opts))
    }

    /// Add arbitrary raw request parameters; keys are not aliased.
    pub fn raw_query_parameters<O, K, V>(&self, params: O) -> Self
    where
        O: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        self.wrap(self.inner.raw_query_parameters(params))
    }

    /// Use a different operator between search terms.
    pub fn with_search_operator(&self, operator: &str) -> Self {
        self.wrap(self.inner.with_search_operator(operator))
    }

    /// A copy of this queryset.
    pub fn all(&self) -> Self {
        self.clone()
    }

    /// A queryset that matches nothing, keeping filters and sort.
    pub fn none(&self) -> Self {
        self.wrap(self.inner.none())
    }

    /// Set the pagination window.
    pub fn set_limits(&self, start: Option<usize>, stop: Option<usize>) -> Self {
        self.wrap(self.inner.set_limits(start, stop))
    }

    /// Restrict to a subsection of the results, lazily.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        self.wrap(self.inner.slice(range))
    }

    /// Compile the current state into request parameters.
    pub fn query_opts(&self) -> QueryParams {
        self.inner.query_opts()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// See [`SolrQuerySet::get_results`]. Documents keep the logical
    /// keys requested through the `alias:field` projections.
    pub async fn get_results(&self) -> Vec<SolrDocument> {
        self.inner.get_results().await
    }

    /// See [`SolrQuerySet::get_results_with`].
    pub async fn get_results_with(&self, overrides: QueryParams) -> Vec<SolrDocument> {
        self.inner.get_results_with(overrides).await
    }

    /// See [`SolrQuerySet::count`].
    pub async fn count(&self) -> u64 {
        self.inner.count().await
    }

    /// Facet counts re-keyed to logical field names. Fields without an
    /// alias keep their Solr name.
    pub async fn get_facets(&self) -> FacetCounts {
        let mut facets = self.inner.get_facets().await;
        facets.fields = self.realias_keys(facets.fields);
        facets.ranges = self.realias_keys(facets.ranges);
        facets
    }

    /// Stats re-keyed to logical field names.
    pub async fn get_stats(&self) -> IndexMap<String, Value> {
        let stats = self.inner.get_stats().await;
        self.realias_keys(stats)
    }

    /// Highlighting with the per-document field maps re-keyed to logical
    /// field names. The outer keys are document ids and stay untouched.
    pub async fn get_highlighting(&self) -> IndexMap<String, IndexMap<String, Vec<String>>> {
        self.inner
            .get_highlighting()
            .await
            .into_iter()
            .map(|(doc_id, fields)| (doc_id, self.realias_keys(fields)))
            .collect()
    }

    /// See [`SolrQuerySet::get_expanded`]. Keys are collapsed values,
    /// not field names, so nothing is re-keyed.
    pub async fn get_expanded(&self) -> IndexMap<String, Value> {
        self.inner.get_expanded().await
    }

    /// See [`SolrQuerySet::query`].
    pub async fn query(&self) -> Self {
        self.wrap(self.inner.query().await)
    }

    /// See [`SolrQuerySet::query_with`].
    pub async fn query_with(&self, overrides: QueryParams) -> Self {
        self.wrap(self.inner.query_with(overrides).await)
    }

    /// See [`SolrQuerySet::is_empty`].
    pub async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }

    /// See [`SolrQuerySet::has_results`].
    pub async fn has_results(&self) -> bool {
        self.inner.has_results().await
    }

    /// See [`SolrQuerySet::get`].
    pub async fn get(&self, index: usize) -> Option<SolrDocument> {
        self.inner.get(index).await
    }

    /// See [`SolrQuerySet::slice_stepped`].
    pub async fn slice_stepped(
        &self,
        range: impl RangeBounds<usize>,
        step: usize,
    ) -> Vec<SolrDocument> {
        self.inner.slice_stepped(range, step).await
    }

    /// See [`SolrQuerySet::cached_docs`].
    pub fn cached_docs(&self) -> Option<Vec<SolrDocument>> {
        self.inner.cached_docs()
    }

    /// See [`SolrQuerySet::cached_response`].
    pub fn cached_response(&self) -> Option<QueryResponse> {
        self.inner.cached_response()
    }
}

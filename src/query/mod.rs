//! Query construction: lookup translation, the chainable queryset, and
//! the field-aliasing layer.

pub mod aliased;
pub mod lookup;
pub mod queryset;

pub use aliased::AliasedSolrQuerySet;
pub use lookup::{lookup_to_filter, LookupValue, SolrValue, ANY_VALUE, LOOKUP_SEP};
pub use queryset::{SolrQuerySet, MATCH_ALL, MATCH_NONE};

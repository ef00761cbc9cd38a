//! URI template table: registration and dispatch.
//!
//! # Responsibilities
//! - Compile templates and group them by canonical path shape
//! - Reject registrations that make a group ambiguous
//! - Dispatch a request path and query to the most specific templates
//!
//! # Data Flow
//! ```text
//! add(template) ──► compile ──► find group by shape ──► validate group
//!               ──► publish snapshot
//!
//! match(path, query) ──► decode segments ──► strip base path ──► per group: path match
//!                    ──► especially interesting ▸ interesting ▸ trivial
//! ```
//!
//! # Design Decisions
//! - Same snapshot/writer-gate scheme as the address table
//! - A failed registration leaves the published snapshot untouched
//! - Within a group only the most specific tier that matched survives
//! - Registration validates against every template sharing the shape,
//!   including wildcard templates of other lengths with a common prefix

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::error::{DispatchError, DispatchResult};
use crate::observability::metrics;
use crate::routing::address::{decode_segment, path_segments, RequestDescriptor};
use crate::routing::filter::{wrong_kind, MessageFilter};
use crate::template::compiler::{CompiledTemplate, ShapeKey};
use crate::template::disambiguation::validate_group;

const TABLE_NAME: &str = "template table";

/// A successful template match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateMatch<P> {
    pub payload: P,
    /// Template text as registered.
    pub template: String,
    /// Variable bindings: path variables first, then query variables.
    pub bindings: Vec<(String, String)>,
}

impl<P> TemplateMatch<P> {
    /// Bound value of `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Specificity tiers, most specific first.
#[derive(Debug, Clone, Copy)]
enum Tier {
    EspeciallyInteresting,
    Interesting,
    Trivial,
}

impl Tier {
    const ALL: [Tier; 3] = [Tier::EspeciallyInteresting, Tier::Interesting, Tier::Trivial];

    fn admits(self, template: &CompiledTemplate, query: &[(String, String)]) -> bool {
        match self {
            Self::EspeciallyInteresting => template.matches_interestingly(query, true),
            Self::Interesting => template.matches_interestingly(query, false),
            Self::Trivial => template.matches_trivially(),
        }
    }
}

struct Entry<P> {
    template: Arc<CompiledTemplate>,
    payload: P,
}

impl<P: Clone> Clone for Entry<P> {
    fn clone(&self) -> Self {
        Self {
            template: Arc::clone(&self.template),
            payload: self.payload.clone(),
        }
    }
}

struct Group<P> {
    shape: ShapeKey,
    entries: Vec<Entry<P>>,
}

impl<P: Clone> Clone for Group<P> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<P> Group<P> {
    fn validate(&self, allow_duplicates: bool) -> DispatchResult<()> {
        let templates: Vec<&CompiledTemplate> = self.entries.iter().map(|e| e.template.as_ref()).collect();
        validate_group(&templates, allow_duplicates)
    }
}

struct Snapshot<P> {
    groups: Vec<Arc<Group<P>>>,
}

impl<P> Clone for Snapshot<P> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
        }
    }
}

impl<P> Default for Snapshot<P> {
    fn default() -> Self {
        Self { groups: Vec::new() }
    }
}

impl<P> Snapshot<P> {
    fn position(&self, shape: &ShapeKey) -> Option<usize> {
        self.groups.iter().position(|g| &g.shape == shape)
    }
}

/// Filter table keyed on URI templates.
pub struct TemplateTable<P> {
    snapshot: ArcSwap<Snapshot<P>>,
    writer: Mutex<()>,
    allow_duplicates: bool,
    base_path: Vec<String>,
}

impl<P: Clone> Default for TemplateTable<P> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<P: Clone> TemplateTable<P> {
    /// Create an empty table. With `allow_duplicates`, equivalent templates
    /// may share a group.
    pub fn new(allow_duplicates: bool) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
            allow_duplicates,
            base_path: Vec::new(),
        }
    }

    /// Require request paths to start with `base`; templates are matched
    /// against the remainder.
    pub fn with_base_path(mut self, base: &str) -> Self {
        self.base_path = path_segments(base)
            .map(|s| decode_segment(s).into_owned())
            .collect();
        self
    }

    fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a filter of any kind; only template filters are accepted.
    pub fn add_filter(&self, filter: MessageFilter, payload: P) -> DispatchResult<()> {
        self.add(&filter.into_template(TABLE_NAME)?, payload)
    }

    /// Compile and register a template.
    pub fn add(&self, template: &str, payload: P) -> DispatchResult<()> {
        let compiled = Arc::new(CompiledTemplate::compile(template)?);

        let _gate = self.write_gate();
        let current = self.snapshot.load_full();
        let position = current.position(compiled.shape());
        let mut group = match position {
            Some(pos) => (*current.groups[pos]).clone(),
            None => Group {
                shape: compiled.shape().clone(),
                entries: Vec::new(),
            },
        };
        group.entries.push(Entry {
            template: Arc::clone(&compiled),
            payload,
        });

        // Wildcard templates also compete with wildcard templates of other
        // lengths whose prefix they share.
        let related: Vec<&CompiledTemplate> = current
            .groups
            .iter()
            .flat_map(|g| g.entries.iter())
            .map(|e| e.template.as_ref())
            .filter(|t| t.shares_shape_with(&compiled))
            .chain(std::iter::once(compiled.as_ref()))
            .collect();
        if let Err(err) = validate_group(&related, self.allow_duplicates) {
            tracing::warn!(template, shape = %compiled.shape(), error = %err, "Template rejected");
            metrics::record_conflict();
            return Err(err);
        }

        let members = group.entries.len();
        let mut next = (*current).clone();
        match position {
            Some(pos) => next.groups[pos] = Arc::new(group),
            None => next.groups.push(Arc::new(group)),
        }
        self.snapshot.store(Arc::new(next));

        tracing::debug!(template, shape = %compiled.shape(), members, "Template registered");
        metrics::record_registration("template");
        Ok(())
    }

    /// Remove a filter of any kind; non-template kinds are rejected.
    pub fn remove_filter(&self, filter: &MessageFilter) -> DispatchResult<bool> {
        match filter {
            MessageFilter::Template(template) => self.remove(template),
            other => Err(wrong_kind(other, TABLE_NAME)),
        }
    }

    /// Remove the first registration of exactly `template`. The remaining
    /// group is validated again before publishing.
    pub fn remove(&self, template: &str) -> DispatchResult<bool> {
        let compiled = CompiledTemplate::compile(template)?;

        let _gate = self.write_gate();
        let current = self.snapshot.load_full();
        let Some(pos) = current.position(compiled.shape()) else {
            return Ok(false);
        };
        let Some(member) = current.groups[pos]
            .entries
            .iter()
            .position(|e| e.template.as_str() == template)
        else {
            return Ok(false);
        };

        let mut next = (*current).clone();
        let mut group = (*current.groups[pos]).clone();
        group.entries.remove(member);
        if group.entries.is_empty() {
            next.groups.remove(pos);
        } else {
            group.validate(self.allow_duplicates)?;
            next.groups[pos] = Arc::new(group);
        }
        self.snapshot.store(Arc::new(next));

        tracing::debug!(template, "Template removed");
        Ok(true)
    }

    /// Every template matching `path` and `query`, grouped by path shape
    /// in registration order.
    pub fn match_request(&self, path: &str, query: &[(String, String)]) -> Vec<TemplateMatch<P>> {
        let decoded: Vec<Cow<'_, str>> = path_segments(path).map(decode_segment).collect();
        let segments: Vec<&str> = decoded.iter().map(|s| s.as_ref()).collect();
        let Some(relative) = self.strip_base(&segments) else {
            tracing::trace!(path, "Path outside base path");
            metrics::record_dispatch("template", 0);
            return Vec::new();
        };

        let snapshot = self.snapshot.load();
        let mut matched = Vec::new();
        for group in &snapshot.groups {
            let path_hits: Vec<(&Entry<P>, Vec<(String, String)>)> = group
                .entries
                .iter()
                .filter_map(|e| e.template.match_path(relative).map(|b| (e, b)))
                .collect();
            if path_hits.is_empty() {
                continue;
            }
            let Some(tier) = Tier::ALL
                .into_iter()
                .find(|tier| path_hits.iter().any(|(e, _)| tier.admits(&e.template, query)))
            else {
                continue;
            };
            for (entry, mut bindings) in path_hits {
                if !tier.admits(&entry.template, query) {
                    continue;
                }
                bindings.extend(entry.template.query_bindings(query));
                matched.push(TemplateMatch {
                    payload: entry.payload.clone(),
                    template: entry.template.as_str().to_string(),
                    bindings,
                });
            }
        }

        tracing::trace!(path, groups = snapshot.groups.len(), matched = matched.len(), "Template dispatch");
        metrics::record_dispatch("template", matched.len());
        matched
    }

    /// Match the path and query of a request descriptor.
    pub fn match_descriptor(&self, request: &RequestDescriptor) -> Vec<TemplateMatch<P>> {
        self.match_request(request.path(), &request.query)
    }

    /// The single match, `None` when nothing matches, or `MultipleMatches`
    /// when the request is ambiguous.
    pub fn match_single(&self, path: &str, query: &[(String, String)]) -> DispatchResult<Option<TemplateMatch<P>>> {
        let mut matched = self.match_request(path, query);
        match matched.len() {
            0 => Ok(None),
            1 => Ok(matched.pop()),
            count => Err(DispatchError::MultipleMatches { count }),
        }
    }

    fn strip_base<'a>(&self, segments: &'a [&'a str]) -> Option<&'a [&'a str]> {
        if segments.len() < self.base_path.len() {
            return None;
        }
        let (head, rest) = segments.split_at(self.base_path.len());
        head.iter()
            .zip(&self.base_path)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
            .then_some(rest)
    }

    /// Registered template texts, grouped by shape.
    pub fn templates(&self) -> Vec<String> {
        self.snapshot
            .load()
            .groups
            .iter()
            .flat_map(|g| g.entries.iter().map(|e| e.template.as_str().to_string()))
            .collect()
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.snapshot.load().groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct path shapes.
    pub fn group_count(&self) -> usize {
        self.snapshot.load().groups.len()
    }

    pub fn clear(&self) {
        let _gate = self.write_gate();
        self.snapshot.store(Arc::new(Snapshot::default()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::query::parse_query_string;

    fn payloads<P: Clone>(matches: &[TemplateMatch<P>]) -> Vec<P> {
        matches.iter().map(|m| m.payload.clone()).collect()
    }

    #[test]
    fn test_literal_query_selects_template() {
        let table = TemplateTable::default();
        table.add("/items?id=1", "one").unwrap();
        table.add("/items?id=2", "two").unwrap();
        table.add("/items", "any").unwrap();

        let hits = table.match_request("/items", &parse_query_string("id=2"));
        assert_eq!(payloads(&hits), vec!["two"]);
        let hits = table.match_request("/items", &parse_query_string("id=3"));
        assert_eq!(payloads(&hits), vec!["any"]);
        assert_eq!(table.group_count(), 1);
    }

    #[test]
    fn test_conflict_leaves_table_unchanged() {
        let table = TemplateTable::default();
        table.add("/items/{id}", 1).unwrap();
        let err = table.add("/items/{key}", 2).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(table.len(), 1);

        let hits = table.match_request("/items/7", &[]);
        assert_eq!(payloads(&hits), vec![1]);
        assert_eq!(hits[0].get("ID"), Some("7"));
    }

    #[test]
    fn test_format_error_rejected() {
        let table: TemplateTable<i32> = TemplateTable::default();
        assert!(table.add("/items/{", 1).unwrap_err().is_format());
        assert!(table.is_empty());
    }

    #[test]
    fn test_especially_interesting_wins() {
        let table = TemplateTable::default();
        table.add("/s?a=1&b={v}", "with-b").unwrap();
        table.add("/s?a=2", "a2").unwrap();
        table.add("/s", "plain").unwrap();

        let hits = table.match_request("/s", &parse_query_string("a=1&b=x"));
        assert_eq!(payloads(&hits), vec!["with-b"]);
        assert_eq!(hits[0].get("v"), Some("x"));

        let hits = table.match_request("/s", &parse_query_string("a=1"));
        assert_eq!(payloads(&hits), vec!["with-b"]);
    }

    #[test]
    fn test_groups_match_independently() {
        let table = TemplateTable::default();
        table.add("/items/{id}", "var").unwrap();
        table.add("/items/latest", "literal").unwrap();
        table.add("/items/*", "rest").unwrap();

        let hits = table.match_request("/items/latest", &[]);
        assert_eq!(payloads(&hits), vec!["var", "literal", "rest"]);
        let hits = table.match_request("/items/a/b", &[]);
        assert_eq!(payloads(&hits), vec!["rest"]);
        assert_eq!(table.group_count(), 3);
    }

    #[test]
    fn test_wildcards_of_different_lengths_validated_together() {
        let table = TemplateTable::default();
        table.add("/a/*", 1).unwrap();
        let err = table.add("/a/{x}/*", 2).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(table.len(), 1);

        table.add("/b/{x}/*", 3).unwrap();
        table.add("/a/{x}", 4).unwrap();
        assert_eq!(table.group_count(), 3);
    }

    #[test]
    fn test_wildcards_of_different_lengths_disambiguated_by_query() {
        let table = TemplateTable::default();
        table.add("/a/*?v=1", 1).unwrap();
        table.add("/a/{x}/*?v=2", 2).unwrap();
        assert!(table.add("/a/{y}/{z}/*?v=1", 3).unwrap_err().is_conflict());

        let hits = table.match_request("/a/p/q", &parse_query_string("v=2"));
        assert_eq!(payloads(&hits), vec![2]);
        assert_eq!(hits[0].get("x"), Some("p"));
    }

    #[test]
    fn test_segments_percent_decoded() {
        let table = TemplateTable::default();
        table.add("/hello world/{id}", 1).unwrap();
        table.add("/items/{id}", 2).unwrap();

        assert_eq!(payloads(&table.match_request("/hello%20world/7", &[])), vec![1]);
        let hits = table.match_request("/items/a%20b", &[]);
        assert_eq!(hits[0].get("id"), Some("a b"));
    }

    #[test]
    fn test_remove_revalidates_and_drops_group() {
        let table = TemplateTable::default();
        table.add("/items?id=1", 1).unwrap();
        table.add("/items?id=2", 2).unwrap();

        assert_eq!(table.remove("/items?id=1"), Ok(true));
        assert_eq!(table.remove("/items?id=1"), Ok(false));
        assert_eq!(table.group_count(), 1);
        assert_eq!(table.remove("/items?id=2"), Ok(true));
        assert_eq!(table.group_count(), 0);
        assert_eq!(table.remove("/nothing"), Ok(false));
    }

    #[test]
    fn test_duplicates_allowed() {
        let table = TemplateTable::new(true);
        table.add("/items/{id}", 1).unwrap();
        table.add("/items/{key}", 2).unwrap();
        assert_eq!(payloads(&table.match_request("/items/9", &[])), vec![1, 2]);
        assert_eq!(
            table.match_single("/items/9", &[]),
            Err(DispatchError::MultipleMatches { count: 2 })
        );
    }

    #[test]
    fn test_base_path() {
        let table = TemplateTable::default().with_base_path("/api/v1");
        table.add("/items/{id}", 1).unwrap();
        assert_eq!(payloads(&table.match_request("/API/v1/items/3", &[])), vec![1]);
        assert!(table.match_request("/items/3", &[]).is_empty());
        assert!(table.match_request("/api", &[]).is_empty());
    }

    #[test]
    fn test_wrong_filter_kind_rejected() {
        let table: TemplateTable<i32> = TemplateTable::default();
        let prefix = MessageFilter::PrefixAddress(
            crate::routing::filter::AddressFilter::parse("http://host/svc", true, vec![]).unwrap(),
        );
        assert!(matches!(
            table.add_filter(prefix.clone(), 1),
            Err(DispatchError::InvalidOperation(_))
        ));
        assert!(matches!(
            table.remove_filter(&prefix),
            Err(DispatchError::InvalidOperation(_))
        ));
        table.add_filter(MessageFilter::Template("/a".into()), 1).unwrap();
        assert_eq!(table.remove_filter(&MessageFilter::Template("/a".into())), Ok(true));
    }
}

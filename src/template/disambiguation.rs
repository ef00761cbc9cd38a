//! Same-path template disambiguation.
//!
//! # Responsibilities
//! - Decide whether a group of templates with one canonical path can be
//!   told apart by their query constraints
//! - Raise a conflict naming the offending templates when they cannot
//!
//! # Data Flow
//! ```text
//! group ──► stable sort by query count ──► no-query slot check
//!       ──► literal key intersection ──► per-template value tuples
//!       ──► pairwise tuple comparison ──► Ok / Conflict
//! ```
//!
//! # Design Decisions
//! - At most one template in a group may declare no query constraints,
//!   unless duplicates are allowed
//! - Only keys that every remaining template binds to a literal take part
//!   in the tuple comparison; an empty literal contributes `None`
//! - Pairwise comparison is quadratic; groups are small in practice

use std::collections::BTreeSet;

use crate::error::{DispatchError, DispatchResult};
use crate::template::compiler::CompiledTemplate;

/// Validate one same-path group. `templates` is in registration order.
pub fn validate_group(templates: &[&CompiledTemplate], allow_duplicates: bool) -> DispatchResult<()> {
    if templates.len() <= 1 {
        return Ok(());
    }

    let mut sorted: Vec<&CompiledTemplate> = templates.to_vec();
    sorted.sort_by_key(|t| t.queries().len());

    let mut first = 0;
    if allow_duplicates {
        // Same canonical path and no queries: these are equivalent.
        while first < sorted.len() && sorted[first].matches_trivially() {
            first += 1;
        }
    } else {
        if sorted[0].matches_trivially() {
            first = 1;
        }
        if sorted[first].matches_trivially() {
            return Err(DispatchError::conflict(
                sorted[first - 1].as_str(),
                Some(sorted[first].as_str()),
                "both templates accept any query string",
            ));
        }
    }

    if sorted.len() - first <= 1 {
        return Ok(());
    }
    ensure_queries_distinct(&sorted[first..], allow_duplicates)
}

fn ensure_queries_distinct(templates: &[&CompiledTemplate], allow_duplicates: bool) -> DispatchResult<()> {
    let mut keys: BTreeSet<String> = templates
        .iter()
        .flat_map(|t| t.queries())
        .filter(|(_, value)| value.is_literal())
        .map(|(key, _)| key.to_ascii_uppercase())
        .collect();
    keys.retain(|key| {
        templates
            .iter()
            .all(|t| t.query(key).is_some_and(|value| value.is_literal()))
    });

    if keys.is_empty() {
        if allow_duplicates && all_equivalent(templates) {
            return Ok(());
        }
        return Err(DispatchError::conflict(
            templates[0].as_str(),
            None,
            "query strings cannot be told apart by literal values",
        ));
    }

    let tuples: Vec<Vec<Option<&str>>> = templates
        .iter()
        .map(|t| {
            keys.iter()
                .map(|key| t.query(key).and_then(|value| value.literal_text()))
                .collect()
        })
        .collect();

    for i in 0..templates.len() {
        for j in i + 1..templates.len() {
            if tuples[i] != tuples[j] {
                continue;
            }
            if !templates[i].is_equivalent_to(templates[j]) {
                return Err(DispatchError::conflict(
                    templates[i].as_str(),
                    Some(templates[j].as_str()),
                    "query literals are identical but the templates differ",
                ));
            }
            if !allow_duplicates {
                return Err(DispatchError::conflict(
                    templates[i].as_str(),
                    Some(templates[j].as_str()),
                    "duplicate template",
                ));
            }
        }
    }
    Ok(())
}

fn all_equivalent(templates: &[&CompiledTemplate]) -> bool {
    templates.windows(2).all(|w| w[0].is_equivalent_to(w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(texts: &[&str]) -> Vec<CompiledTemplate> {
        texts.iter().map(|t| CompiledTemplate::compile(t).unwrap()).collect()
    }

    fn check(texts: &[&str], allow: bool) -> DispatchResult<()> {
        let compiled = compile(texts);
        let refs: Vec<&CompiledTemplate> = compiled.iter().collect();
        validate_group(&refs, allow)
    }

    #[test]
    fn test_single_template_is_valid() {
        assert!(check(&["/a"], false).is_ok());
        assert!(check(&[], false).is_ok());
    }

    #[test]
    fn test_distinct_literals_are_valid() {
        assert!(check(&["/items?id=1", "/items?id=2", "/items"], false).is_ok());
        assert!(check(&["/items?id=1&v={v}", "/items?id=2"], false).is_ok());
    }

    #[test]
    fn test_two_queryless_templates_conflict() {
        let err = check(&["/items/{id}", "/items/{key}"], false).unwrap_err();
        assert!(err.is_conflict());
        assert!(check(&["/items/{id}", "/items/{key}"], true).is_ok());
    }

    #[test]
    fn test_variable_only_queries_conflict() {
        let err = check(&["/items?a={x}", "/items?b={y}"], false).unwrap_err();
        assert!(err.is_conflict());
        let err = check(&["/items?a={x}", "/items?b={y}"], true).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_same_key_bound_to_variables_conflicts() {
        let err = check(&["/items?id={x}", "/items?id={y}"], false).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_equal_tuples_with_different_shapes_conflict() {
        let err = check(&["/items?id=1&v={v}", "/items?id=1"], true).unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("/items?id=1"));
    }

    #[test]
    fn test_duplicates_need_permission() {
        let err = check(&["/items?id=1&v={v}", "/items?ID=1&v={w}"], false).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        assert!(check(&["/items?id=1&v={v}", "/items?ID=1&v={w}"], true).is_ok());
    }

    #[test]
    fn test_key_not_literal_everywhere_is_ignored() {
        // `b` is literal in one template only; only `a` is compared.
        let err = check(&["/x?a=1&b=2", "/x?a=1&b={v}"], false).unwrap_err();
        assert!(err.is_conflict());
        assert!(check(&["/x?a=1&b=2", "/x?a=2&b={v}"], false).is_ok());
    }

    #[test]
    fn test_empty_literal_takes_part() {
        assert!(check(&["/svc?wsdl", "/svc?wsdl=full"], false).is_ok());
        assert!(check(&["/svc?wsdl&x=1", "/svc?wsdl&x=2"], false).is_ok());
    }
}

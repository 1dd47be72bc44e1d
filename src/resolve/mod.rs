//! Fuzzy theme name resolution
//!
//! Free-text names are compared on their normalized key (lowercase,
//! alphanumerics only). Match rules are tried in order; the first rule that
//! selects anything decides the outcome:
//! - exact: key equals the query
//! - prefix: key starts with the query
//! - substring: key contains the query
//!
//! A rule that selects more than one theme is an ambiguous match, never a
//! silent pick.

use tracing::debug;

use crate::theme::{normalize, Theme, ThemeError};

/// One matching strategy over normalized strings
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub name: &'static str,
    pub matches: fn(query: &str, candidate: &str) -> bool,
}

/// Match rules in precedence order
pub const MATCH_RULES: &[MatchRule] = &[
    MatchRule {
        name: "exact",
        matches: exact,
    },
    MatchRule {
        name: "prefix",
        matches: prefix,
    },
    MatchRule {
        name: "substring",
        matches: substring,
    },
];

fn exact(query: &str, candidate: &str) -> bool {
    candidate == query
}

fn prefix(query: &str, candidate: &str) -> bool {
    candidate.starts_with(query)
}

fn substring(query: &str, candidate: &str) -> bool {
    candidate.contains(query)
}

/// Resolve `query` to exactly one theme among `candidates`.
pub fn resolve<'a, I>(query: &str, candidates: I) -> Result<&'a Theme, ThemeError>
where
    I: IntoIterator<Item = &'a Theme>,
{
    resolve_with(MATCH_RULES, query, candidates)
}

/// Resolve with an explicit rule table
pub fn resolve_with<'a, I>(
    rules: &[MatchRule],
    query: &str,
    candidates: I,
) -> Result<&'a Theme, ThemeError>
where
    I: IntoIterator<Item = &'a Theme>,
{
    let key = normalize(query);
    if key.is_empty() {
        return Err(ThemeError::NotFound(query.to_string()));
    }

    let keyed: Vec<(String, &'a Theme)> = candidates
        .into_iter()
        .map(|t| (normalize(&t.display_name), t))
        .collect();

    for rule in rules {
        let mut hits = keyed
            .iter()
            .filter(|(candidate, _)| (rule.matches)(&key, candidate))
            .map(|(_, theme)| *theme);

        let Some(first) = hits.next() else {
            continue;
        };

        let rest: Vec<&Theme> = hits.collect();
        if rest.is_empty() {
            debug!("'{}' resolved to '{}' by {} match", query, first.slug, rule.name);
            return Ok(first);
        }

        let mut names: Vec<String> = std::iter::once(first)
            .chain(rest)
            .map(|t| t.display_name.clone())
            .collect();
        names.sort();
        return Err(ThemeError::Ambiguous {
            query: query.to_string(),
            candidates: names,
        });
    }

    Err(ThemeError::NotFound(query.to_string()))
}

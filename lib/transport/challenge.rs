//! Parsing of `WWW-Authenticate: Bearer ...` challenge headers.

use std::collections::HashMap;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A parsed `WWW-Authenticate: Bearer realm="...",service="...",scope="..."` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    /// The token-exchange endpoint.
    pub realm: String,

    /// The `service` parameter, if present.
    pub service: Option<String>,

    /// The `scope` parameter, if present.
    pub scope: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses a `WWW-Authenticate` header value, returning `None` unless it opens with `Bearer `.
///
/// The grammar is a comma-separated list of `key="value"` pairs; this parser tolerates missing
/// quotes and extra whitespace around commas, since real-world registries are not perfectly
/// consistent about it.
pub fn parse_bearer_challenge(header_value: &str) -> Option<BearerChallenge> {
    let rest = header_value.strip_prefix("Bearer ")?;
    let pairs = parse_pairs(rest);

    let realm = pairs.get("realm")?.clone();
    std::option::Option::Some(BearerChallenge {
        realm,
        service: pairs.get("service").cloned(),
        scope: pairs.get("scope").cloned(),
    })
}

fn parse_pairs(input: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for segment in split_top_level_commas(input) {
        let segment = segment.trim();
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        pairs.insert(key.to_string(), value.to_string());
    }
    pairs
}

/// Splits on commas that are not inside a quoted value, since `scope` values may themselves
/// legitimately contain commas-in-quotes in unusual registries (none observed in practice, but
/// the parser should not silently mis-split a quoted field).
fn split_top_level_commas(input: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                segments.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&input[start..]);
    segments
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

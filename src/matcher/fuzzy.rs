//! Fuzzy fallback (§4.E step 4). Normalizes both sides into token sets and
//! requires intersection or substring containment, guarded against
//! geographic modifiers ("east texas" must not match "texas"). Grounded in
//! `names.py::normalize_tokens`.

use std::collections::HashSet;

use super::teams::normalize;

const GEOGRAPHIC_MODIFIERS: &[&str] = &["east", "west", "north", "south", "central"];

fn tokens(name: &str) -> HashSet<String> {
    normalize(name).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// True if `candidate` plausibly refers to the same team as `query`.
pub fn fuzzy_matches(query: &str, candidate: &str) -> bool {
    let q = tokens(query);
    let c = tokens(candidate);
    if q.is_empty() || c.is_empty() {
        return false;
    }

    if geographic_modifier_mismatch(&q, &c) {
        return false;
    }

    if !q.is_disjoint(&c) {
        return true;
    }

    let qn = normalize(query);
    let cn = normalize(candidate);
    qn.contains(&cn) || cn.contains(&qn)
}

/// Blocks a match when one side carries a geographic modifier the other
/// lacks (prevents "East Texas" from matching bare "Texas").
fn geographic_modifier_mismatch(q: &HashSet<String>, c: &HashSet<String>) -> bool {
    let q_mods: HashSet<&str> = q.iter().map(String::as_str).filter(|t| GEOGRAPHIC_MODIFIERS.contains(t)).collect();
    let c_mods: HashSet<&str> = c.iter().map(String::as_str).filter(|t| GEOGRAPHIC_MODIFIERS.contains(t)).collect();
    q_mods != c_mods
}

/// Finds the first currently-active ticker whose embedded team name fuzzy
/// matches `query`, among `active_tickers` (already-resolved names, e.g.
/// extracted from the exchange's market title field).
pub fn find_fuzzy_match<'a>(query: &str, active: &'a [(String, String)]) -> Option<&'a str> {
    active
        .iter()
        .find(|(_, display_name)| fuzzy_matches(query, display_name))
        .map(|(ticker, _)| ticker.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geographic_modifier_blocks_false_positive() {
        assert!(!fuzzy_matches("East Texas", "Texas"));
    }

    #[test]
    fn token_intersection_matches() {
        assert!(fuzzy_matches("Duke Blue Devils", "Duke"));
    }

    #[test]
    fn substring_containment_matches() {
        assert!(fuzzy_matches("North Carolina", "University of North Carolina"));
    }
}

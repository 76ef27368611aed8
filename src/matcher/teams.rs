//! Team-name normalization and the static team-code dictionary (§4.E step
//! 1). Grounded in `utils/names.py::normalize_name` /
//! `smart_team_lookup` and `data/team_maps.py`'s fallback `TEAM_MAP`; a
//! representative subset of the original's 500+-entry map, since the rest
//! is franchise-name trivia rather than matching logic.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Sport series prefix used when building candidate tickers (§4.E step 1).
pub fn series_prefix(sport: &str) -> &'static str {
    match sport.to_ascii_uppercase().as_str() {
        "NFL" => "KXNFLGAME",
        "NBA" => "KXNBAGAME",
        "CBBM" => "KXNCAAMBGAME",
        "CBBW" => "KXNCAAWBGAME",
        "MLB" => "KXMLBGAME",
        "NHL" => "KXNHLGAME",
        _ => "KXGAME",
    }
}

pub static TEAM_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("kansas", "KU"),
        ("university of kansas", "KU"),
        ("kentucky", "UK"),
        ("university of kentucky", "UK"),
        ("duke", "DUKE"),
        ("north carolina", "UNC"),
        ("university of north carolina", "UNC"),
        ("michigan", "MICH"),
        ("michigan state", "MSU"),
        ("ohio state", "OSU"),
        ("texas", "TEX"),
        ("university of texas", "TEX"),
        ("florida", "FLA"),
        ("university of florida", "FLA"),
        ("alabama", "ALA"),
        ("ucla", "UCLA"),
        ("usc", "USC"),
        ("university of southern california", "USC"),
        ("virginia", "UVA"),
        ("university of virginia", "UVA"),
        ("indiana", "IND"),
        ("iowa", "IOWA"),
        ("wisconsin", "WIS"),
        ("purdue", "PUR"),
        ("gonzaga", "ZAGA"),
        ("villanova", "NOVA"),
        ("arizona", "ARIZ"),
        ("baylor", "BAY"),
        ("houston", "HOU"),
        ("connecticut", "CONN"),
        ("uconn", "CONN"),
        ("tennessee", "TENN"),
        ("arkansas", "ARK"),
        ("auburn", "AUB"),
        ("lsu", "LSU"),
        ("louisiana state", "LSU"),
        ("oklahoma", "OU"),
        ("oregon", "ORE"),
        ("illinois", "ILL"),
        ("marquette", "MARQ"),
        ("creighton", "CREI"),
        ("saint mary's", "SMC"),
        ("butler", "BUT"),
        ("xavier", "XAV"),
        ("san diego state", "SDSU"),
        ("east texas", "ETEX"),
        ("texas am", "TAMU"),
        ("texas a and m", "TAMU"),
    ])
});

/// Strip accents, punctuation, `(W)`/2-letter-region suffixes, and lowercase.
/// Grounded in `names.py::normalize_tokens` minus the team-alias rewrite
/// pass (handled separately by `smart_lookup`).
pub fn normalize(raw: &str) -> String {
    let mut s = strip_accents(raw).to_lowercase();
    s = regex_lite_replace_parenthetical(&s);
    s = s.replace('&', " and ").replace('-', " ").replace('\'', "");
    s = s.replace("st.", "st").replace("saint", "st");
    s = s.chars().map(|c| if c.is_ascii_alphabetic() || c == ' ' { c } else { ' ' }).collect();
    collapse_spaces(&s)
}

fn strip_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

fn regex_lite_replace_parenthetical(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0u32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

const MASCOTS: &[&str] = &[
    "tigers", "bulldogs", "wildcats", "eagles", "bears", "panthers", "lions", "hawks",
    "falcons", "cougars", "huskies", "terriers", "cardinals", "blue devils", "tar heels",
    "spartans", "trojans", "aggies", "longhorns", "wolverines", "buckeyes", "gators",
    "seminoles", "hurricanes", "gamecocks", "jayhawks", "sooners", "cornhuskers",
    "volunteers", "bruins", "rebels", "commodores", "knights", "mustangs", "rams",
    "badgers", "fighting irish", "mountaineers", "cyclones", "owls", "bison", "broncos",
];

/// Code, confidence, matched-key. Mirrors `smart_team_lookup`'s 3-valued
/// return, minus the "fallback" empty string case (callers decide the
/// fallback code themselves).
pub enum MatchConfidence {
    Exact,
    WithoutMascot,
    PrefixMatch,
}

pub fn smart_lookup(team_name: &str) -> Option<(&'static str, MatchConfidence)> {
    let normalized = normalize(team_name);
    if let Some(&code) = TEAM_MAP.get(normalized.as_str()) {
        return Some((code, MatchConfidence::Exact));
    }

    let words: Vec<&str> = normalized.split(' ').collect();
    if words.len() > 1 {
        if MASCOTS.contains(words.last().unwrap()) {
            let without = words[..words.len() - 1].join(" ");
            if let Some(&code) = TEAM_MAP.get(without.as_str()) {
                return Some((code, MatchConfidence::WithoutMascot));
            }
        }
    }

    for (&key, &code) in TEAM_MAP.iter() {
        if key.len() >= 3 && normalized.starts_with(key) {
            return Some((code, MatchConfidence::PrefixMatch));
        }
    }
    None
}

/// Fallback code when no dictionary entry matches: first 3-4 letters of
/// the cleaned name, uppercased, padded with 'X' if too short.
pub fn fallback_code(team_name: &str, len: usize) -> String {
    let cleaned: String = normalize(team_name).chars().filter(|c| !c.is_whitespace()).collect();
    let mut code: String = cleaned.chars().take(len).collect::<String>().to_uppercase();
    while code.len() < len {
        code.push('X');
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_parenthetical_and_punctuation() {
        assert_eq!(normalize("Duke (W)"), "duke");
        assert_eq!(normalize("Texas A&M"), "texas and m");
    }

    #[test]
    fn exact_lookup_hits_dictionary() {
        let (code, _) = smart_lookup("Kansas").unwrap();
        assert_eq!(code, "KU");
    }

    #[test]
    fn mascot_suffix_is_stripped_before_lookup() {
        let (code, _) = smart_lookup("Duke Blue Devils").unwrap();
        assert_eq!(code, "DUKE");
    }

    #[test]
    fn fallback_code_pads_short_names() {
        assert_eq!(fallback_code("Ga", 3), "GAX");
    }
}

use super::ResolverConfig;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Lowercase, turn punctuation into spaces, collapse whitespace runs.
pub fn normalize(text: &str) -> String {
    // Apostrophes are dropped so "kid's room" and "kids room" match
    let mapped: String = text
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pre-normalized form of a name or query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedName {
    pub text: String,
    pub compact: String,
    pub tokens: Vec<String>,
}

impl NormalizedName {
    pub fn new(raw: &str) -> Self {
        let text = normalize(raw);
        Self {
            compact: text.replace(' ', ""),
            tokens: text.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect(),
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Score `query` against `candidate`; 1.0 is an exact match, 0.0 no match.
pub(crate) fn score(
    query: &NormalizedName,
    candidate: &NormalizedName,
    config: &ResolverConfig,
    matcher: &SkimMatcherV2,
) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if query.text == candidate.text || query.compact == candidate.compact {
        return 1.0;
    }

    let mut best = 0.0_f64;

    // Prefix in either direction ("kitch" / "kitchen", "kitchen ceiling" / "kitchen")
    let (short, long) = if query.compact.len() <= candidate.compact.len() {
        (&query.compact, &candidate.compact)
    } else {
        (&candidate.compact, &query.compact)
    };
    if long.starts_with(short.as_str()) {
        let ratio = short.len() as f64 / long.len() as f64;
        best = best.max(config.prefix_weight * (0.5 + 0.5 * ratio));
    }

    // Shared whole tokens ("bedroom" / "master bedroom")
    let shared = query
        .tokens
        .iter()
        .filter(|t| candidate.tokens.contains(t))
        .count();
    if shared > 0 {
        let query_coverage = shared as f64 / query.tokens.len() as f64;
        let candidate_coverage = shared as f64 / candidate.tokens.len() as f64;
        best = best.max(config.token_weight * query_coverage * (0.5 + 0.5 * candidate_coverage));
    }

    // Typos and abbreviations
    let similarity = edit_similarity(&query.compact, &candidate.compact)
        .max(subsequence_similarity(query, candidate, matcher));
    if similarity >= config.min_fuzzy_similarity {
        best = best.max(config.fuzzy_weight * similarity);
    }

    best.min(0.99)
}

/// `1 - levenshtein / max_len`.
pub(crate) fn edit_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Skim subsequence score of the query inside the candidate, scaled to 0..1
/// by the query's self-match score and by how much of the candidate it covers.
fn subsequence_similarity(
    query: &NormalizedName,
    candidate: &NormalizedName,
    matcher: &SkimMatcherV2,
) -> f64 {
    let Some(score) = matcher.fuzzy_match(&candidate.text, &query.text) else {
        return 0.0;
    };
    let perfect = match matcher.fuzzy_match(&query.text, &query.text) {
        Some(p) if p > 0 => p as f64,
        _ => return 0.0,
    };
    let ratio = (score as f64 / perfect).clamp(0.0, 1.0);
    let coverage = query.compact.len() as f64 / candidate.compact.len().max(1) as f64;
    ratio * coverage.min(1.0)
}

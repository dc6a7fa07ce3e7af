// Fuzzy target resolution
//
// Maps a free-text target phrase onto lights, rooms and zones using the
// name index carried by each cache generation.

mod score;
#[cfg(test)]
mod tests;

pub use score::{normalize, NormalizedName};

use crate::event::ResourceKind;
use crate::state::{Arena, Resource, Scene};
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Phrases that address every light.
const ALL_LIGHTS_PHRASES: &[&str] = &[
    "all",
    "all lights",
    "all the lights",
    "lights",
    "every light",
    "everything",
    "everywhere",
    "house",
    "the house",
    "whole house",
    "the whole house",
];

/// Resolver tuning (threshold, margin and scoring weights)
#[derive(Clone, Debug, Deserialize)]
pub struct ResolverConfig {
    /// Minimum top score for an automatic match
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Required lead of the top score over the runner-up
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_prefix_weight")]
    pub prefix_weight: f64,
    #[serde(default = "default_token_weight")]
    pub token_weight: f64,
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy_weight: f64,
    /// Similarity below which fuzzy matches score zero
    #[serde(default = "default_min_fuzzy_similarity")]
    pub min_fuzzy_similarity: f64,
}

fn default_confidence_threshold() -> f64 {
    0.55
}

fn default_ambiguity_margin() -> f64 {
    0.1
}

fn default_top_k() -> usize {
    5
}

fn default_prefix_weight() -> f64 {
    0.85
}

fn default_token_weight() -> f64 {
    0.75
}

fn default_fuzzy_weight() -> f64 {
    0.7
}

fn default_min_fuzzy_similarity() -> f64 {
    0.5
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
            top_k: default_top_k(),
            prefix_weight: default_prefix_weight(),
            token_weight: default_token_weight(),
            fuzzy_weight: default_fuzzy_weight(),
            min_fuzzy_similarity: default_min_fuzzy_similarity(),
        }
    }
}

/// Resolved operand of a command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Light { id: String, name: String },
    Room { id: String, name: String },
    Zone { id: String, name: String },
    AllLights,
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Light { name, .. } | Target::Room { name, .. } | Target::Zone { name, .. } => {
                name
            }
            Target::AllLights => "all lights",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Target::Light { id, .. } | Target::Room { id, .. } | Target::Zone { id, .. } => {
                Some(id)
            }
            Target::AllLights => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Target::Light { .. } => "light",
            Target::Room { .. } => "room",
            Target::Zone { .. } => "zone",
            Target::AllLights => "all",
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Target::Room { .. } | Target::Zone { .. })
    }

    /// Tie-break order for equal scores: rooms, then zones, then lights.
    fn priority(&self) -> u8 {
        match self {
            Target::Room { .. } => 0,
            Target::Zone { .. } => 1,
            Target::Light { .. } => 2,
            Target::AllLights => 3,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::AllLights => write!(f, "all lights"),
            other => write!(f, "{} ({})", other.name(), other.kind_label()),
        }
    }
}

/// One searchable name.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub target: Target,
    pub name: NormalizedName,
}

/// Normalized names of every light, room and zone in one cache generation.
#[derive(Clone, Debug, Default)]
pub struct NameIndex {
    entries: Vec<IndexEntry>,
}

impl NameIndex {
    pub fn build<'a>(resources: impl Iterator<Item = &'a Resource>) -> Self {
        let mut entries: Vec<IndexEntry> = resources
            .filter_map(|resource| {
                let target = match resource {
                    Resource::Light(l) => Target::Light {
                        id: l.id.clone(),
                        name: l.name.clone(),
                    },
                    Resource::Room(g) => Target::Room {
                        id: g.id.clone(),
                        name: g.name.clone(),
                    },
                    Resource::Zone(g) => Target::Zone {
                        id: g.id.clone(),
                        name: g.name.clone(),
                    },
                    _ => return None,
                };
                Some(IndexEntry {
                    name: NormalizedName::new(target.name()),
                    target,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            a.name
                .text
                .cmp(&b.name.text)
                .then_with(|| a.target.priority().cmp(&b.target.priority()))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display names, deduplicated and sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.target.name().to_string())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names.dedup();
        names
    }
}

/// A scored candidate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub target: Target,
    pub score: f64,
}

/// Outcome of resolving a target phrase.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Unique(Target),
    /// Several close candidates, best first
    Ambiguous {
        phrase: String,
        candidates: Vec<Candidate>,
    },
    /// Nothing matched; `available` lists every addressable name
    NotFound {
        phrase: String,
        available: Vec<String>,
    },
}

/// Outcome of resolving a scene name.
#[derive(Clone, Debug)]
pub enum SceneMatch<'a> {
    Unique(&'a Scene),
    Ambiguous(Vec<&'a Scene>),
    NotFound { available: Vec<String> },
}

pub struct Resolver {
    config: ResolverConfig,
    matcher: SkimMatcherV2,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            matcher: SkimMatcherV2::default(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Scored candidates, best first, at most `top_k`.
    pub fn candidates(&self, index: &NameIndex, phrase: &str) -> Vec<Candidate> {
        let query = NormalizedName::new(phrase);
        if query.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = index
            .entries()
            .iter()
            .filter_map(|entry| {
                let score = score::score(&query, &entry.name, &self.config, &self.matcher);
                (score > 0.0).then(|| Candidate {
                    target: entry.target.clone(),
                    score,
                })
            })
            .collect();

        candidates.sort_by(compare_candidates);
        candidates.truncate(self.config.top_k.max(1));
        candidates
    }

    /// Bind a target phrase to one target.
    pub fn resolve(&self, arena: &Arena, phrase: &str) -> Resolution {
        let index = arena.name_index();
        let query = NormalizedName::new(phrase);
        let not_found = || Resolution::NotFound {
            phrase: phrase.trim().to_string(),
            available: index.names(),
        };

        if query.is_empty() {
            return not_found();
        }

        let candidates = self.candidates(index, phrase);
        let has_exact = candidates.first().is_some_and(|c| c.score >= 1.0);
        if !has_exact && ALL_LIGHTS_PHRASES.contains(&query.text.as_str()) {
            return Resolution::Unique(Target::AllLights);
        }

        let Some(top) = candidates.first() else {
            return not_found();
        };

        if has_exact {
            // Exact names only compete with other exact names of the same kind
            let rivals = candidates
                .iter()
                .skip(1)
                .filter(|c| c.score >= 1.0 && c.target.priority() == top.target.priority())
                .count();
            if rivals == 0 {
                return Resolution::Unique(top.target.clone());
            }
            return Resolution::Ambiguous {
                phrase: phrase.trim().to_string(),
                candidates: candidates.into_iter().filter(|c| c.score >= 1.0).collect(),
            };
        }

        let runner_up = candidates.get(1).map(|c| c.score).unwrap_or(0.0);
        if top.score >= self.config.confidence_threshold
            && top.score - runner_up >= self.config.ambiguity_margin
        {
            return Resolution::Unique(top.target.clone());
        }

        Resolution::Ambiguous {
            phrase: phrase.trim().to_string(),
            candidates,
        }
    }

    /// Find a scene by name, optionally restricted to one room or zone.
    pub fn resolve_scene<'a>(
        &self,
        arena: &'a Arena,
        phrase: &str,
        group_id: Option<&str>,
    ) -> SceneMatch<'a> {
        let scenes: Vec<&Scene> = match group_id {
            Some(id) => arena.scenes_for_group(id),
            None => arena.scenes(),
        };
        let available = || {
            let mut names: Vec<String> = scenes.iter().map(|s| s.name.clone()).collect();
            names.dedup();
            names
        };

        let query = NormalizedName::new(phrase);
        if query.is_empty() {
            return SceneMatch::NotFound {
                available: available(),
            };
        }

        let mut scored: Vec<(&Scene, f64)> = scenes
            .iter()
            .map(|scene| {
                let name = NormalizedName::new(&scene.name);
                (*scene, score::score(&query, &name, &self.config, &self.matcher))
            })
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let Some(&(top, top_score)) = scored.first() else {
            return SceneMatch::NotFound {
                available: available(),
            };
        };
        let runner_up = scored.get(1).map(|(_, s)| *s).unwrap_or(0.0);

        if top_score >= 1.0 && runner_up < 1.0 {
            return SceneMatch::Unique(top);
        }
        if top_score >= self.config.confidence_threshold
            && top_score - runner_up >= self.config.ambiguity_margin
        {
            return SceneMatch::Unique(top);
        }
        if top_score < self.config.confidence_threshold {
            return SceneMatch::NotFound {
                available: available(),
            };
        }

        SceneMatch::Ambiguous(
            scored
                .into_iter()
                .take(self.config.top_k.max(1))
                .map(|(scene, _)| scene)
                .collect(),
        )
    }

    /// Whether a phrase names a cached resource of `kind` exactly.
    pub fn is_exact_name(&self, arena: &Arena, phrase: &str, kind: ResourceKind) -> bool {
        let query = normalize(phrase);
        arena.name_index().entries().iter().any(|e| {
            e.name.text == query
                && matches!(
                    (&e.target, kind),
                    (Target::Light { .. }, ResourceKind::Light)
                        | (Target::Room { .. }, ResourceKind::Room)
                        | (Target::Zone { .. }, ResourceKind::Zone)
                )
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.target.priority().cmp(&b.target.priority()))
        .then_with(|| a.target.name().cmp(b.target.name()))
}

//! Greedy single-pass record matching.
//!
//! Each incoming record is scored against the representative (founding record)
//! of every cluster formed by earlier sources and joins the best-scoring one at
//! or above the threshold; otherwise it founds a new cluster. Earlier decisions
//! are never revisited.

use log::{debug, warn};

use crate::config::{KeyField, MatchConfig, SimilarityAlgorithm};
use crate::model::{AmbiguousMatch, MatchCluster, NormalizedRecord, Value};
use crate::template::normalize_header;

/// Scores within this distance are treated as a tie.
const SCORE_EPSILON: f64 = 1e-9;

/// Similarity of one key field in [0,1]; `None` when either side is null.
///
/// Equal values short-circuit to 1.0. Unequal values score 0.0 unless the
/// field is fuzzy.
pub fn field_similarity(key: &KeyField, a: &Value, b: &Value) -> Option<f64> {
    let (a, b) = (a.as_text()?, b.as_text()?);
    let (a, b) = if key.normalize {
        (normalize_header(&a), normalize_header(&b))
    } else {
        (a.into_owned(), b.into_owned())
    };

    if a == b {
        return Some(1.0);
    }
    if !key.fuzzy {
        return Some(0.0);
    }
    Some(match key.algorithm {
        SimilarityAlgorithm::JaroWinkler => strsim::jaro_winkler(&a, &b),
        SimilarityAlgorithm::Levenshtein => strsim::normalized_levenshtein(&a, &b),
    })
}

/// Weighted score of `candidate` against `representative`.
///
/// Returns `None` when the pair cannot match: a field fell below its floor
/// (exact fields must be equal), or every key field was null on one side.
pub fn score_pair(
    keys: &[KeyField],
    representative: &NormalizedRecord,
    candidate: &NormalizedRecord,
) -> Option<f64> {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for key in keys {
        let Some(sim) = field_similarity(
            key,
            representative.value(&key.field),
            candidate.value(&key.field),
        ) else {
            continue;
        };

        let floor = if key.fuzzy { key.min_similarity } else { 1.0 };
        if sim < floor {
            return None;
        }
        weighted += sim * key.weight;
        total_weight += key.weight;
    }

    if total_weight == 0.0 {
        None
    } else {
        Some(weighted / total_weight)
    }
}

/// Final state of a matching pass.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Clusters in founding order; `clusters[i].id == i`.
    pub clusters: Vec<MatchCluster>,
    pub ambiguous: Vec<AmbiguousMatch>,
}

/// Where one record lands among the clusters of earlier sources.
struct Placement {
    chosen: usize,
    score: f64,
    /// Clusters scoring within `SCORE_EPSILON` of the best, in tie-break order.
    tied: Vec<usize>,
}

/// Accumulating cluster set. Single writer: sources are added one at a time.
///
/// Every record of a source is scored against the clusters as they stood
/// before that source, so row order within a source never changes the result.
pub struct Matcher<'a> {
    config: &'a MatchConfig,
    clusters: Vec<MatchCluster>,
    ambiguous: Vec<AmbiguousMatch>,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a MatchConfig) -> Self {
        Self {
            config,
            clusters: Vec::new(),
            ambiguous: Vec::new(),
        }
    }

    /// Best cluster for `record`, or `None` when nothing reaches the threshold.
    fn place(&self, record: &NormalizedRecord) -> Option<Placement> {
        let mut candidates: Vec<(usize, f64)> = self
            .clusters
            .iter()
            .filter_map(|c| {
                score_pair(&self.config.keys, c.representative(), record)
                    .filter(|s| *s + SCORE_EPSILON >= self.config.threshold)
                    .map(|s| (c.id, s))
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let best = candidates
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        candidates.retain(|(_, s)| best - s <= SCORE_EPSILON);

        // Larger cluster, then earlier cluster.
        candidates.sort_by(|a, b| {
            self.clusters[b.0]
                .len()
                .cmp(&self.clusters[a.0].len())
                .then(a.0.cmp(&b.0))
        });

        let (chosen, score) = candidates[0];
        Some(Placement {
            chosen,
            score,
            tied: candidates.iter().map(|(id, _)| *id).collect(),
        })
    }

    /// Place every record of one source; returns the cluster id of each record.
    ///
    /// Placement is decided for the whole source first. Joins and new
    /// singletons take effect afterwards, in row order.
    pub fn add_source<I>(&mut self, records: I) -> Vec<usize>
    where
        I: IntoIterator<Item = NormalizedRecord>,
    {
        let records: Vec<NormalizedRecord> = records.into_iter().collect();
        let placements: Vec<Option<Placement>> = records.iter().map(|r| self.place(r)).collect();

        let mut ids = Vec::with_capacity(records.len());
        for (record, placement) in records.into_iter().zip(placements) {
            let Some(Placement { chosen, score, tied }) = placement else {
                let id = self.clusters.len();
                self.clusters.push(MatchCluster::singleton(id, record));
                ids.push(id);
                continue;
            };

            if tied.len() > 1 {
                warn!(
                    "ambiguous match for {}:{}: clusters {:?} tie at {:.3}, chose {}",
                    record.source(),
                    record.row(),
                    tied,
                    score,
                    chosen
                );
                self.ambiguous.push(AmbiguousMatch {
                    record: record.provenance.clone(),
                    score,
                    candidates: tied,
                    chosen,
                });
            }

            debug!(
                "{}:{} joins cluster {} (score {:.3})",
                record.source(),
                record.row(),
                chosen,
                score
            );
            self.clusters[chosen].push(record, score);
            ids.push(chosen);
        }
        ids
    }

    pub fn clusters(&self) -> &[MatchCluster] {
        &self.clusters
    }

    pub fn finish(self) -> MatchOutcome {
        MatchOutcome {
            clusters: self.clusters,
            ambiguous: self.ambiguous,
        }
    }
}

/// Match a full record stream in one go; consecutive records of one source form a batch.
pub fn match_records<I>(config: &MatchConfig, records: I) -> MatchOutcome
where
    I: IntoIterator<Item = NormalizedRecord>,
{
    let mut matcher = Matcher::new(config);
    let mut batch: Vec<NormalizedRecord> = Vec::new();
    for record in records {
        if batch.last().is_some_and(|r| r.source() != record.source()) {
            matcher.add_source(std::mem::take(&mut batch));
        }
        batch.push(record);
    }
    matcher.add_source(batch);
    matcher.finish()
}

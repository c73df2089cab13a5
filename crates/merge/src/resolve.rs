use std::collections::BTreeMap;

use log::debug;

use crate::config::{ConflictPolicy, ResolutionConfig};
use crate::model::{ConflictNote, MatchCluster, MergedRecord, Provenance, Value};

/// Turns clusters into merged records under a fixed field list and policy set.
pub struct Resolver<'a> {
    fields: &'a [String],
    resolution: &'a ResolutionConfig,
    sum_fields: &'a [String],
}

/// A non-null value and the record it came from.
struct Candidate<'c> {
    value: &'c Value,
    provenance: &'c Provenance,
}

impl<'a> Resolver<'a> {
    pub fn new(
        fields: &'a [String],
        resolution: &'a ResolutionConfig,
        sum_fields: &'a [String],
    ) -> Self {
        Self {
            fields,
            resolution,
            sum_fields,
        }
    }

    pub fn resolve(&self, cluster: &MatchCluster) -> MergedRecord {
        let mut values = BTreeMap::new();
        let mut conflicts = BTreeMap::new();

        for field in self.fields {
            let candidates: Vec<Candidate<'_>> = cluster
                .members
                .iter()
                .filter_map(|r| {
                    let value = r.value(field);
                    (!value.is_null()).then_some(Candidate {
                        value,
                        provenance: &r.provenance,
                    })
                })
                .collect();

            let Some(first) = candidates.first() else {
                values.insert(field.clone(), Value::Null);
                continue;
            };
            if candidates.iter().all(|c| c.value == first.value) {
                values.insert(field.clone(), first.value.clone());
                continue;
            }

            let winner = pick(self.resolution.policy_for(field), &candidates).value;
            let notes: Vec<ConflictNote> = candidates
                .iter()
                .filter(|c| c.value != winner)
                .map(|c| ConflictNote {
                    field: field.clone(),
                    value: c.value.clone(),
                    source: c.provenance.source.clone(),
                    row: c.provenance.row,
                })
                .collect();

            debug!(
                "cluster {}: '{}' resolved to '{}' over {} other value(s)",
                cluster.id,
                field,
                winner,
                notes.len()
            );
            values.insert(field.clone(), winner.clone());
            conflicts.insert(field.clone(), notes);
        }

        let totals = self
            .sum_fields
            .iter()
            .map(|field| {
                let sum = cluster
                    .members
                    .iter()
                    .filter_map(|r| r.value(field).as_number())
                    .sum::<f64>();
                (field.clone(), sum)
            })
            .collect();

        MergedRecord {
            cluster_id: cluster.id,
            values,
            conflicts,
            members: cluster.members.iter().map(|r| r.provenance.clone()).collect(),
            member_count: cluster.len(),
            confidence: cluster.confidence,
            totals,
        }
    }

    pub fn resolve_all(&self, clusters: &[MatchCluster]) -> Vec<MergedRecord> {
        clusters.iter().map(|c| self.resolve(c)).collect()
    }
}

/// Winning candidate; `candidates` is non-empty and in member order.
fn pick<'c, 'v>(policy: ConflictPolicy, candidates: &'c [Candidate<'v>]) -> &'c Candidate<'v> {
    let mut best = &candidates[0];
    match policy {
        ConflictPolicy::PreferFirstSource => {}
        ConflictPolicy::PreferLongest => {
            let mut best_len = text_len(best.value);
            for c in &candidates[1..] {
                let len = text_len(c.value);
                if len > best_len {
                    best = c;
                    best_len = len;
                }
            }
        }
        ConflictPolicy::PreferMostFrequent => {
            let frequency = |v: &Value| candidates.iter().filter(|c| c.value == v).count();
            let mut best_count = frequency(best.value);
            for c in &candidates[1..] {
                let count = frequency(c.value);
                if count > best_count {
                    best = c;
                    best_count = count;
                }
            }
        }
    }
    best
}

fn text_len(value: &Value) -> usize {
    value.as_text().map(|t| t.chars().count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NormalizedRecord;

    fn rec(source: &str, row: usize, fields: &[(&str, Value)]) -> NormalizedRecord {
        NormalizedRecord {
            provenance: Provenance {
                source: source.into(),
                row,
            },
            values: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn cluster(records: Vec<NormalizedRecord>) -> MatchCluster {
        let mut iter = records.into_iter();
        let mut c = MatchCluster::singleton(7, iter.next().unwrap());
        for r in iter {
            c.push(r, 1.0);
        }
        c
    }

    fn names(values: &[&str]) -> MatchCluster {
        cluster(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| rec(&format!("s{i}"), 0, &[("name", Value::text(v))]))
                .collect(),
        )
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_distinct_value_has_no_conflict() {
        let c = cluster(vec![
            rec("a", 0, &[("name", Value::text("Jane"))]),
            rec("b", 3, &[("name", Value::text("Jane"))]),
            rec("c", 1, &[("name", Value::Null)]),
        ]);
        let f = fields(&["name", "email"]);
        let res = ResolutionConfig::default();
        let merged = Resolver::new(&f, &res, &[]).resolve(&c);

        assert_eq!(merged.value("name"), &Value::text("Jane"));
        assert!(merged.value("email").is_null());
        assert!(merged.conflicts_for("name").is_empty());
        assert!(!merged.has_conflicts());
        assert_eq!(merged.member_count, 3);
        assert_eq!(merged.cluster_id, 7);
        assert_eq!(merged.members[1].row, 3);
    }

    #[test]
    fn prefer_first_source() {
        let f = fields(&["name"]);
        let res = ResolutionConfig::new(ConflictPolicy::PreferFirstSource);
        let merged = Resolver::new(&f, &res, &[]).resolve(&names(&["Jo", "Joanna", "Jo"]));
        assert_eq!(merged.value("name"), &Value::text("Jo"));
        let notes = merged.conflicts_for("name");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].value, Value::text("Joanna"));
        assert_eq!(notes[0].source, "s1");
    }

    #[test]
    fn prefer_longest_ties_go_to_first() {
        let f = fields(&["name"]);
        let res = ResolutionConfig::new(ConflictPolicy::PreferLongest);
        let resolver = Resolver::new(&f, &res, &[]);

        let merged = resolver.resolve(&names(&["Jo", "Joanna", "Johnny"]));
        assert_eq!(merged.value("name"), &Value::text("Joanna"));
        assert_eq!(merged.conflict_count(), 2);

        // character count, not bytes
        let merged = resolver.resolve(&names(&["Zoë", "Zoey"]));
        assert_eq!(merged.value("name"), &Value::text("Zoey"));
    }

    #[test]
    fn prefer_most_frequent() {
        let f = fields(&["name"]);
        let res = ResolutionConfig::new(ConflictPolicy::PreferMostFrequent);
        let merged = Resolver::new(&f, &res, &[]).resolve(&names(&["Alice", "Alicia", "Alice"]));

        assert_eq!(merged.value("name"), &Value::text("Alice"));
        let notes = merged.conflicts_for("name");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].value, Value::text("Alicia"));
        assert_eq!(notes[0].source, "s1");
    }

    #[test]
    fn most_frequent_tie_goes_to_earliest() {
        let f = fields(&["name"]);
        let res = ResolutionConfig::new(ConflictPolicy::PreferMostFrequent);
        let merged = Resolver::new(&f, &res, &[]).resolve(&names(&["B", "A", "A", "B"]));
        assert_eq!(merged.value("name"), &Value::text("B"));
        assert_eq!(merged.conflict_count(), 2);
    }

    #[test]
    fn distinct_values_are_case_sensitive() {
        let f = fields(&["name"]);
        let res = ResolutionConfig::default();
        let merged = Resolver::new(&f, &res, &[]).resolve(&names(&["Alice", "alice"]));
        assert_eq!(merged.conflict_count(), 1);
    }

    #[test]
    fn per_field_policy_override() {
        let c = cluster(vec![
            rec("a", 0, &[("name", Value::text("Jo")), ("city", Value::text("Oslo"))]),
            rec("b", 0, &[("name", Value::text("Joanna")), ("city", Value::text("Bergen"))]),
        ]);
        let f = fields(&["name", "city"]);
        let mut res = ResolutionConfig::new(ConflictPolicy::PreferFirstSource);
        res.fields.insert("name".into(), ConflictPolicy::PreferLongest);
        let merged = Resolver::new(&f, &res, &[]).resolve(&c);
        assert_eq!(merged.value("name"), &Value::text("Joanna"));
        assert_eq!(merged.value("city"), &Value::text("Oslo"));
    }

    #[test]
    fn totals_sum_numeric_members() {
        let c = cluster(vec![
            rec("a", 0, &[("amount", Value::Number(10.5))]),
            rec("b", 0, &[("amount", Value::Number(4.5))]),
            rec("c", 0, &[("amount", Value::text("n/a"))]),
        ]);
        let f = fields(&["amount"]);
        let sums = fields(&["amount"]);
        let res = ResolutionConfig::default();
        let merged = Resolver::new(&f, &res, &sums).resolve(&c);
        assert_eq!(merged.totals["amount"], 15.0);
        // every distinct value still recorded
        assert_eq!(merged.conflict_count(), 2);
    }
}

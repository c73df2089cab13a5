use listmerge_engine::config::{ConflictPolicy, KeyField, SessionConfig};
use listmerge_engine::model::{MergeResult, Value};
use listmerge_engine::normalize::normalize;
use listmerge_engine::template::{FieldDef, HeaderTemplate, TemplateStore};
use listmerge_engine::validate::{validate, IssueCode, ValidationContext};
use listmerge_engine::{run, RawTable};

fn person() -> HeaderTemplate {
    HeaderTemplate::new(
        "person",
        vec![
            FieldDef::text("name", ["name", "Full Name"]).required(),
            FieldDef::text("email", ["email", "E-mail", "Mail"]).required(),
            FieldDef::text("customerId", ["customerId", "Customer No"]),
            FieldDef::number("amount", ["amount", "Betrag"]),
        ],
    )
}

fn store() -> TemplateStore {
    TemplateStore::from_templates([person()])
}

fn session(keys: Vec<KeyField>, policy: ConflictPolicy) -> SessionConfig {
    let mut config = SessionConfig::with_keys(keys);
    config.template = Some("person".into());
    config.resolution.policy = policy;
    config
}

fn merge(config: &SessionConfig, tables: &[RawTable]) -> MergeResult {
    run(config, &store(), tables).unwrap()
}

// -------------------------------------------------------------------------
// Normalization
// -------------------------------------------------------------------------

#[test]
fn full_mapping_is_a_bijection() {
    let table = RawTable::from_rows(
        "a",
        &["Customer No", "Betrag", "Mail", "Full Name"],
        &[&["7", "12,50", "x@y.z", "Jane"], &["8", "", "", "Bob"]],
    );
    let template = person();
    let (records, report) = normalize(&table, &template);

    let expected: Vec<&str> = {
        let mut f: Vec<&str> = template.field_names().collect();
        f.sort();
        f
    };
    for record in &records {
        let keys: Vec<&str> = record.values.keys().map(String::as_str).collect();
        assert_eq!(keys, expected);
    }
    assert!(report.unmapped.is_empty());
    assert!(report.is_clean());
    assert_eq!(records[0].value("amount"), &Value::Number(12.5));
    assert!(records[1].value("email").is_null());
    assert_eq!(records[1].row(), 1);
}

// -------------------------------------------------------------------------
// Matching
// -------------------------------------------------------------------------

#[test]
fn identical_customer_id_always_clusters() {
    let a = RawTable::from_rows("a", &["customerId", "name"], &[&["42", "Jane Doe"]]);
    let b = RawTable::from_rows("b", &["Customer No", "name"], &[&["42", "J. Doe"]]);

    for threshold in [0.0, 0.5, 0.99, 1.0] {
        let mut config = session(
            vec![KeyField::fuzzy("customerId", 0.99)],
            ConflictPolicy::PreferFirstSource,
        );
        config.matching.threshold = threshold;
        let result = merge(&config, &[a.clone(), b.clone()]);
        assert_eq!(result.merged.len(), 1, "threshold {threshold}");
        assert_eq!(result.merged[0].member_count, 2);
        assert_eq!(result.merged[0].confidence, 1.0);
    }
}

#[test]
fn null_key_record_is_always_a_singleton() {
    let a = RawTable::from_rows("a", &["customerId", "name"], &[&["1", "Jane"], &["", "Jane"]]);
    let b = RawTable::from_rows("b", &["customerId", "name"], &[&["", "Jane"], &["1", "Jane"]]);
    let config = session(
        vec![KeyField::exact("customerId")],
        ConflictPolicy::PreferFirstSource,
    );
    let result = merge(&config, &[a, b]);

    assert_eq!(result.merged.len(), 1);
    assert_eq!(result.merged[0].member_count, 2);
    assert_eq!(result.unmatched.len(), 2);
    assert!(result
        .unmatched
        .iter()
        .all(|r| r.value("customerId").is_null() && r.member_count == 1));
}

#[test]
fn rows_join_earlier_sources_not_their_own() {
    let a = RawTable::from_rows(
        "a",
        &["email", "amount"],
        &[&["jane@x.com", "10"], &["jane@x.com", "4"], &["bob@x.com", "1"]],
    );
    let b = RawTable::from_rows("b", &["email", "amount"], &[&["JANE@x.com ", "5,5"]]);
    let mut config = session(vec![KeyField::exact("email")], ConflictPolicy::PreferFirstSource);
    config.aggregate.sum_fields = vec!["amount".into()];
    let result = merge(&config, &[a, b]);

    // the two jane rows of `a` stay apart; b's row ties between them and joins the first
    assert_eq!(result.stats.clusters, 3);
    assert_eq!(result.merged.len(), 1);
    assert_eq!(result.merged[0].totals["amount"], 15.5);
    assert_eq!(result.stats.field_totals["amount"], 20.5);
    assert_eq!(result.unmatched.len(), 2);
    assert_eq!(result.ambiguous.len(), 1);
    assert_eq!(result.ambiguous[0].chosen, result.merged[0].cluster_id);
}

// -------------------------------------------------------------------------
// Resolution
// -------------------------------------------------------------------------

#[test]
fn most_frequent_alice() {
    let tables = [
        RawTable::from_rows("a", &["customerId", "name"], &[&["1", "Alice"]]),
        RawTable::from_rows("b", &["customerId", "name"], &[&["1", "Alicia"]]),
        RawTable::from_rows("c", &["customerId", "name"], &[&["1", "Alice"]]),
    ];
    let config = session(
        vec![KeyField::exact("customerId")],
        ConflictPolicy::PreferMostFrequent,
    );
    let result = merge(&config, &tables);

    let record = &result.merged[0];
    assert_eq!(record.value("name"), &Value::text("Alice"));
    let notes = record.conflicts_for("name");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].value, Value::text("Alicia"));
    assert_eq!(notes[0].source, "b");
    assert_eq!(notes[0].row, 0);
}

#[test]
fn single_distinct_value_never_conflicts() {
    let tables = [
        RawTable::from_rows("a", &["customerId", "name", "email"], &[&["1", "Jane", ""]]),
        RawTable::from_rows("b", &["customerId", "name", "email"], &[&["1", "Jane", "j@x.com"]]),
    ];
    let config = session(vec![KeyField::exact("customerId")], ConflictPolicy::PreferLongest);
    let result = merge(&config, &tables);
    let record = &result.merged[0];

    assert_eq!(record.value("name"), &Value::text("Jane"));
    assert_eq!(record.value("email"), &Value::text("j@x.com"));
    assert!(!record.has_conflicts());
    assert_eq!(result.stats.rows_with_conflicts, 0);
}

#[test]
fn source_order_changes_first_source_winner() {
    let a = RawTable::from_rows("a", &["customerId", "email"], &[&["1", "a@x.com"]]);
    let b = RawTable::from_rows("b", &["customerId", "email"], &[&["1", "b@x.com"]]);
    let config = session(
        vec![KeyField::exact("customerId")],
        ConflictPolicy::PreferFirstSource,
    );

    let forward = merge(&config, &[a.clone(), b.clone()]);
    let backward = merge(&config, &[b, a]);

    assert_eq!(forward.merged[0].value("email"), &Value::text("a@x.com"));
    assert_eq!(backward.merged[0].value("email"), &Value::text("b@x.com"));
    assert_eq!(forward.merged[0].conflicts_for("email")[0].source, "b");
    assert_eq!(backward.merged[0].conflicts_for("email")[0].source, "a");
}

// -------------------------------------------------------------------------
// End to end
// -------------------------------------------------------------------------

#[test]
fn differing_headers_merge_cleanly() {
    let a = RawTable::from_rows("A", &["Full Name", "Email"], &[&["Jane Doe", "jane@x.com"]]);
    let b = RawTable::from_rows("B", &["name", "E-mail"], &[&["Jane Doe", "jane@x.com"]]);
    let config = session(
        vec![KeyField::exact("name"), KeyField::exact("email")],
        ConflictPolicy::PreferFirstSource,
    );
    let result = merge(&config, &[a, b]);

    assert_eq!(result.stats.clusters, 1);
    assert_eq!(result.merged.len(), 1);
    assert!(result.unmatched.is_empty());
    assert_eq!(result.merged[0].conflict_count(), 0);
    assert_eq!(result.stats.conflict_notes, 0);
}

#[test]
fn name_only_key_records_email_conflict() {
    let a = RawTable::from_rows("A", &["name", "email"], &[&["Jane Doe", "jane@x.com"]]);
    let b = RawTable::from_rows("B", &["name", "email"], &[&["Jane Doe", "j.doe@x.com"]]);
    let config = session(vec![KeyField::exact("name")], ConflictPolicy::PreferFirstSource);
    let result = merge(&config, &[a, b]);

    assert_eq!(result.merged.len(), 1);
    let record = &result.merged[0];
    assert_eq!(record.value("email"), &Value::text("jane@x.com"));
    let notes = record.conflicts_for("email");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].value, Value::text("j.doe@x.com"));
    assert_eq!(notes[0].source, "B");
    assert!(result.has_warnings());
}

#[test]
fn fuzzy_name_with_validation() {
    let a = RawTable::from_rows(
        "crm",
        &["Full Name", "Mail", "Betrag"],
        &[&["Jonathan Smith", "js@x.com", "100,25"], &["Ann Lee", "ann@x.com", "3"]],
    );
    let b = RawTable::from_rows(
        "shop",
        &["name", "email", "amount", "Phone"],
        &[&["Jonathon Smith", "", "50", "555"]],
    );
    let mut config = SessionConfig::from_toml(
        r#"
template = "person"

[[sources]]
id = "crm"
[[sources]]
id = "shop"

[matching]
threshold = 0.9
[[matching.keys]]
field = "name"
fuzzy = true
min_similarity = 0.9

[aggregate]
sum_fields = ["amount"]

[validation]
[validation.expected_rows]
crm = 2
shop = 1
[validation.expected_sums]
amount = 153.25
"#,
    )
    .unwrap();

    let result = run(&config, &store(), &[a.clone(), b.clone()]).unwrap();
    assert_eq!(result.merged.len(), 1);
    let record = &result.merged[0];
    assert_eq!(record.value("name"), &Value::text("Jonathan Smith"));
    assert!(record.confidence < 1.0);
    assert_eq!(record.totals["amount"], 150.25);
    assert_eq!(result.stats.unmapped_columns["shop"], vec!["Phone".to_string()]);

    let ctx = config.validation.clone().unwrap();
    let report = validate(&result, &ctx);
    assert!(report.valid, "{:?}", report.issues);

    config.validation = Some(ValidationContext {
        expected_sums: [("amount".to_string(), 150.0)].into_iter().collect(),
        ..ctx
    });
    let report = validate(&result, config.validation.as_ref().unwrap());
    assert!(report.has(IssueCode::SumMismatch));
}

#[test]
fn result_serializes_to_json() {
    let a = RawTable::from_rows("A", &["name", "email"], &[&["Jane", "a@x.com"]]);
    let b = RawTable::from_rows("B", &["name", "email"], &[&["Jane", "b@x.com"]]);
    let config = session(vec![KeyField::exact("name")], ConflictPolicy::PreferFirstSource);
    let result = merge(&config, &[a, b]);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["meta"]["template_id"], "person");
    assert_eq!(json["merged"][0]["values"]["email"], "a@x.com");
    assert_eq!(json["merged"][0]["values"]["amount"], serde_json::Value::Null);
    assert_eq!(json["merged"][0]["conflicts"]["email"][0]["source"], "B");
    assert_eq!(json["stats"]["merged_rows"], 1);
}

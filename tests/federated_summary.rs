use std::collections::{BTreeMap, HashMap};

use federated_summary::aggregate::{AggregatorOptions, CentralAggregator, NodeParticipation, NodeStatus};
use federated_summary::dispatch::{DispatchOptions, InProcessDispatcher, NodeDispatcher, NodeOutcome};
use federated_summary::ingestion::ingest_csv_inferring_schema;
use federated_summary::local::{DataStation, LocalStatBundle, LocalVarianceBundle};
use federated_summary::policy::{PolicyConfig, StatCapabilities, StatisticKind};
use federated_summary::privacy::ExclusionReason;
use federated_summary::task::{SummaryRequest, SummaryTask, VarianceRequest};
use federated_summary::types::{ColumnKind, DataSet, DataType, Field, NodeId, Schema, Value};
use federated_summary::SummaryError;

fn lenient() -> PolicyConfig {
    PolicyConfig {
        minimum_rows: 2,
        privacy_threshold: 1,
        ..PolicyConfig::default()
    }
}

fn numeric_station(id: u64, values: &[f64], policy: PolicyConfig) -> DataStation {
    let schema = Schema::new(vec![Field::new("x", DataType::Float64)]);
    let rows = values.iter().map(|v| vec![Value::Float64(*v)]).collect();
    DataStation::new(NodeId(id), DataSet::new(schema, rows), policy)
}

fn text_station(id: u64, column: &str, values: &[&str], policy: PolicyConfig) -> DataStation {
    let schema = Schema::new(vec![Field::new(column, DataType::Utf8)]);
    let rows = values.iter().map(|v| vec![Value::Utf8(v.to_string())]).collect();
    DataStation::new(NodeId(id), DataSet::new(schema, rows), policy)
}

fn aggregator(stations: Vec<DataStation>) -> CentralAggregator<InProcessDispatcher> {
    CentralAggregator::new(InProcessDispatcher::new(stations, DispatchOptions::default()))
}

fn worked_example() -> Vec<DataStation> {
    vec![
        numeric_station(1, &[1.0, 2.0, 3.0], lenient()),
        numeric_station(2, &[4.0, 5.0], lenient()),
    ]
}

#[test]
fn worked_example_matches_pooled_statistics() {
    let report = aggregator(worked_example()).run(&SummaryTask::default()).unwrap();

    let x = &report.numeric["x"];
    assert_eq!(x.count, Some(5));
    assert_eq!(x.missing, Some(0));
    assert_eq!(x.sum, Some(15.0));
    assert_eq!(x.mean, Some(3.0));
    assert_eq!(x.std, Some(2.0f64.sqrt()));
    assert_eq!(x.min, Some(1.0));
    assert_eq!(x.max, Some(5.0));
    assert!(report.categorical.is_empty());

    assert_eq!(
        report.num_complete_rows_per_node,
        BTreeMap::from([(NodeId(1), 3), (NodeId(2), 2)])
    );
    for participation in report.participation.values() {
        assert_eq!(participation.summary, NodeStatus::Contributed);
        assert_eq!(participation.variance, NodeStatus::Contributed);
    }
}

#[test]
fn disallowed_min_at_one_node_comes_from_the_others() {
    let policy_a = PolicyConfig {
        capabilities: StatCapabilities::all().with(StatisticKind::Min, false),
        ..lenient()
    };
    let stations = vec![
        numeric_station(1, &[1.0, 2.0, 3.0], policy_a),
        numeric_station(2, &[4.0, 5.0], lenient()),
    ];
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();

    let x = &report.numeric["x"];
    assert_eq!(x.min, Some(4.0));
    assert_eq!(x.max, Some(5.0));
    assert_eq!(x.mean, Some(3.0));
}

#[test]
fn policy_keys_are_read_per_node() {
    let source = HashMap::from([
        ("SUMMARY_ALLOW_MIN".to_string(), "false".to_string()),
        ("SUMMARY_MINIMUM_ROWS".to_string(), "2".to_string()),
    ]);
    let schema = Schema::new(vec![Field::new("x", DataType::Float64)]);
    let rows = [1.0, 2.0, 3.0].iter().map(|v| vec![Value::Float64(*v)]).collect();
    let a = DataStation::from_source(NodeId(1), DataSet::new(schema, rows), &source).unwrap();

    let report = aggregator(vec![a, numeric_station(2, &[4.0, 5.0], lenient())])
        .run(&SummaryTask::default())
        .unwrap();
    assert_eq!(report.numeric["x"].min, Some(4.0));
}

#[test]
fn excluded_node_does_not_change_the_result() {
    let baseline = aggregator(worked_example()).run(&SummaryTask::default()).unwrap();

    let mut stations = worked_example();
    stations.push(numeric_station(3, &[1000.0], lenient()));
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();

    assert_eq!(report.numeric, baseline.numeric);
    assert_eq!(
        report.participation[&NodeId(3)],
        NodeParticipation {
            summary: NodeStatus::Excluded {
                reason: ExclusionReason::BelowMinimumRows {
                    rows: 1,
                    minimum_rows: 2,
                },
            },
            variance: NodeStatus::NotDispatched,
        }
    );
    assert!(!report.num_complete_rows_per_node.contains_key(&NodeId(3)));
}

#[test]
fn unique_counts_only_from_nodes_above_threshold() {
    let policy = PolicyConfig {
        privacy_threshold: 3,
        ..lenient()
    };
    let stations = vec![
        text_station(1, "site", &["a", "b", "c", "a"], policy.clone()),
        text_station(2, "site", &["a", "d"], policy),
    ];
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();

    let site = &report.categorical["site"];
    assert_eq!(site.count, Some(6));
    assert_eq!(site.missing, Some(0));
    assert_eq!(
        site.counts_unique_values,
        Some(BTreeMap::from([
            ("a".to_string(), 2),
            ("b".to_string(), 1),
            ("c".to_string(), 1),
        ]))
    );
}

#[test]
fn unique_counts_absent_when_every_node_is_below_threshold() {
    let policy = PolicyConfig {
        privacy_threshold: 10,
        ..lenient()
    };
    let stations = vec![text_station(1, "site", &["a", "b", "c"], policy)];
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();

    let site = &report.categorical["site"];
    assert_eq!(site.count, Some(3));
    assert_eq!(site.counts_unique_values, None);
}

#[test]
fn nodes_disagreeing_on_column_kind_fail_the_run() {
    let stations = vec![
        numeric_station(1, &[1.0, 2.0, 3.0], lenient()),
        text_station(2, "x", &["low", "high"], lenient()),
    ];
    let err = aggregator(stations).run(&SummaryTask::default()).unwrap_err();
    match err {
        SummaryError::ColumnTypeMismatch {
            column,
            first_node,
            first,
            node,
            kind,
        } => {
            assert_eq!(column, "x");
            assert_eq!((first_node, first), (NodeId(1), ColumnKind::Numeric));
            assert_eq!((node, kind), (NodeId(2), ColumnKind::Categorical));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn numeric_columns_hint_overrides_the_heuristic() {
    let stations = vec![
        text_station(1, "code", &["1", "2", "2"], lenient()),
        text_station(2, "code", &["3", "4"], lenient()),
    ];

    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();
    assert!(report.categorical.contains_key("code"));

    let stations = vec![
        text_station(1, "code", &["1", "2", "2"], lenient()),
        text_station(2, "code", &["3", "4"], lenient()),
    ];
    let task = SummaryTask::from_json(r#"{"columns": ["code"], "numeric_columns": ["code"]}"#).unwrap();
    let report = aggregator(stations).run(&task).unwrap();
    assert_eq!(report.numeric["code"].mean, Some(2.4));
}

fn csv_station(id: u64, text: &str, policy: PolicyConfig) -> DataStation {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
    DataStation::new(NodeId(id), ingest_csv_inferring_schema(&mut rdr).unwrap(), policy)
}

#[test]
fn all_empty_column_at_one_node_merges_under_the_observed_kind() {
    // node 2 infers "age" as text since it holds no value at all
    let stations = vec![
        csv_station(1, "age,site\n1,a\n2,a\n3,b\n", lenient()),
        csv_station(2, "age,site\n,b\n,c\n", lenient()),
    ];
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();

    let age = &report.numeric["age"];
    assert_eq!(age.count, Some(3));
    assert_eq!(age.missing, Some(2));
    assert_eq!(age.mean, Some(2.0));
    assert_eq!(age.std, Some((2.0f64 / 3.0).sqrt()));
    assert!(!report.categorical.contains_key("age"));

    let site = &report.categorical["site"];
    assert_eq!(site.count, Some(5));
    assert_eq!(site.missing, Some(0));
    assert_eq!(report.participation[&NodeId(2)].summary, NodeStatus::Contributed);
}

#[test]
fn infinite_values_never_reach_the_report() {
    let stations = vec![
        numeric_station(1, &[1.0, f64::INFINITY, 3.0], lenient()),
        csv_station(2, "x\n2.0\n-inf\n", lenient()),
    ];
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();

    let x = &report.numeric["x"];
    assert_eq!(x.count, Some(3));
    assert_eq!(x.missing, Some(2));
    assert_eq!(x.sum, Some(6.0));
    assert_eq!((x.min, x.max), (Some(1.0), Some(3.0)));
    assert_eq!(x.mean, Some(2.0));
    assert_eq!(x.std, Some((2.0f64 / 3.0).sqrt()));
}

#[test]
fn empty_organizations_list_selects_every_node() {
    let task = SummaryTask::from_json(r#"{"organizations_to_include": []}"#).unwrap();
    let report = aggregator(worked_example()).run(&task).unwrap();

    assert_eq!(report.numeric["x"].count, Some(5));
    assert_eq!(report.participation.len(), 2);
}

#[test]
fn column_minimum_rows_gate_is_opt_in() {
    let sparse = |enforce: bool| {
        let schema = Schema::new(vec![Field::new("x", DataType::Float64), Field::new("y", DataType::Float64)]);
        let rows = vec![
            vec![Value::Float64(1.0), Value::Float64(1.0)],
            vec![Value::Float64(2.0), Value::Null],
            vec![Value::Float64(3.0), Value::Null],
        ];
        let policy = PolicyConfig {
            minimum_rows: 2,
            enforce_column_minimum_rows: enforce,
            ..lenient()
        };
        DataStation::new(NodeId(1), DataSet::new(schema, rows), policy)
    };

    let report = aggregator(vec![sparse(false)]).run(&SummaryTask::default()).unwrap();
    assert_eq!(report.numeric["y"].count, Some(1));

    let report = aggregator(vec![sparse(true)]).run(&SummaryTask::default()).unwrap();
    assert!(!report.numeric.contains_key("y"));
    assert_eq!(report.numeric["x"].count, Some(3));
}

#[test]
fn organizations_filter_limits_the_run() {
    let task = SummaryTask {
        organizations_to_include: Some(vec![NodeId(2), NodeId(9)]),
        ..SummaryTask::default()
    };
    let report = aggregator(worked_example()).run(&task).unwrap();

    let x = &report.numeric["x"];
    assert_eq!(x.count, Some(2));
    assert_eq!(x.mean, Some(4.5));
    assert_eq!(x.std, Some(0.5));
    assert!(!report.participation.contains_key(&NodeId(1)));
    assert_eq!(report.participation[&NodeId(9)].summary, NodeStatus::Unreachable);
}

#[test]
fn no_contributing_node_is_an_error() {
    let stations = vec![numeric_station(1, &[1.0], lenient())];
    let err = aggregator(stations).run(&SummaryTask::default()).unwrap_err();
    assert!(matches!(err, SummaryError::NoParticipatingNodes));
}

#[test]
fn node_error_fails_the_run() {
    let task = SummaryTask {
        columns: Some(vec!["y".to_string()]),
        ..SummaryTask::default()
    };
    let err = aggregator(worked_example()).run(&task).unwrap_err();
    assert!(matches!(err, SummaryError::NodeFailed { node: NodeId(1), .. }));
}

#[test]
fn invalid_task_is_rejected_before_dispatch() {
    let task = SummaryTask {
        columns: Some(vec!["x".to_string()]),
        numeric_columns: Some(vec!["y".to_string()]),
        ..SummaryTask::default()
    };
    let agg = aggregator(worked_example());
    assert!(matches!(agg.run(&task), Err(SummaryError::InvalidTask { .. })));
    assert_eq!(agg.dispatcher().metrics().snapshot().phase_id, 0);
}

#[test]
fn variance_switch_withholds_only_that_node() {
    let policy_b = PolicyConfig {
        capabilities: StatCapabilities::all().with(StatisticKind::Variance, false),
        ..lenient()
    };
    let stations = vec![
        numeric_station(1, &[1.0, 2.0, 3.0], lenient()),
        numeric_station(2, &[4.0, 5.0], policy_b.clone()),
    ];
    let report = aggregator(stations).run(&SummaryTask::default()).unwrap();
    assert_eq!(report.numeric["x"].std, Some((5.0f64 / 3.0).sqrt()));

    let stations = vec![
        numeric_station(1, &[1.0, 2.0, 3.0], lenient()),
        numeric_station(2, &[4.0, 5.0], policy_b),
    ];
    let strict = aggregator(stations).with_options(AggregatorOptions {
        require_all_variance: true,
    });
    let report = strict.run(&SummaryTask::default()).unwrap();
    assert_eq!(report.numeric["x"].std, None);
    assert_eq!(report.numeric["x"].mean, Some(3.0));
}

#[test]
fn policy_change_between_runs_takes_effect() {
    let mut agg = aggregator(worked_example());
    let first = agg.run(&SummaryTask::default()).unwrap();
    assert_eq!(first.numeric["x"].count, Some(5));

    agg.dispatcher_mut()
        .station_mut(NodeId(2))
        .unwrap()
        .set_policy(PolicyConfig {
            minimum_rows: 3,
            ..lenient()
        });
    let second = agg.run(&SummaryTask::default()).unwrap();
    assert_eq!(second.numeric["x"].count, Some(3));
    assert_eq!(second.numeric["x"].mean, Some(2.0));
}

/// Drops one node's answer in the variance phase, as if it went offline between the phases.
struct DropsOutInPhaseTwo {
    inner: InProcessDispatcher,
    drop: NodeId,
}

impl NodeDispatcher for DropsOutInPhaseTwo {
    fn nodes(&self) -> Vec<NodeId> {
        self.inner.nodes()
    }

    fn dispatch_summary(&self, nodes: &[NodeId], request: &SummaryRequest) -> Vec<NodeOutcome<LocalStatBundle>> {
        self.inner.dispatch_summary(nodes, request)
    }

    fn dispatch_variance(
        &self,
        nodes: &[NodeId],
        request: &VarianceRequest,
    ) -> Vec<NodeOutcome<LocalVarianceBundle>> {
        let mut outcomes = self.inner.dispatch_variance(nodes, request);
        outcomes.retain(|o| o.node != self.drop);
        outcomes
    }
}

#[test]
fn node_lost_between_phases_keeps_variance_consistent() {
    let dispatcher = DropsOutInPhaseTwo {
        inner: InProcessDispatcher::new(worked_example(), DispatchOptions::default()),
        drop: NodeId(2),
    };
    let report = CentralAggregator::new(dispatcher).run(&SummaryTask::default()).unwrap();

    let x = &report.numeric["x"];
    assert_eq!(x.mean, Some(3.0));
    assert_eq!(x.std, Some((5.0f64 / 3.0).sqrt()));
    assert_eq!(report.participation[&NodeId(2)].summary, NodeStatus::Contributed);
    assert_eq!(report.participation[&NodeId(2)].variance, NodeStatus::Unreachable);
}

#[test]
fn task_and_report_travel_as_json() {
    let task = SummaryTask::from_json(r#"{"columns": ["x"], "organizations_to_include": [1, 2]}"#).unwrap();
    let report = aggregator(worked_example()).run(&task).unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["numeric"]["x"]["count"], 5);
    assert_eq!(json["numeric"]["x"]["mean"], 3.0);
    assert_eq!(json["num_complete_rows_per_node"]["1"], 3);
    assert_eq!(json["participation"]["2"]["variance"]["status"], "contributed");
}

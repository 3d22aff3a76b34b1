use std::path::PathBuf;
use std::time::Duration;

use peersync_core::models::{NodeRole, WatermarkPolicy};
use peersync_core::sync::{CyclePhase, CycleStatus, SyncReport};
use peersync_core::{NodeConfig, Record, TableKind, Timestamp};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::cli::NodeCommands;
use crate::commands::common::{
    format_relative_time, parse_field_assignments, record_preview, resolve_paths_with,
    retention_cutoff, NodePaths,
};
use crate::commands::node::{format_node_lines, run_node};
use crate::commands::record::{run_create, run_delete, run_purge, run_update};
use crate::commands::sync::{format_report_lines, run_local_cycle};
use crate::error::CliError;

fn temp_paths() -> (TempDir, NodePaths) {
    let dir = TempDir::new().unwrap();
    let paths = NodePaths {
        db_path: dir.path().join("peersync.db"),
        config_path: dir.path().join("node_config.json"),
    };
    (dir, paths)
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[test]
fn flags_override_env_which_overrides_data_dir() {
    let lookup = |name: &str| match name {
        "PEERSYNC_DATA_DIR" => Some(PathBuf::from("/env/data")),
        "PEERSYNC_NODE_CONFIG" => Some(PathBuf::from("/env/node.json")),
        _ => None,
    };

    let paths = resolve_paths_with(None, None, None, lookup);
    assert_eq!(paths.db_path, PathBuf::from("/env/data/peersync.db"));
    assert_eq!(paths.config_path, PathBuf::from("/env/node.json"));

    let paths = resolve_paths_with(
        Some(PathBuf::from("/flag/data")),
        Some(PathBuf::from("/flag/db.sqlite")),
        None,
        lookup,
    );
    assert_eq!(paths.db_path, PathBuf::from("/flag/db.sqlite"));
    assert_eq!(paths.config_path, PathBuf::from("/env/node.json"));
}

#[test]
fn field_assignments_follow_column_types() {
    let fields = parse_field_assignments(
        TableKind::Student,
        &args(&["name=Ama Mensah", "age=20", "index_number=0244", "contact="]),
    )
    .unwrap();
    assert_eq!(fields["name"], json!("Ama Mensah"));
    assert_eq!(fields["age"], json!(20));
    assert_eq!(fields["index_number"], json!("0244"));
    assert_eq!(fields["contact"], Value::Null);
}

#[test]
fn field_assignments_reject_bad_input() {
    assert!(matches!(
        parse_field_assignments(TableKind::Student, &args(&["nickname=Ama"])),
        Err(CliError::InvalidField(_))
    ));
    assert!(matches!(
        parse_field_assignments(TableKind::Student, &args(&["age=twenty"])),
        Err(CliError::InvalidField(_))
    ));
    assert!(matches!(
        parse_field_assignments(TableKind::Student, &args(&["name"])),
        Err(CliError::InvalidField(_))
    ));
}

#[test]
fn record_preview_collapses_and_truncates() {
    let record = Record::new(TableKind::Student, "NODE_A")
        .with_field("name", "Ama   Mensah")
        .with_field("age", 20);
    assert_eq!(record_preview(TableKind::Student, &record, 80), "Ama Mensah, age=20");
    assert_eq!(record_preview(TableKind::Student, &record, 8), "Ama M...");
}

#[test]
fn relative_time_formats_expected_buckets() {
    let now = Timestamp::from_millis(10_000_000_000);
    let ago = |millis: i64| Timestamp::from_millis(now.as_millis() - millis);
    assert_eq!(format_relative_time(ago(30_000), now), "just now");
    assert_eq!(format_relative_time(ago(5 * 60_000), now), "5m ago");
    assert_eq!(format_relative_time(ago(3 * 3_600_000), now), "3h ago");
    assert_eq!(format_relative_time(ago(2 * 86_400_000), now), "2d ago");
}

#[test]
fn retention_cutoff_counts_back_whole_days() {
    let now = Timestamp::from_millis(5 * 86_400_000);
    assert_eq!(
        retention_cutoff(2, now),
        Timestamp::from_millis(3 * 86_400_000)
    );
    assert_eq!(retention_cutoff(0, now), now);
}

#[test]
fn report_lines_show_counts_only_for_completed_cycles() {
    let report = SyncReport {
        status: CycleStatus::Completed,
        phase: CyclePhase::Done,
        peer: Some("10.0.0.2:5000".to_string()),
        message: "Sync with 10.0.0.2:5000 completed".to_string(),
        count: 3,
        applied: 2,
        pushed: 1,
        errors: vec!["Error processing Ghost: unknown table".to_string()],
    };
    assert_eq!(
        format_report_lines(&report),
        vec![
            "Sync with 10.0.0.2:5000 completed".to_string(),
            "received 3, applied 2, pushed 1".to_string(),
            "  error: Error processing Ghost: unknown table".to_string(),
        ]
    );

    let offline = SyncReport {
        status: CycleStatus::Offline,
        errors: Vec::new(),
        ..report
    };
    assert_eq!(format_report_lines(&offline).len(), 1);
}

#[test]
fn node_lines_show_push_watermark_only_for_split_policy() {
    let mut config = NodeConfig {
        peer_address: "10.0.0.2:5000".to_string(),
        ..NodeConfig::default()
    };
    let lines = format_node_lines(&config);
    assert!(lines.iter().any(|line| line == "last pull    never"));
    assert!(!lines.iter().any(|line| line.starts_with("last push")));

    config.watermark_policy = WatermarkPolicy::Split;
    assert!(format_node_lines(&config)
        .iter()
        .any(|line| line == "last push    never"));
}

#[test]
fn node_commands_update_identity_file() {
    let (_dir, paths) = temp_paths();

    run_node(
        NodeCommands::SetPeer {
            address: " 10.0.0.2:5000 ".to_string(),
        },
        &paths,
    )
    .unwrap();
    run_node(
        NodeCommands::SetRole {
            role: NodeRole::Counsellor,
        },
        &paths,
    )
    .unwrap();
    run_node(NodeCommands::Disable, &paths).unwrap();
    run_node(
        NodeCommands::Policy {
            policy: WatermarkPolicy::Split,
        },
        &paths,
    )
    .unwrap();

    let config = paths.identity().load().unwrap();
    assert_eq!(config.peer_address, "10.0.0.2:5000");
    assert_eq!(config.node_role, NodeRole::Counsellor);
    assert!(!config.sync_enabled);
    assert_eq!(config.watermark_policy, WatermarkPolicy::Split);

    assert!(matches!(
        run_node(NodeCommands::Interval { seconds: 0 }, &paths),
        Err(CliError::Config(_))
    ));
    assert!(matches!(
        run_node(
            NodeCommands::SetPeer {
                address: "  ".to_string()
            },
            &paths
        ),
        Err(CliError::Config(_))
    ));
}

#[test]
fn reset_watermarks_requires_a_peer() {
    let (_dir, paths) = temp_paths();
    assert!(matches!(
        run_node(NodeCommands::ResetWatermarks, &paths),
        Err(CliError::Config(_))
    ));

    paths
        .identity()
        .update(|config| {
            config.peer_address = "10.0.0.2:5000".to_string();
            config.set_watermark("10.0.0.2:5000", Timestamp::from_millis(1_000));
        })
        .unwrap();
    run_node(NodeCommands::ResetWatermarks, &paths).unwrap();
    assert_eq!(
        paths.identity().load().unwrap().watermark("10.0.0.2:5000"),
        Timestamp::EPOCH
    );
}

#[tokio::test]
async fn record_commands_create_update_and_tombstone() {
    let (_dir, paths) = temp_paths();
    let node_id = paths.identity().load().unwrap().node_id;

    let global_id = run_create("student", &args(&["name=Ama", "age=20"]), &paths)
        .await
        .unwrap();
    run_update("Student", &global_id, &args(&["name=Ama K."]), &paths)
        .await
        .unwrap();

    let store = paths.open_store().await.unwrap();
    let record = store
        .get_record(TableKind::Student, &global_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.field("name"), Some(&json!("Ama K.")));
    assert_eq!(record.field("age"), Some(&json!(20)));
    assert_eq!(record.last_modified_by.as_deref(), Some(node_id.as_str()));
    drop(store);

    run_delete("Student", &global_id, &paths).await.unwrap();
    assert!(matches!(
        run_update("Student", "missing", &args(&["name=X"]), &paths).await,
        Err(CliError::RecordNotFound(_))
    ));
    assert!(matches!(
        run_delete("Student", "  ", &paths).await,
        Err(CliError::EmptyRecordId)
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(run_purge(0, &paths).await.unwrap(), 1);
}

#[tokio::test]
async fn create_requires_the_required_columns() {
    let (_dir, paths) = temp_paths();
    let result = run_create("Student", &args(&["age=20"]), &paths).await;
    assert!(matches!(result, Err(CliError::Core(_))));

    let result = run_create("Ghost", &args(&["name=Ama"]), &paths).await;
    assert!(matches!(result, Err(CliError::Core(_))));
}

#[tokio::test]
async fn local_cycle_without_peer_is_skipped() {
    let (_dir, paths) = temp_paths();
    let report = run_local_cycle(&paths, Duration::from_millis(200), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(report.status, CycleStatus::Skipped);
}

#[tokio::test]
async fn local_cycle_with_unreachable_peer_is_offline() {
    let (_dir, paths) = temp_paths();
    paths
        .identity()
        .update(|config| config.peer_address = "127.0.0.1:1".to_string())
        .unwrap();
    let report = run_local_cycle(&paths, Duration::from_millis(500), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(report.status, CycleStatus::Offline);
}

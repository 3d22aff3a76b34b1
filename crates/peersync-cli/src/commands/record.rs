use peersync_core::{TableKind, Timestamp};

use crate::cli::RecordCommands;
use crate::commands::common::{
    format_record_lines, normalize_record_id, parse_field_assignments, parse_table,
    record_to_list_item, require_record, retention_cutoff, NodePaths, RecordListItem,
};
use crate::error::CliError;

pub async fn run_record(command: RecordCommands, paths: &NodePaths) -> Result<(), CliError> {
    match command {
        RecordCommands::Tables => {
            for line in format_table_lines() {
                println!("{line}");
            }
            Ok(())
        }
        RecordCommands::Create { table, fields } => {
            run_create(&table, &fields, paths).await.map(|global_id| {
                println!("{global_id}");
            })
        }
        RecordCommands::Update {
            table,
            global_id,
            fields,
        } => run_update(&table, &global_id, &fields, paths).await,
        RecordCommands::Delete { table, global_id } => {
            run_delete(&table, &global_id, paths).await
        }
        RecordCommands::Show { table, global_id } => {
            let table = parse_table(&table)?;
            let global_id = normalize_record_id(&global_id)?;
            let store = paths.open_store().await?;
            let record = require_record(&store, table, &global_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        RecordCommands::List {
            table,
            limit,
            deleted,
            json,
        } => run_list(&table, limit, deleted, json, paths).await,
        RecordCommands::Purge { older_than_days } => {
            let purged = run_purge(older_than_days, paths).await?;
            println!("Purged {purged} tombstone(s)");
            Ok(())
        }
    }
}

pub async fn run_create(
    table: &str,
    assignments: &[String],
    paths: &NodePaths,
) -> Result<String, CliError> {
    let table = parse_table(table)?;
    let fields = parse_field_assignments(table, assignments)?;
    let node_id = paths.identity().load()?.node_id;
    let store = paths.open_store().await?;

    let record = store.create_record(table, fields, &node_id).await?;
    let global_id = record.global_id().unwrap_or_default().to_string();
    tracing::debug!(table = %table, global_id = %global_id, "Record created");
    Ok(global_id)
}

pub async fn run_update(
    table: &str,
    global_id: &str,
    assignments: &[String],
    paths: &NodePaths,
) -> Result<(), CliError> {
    let table = parse_table(table)?;
    let global_id = normalize_record_id(global_id)?;
    let fields = parse_field_assignments(table, assignments)?;
    let node_id = paths.identity().load()?.node_id;
    let store = paths.open_store().await?;

    require_record(&store, table, &global_id).await?;
    store
        .update_record(table, &global_id, fields, &node_id)
        .await?;
    println!("{global_id}");
    Ok(())
}

pub async fn run_delete(table: &str, global_id: &str, paths: &NodePaths) -> Result<(), CliError> {
    let table = parse_table(table)?;
    let global_id = normalize_record_id(global_id)?;
    let node_id = paths.identity().load()?.node_id;
    let store = paths.open_store().await?;

    require_record(&store, table, &global_id).await?;
    store.delete_record(table, &global_id, &node_id).await?;
    println!("{global_id}");
    Ok(())
}

pub async fn run_list(
    table: &str,
    limit: usize,
    include_deleted: bool,
    as_json: bool,
    paths: &NodePaths,
) -> Result<(), CliError> {
    let table = parse_table(table)?;
    let store = paths.open_store().await?;
    let records = store.list_records(table, include_deleted, limit).await?;

    if as_json {
        let json_items = records
            .iter()
            .map(|record| record_to_list_item(table, record))
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_record_lines(table, &records) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_purge(older_than_days: u32, paths: &NodePaths) -> Result<usize, CliError> {
    let store = paths.open_store().await?;
    let cutoff = retention_cutoff(older_than_days, Timestamp::now());
    Ok(store.purge_tombstones(cutoff).await?)
}

fn format_table_lines() -> Vec<String> {
    TableKind::ALL
        .iter()
        .map(|table| {
            let columns = table
                .columns()
                .iter()
                .map(|column| {
                    let required = if column.required { "!" } else { "" };
                    format!("{}:{}{required}", column.name, column.kind)
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!("{:<22}  {columns}", table.table_name())
        })
        .collect()
}

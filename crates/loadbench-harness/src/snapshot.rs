//! Ephemeral snapshot keyspaces.
//!
//! A snapshot is a fresh keyspace holding the schema of the base keyspace and
//! a full copy of every non-counter table. Counter columns cannot be written
//! by insertion, so counter tables start empty in the snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use loadbench_core::{CoreError, CoreResult, StoreSession};

const SNAPSHOT_INFIX: &str = "_run_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name for a snapshot of `base` taken now: `{base}_run_YYYYmmdd_HHMMSS`.
pub fn snapshot_name(base: &str) -> String {
    snapshot_name_at(base, Local::now())
}

pub fn snapshot_name_at(base: &str, at: DateTime<Local>) -> String {
    format!("{base}{SNAPSHOT_INFIX}{}", at.format(TIMESTAMP_FORMAT))
}

/// Whether `keyspace` looks like a snapshot of `base`.
pub fn is_snapshot_of(base: &str, keyspace: &str) -> bool {
    let Some(stamp) = keyspace
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(SNAPSHOT_INFIX))
    else {
        return false;
    };
    stamp.len() == 15
        && stamp
            .char_indices()
            .all(|(i, c)| if i == 8 { c == '_' } else { c.is_ascii_digit() })
}

/// Split a CQL schema file into the statements a snapshot replays.
///
/// Comment lines are dropped. `USE`, `CREATE KEYSPACE` and `DROP KEYSPACE`
/// statements are skipped since the snapshot provides its own keyspace.
pub fn split_schema_statements(schema: &str) -> Vec<String> {
    schema
        .split(';')
        .filter_map(|raw| {
            let statement = raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with("//"))
                .collect::<Vec<_>>()
                .join(" ");
            let upper = statement.to_ascii_uppercase();
            let skipped = statement.is_empty()
                || upper.starts_with("USE ")
                || upper.starts_with("CREATE KEYSPACE")
                || upper.starts_with("DROP KEYSPACE");
            (!skipped).then_some(statement)
        })
        .collect()
}

/// What a successful snapshot contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub keyspace: String,
    pub statements_applied: usize,
    /// Rows copied per table.
    pub copied: BTreeMap<String, usize>,
    pub skipped_counter_tables: Vec<String>,
}

impl SnapshotReport {
    pub fn total_rows(&self) -> usize {
        self.copied.values().sum()
    }
}

/// Build `target` as a snapshot of `source`.
///
/// The target must not exist yet. If any step fails the partially built
/// keyspace is dropped and a [`CoreError::Snapshot`] is returned, so a
/// half-built snapshot is never left behind as a benchmark target.
pub async fn snapshot_keyspace(
    session: &dyn StoreSession,
    source: &str,
    target: &str,
    schema: &str,
    replication_factor: u32,
) -> CoreResult<SnapshotReport> {
    if source == target {
        return Err(CoreError::snapshot(
            target,
            "snapshot keyspace must differ from the source keyspace",
        ));
    }

    let existing = session
        .list_keyspaces()
        .await
        .map_err(|e| CoreError::snapshot(target, e.to_string()))?;
    if !existing.iter().any(|k| k == source) {
        return Err(CoreError::snapshot(
            target,
            format!("source keyspace `{source}` does not exist"),
        ));
    }
    if existing.iter().any(|k| k == target) {
        return Err(CoreError::snapshot(target, "keyspace already exists"));
    }

    session
        .create_keyspace(target, replication_factor)
        .await
        .map_err(|e| CoreError::snapshot(target, e.to_string()))?;
    tracing::info!(keyspace = target, replication_factor, "Created snapshot keyspace");

    match populate(session, source, target, schema).await {
        Ok(report) => {
            tracing::info!(
                keyspace = target,
                tables = report.copied.len(),
                rows = report.total_rows(),
                "Snapshot keyspace is ready for benchmarking"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!(keyspace = target, error = %e, "Snapshot failed, dropping partial keyspace");
            if let Err(drop_err) = session.drop_keyspace(target).await {
                tracing::warn!(keyspace = target, error = %drop_err, "Could not drop partial snapshot");
            }
            Err(CoreError::snapshot(target, e.to_string()))
        }
    }
}

async fn populate(
    session: &dyn StoreSession,
    source: &str,
    target: &str,
    schema: &str,
) -> CoreResult<SnapshotReport> {
    let mut report = SnapshotReport {
        keyspace: target.to_string(),
        ..Default::default()
    };

    for statement in split_schema_statements(schema) {
        session.execute_schema(target, &statement).await?;
        report.statements_applied += 1;
    }
    tracing::info!(
        keyspace = target,
        statements = report.statements_applied,
        "Schema created in snapshot keyspace"
    );

    for table in session.list_tables(source).await? {
        if table.is_counter_table() {
            tracing::info!(table = %table.name, "Skipping counter table (counter columns not copyable)");
            report.skipped_counter_tables.push(table.name);
            continue;
        }

        let rows = session.read_rows(source, &table.name).await?;
        let copied = session.write_rows(target, &table.name, rows).await?;
        tracing::info!(
            rows = copied,
            from = %format!("{source}.{}", table.name),
            to = %format!("{target}.{}", table.name),
            "Copied table"
        );
        report.copied.insert(table.name, copied);
    }

    Ok(report)
}

/// Drop a snapshot keyspace. Missing keyspaces are not an error.
pub async fn drop_snapshot_keyspace(session: &dyn StoreSession, keyspace: &str) -> CoreResult<()> {
    session.drop_keyspace(keyspace).await?;
    tracing::info!(keyspace, "Dropped snapshot keyspace");
    Ok(())
}

/// Drop every leftover snapshot of `base`, returning the dropped names.
pub async fn cleanup_stale_snapshots(
    session: &dyn StoreSession,
    base: &str,
) -> CoreResult<Vec<String>> {
    let stale: Vec<String> = session
        .list_keyspaces()
        .await?
        .into_iter()
        .filter(|k| is_snapshot_of(base, k))
        .collect();

    for keyspace in &stale {
        drop_snapshot_keyspace(session, keyspace).await?;
    }
    if stale.is_empty() {
        tracing::info!(base, "No stale snapshot keyspaces found");
    }
    Ok(stale)
}

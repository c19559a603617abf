//! Minimal CQL schema parsing for the in-memory store.
//!
//! Only `CREATE TABLE` statements produce tables. Index, type and other DDL
//! statements are accepted and ignored.

use loadbench_core::{ColumnSchema, CoreError, CoreResult, TableSchema};

/// Parsed form of one schema statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatement {
    CreateTable(TableSchema),
    Ignored,
}

/// Parse a single statement (without trailing `;`).
pub fn parse_statement(statement: &str) -> CoreResult<SchemaStatement> {
    let normalized = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = normalized.to_ascii_uppercase();

    if !upper.starts_with("CREATE TABLE") {
        return Ok(SchemaStatement::Ignored);
    }

    let open = normalized
        .find('(')
        .ok_or_else(|| invalid(&normalized, "missing column list"))?;
    let close = matching_paren(&normalized, open)
        .ok_or_else(|| invalid(&normalized, "unbalanced parentheses"))?;

    let mut head = normalized["CREATE TABLE".len()..open].trim().to_string();
    if head.to_ascii_uppercase().starts_with("IF NOT EXISTS") {
        head = head["IF NOT EXISTS".len()..].trim().to_string();
    }
    let name = head
        .rsplit('.')
        .next()
        .map(|n| n.trim().to_ascii_lowercase())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid(&normalized, "missing table name"))?;

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();

    for item in split_top_level(&normalized[open + 1..close]) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if item.to_ascii_uppercase().starts_with("PRIMARY KEY") {
            primary_key = item["PRIMARY KEY".len()..]
                .split(|c: char| c == '(' || c == ')' || c == ',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            continue;
        }

        let mut parts = item.splitn(2, ' ');
        let column = parts
            .next()
            .map(|c| c.trim().to_ascii_lowercase())
            .ok_or_else(|| invalid(&normalized, "empty column definition"))?;
        let rest = parts
            .next()
            .ok_or_else(|| invalid(&normalized, "column without type"))?
            .trim();

        let rest_upper = rest.to_ascii_uppercase();
        let mut data_type = rest.to_string();
        if let Some(pos) = rest_upper.find(" PRIMARY KEY") {
            data_type = rest[..pos].to_string();
            primary_key = vec![column.clone()];
        }
        if let Some(pos) = data_type.to_ascii_uppercase().find(" STATIC") {
            data_type.truncate(pos);
        }

        columns.push(ColumnSchema::new(column, data_type.trim()));
    }

    if primary_key.is_empty() {
        return Err(invalid(&normalized, "missing PRIMARY KEY"));
    }
    for key in &primary_key {
        if !columns.iter().any(|c| &c.name == key) {
            return Err(invalid(
                &normalized,
                &format!("primary key column `{key}` is not defined"),
            ));
        }
    }

    Ok(SchemaStatement::CreateTable(TableSchema {
        name,
        columns,
        primary_key,
    }))
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested in `()` or `<>`.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' | '<' => depth += 1,
            ')' | '>' => depth -= 1,
            ',' if depth == 0 => {
                items.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&body[start..]);
    items
}

fn invalid(statement: &str, reason: &str) -> CoreError {
    let preview: String = statement.chars().take(80).collect();
    CoreError::Serialization(format!("invalid schema statement ({reason}): {preview}"))
}

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use crate::{
    engine::{Column, Engine, Row},
    error::{ClientError, Result},
};

const TYPE_TERMINATORS: [&str; 9] = [
    "DEFAULT",
    "MATERIALIZED",
    "ALIAS",
    "EPHEMERAL",
    "CODEC",
    "COMMENT",
    "TTL",
    "NOT",
    "NULL",
];

const NON_COLUMNS: [&str; 4] = ["INDEX", "PROJECTION", "CONSTRAINT", "PRIMARY"];

#[derive(Debug, Default)]
struct Table {
    columns: Vec<Column>,
    defaults: HashMap<String, String>,
    rows: Vec<Row>,
}

impl Table {
    fn add_column(&mut self, column: Column, default: Option<String>) {
        if let Some(default) = default {
            self.defaults.insert(column.name.to_owned(), default);
        }

        self.columns.push(column);
    }

    /// Fills the columns a row leaves out from their `DEFAULT` expression.
    fn complete(&self, mut row: Row) -> Result<Row> {
        for (column, expression) in self.defaults.iter() {
            if row.contains_key(column) {
                continue;
            }

            let value = evaluate(expression)
                .ok_or_else(|| ClientError::Unsupported(format!("DEFAULT {expression}")))?;

            row.insert(column.to_owned(), value);
        }

        Ok(row)
    }
}

#[derive(Debug, Default)]
struct Data {
    tables: HashMap<String, Table>,
    statements: Vec<String>,
}

/// In-process stand-in for an analytical database.
///
/// Understands `CREATE TABLE`, `DROP TABLE`, `ALTER TABLE .. ADD/DROP COLUMN`
/// and `SELECT <columns> FROM <table> [ORDER BY ..]`; anything else is
/// rejected with [`ClientError::Unsupported`]. Column `DEFAULT`s made of a
/// literal, `now()` or `now64()` are filled on insert. Every statement handed
/// to `execute` is recorded, accepted or not.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    data: Arc<RwLock<Data>>,
    replicated: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replication(mut self) -> Self {
        self.replicated = true;
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.data.read().statements.clone()
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables = self.data.read().tables.keys().cloned().collect::<Vec<_>>();
        tables.sort();
        tables
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.data
            .read()
            .tables
            .get(table)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    fn create_table(&self, statement: &str, words: &[&str]) -> Result<()> {
        let (if_not_exists, words) = strip_clause(words, &["IF", "NOT", "EXISTS"]);
        let name = table_name(words, statement)?;

        let columns = match statement.find('(') {
            Some(start) => {
                let end = matching_paren(statement, start)
                    .ok_or_else(|| ClientError::Unsupported(statement.to_owned()))?;
                parse_columns(&statement[start + 1..end])
            }
            None => Vec::new(),
        };

        let mut table = Table::default();
        for (column, default) in columns {
            table.add_column(column, default);
        }

        let mut data = self.data.write();

        if data.tables.contains_key(&name) {
            return if if_not_exists {
                Ok(())
            } else {
                Err(ClientError::TableExists(name))
            };
        }

        data.tables.insert(name, table);

        Ok(())
    }

    fn drop_table(&self, statement: &str, words: &[&str]) -> Result<()> {
        let (if_exists, words) = strip_clause(words, &["IF", "EXISTS"]);
        let name = table_name(words, statement)?;

        match self.data.write().tables.remove(&name) {
            Some(_) => Ok(()),
            None if if_exists => Ok(()),
            None => Err(ClientError::UnknownTable(name)),
        }
    }

    fn alter_table(&self, statement: &str, words: &[&str]) -> Result<()> {
        let name = table_name(words, statement)?;
        let unsupported = || ClientError::Unsupported(statement.to_owned());

        let mut data = self.data.write();
        let table = data
            .tables
            .get_mut(&name)
            .ok_or_else(|| ClientError::UnknownTable(name.to_owned()))?;

        match words.get(1..) {
            Some([action, column, rest @ ..])
                if is_keyword(action, "ADD") && is_keyword(column, "COLUMN") =>
            {
                let (if_not_exists, rest) = strip_clause(rest, &["IF", "NOT", "EXISTS"]);
                let definition = rest.join(" ");
                let (column, default) = parse_column(&definition).ok_or_else(unsupported)?;

                if table.columns.iter().any(|c| c.name == column.name) {
                    return if if_not_exists {
                        Ok(())
                    } else {
                        Err(unsupported())
                    };
                }

                table.add_column(column, default);
                Ok(())
            }
            Some([action, column, rest @ ..])
                if is_keyword(action, "DROP") && is_keyword(column, "COLUMN") =>
            {
                let (if_exists, rest) = strip_clause(rest, &["IF", "EXISTS"]);
                let column = rest.first().map(|c| ident(c)).ok_or_else(unsupported)?;
                let before = table.columns.len();
                table.columns.retain(|c| c.name != column);
                table.defaults.remove(&column);

                if table.columns.len() == before && !if_exists {
                    return Err(unsupported());
                }

                for row in table.rows.iter_mut() {
                    row.remove(&column);
                }

                Ok(())
            }
            _ => Err(unsupported()),
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn replicated(&self) -> bool {
        self.replicated
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        let statement = statement.trim().trim_end_matches(';').trim();
        self.data.write().statements.push(statement.to_owned());

        let words = statement.split_whitespace().collect::<Vec<_>>();

        match words.as_slice() {
            [verb, object, rest @ ..] if is_keyword(object, "TABLE") => {
                if is_keyword(verb, "CREATE") {
                    self.create_table(statement, rest)
                } else if is_keyword(verb, "DROP") {
                    self.drop_table(statement, rest)
                } else if is_keyword(verb, "ALTER") {
                    self.alter_table(statement, rest)
                } else {
                    Err(ClientError::Unsupported(statement.to_owned()))
                }
            }
            _ => Err(ClientError::Unsupported(statement.to_owned())),
        }
    }

    async fn select(&self, statement: &str) -> Result<Vec<Row>> {
        let unsupported = || ClientError::Unsupported(statement.to_owned());
        let lowercase = statement.to_ascii_lowercase();

        if !lowercase.trim_start().starts_with("select ") {
            return Err(unsupported());
        }

        let select_start = lowercase.find("select ").ok_or_else(unsupported)? + "select ".len();
        let from = lowercase
            .find(" from ")
            .filter(|from| *from >= select_start)
            .ok_or_else(unsupported)?;

        let columns = statement[select_start..from].trim();
        if columns.is_empty() {
            return Err(unsupported());
        }

        let source = statement[from + " from ".len()..]
            .trim()
            .trim_end_matches(';');
        let (source, order_by) = match source.to_ascii_lowercase().find(" order by ") {
            Some(idx) => (&source[..idx], Some(&source[idx + " order by ".len()..])),
            None => (source, None),
        };

        let name = source
            .split_whitespace()
            .next()
            .map(ident)
            .ok_or_else(unsupported)?;

        let order_by = match order_by {
            Some(keys) => parse_order_by(keys).ok_or_else(unsupported)?,
            None => Vec::new(),
        };

        let data = self.data.read();
        let table = data
            .tables
            .get(&name)
            .ok_or_else(|| ClientError::UnknownTable(name.to_owned()))?;

        let mut rows = table.rows.iter().collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            order_by.iter().fold(Ordering::Equal, |ordering, (column, descending)| {
                ordering.then_with(|| {
                    let ordering = compare_values(
                        a.get(column).unwrap_or(&Value::Null),
                        b.get(column).unwrap_or(&Value::Null),
                    );

                    if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
            })
        });

        if columns == "*" {
            return Ok(rows.into_iter().cloned().collect());
        }

        let columns = columns.split(',').map(ident).collect::<Vec<_>>();

        Ok(rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        let value = row.get(column).cloned().unwrap_or(Value::Null);
                        (column.to_owned(), value)
                    })
                    .collect::<Row>()
            })
            .collect())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let mut data = self.data.write();
        let table = data
            .tables
            .get_mut(table)
            .ok_or_else(|| ClientError::UnknownTable(table.to_owned()))?;

        let rows = rows
            .into_iter()
            .map(|row| table.complete(row))
            .collect::<Result<Vec<_>>>()?;

        table.rows.extend(rows);

        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.data.read().tables.contains_key(name))
    }

    async fn describe_table(&self, name: &str) -> Result<Vec<Column>> {
        self.data
            .read()
            .tables
            .get(name)
            .map(|table| table.columns.clone())
            .ok_or_else(|| ClientError::UnknownTable(name.to_owned()))
    }
}

fn is_keyword(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

/// Drops an optional leading clause such as `IF NOT EXISTS`.
fn strip_clause<'a, 'b>(words: &'a [&'b str], clause: &[&str]) -> (bool, &'a [&'b str]) {
    let present = words.len() >= clause.len()
        && words
            .iter()
            .zip(clause)
            .all(|(word, keyword)| is_keyword(word, keyword));

    if present {
        (true, &words[clause.len()..])
    } else {
        (false, words)
    }
}

/// Unquoted identifier without its database qualifier.
fn ident(raw: &str) -> String {
    let raw = raw.trim().trim_matches(|c| c == '`' || c == '"');
    raw.rsplit('.')
        .next()
        .unwrap_or(raw)
        .trim_matches(|c| c == '`' || c == '"')
        .to_owned()
}

fn table_name(words: &[&str], statement: &str) -> Result<String> {
    words
        .first()
        .and_then(|word| word.split('(').next())
        .filter(|name| !name.is_empty())
        .map(ident)
        .ok_or_else(|| ClientError::Unsupported(statement.to_owned()))
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;

    for (idx, c) in text.char_indices().skip_while(|(idx, _)| *idx < open) {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    None
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    parts.push(&text[start..]);
    parts
}

fn parse_columns(body: &str) -> Vec<(Column, Option<String>)> {
    split_top_level(body)
        .into_iter()
        .filter_map(parse_column)
        .collect()
}

fn is_terminator(word: &str) -> bool {
    TYPE_TERMINATORS.iter().any(|keyword| is_keyword(word, keyword))
}

/// Column and its `DEFAULT` expression, if any.
fn parse_column(definition: &str) -> Option<(Column, Option<String>)> {
    let definition = definition.trim();
    let (name, rest) = definition.split_once(char::is_whitespace)?;

    if NON_COLUMNS.iter().any(|keyword| is_keyword(name, keyword)) {
        return None;
    }

    let words = rest.split_whitespace().collect::<Vec<_>>();
    let mut data_type = String::new();
    let mut depth = 0i32;
    let mut consumed = 0;

    for word in words.iter() {
        if depth == 0 && !data_type.is_empty() && is_terminator(word) {
            break;
        }

        if !data_type.is_empty() {
            data_type.push(' ');
        }

        data_type.push_str(word);
        depth += word.matches('(').count() as i32 - word.matches(')').count() as i32;
        consumed += 1;
    }

    let modifiers = &words[consumed..];
    let default = modifiers
        .iter()
        .position(|word| is_keyword(word, "DEFAULT"))
        .map(|pos| {
            modifiers[pos + 1..]
                .iter()
                .take_while(|word| !is_terminator(word))
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|expression| !expression.is_empty());

    Some((
        Column {
            name: ident(name),
            data_type,
        },
        default,
    ))
}

/// Value of a constant or clock `DEFAULT` expression.
fn evaluate(expression: &str) -> Option<Value> {
    let expression = expression.trim();
    let function = expression.to_ascii_lowercase();

    if function.starts_with("now64(") {
        return Some(Value::String(
            Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ));
    }

    if function == "now()" {
        return Some(Value::String(
            Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ));
    }

    if let Some(literal) = expression
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Some(Value::String(literal.to_owned()));
    }

    serde_json::from_str::<serde_json::Number>(expression)
        .ok()
        .map(Value::Number)
}

/// `ORDER BY` keys as `(column, descending)`.
fn parse_order_by(keys: &str) -> Option<Vec<(String, bool)>> {
    keys.split(',')
        .map(|key| match key.split_whitespace().collect::<Vec<_>>().as_slice() {
            [column] => Some((ident(column), false)),
            [column, direction] if is_keyword(direction, "ASC") => Some((ident(column), false)),
            [column, direction] if is_keyword(direction, "DESC") => Some((ident(column), true)),
            _ => None,
        })
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .unwrap_or_default()
            .total_cmp(&b.as_f64().unwrap_or_default()),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

//! Header-mapped parsing of delimited text tables.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Field separator of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Comma-separated.
    #[default]
    Comma,
    /// Runs of spaces or tabs.
    Whitespace,
}

impl Delimiter {
    pub(crate) fn split(self, line: &str) -> Vec<&str> {
        match self {
            Delimiter::Comma => line.split(',').map(str::trim).collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

/// Column positions by name.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    pub(crate) fn parse(line: &str, delimiter: Delimiter) -> Self {
        let columns = delimiter
            .split(line.trim_start_matches('\u{feff}'))
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Self { columns }
    }

    pub(crate) fn require(&self, name: &'static str) -> Result<usize> {
        self.columns
            .get(name)
            .copied()
            .ok_or(Error::MissingColumn(name))
    }

    pub(crate) fn optional(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }
}

/// Parse field `index` of a row.
pub(crate) fn field<T: FromStr>(fields: &[&str], index: usize, line: usize, name: &str) -> Result<T> {
    let raw = fields
        .get(index)
        .ok_or_else(|| Error::format(line, format!("row has no '{name}' field")))?;
    raw.parse()
        .map_err(|_| Error::format(line, format!("cannot parse '{raw}' as {name}")))
}

/// Parse a 0/1 or true/false flag.
pub(crate) fn flag(fields: &[&str], index: usize, line: usize, name: &str) -> Result<bool> {
    match fields.get(index).copied() {
        Some("1" | "true" | "True") => Ok(true),
        Some("0" | "false" | "False") => Ok(false),
        Some(raw) => Err(Error::format(line, format!("cannot parse '{raw}' as {name}"))),
        None => Err(Error::format(line, format!("row has no '{name}' field"))),
    }
}

/// Non-empty, non-comment data lines with their 1-based line numbers.
pub(crate) fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

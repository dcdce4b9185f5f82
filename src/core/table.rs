// Typed table model: cells, columns, and the immutable dataset.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, Serializer};

use crate::core::error::{Error, ErrorKind};

// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Human rendering used by table output; nulls render as an empty string.
    pub fn display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Number(value) => match integral(*value) {
                Some(int) => int.to_string(),
                None => value.to_string(),
            },
            Cell::Text(value) => value.clone(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Number(value) => match integral(*value) {
                Some(int) => serializer.serialize_i64(int),
                None => serializer.serialize_f64(*value),
            },
            Cell::Text(value) => serializer.serialize_str(value),
        }
    }
}

fn integral(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INT {
        Some(value as i64)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub inferred_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, inferred_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            inferred_type,
        }
    }
}

pub type Row = Vec<Cell>;

/// A fully resident table. There are no mutators: once built, the columns,
/// rows, and cells stay exactly as constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Row>,
    source: Option<PathBuf>,
}

impl Dataset {
    /// Builds a dataset, rejecting duplicate column names and ragged rows.
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Result<Self, Error> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::new(ErrorKind::DuplicateColumn)
                    .with_message(format!("duplicate column name {:?}", column.name)));
            }
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::new(ErrorKind::MalformedRow)
                    .with_message(format!(
                        "expected {} fields, found {}",
                        columns.len(),
                        row.len()
                    ))
                    .with_row(index as u64 + 2));
            }
        }
        Ok(Self {
            columns,
            rows,
            source: None,
        })
    }

    pub(crate) fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Iterates the cells of one column in row order.
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

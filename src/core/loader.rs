// CSV ingestion: header parsing, per-column type inference, and cell normalization.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Cell, Column, ColumnType, Dataset, Row};

pub const DEFAULT_NULL_TOKENS: [&str; 5] = ["NA", "NaN", "null", "NULL", "<nil>"];

#[derive(Clone, Debug, PartialEq)]
pub struct LoadOptions {
    pub delimiter: u8,
    /// Fields equal to one of these (after optional trimming) load as nulls.
    /// Empty fields are always null.
    pub null_tokens: Vec<String>,
    /// Trim ASCII whitespace before null detection and numeric parsing.
    /// Text cells always keep the field exactly as written.
    pub trim: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            null_tokens: DEFAULT_NULL_TOKENS.iter().map(|token| token.to_string()).collect(),
            trim: true,
        }
    }
}

impl LoadOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn normalize<'a>(&self, field: &'a str) -> &'a str {
        if self.trim {
            field.trim_ascii()
        } else {
            field
        }
    }

    fn is_null(&self, field: &str) -> bool {
        let field = self.normalize(field);
        field.is_empty() || self.null_tokens.iter().any(|token| token == field)
    }

    fn parse_number(&self, field: &str) -> Option<f64> {
        self.normalize(field)
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }
}

/// Parses a user-supplied delimiter; it must be exactly one ASCII character.
pub fn parse_delimiter(value: &str) -> Result<u8, Error> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii() && ch != '"' && ch != '\n' && ch != '\r' => Ok(ch as u8),
        _ => Err(Error::new(ErrorKind::InvalidRequest)
            .with_message(format!("invalid delimiter {value:?}"))
            .with_hint("Use a single ASCII character such as ',' or ';'.")),
    }
}

pub fn load_path(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Dataset, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open csv source")
            .with_path(path)
            .with_source(err)
    })?;
    let dataset = load_reader(BufReader::new(file), options).map_err(|err| err.with_path(path))?;
    Ok(dataset.with_source(path))
}

/// Reads a full CSV source into a dataset. Nothing is returned unless every
/// record was read and matched the header width.
pub fn load_reader<R: Read>(source: R, options: &LoadOptions) -> Result<Dataset, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = reader.headers().map_err(csv_error)?.clone();
    let width = headers.len();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        if record.len() != width {
            let line = record.position().map(|pos| pos.line());
            let mut err = Error::new(ErrorKind::MalformedRow).with_message(format!(
                "expected {width} fields, found {}",
                record.len()
            ));
            if let Some(line) = line {
                err = err.with_row(line);
            }
            return Err(err);
        }
        records.push(record);
    }

    let types = (0..width)
        .map(|index| {
            let numeric = records.iter().all(|record| {
                let field = &record[index];
                options.is_null(field) || options.parse_number(field).is_some()
            });
            if numeric {
                ColumnType::Numeric
            } else {
                ColumnType::Categorical
            }
        })
        .collect::<Vec<_>>();

    let columns = headers
        .iter()
        .zip(&types)
        .map(|(name, inferred_type)| Column::new(name, *inferred_type))
        .collect::<Vec<_>>();

    let rows = records
        .iter()
        .map(|record| {
            record
                .iter()
                .zip(&types)
                .map(|(field, inferred_type)| to_cell(field, *inferred_type, options))
                .collect::<Row>()
        })
        .collect::<Vec<_>>();

    let dataset = Dataset::new(columns, rows)?;
    tracing::debug!(
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        "parsed csv"
    );
    Ok(dataset)
}

fn to_cell(field: &str, inferred_type: ColumnType, options: &LoadOptions) -> Cell {
    if options.is_null(field) {
        return Cell::Null;
    }
    match inferred_type {
        ColumnType::Numeric => match options.parse_number(field) {
            Some(value) => Cell::Number(value),
            None => Cell::Text(field.to_string()),
        },
        ColumnType::Categorical => Cell::Text(field.to_string()),
    }
}

fn csv_error(err: csv::Error) -> Error {
    let line = err.position().map(|pos| pos.line());
    let (kind, message) = match err.kind() {
        csv::ErrorKind::Io(_) => (ErrorKind::Io, "failed to read csv source"),
        csv::ErrorKind::UnequalLengths { .. } => (ErrorKind::MalformedRow, "row width mismatch"),
        csv::ErrorKind::Utf8 { .. } => (ErrorKind::Syntax, "csv source is not valid utf-8"),
        _ => (ErrorKind::Syntax, "invalid csv syntax"),
    };
    let mut out = Error::new(kind).with_message(message);
    if let Some(line) = line {
        out = out.with_row(line);
    }
    out.with_source(err)
}

#[cfg(test)]
mod tests {
    use super::{LoadOptions, load_path, load_reader, parse_delimiter};
    use crate::core::error::ErrorKind;
    use crate::core::table::{Cell, ColumnType};

    fn load(text: &str) -> crate::core::table::Dataset {
        load_reader(text.as_bytes(), &LoadOptions::default()).expect("load")
    }

    #[test]
    fn loads_mixed_columns() {
        let dataset = load("name,age\nAlice,30\nBob,\nCarol,25\n");
        assert_eq!(dataset.column_names(), vec!["name", "age"]);
        assert_eq!(dataset.columns()[0].inferred_type, ColumnType::Categorical);
        assert_eq!(dataset.columns()[1].inferred_type, ColumnType::Numeric);
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(
            dataset.rows()[1],
            vec![Cell::Text("Bob".to_string()), Cell::Null]
        );
        assert_eq!(dataset.rows()[2][1], Cell::Number(25.0));
    }

    #[test]
    fn one_text_cell_flips_column_to_categorical() {
        let numeric = load("v\n1\n2\n3\n");
        assert_eq!(numeric.columns()[0].inferred_type, ColumnType::Numeric);

        let mixed = load("v\n1\ntwo\n3\n");
        assert_eq!(mixed.columns()[0].inferred_type, ColumnType::Categorical);
        assert_eq!(mixed.rows()[0][0], Cell::Text("1".to_string()));
        assert_eq!(mixed.rows()[1][0], Cell::Text("two".to_string()));
    }

    #[test]
    fn header_only_source_has_columns_and_no_rows() {
        let dataset = load("a,b,c\n");
        assert_eq!(dataset.column_count(), 3);
        assert_eq!(dataset.row_count(), 0);
        assert!(
            dataset
                .columns()
                .iter()
                .all(|column| column.inferred_type == ColumnType::Numeric)
        );
    }

    #[test]
    fn empty_source_is_an_empty_dataset() {
        let dataset = load("");
        assert_eq!(dataset.column_count(), 0);
        assert_eq!(dataset.row_count(), 0);
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let err = load_reader("a,b,a\n1,2,3\n".as_bytes(), &LoadOptions::default())
            .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::DuplicateColumn);
    }

    #[test]
    fn short_row_is_malformed_with_line() {
        let err = load_reader("a,b\n1,2\n3\n".as_bytes(), &LoadOptions::default())
            .expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::MalformedRow);
        assert_eq!(err.row(), Some(3));
    }

    #[test]
    fn invalid_utf8_is_a_syntax_error() {
        let bytes: &[u8] = b"a,b\n1,\xff\xfe\n";
        let err = load_reader(bytes, &LoadOptions::default()).expect_err("utf8");
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn null_tokens_and_whitespace_are_null() {
        let dataset = load("x,y\nNA, 1 \n  ,2\nnull,3\n");
        assert_eq!(dataset.columns()[0].inferred_type, ColumnType::Numeric);
        assert!(dataset.column_cells(0).all(Cell::is_null));
        assert_eq!(dataset.rows()[0][1], Cell::Number(1.0));
    }

    #[test]
    fn non_finite_spellings_are_text() {
        let dataset = load("x\n1\ninf\n");
        assert_eq!(dataset.columns()[0].inferred_type, ColumnType::Categorical);
    }

    #[test]
    fn text_cells_keep_original_spacing() {
        let dataset = load("x\n  padded \n");
        assert_eq!(dataset.rows()[0][0], Cell::Text("  padded ".to_string()));
    }

    #[test]
    fn custom_delimiter_is_honored() {
        let options = LoadOptions::default().with_delimiter(b';');
        let dataset = load_reader("a;b\n1,5;x\n".as_bytes(), &options).expect("load");
        assert_eq!(dataset.column_names(), vec!["a", "b"]);
        assert_eq!(dataset.rows()[0][0], Cell::Text("1,5".to_string()));
    }

    #[test]
    fn quoted_fields_may_contain_delimiters() {
        let dataset = load("name,city\n\"Doe, Jane\",Paris\n");
        assert_eq!(dataset.rows()[0][0], Cell::Text("Doe, Jane".to_string()));
    }

    #[test]
    fn parse_delimiter_requires_one_ascii_char() {
        assert_eq!(parse_delimiter(";").expect("semicolon"), b';');
        assert_eq!(parse_delimiter("\t").expect("tab"), b'\t');
        for bad in ["", ";;", "é", "\""] {
            let err = parse_delimiter(bad).expect_err("bad delimiter");
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
    }

    #[test]
    fn load_path_records_source_and_reports_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("people.csv");
        std::fs::write(&path, "name,age\nAlice,30\n").expect("write");
        let dataset = load_path(&path, &LoadOptions::default()).expect("load");
        assert_eq!(dataset.source(), Some(path.as_path()));

        let missing = temp.path().join("missing.csv");
        let err = load_path(&missing, &LoadOptions::default()).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.path(), Some(missing.as_path()));
    }
}

//! Purpose: `tabserve` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON or tables on stdout.
//! Invariants: Non-interactive output is JSON; tables are only drawn for terminals.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap::error::ErrorKind as ClapErrorKind;
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;

use tabserve::api::{
    Cell, ColumnStats, ColumnSummary, Dataset, Error, ErrorKind, LoadOptions, Page,
    parse_delimiter, to_exit_code,
};

const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::InvalidRequest)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `tabserve --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "tabserve",
    version,
    about = "Load a CSV file into memory and serve pages and summaries of it",
    long_about = None,
    after_help = r#"EXAMPLES
  $ tabserve inspect people.csv --limit 20
  $ tabserve describe people.csv
  $ tabserve serve --bind 127.0.0.1:8080 --load people.csv
  $ tabserve remote --url http://127.0.0.1:8080 page --start 100 --limit 50"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "auto",
        help = "Colorize labels: auto|always|never"
    )]
    color: ColorMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Serve one in-memory dataset over HTTP (loopback by default)")]
    Serve(ServeArgs),
    #[command(about = "Load a CSV file locally and print a page of rows")]
    Inspect {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, allow_negative_numbers = true, help = "First row to show (default 0)")]
        start: Option<i64>,
        #[arg(
            long,
            allow_negative_numbers = true,
            help = "Rows to show (default 100, max 1000)"
        )]
        limit: Option<i64>,
        #[arg(long, help = "Field delimiter (single ASCII character)")]
        delimiter: Option<String>,
        #[arg(long, help = "Emit JSON even on a terminal")]
        json: bool,
    },
    #[command(about = "Load a CSV file locally and print per-column statistics")]
    Describe {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, help = "Field delimiter (single ASCII character)")]
        delimiter: Option<String>,
        #[arg(long, help = "Emit JSON even on a terminal")]
        json: bool,
    },
    #[command(about = "Talk to a running `tabserve serve` instance")]
    Remote {
        #[arg(
            long,
            default_value = "http://127.0.0.1:8080",
            help = "Server base URL",
            value_hint = ValueHint::Url
        )]
        url: String,
        #[command(subcommand)]
        command: RemoteCommand,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RemoteCommand {
    #[command(about = "Ask the server to load a CSV file (path resolved on the server)")]
    Load {
        path: String,
        #[arg(long, help = "Field delimiter (single ASCII character)")]
        delimiter: Option<String>,
    },
    #[command(about = "Fetch a page of rows")]
    Page {
        #[arg(long, allow_negative_numbers = true)]
        start: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },
    #[command(about = "Fetch per-column statistics")]
    Summary,
    #[command(about = "Describe the currently loaded dataset")]
    Info,
    #[command(about = "Check that the server is up")]
    Health,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080", help = "Bind address")]
    bind: String,
    #[arg(
        long,
        value_name = "DIR",
        help = "Resolve relative load paths against this directory",
        value_hint = ValueHint::DirPath
    )]
    data_dir: Option<PathBuf>,
    #[arg(
        long = "load",
        value_name = "PATH",
        help = "Load this CSV file before accepting requests",
        value_hint = ValueHint::FilePath
    )]
    preload: Option<PathBuf>,
    #[arg(long, help = "Default field delimiter (single ASCII character)")]
    delimiter: Option<String>,
    #[arg(long, help = "Allow non-loopback binds")]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes"
    )]
    max_body_bytes: u64,
}

fn serve_config_from_args(args: ServeArgs) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = args.bind.parse().map_err(|_| {
        Error::new(ErrorKind::InvalidRequest)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:8080.")
    })?;
    Ok(serve::ServeConfig {
        bind,
        data_dir: args.data_dir,
        preload: args.preload,
        load_options: load_options(args.delimiter.as_deref())?,
        allow_non_loopback: args.allow_non_loopback,
        max_body_bytes: args.max_body_bytes,
    })
}

fn load_options(delimiter: Option<&str>) -> Result<LoadOptions, Error> {
    let options = LoadOptions::default();
    match delimiter {
        Some(delimiter) => Ok(options.with_delimiter(parse_delimiter(delimiter)?)),
        None => Ok(options),
    }
}

fn delimiter_char(delimiter: Option<&str>) -> Result<Option<char>, Error> {
    delimiter
        .map(|value| parse_delimiter(value).map(char::from))
        .transpose()
}

fn page_json(dataset: &Dataset, page: &Page<'_>) -> Value {
    let mut body = json!({
        "records": page.rows,
        "columns": dataset.column_names(),
        "total": page.total,
        "start": page.start,
        "limit": page.limit,
    });
    if page.is_empty() {
        body["message"] = json!("No data in specified range");
    }
    body
}

fn emit_page_table(dataset: &Dataset, page: &Page<'_>) {
    let headers = dataset.column_names();
    let rows = page
        .rows
        .iter()
        .map(|row| row.iter().map(Cell::display).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    if !headers.is_empty() {
        emit_table(&headers, &rows);
    }
    if page.is_empty() {
        println!("No rows in range (start {}, total {})", page.start, page.total);
    } else {
        println!(
            "rows {}-{} of {}",
            page.start,
            page.end().saturating_sub(1),
            page.total
        );
    }
}

fn emit_summary_table(summary: &[ColumnSummary]) {
    let headers = [
        "COLUMN", "TYPE", "COUNT", "NULLS", "MIN", "MAX", "MEAN", "STDDEV", "DISTINCT", "TOP",
    ];
    let rows = summary
        .iter()
        .map(|column| {
            let mut row = vec![
                column.name.clone(),
                String::new(),
                column.count.to_string(),
                column.null_count.to_string(),
            ];
            match &column.stats {
                ColumnStats::Numeric(stats) => {
                    row[1] = "numeric".to_string();
                    row.extend(
                        [stats.min, stats.max, stats.mean, stats.stddev]
                            .into_iter()
                            .map(format_stat),
                    );
                    row.extend(["-".to_string(), "-".to_string()]);
                }
                ColumnStats::Categorical(stats) => {
                    row[1] = "categorical".to_string();
                    row.extend(std::iter::repeat_n("-".to_string(), 4));
                    row.push(stats.distinct_count.to_string());
                    row.push(match &stats.top {
                        Some(top) => format!("{top} ({})", stats.top_count),
                        None => "-".to_string(),
                    });
                }
            }
            row
        })
        .collect::<Vec<_>>();
    emit_table(&headers, &rows);
}

fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(value) if value.fract() == 0.0 && value.abs() < 1e15 => format!("{value:.0}"),
        Some(value) => format!("{value:.4}"),
        None => "-".to_string(),
    }
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let column_count = headers.len();
    let mut sanitized_rows = Vec::with_capacity(rows.len());
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        let mut sanitized = Vec::with_capacity(column_count);
        for (idx, width) in widths.iter_mut().enumerate() {
            let value = row.get(idx).map(String::as_str).unwrap_or("");
            let cleaned = sanitize_table_cell(value);
            *width = (*width).max(cleaned.chars().count());
            sanitized.push(cleaned);
        }
        sanitized_rows.push(sanitized);
    }

    let mut lines = Vec::with_capacity(sanitized_rows.len() + 1);
    lines.push(format_table_line(
        &headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>(),
        &widths,
    ));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len && idx + 1 < widths.len() {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Io if err.path().is_some() => {
            err.with_hint("Could not read the file. Check the path and its permissions.")
        }
        ErrorKind::Io => {
            err.with_hint("I/O error. Check that the server is running and reachable.")
        }
        ErrorKind::Syntax | ErrorKind::MalformedRow => {
            err.with_hint("The file is not well-formed CSV. Check quoting and row widths.")
        }
        ErrorKind::DuplicateColumn => err.with_hint("Rename the repeated header column."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and report it if it persists.",
    )
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::InvalidRequest => "invalid request".to_string(),
        ErrorKind::NotLoaded => "no data loaded".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Syntax => "invalid csv syntax".to_string(),
        ErrorKind::MalformedRow => "malformed csv row".to_string(),
        ErrorKind::DuplicateColumn => "duplicate column name".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(row) = err.row() {
        lines.push(format!(
            "{} {row}",
            colorize_label("row:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        ServeArgs, error_json, error_text, format_stat, load_options, page_json, render_table,
        serve_config_from_args,
    };
    use tabserve::api::{Error, ErrorKind, LoadOptions, PageRequest, load_reader, page};

    #[test]
    fn render_table_pads_columns() {
        let table = render_table(
            &["NAME", "AGE"],
            &[
                vec!["Alice".to_string(), "30".to_string()],
                vec!["Bo".to_string(), String::new()],
            ],
        );
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "NAME   AGE");
        assert_eq!(lines[1], "Alice  30");
        assert_eq!(lines[2], "Bo     ");
    }

    #[test]
    fn render_table_escapes_newlines() {
        let table = render_table(&["NOTE"], &[vec!["a\nb".to_string()]]);
        assert!(table.contains("a\\nb"));
    }

    #[test]
    fn format_stat_trims_integral_values() {
        assert_eq!(format_stat(Some(25.0)), "25");
        assert_eq!(format_stat(Some(27.5)), "27.5000");
        assert_eq!(format_stat(None), "-");
    }

    #[test]
    fn error_json_includes_context() {
        let err = Error::new(ErrorKind::MalformedRow)
            .with_message("expected 2 fields, found 1")
            .with_path("data.csv")
            .with_row(3);
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "MalformedRow");
        assert_eq!(value["error"]["row"], 3);
        assert_eq!(value["error"]["path"], "data.csv");
    }

    #[test]
    fn error_text_without_color_has_labels() {
        let err = Error::not_loaded();
        let text = error_text(&err, false);
        assert!(text.starts_with("error: no data loaded"));
        assert!(text.contains("hint: "));
    }

    #[test]
    fn page_json_marks_empty_ranges() {
        let dataset = load_reader("a\n1\n2\n".as_bytes(), &LoadOptions::default()).expect("load");
        let result = page(&dataset, PageRequest::new(Some(5), None));
        let value = page_json(&dataset, &result);
        assert_eq!(value["total"], 2);
        assert_eq!(value["records"].as_array().map(Vec::len), Some(0));
        assert_eq!(value["message"], "No data in specified range");
    }

    #[test]
    fn load_options_reject_bad_delimiters() {
        assert_eq!(load_options(Some(";")).expect("options").delimiter, b';');
        let err = load_options(Some("ab")).expect_err("bad");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn serve_args_require_socket_address() {
        let args = ServeArgs {
            bind: "localhost".to_string(),
            data_dir: None,
            preload: None,
            delimiter: None,
            allow_non_loopback: false,
            max_body_bytes: 1024,
        };
        let err = serve_config_from_args(args).expect_err("bad bind");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}

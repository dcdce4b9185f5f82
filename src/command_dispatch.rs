//! Purpose: Hold top-level CLI command dispatch for `tabserve`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Local commands load, query, and drop a dataset without a server.
//! Invariants: Remote commands print the server's JSON payloads unchanged in shape.

use super::*;
use tabserve::api::{PageRequest, RemoteClient, load_path, page, summarize};

pub(super) fn dispatch_command(
    command: Command,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "tabserve", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let config = serve_config_from_args(args)?;
            if io::stderr().is_terminal() {
                let scheme_host = format!("http://{}", config.bind);
                eprintln!(
                    "{} serving on {scheme_host} (routes: /load /data /summary /info /healthz)",
                    colorize_label("tabserve:", color_mode.use_color(true), AnsiColor::Yellow)
                );
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Inspect {
            path,
            start,
            limit,
            delimiter,
            json,
        } => {
            let options = load_options(delimiter.as_deref())?;
            let dataset = load_path(&path, &options)?;
            let result = page(&dataset, PageRequest::new(start, limit));
            if json || !io::stdout().is_terminal() {
                emit_json(page_json(&dataset, &result));
            } else {
                emit_page_table(&dataset, &result);
            }
            Ok(RunOutcome::ok())
        }
        Command::Describe {
            path,
            delimiter,
            json,
        } => {
            let options = load_options(delimiter.as_deref())?;
            let dataset = load_path(&path, &options)?;
            let summary = summarize(&dataset);
            if json || !io::stdout().is_terminal() {
                emit_json(json!({ "summary": summary }));
            } else {
                emit_summary_table(&summary);
            }
            Ok(RunOutcome::ok())
        }
        Command::Remote { url, command } => {
            let client = RemoteClient::new(url)?;
            match command {
                RemoteCommand::Load { path, delimiter } => {
                    let delimiter = delimiter_char(delimiter.as_deref())?;
                    let info = client.load(&path, delimiter)?;
                    emit_json(json!({ "dataset": info }));
                }
                RemoteCommand::Page { start, limit } => {
                    let view = client.page(start, limit)?;
                    let mut body = json!({
                        "records": view.records,
                        "columns": view.columns,
                        "total": view.total,
                        "start": view.start,
                        "limit": view.limit,
                    });
                    if let Some(message) = view.message {
                        body["message"] = json!(message);
                    }
                    emit_json(body);
                }
                RemoteCommand::Summary => {
                    let summary = client.summary()?;
                    emit_json(json!({ "summary": summary }));
                }
                RemoteCommand::Info => {
                    let info = client.info()?;
                    emit_json(json!({ "dataset": info }));
                }
                RemoteCommand::Health => {
                    let health = client.health()?;
                    emit_json(json!({ "ok": health.ok, "loaded": health.loaded }));
                }
            }
            Ok(RunOutcome::ok())
        }
    }
}

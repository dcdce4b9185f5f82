//! Purpose: Define the public Rust API boundary for tabserve.
//! Exports: Table model, loader, store, engines, errors, and `RemoteClient`.
//! Role: Single import path for the binary, the HTTP adapter, and tests.
//! Invariants: Everything here is a re-export or a thin client; no table logic lives here.

mod remote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::loader::{LoadOptions, load_path, load_reader, parse_delimiter};
pub use crate::core::page::{DEFAULT_LIMIT, MAX_LIMIT, Page, PageRequest, page};
pub use crate::core::store::{DatasetInfo, Snapshot, Store};
pub use crate::core::summary::{
    CategoricalStats, ColumnStats, ColumnSummary, NumericStats, summarize,
};
pub use crate::core::table::{Cell, Column, ColumnType, Dataset, Row};
pub use remote::{Health, PageView, RemoteClient};

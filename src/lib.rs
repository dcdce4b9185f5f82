//! Purpose: Library crate behind the `tabserve` binary and its tests.
//! Exports: `core` (table model, loader, store, engines, errors) and `api`.
//! Role: The HTTP server and CLI are thin adapters over these modules.
//! Invariants: A `Dataset` is never mutated after the loader builds it.
//! Invariants: The store is passed explicitly; there is no process-global table.
pub mod api;
pub mod core;

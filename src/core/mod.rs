// Core modules: table model, CSV loading, the dataset store, and query engines.
pub mod error;
pub mod loader;
pub mod page;
pub mod store;
pub mod summary;
pub mod table;

// Holder of the single resident dataset.
//
// Readers clone an `Arc` under a shared lock; a replace swaps the reference
// under the exclusive lock. Datasets themselves are never touched in place,
// so a snapshot stays valid for as long as its holder keeps it.
use std::ops::Deref;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Column, Dataset};

#[derive(Clone, Debug)]
pub struct Snapshot {
    dataset: Arc<Dataset>,
    generation: u64,
    loaded_at: OffsetDateTime,
}

impl Snapshot {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// 1 for the first installed dataset, incremented by every replace.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }

    pub fn info(&self) -> Result<DatasetInfo, Error> {
        let loaded_at = self.loaded_at.format(&Rfc3339).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to format load time")
                .with_source(err)
        })?;
        Ok(DatasetInfo {
            generation: self.generation,
            source: self
                .dataset
                .source()
                .map(|path| path.display().to_string()),
            rows: self.dataset.row_count() as u64,
            columns: self.dataset.columns().to_vec(),
            loaded_at,
        })
    }
}

impl Deref for Snapshot {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.dataset
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub generation: u64,
    pub source: Option<String>,
    pub rows: u64,
    pub columns: Vec<Column>,
    pub loaded_at: String,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Snapshot>,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct Store {
    slot: RwLock<Slot>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `dataset` as the current table and returns its snapshot.
    /// Snapshots handed out earlier keep observing the dataset they captured.
    pub fn replace(&self, dataset: Dataset) -> Snapshot {
        let dataset = Arc::new(dataset);
        let loaded_at = OffsetDateTime::now_utc();
        let (installed, displaced) = {
            let mut slot = self.write();
            slot.generation += 1;
            let installed = Snapshot {
                dataset,
                generation: slot.generation,
                loaded_at,
            };
            let displaced = slot.current.replace(installed.clone());
            (installed, displaced)
        };
        // The previous table is released outside the lock.
        drop(displaced);
        installed
    }

    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        self.read().current.clone().ok_or_else(Error::not_loaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.read().current.is_some()
    }

    /// Generation of the current dataset, or 0 while nothing is loaded.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    // The slot is only ever assigned whole, so a poisoned lock still guards
    // a consistent value.
    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

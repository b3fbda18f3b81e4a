use std::{ops::RangeBounds, path::PathBuf};

use fjall::{Keyspace, Partition, PartitionCreateOptions, PersistMode};
use tracing::debug;

use crate::{
    error::Result,
    storage::engine::{Engine, EngineIterator},
};

/// Name of the single partition holding every key
const PARTITION: &str = "kv";

/// Disk-backed storage engine on a fjall keyspace.
///
/// All keys live in one partition. Every write is persisted before it
/// returns, so a committed answer survives the process exiting.
pub struct DiskEngine {
    keyspace: Keyspace,
    partition: Partition,
    persist_mode: PersistMode,
}

impl DiskEngine {
    /// Opens (or creates) the keyspace directory at `path`
    pub fn new(path: PathBuf) -> Result<Self> {
        Self::with_persist_mode(path, PersistMode::SyncAll)
    }

    pub fn with_persist_mode(path: PathBuf, persist_mode: PersistMode) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        let keyspace = fjall::Config::new(&path).open()?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        debug!(?path, "opened disk store");
        Ok(Self {
            keyspace,
            partition,
            persist_mode,
        })
    }
}

impl Engine for DiskEngine {
    type EngineIterator<'a> = DiskEngineIterator<'a>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.partition.insert(key, value)?;
        self.keyspace.persist(self.persist_mode)?;
        Ok(())
    }

    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        Ok(self.partition.get(key)?.map(|value| value.to_vec()))
    }

    fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.partition.remove(key)?;
        self.keyspace.persist(self.persist_mode)?;
        Ok(())
    }

    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_> {
        let range = (range.start_bound().cloned(), range.end_bound().cloned());
        DiskEngineIterator {
            inner: Box::new(self.partition.range(range).map(|entry| {
                let (key, value) = entry?;
                Ok((key.to_vec(), value.to_vec()))
            })),
        }
    }
}

pub struct DiskEngineIterator<'a> {
    inner: Box<dyn DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> + 'a>,
}

impl EngineIterator for DiskEngineIterator<'_> {}

impl Iterator for DiskEngineIterator<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl DoubleEndedIterator for DiskEngineIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

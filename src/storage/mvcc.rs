//! Multi-version concurrency control over a byte-level [`Engine`].
//!
//! Every write is stored under `Key::Version(key, version)`. A transaction
//! sees the newest version of a key that was committed before it began, plus
//! its own writes. Writes to a key that has a version invisible to us fail
//! with [`Error::WriteConflict`].

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    storage::{
        engine::Engine,
        keycode::{deserialize_key, serialize_key},
    },
};

pub type Version = u64;

/// Shared handle to a versioned store. Cloning shares the underlying engine.
pub struct Mvcc<E: Engine> {
    engine: Arc<Mutex<E>>,
}

impl<E: Engine> Clone for Mvcc<E> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone() }
    }
}

impl<E: Engine> Mvcc<E> {
    pub fn new(engine: E) -> Self {
        Self { engine: Arc::new(Mutex::new(engine)) }
    }

    pub fn begin(&self) -> Result<MvccTransaction<E>> {
        MvccTransaction::begin(self.engine.clone())
    }
}

/// What a transaction is allowed to see
pub struct TransactionState {
    pub version: Version,
    /// Transactions that were still running when this one began
    pub active: HashSet<Version>,
}

impl TransactionState {
    fn is_visible(&self, version: Version) -> bool {
        !self.active.contains(&version) && version <= self.version
    }
}

/// Internal key layout. Variant order matters: it is the key prefix.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Key {
    NextVersion,
    TxnActive(Version),
    /// Marks a key written by a transaction, used to undo it on rollback
    TxnWrite(Version, #[serde(with = "serde_bytes")] Vec<u8>),
    Version(#[serde(with = "serde_bytes")] Vec<u8>, Version),
}

impl Key {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize_key(bytes)
    }
}

/// Prefixes of [`Key`], variant indices line up with it
#[derive(Debug, Serialize, Deserialize)]
pub enum KeyPrefix {
    NextVersion,
    TxnActive,
    TxnWrite(Version),
    Version(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl KeyPrefix {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(self)
    }
}

fn unexpected_key(key: &[u8]) -> Error {
    Error::Internal(format!("unexpected mvcc key {:x?}", key))
}

pub struct MvccTransaction<E: Engine> {
    engine: Arc<Mutex<E>>,
    state: TransactionState,
}

impl<E: Engine> MvccTransaction<E> {
    fn begin(engine: Arc<Mutex<E>>) -> Result<Self> {
        let mut eng = engine.lock()?;

        let version = match eng.get(Key::NextVersion.encode()?)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => 1,
        };
        eng.set(Key::NextVersion.encode()?, bincode::serialize(&(version + 1))?)?;

        let active = Self::scan_active(&mut eng)?;
        eng.set(Key::TxnActive(version).encode()?, vec![])?;
        drop(eng);

        Ok(Self {
            engine,
            state: TransactionState { version, active },
        })
    }

    pub fn version(&self) -> Version {
        self.state.version
    }

    /// Makes the writes permanent by forgetting the rollback bookkeeping
    pub fn commit(&self) -> Result<()> {
        let mut eng = self.engine.lock()?;
        let writes = eng
            .scan_prefix(KeyPrefix::TxnWrite(self.state.version).encode()?)
            .map(|r| r.map(|(key, _)| key))
            .collect::<Result<Vec<_>>>()?;
        for key in writes {
            eng.delete(key)?;
        }
        eng.delete(Key::TxnActive(self.state.version).encode()?)
    }

    /// Removes every version this transaction wrote
    pub fn rollback(&self) -> Result<()> {
        let mut eng = self.engine.lock()?;
        let mut doomed = Vec::new();
        for item in eng.scan_prefix(KeyPrefix::TxnWrite(self.state.version).encode()?) {
            let (key, _) = item?;
            match Key::decode(&key)? {
                Key::TxnWrite(_, raw) => doomed.push(Key::Version(raw, self.state.version).encode()?),
                _ => return Err(unexpected_key(&key)),
            }
            doomed.push(key);
        }
        for key in doomed {
            eng.delete(key)?;
        }
        eng.delete(Key::TxnActive(self.state.version).encode()?)
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write(key, Some(value))
    }

    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.write(key, None)
    }

    pub fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let mut eng = self.engine.lock()?;
        let from = Key::Version(key.clone(), 0).encode()?;
        let to = Key::Version(key, self.state.version).encode()?;

        for item in eng.scan(from..=to).rev() {
            let (k, v) = item?;
            match Key::decode(&k)? {
                Key::Version(_, version) if self.state.is_visible(version) => {
                    return Ok(bincode::deserialize(&v)?);
                }
                Key::Version(..) => {}
                _ => return Err(unexpected_key(&k)),
            }
        }
        Ok(None)
    }

    /// Returns the latest visible value of every key under `prefix`, in key order
    pub fn scan_prefix(&self, prefix: Vec<u8>) -> Result<Vec<ScanResult>> {
        let mut eng = self.engine.lock()?;
        // Drop the byte-string terminator so the prefix matches longer keys
        let mut raw_prefix = KeyPrefix::Version(prefix).encode()?;
        raw_prefix.truncate(raw_prefix.len() - 2);

        let mut latest = BTreeMap::new();
        for item in eng.scan_prefix(raw_prefix) {
            let (k, v) = item?;
            match Key::decode(&k)? {
                Key::Version(raw, version) if self.state.is_visible(version) => {
                    match bincode::deserialize::<Option<Vec<u8>>>(&v)? {
                        Some(value) => latest.insert(raw, value),
                        None => latest.remove(&raw),
                    };
                }
                Key::Version(..) => {}
                _ => return Err(unexpected_key(&k)),
            }
        }
        Ok(latest
            .into_iter()
            .map(|(key, value)| ScanResult { key, value })
            .collect())
    }

    fn write(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        let mut eng = self.engine.lock()?;

        // Any version newer than the oldest one we can't see is a conflict
        let oldest_invisible = self
            .state
            .active
            .iter()
            .min()
            .copied()
            .unwrap_or(self.state.version + 1);
        let from = Key::Version(key.clone(), oldest_invisible).encode()?;
        let to = Key::Version(key.clone(), Version::MAX).encode()?;
        if let Some((k, _)) = eng.scan(from..=to).last().transpose()? {
            match Key::decode(&k)? {
                Key::Version(_, version) if !self.state.is_visible(version) => {
                    return Err(Error::WriteConflict);
                }
                Key::Version(..) => {}
                _ => return Err(unexpected_key(&k)),
            }
        }

        eng.set(Key::TxnWrite(self.state.version, key.clone()).encode()?, vec![])?;
        eng.set(
            Key::Version(key, self.state.version).encode()?,
            bincode::serialize(&value)?,
        )
    }

    fn scan_active(eng: &mut MutexGuard<E>) -> Result<HashSet<Version>> {
        let mut active = HashSet::new();
        for item in eng.scan_prefix(KeyPrefix::TxnActive.encode()?) {
            let (k, _) = item?;
            match Key::decode(&k)? {
                Key::TxnActive(version) => active.insert(version),
                _ => return Err(unexpected_key(&k)),
            };
        }
        Ok(active)
    }
}

#[derive(Debug, PartialEq)]
pub struct ScanResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::{Mvcc, ScanResult};
    use crate::{
        error::{Error, Result},
        storage::{disk::DiskEngine, engine::Engine, memory::MemoryEngine},
    };

    fn seed<E: Engine>(mvcc: &Mvcc<E>) -> Result<()> {
        let txn = mvcc.begin()?;
        txn.set(b"day1".to_vec(), b"not_started".to_vec())?;
        txn.set(b"day2".to_vec(), b"not_started".to_vec())?;
        txn.set(b"day3".to_vec(), b"not_started".to_vec())?;
        txn.commit()
    }

    #[test]
    fn test_own_writes_and_deletes() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        let txn = mvcc.begin()?;
        txn.set(b"a".to_vec(), b"1".to_vec())?;
        txn.set(b"a".to_vec(), b"2".to_vec())?;
        txn.set(b"b".to_vec(), b"3".to_vec())?;
        txn.delete(b"b".to_vec())?;
        assert_eq!(txn.get(b"a".to_vec())?, Some(b"2".to_vec()));
        assert_eq!(txn.get(b"b".to_vec())?, None);
        txn.commit()?;

        let txn = mvcc.begin()?;
        assert_eq!(txn.get(b"a".to_vec())?, Some(b"2".to_vec()));
        assert_eq!(txn.get(b"b".to_vec())?, None);
        Ok(())
    }

    #[test]
    fn test_snapshot_isolation() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        seed(&mvcc)?;

        let reader = mvcc.begin()?;
        let writer = mvcc.begin()?;
        writer.set(b"day1".to_vec(), b"in_progress".to_vec())?;
        writer.set(b"day4".to_vec(), b"in_progress".to_vec())?;

        // Uncommitted and later-committed writes both stay invisible
        assert_eq!(reader.get(b"day1".to_vec())?, Some(b"not_started".to_vec()));
        writer.commit()?;
        assert_eq!(reader.get(b"day1".to_vec())?, Some(b"not_started".to_vec()));
        assert_eq!(reader.scan_prefix(b"day".to_vec())?.len(), 3);

        let later = mvcc.begin()?;
        assert_eq!(later.get(b"day1".to_vec())?, Some(b"in_progress".to_vec()));
        assert_eq!(later.scan_prefix(b"day".to_vec())?.len(), 4);
        Ok(())
    }

    #[test]
    fn test_scan_prefix() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        seed(&mvcc)?;
        let txn = mvcc.begin()?;
        txn.set(b"dax".to_vec(), b"x".to_vec())?;
        txn.delete(b"day2".to_vec())?;

        assert_eq!(
            txn.scan_prefix(b"day".to_vec())?,
            vec![
                ScanResult { key: b"day1".to_vec(), value: b"not_started".to_vec() },
                ScanResult { key: b"day3".to_vec(), value: b"not_started".to_vec() },
            ]
        );
        assert_eq!(txn.scan_prefix(b"da".to_vec())?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_write_conflict() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        seed(&mvcc)?;

        let t1 = mvcc.begin()?;
        let t2 = mvcc.begin()?;
        t1.set(b"day1".to_vec(), b"in_progress".to_vec())?;
        assert_eq!(t2.set(b"day1".to_vec(), b"completed".to_vec()), Err(Error::WriteConflict));
        assert_eq!(t2.delete(b"day1".to_vec()), Err(Error::WriteConflict));

        // A transaction that started and committed after t1 also conflicts
        let t3 = mvcc.begin()?;
        t3.set(b"day9".to_vec(), b"x".to_vec())?;
        t3.commit()?;
        assert_eq!(t1.set(b"day9".to_vec(), b"y".to_vec()), Err(Error::WriteConflict));

        t2.set(b"day2".to_vec(), b"completed".to_vec())?;
        t1.commit()?;
        t2.commit()?;
        Ok(())
    }

    #[test]
    fn test_rollback() -> Result<()> {
        let mvcc = Mvcc::new(MemoryEngine::new());
        seed(&mvcc)?;

        let txn = mvcc.begin()?;
        txn.set(b"day1".to_vec(), b"completed".to_vec())?;
        txn.delete(b"day2".to_vec())?;
        txn.rollback()?;

        let txn = mvcc.begin()?;
        assert_eq!(txn.get(b"day1".to_vec())?, Some(b"not_started".to_vec()));
        assert_eq!(txn.get(b"day2".to_vec())?, Some(b"not_started".to_vec()));
        // The rolled back version no longer blocks writers
        txn.set(b"day1".to_vec(), b"in_progress".to_vec())?;
        txn.commit()
    }

    #[test]
    fn test_versions_survive_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mvcc.log");

        let mvcc = Mvcc::new(DiskEngine::new(path.clone())?);
        seed(&mvcc)?;
        let version = mvcc.begin()?.version();
        drop(mvcc);

        let mvcc = Mvcc::new(DiskEngine::new(path)?);
        let txn = mvcc.begin()?;
        assert!(txn.version() > version);
        assert_eq!(txn.get(b"day3".to_vec())?, Some(b"not_started".to_vec()));
        Ok(())
    }
}

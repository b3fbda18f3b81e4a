use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Byte-level key/value storage engine.
///
/// Keys are ordered lexicographically. The SQL layer never talks to this trait
/// directly, it goes through [`crate::storage::mvcc::Mvcc`].
pub trait Engine {
    type EngineIterator<'a>: EngineIterator
    where
        Self: 'a;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, key: Vec<u8>) -> Result<()>;
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_>;

    /// Scans every key starting with `prefix`.
    ///
    /// The prefix becomes the range `[prefix, prefix+1)` where `prefix+1` is the
    /// prefix with its last byte incremented, carrying past `0xff` bytes.
    fn scan_prefix(&mut self, prefix: Vec<u8>) -> Self::EngineIterator<'_> {
        let start = Bound::Included(prefix.clone());
        let mut upper = prefix;
        let end = loop {
            match upper.last_mut() {
                Some(0xff) => {
                    upper.pop();
                }
                Some(last) => {
                    *last += 1;
                    break Bound::Excluded(upper);
                }
                None => break Bound::Unbounded,
            }
        };
        self.scan((start, end))
    }
}

/// Storage engine iterator, traversable from both ends
pub trait EngineIterator: DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::{
        error::Result,
        storage::{disk::DiskEngine, memory::MemoryEngine},
    };
    use std::ops::Bound;

    fn check_point_ops(mut eng: impl Engine) -> Result<()> {
        assert_eq!(eng.get(b"missing".to_vec())?, None);

        eng.set(b"day".to_vec(), vec![1])?;
        assert_eq!(eng.get(b"day".to_vec())?, Some(vec![1]));

        eng.set(b"day".to_vec(), vec![2, 3])?;
        assert_eq!(eng.get(b"day".to_vec())?, Some(vec![2, 3]));

        eng.delete(b"day".to_vec())?;
        assert_eq!(eng.get(b"day".to_vec())?, None);

        eng.set(b"".to_vec(), vec![])?;
        assert_eq!(eng.get(b"".to_vec())?, Some(vec![]));
        Ok(())
    }

    fn check_range_scan(mut eng: impl Engine) -> Result<()> {
        for key in ["orders", "customers", "sales", "users", "purchases"] {
            eng.set(key.as_bytes().to_vec(), key.to_uppercase().into_bytes())?;
        }

        let keys = eng
            .scan((Bound::Included(b"c".to_vec()), Bound::Excluded(b"q".to_vec())))
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![b"customers".to_vec(), b"orders".to_vec(), b"purchases".to_vec()]);

        let mut iter = eng.scan(..);
        let (last, value) = iter.next_back().transpose()?.expect("scan is empty");
        assert_eq!(last, b"users".to_vec());
        assert_eq!(value, b"USERS".to_vec());
        Ok(())
    }

    fn check_prefix_scan(mut eng: impl Engine) -> Result<()> {
        eng.set(b"sales".to_vec(), vec![1])?;
        eng.set(b"sales_2023".to_vec(), vec![2])?;
        eng.set(b"salt".to_vec(), vec![3])?;
        eng.set(vec![0x01, 0xff], vec![4])?;
        eng.set(vec![0x01, 0xff, 0x00], vec![5])?;
        eng.set(vec![0x02], vec![6])?;

        let values = eng
            .scan_prefix(b"sales".to_vec())
            .map(|r| r.map(|(_, v)| v))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(values, vec![vec![1], vec![2]]);

        let values = eng
            .scan_prefix(vec![0x01, 0xff])
            .map(|r| r.map(|(_, v)| v))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(values, vec![vec![4], vec![5]]);
        Ok(())
    }

    #[test]
    fn test_memory() -> Result<()> {
        check_point_ops(MemoryEngine::new())?;
        check_range_scan(MemoryEngine::new())?;
        check_prefix_scan(MemoryEngine::new())?;
        Ok(())
    }

    #[test]
    fn test_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        check_point_ops(DiskEngine::new(dir.path().join("point"))?)?;
        check_range_scan(DiskEngine::new(dir.path().join("range"))?)?;
        check_prefix_scan(DiskEngine::new(dir.path().join("prefix"))?)?;
        Ok(())
    }
}

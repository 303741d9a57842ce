use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use crate::{Error, Result};

use super::{BlockIterator, BlockKey, BlockStore};

/// Directory-backed block store.
///
/// Each block lives in `<dir>/<prefix>/<hex-key>`, where the prefix is
/// the first four hex digits of the key, keeping directory fan-out
/// bounded. Writes land in a temporary file first and are renamed into
/// place, so a block file is either absent or complete; rewriting an
/// existing key replaces it atomically.
pub struct FsStore {
    name: String,
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

const TMP_SUFFIX: &str = ".tmp";

impl FsStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|err| Error::Store(format!("unable to create {:?} - {}", dir, err)))?;
        Ok(Self {
            name: dir.to_string_lossy().into_owned(),
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn block_path(&self, key: &BlockKey) -> PathBuf {
        let hex_key = key.to_hex();
        let prefix = &hex_key[..hex_key.len().min(4)];
        self.dir.join(prefix).join(hex_key)
    }
}

impl BlockStore for FsStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>> {
        Ok(keys
            .iter()
            .map(|key| self.block_path(key).is_file())
            .collect())
    }

    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>> {
        match fs::read(self.block_path(key)) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::BlockUnavailable),
            Err(err) => Err(Error::Store(format!("read of {} failed - {}", key, err))),
        }
    }

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidArg("empty block key".to_string()));
        }
        let path = self.block_path(key);
        let parent = path.parent().expect("block path always has a parent");
        fs::create_dir_all(parent)
            .map_err(|err| Error::Store(format!("unable to create {:?} - {}", parent, err)))?;

        let tmp_path = parent.join(format!(
            "{}.{}.{}{}",
            key.to_hex(),
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed),
            TMP_SUFFIX
        ));
        fs::write(&tmp_path, block)
            .map_err(|err| Error::Store(format!("write of {} failed - {}", key, err)))?;
        fs::rename(&tmp_path, &path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            Error::Store(format!("rename of {} failed - {}", key, err))
        })?;
        Ok(())
    }

    fn delete_block(&self, key: &BlockKey) -> Result<()> {
        match fs::remove_file(self.block_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::BlockUnavailable),
            Err(err) => Err(Error::Store(format!("delete of {} failed - {}", key, err))),
        }
    }

    fn first_block(&self) -> Result<BlockIterator> {
        let walker = WalkDir::new(&self.dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let file_name = entry.file_name().to_string_lossy().into_owned();
                    if file_name.ends_with(TMP_SUFFIX) {
                        return None;
                    }
                    BlockKey::from_hex(&file_name).ok().map(Ok)
                }
                Ok(_) => None,
                Err(err) => Some(Err(Error::Store(format!("store walk failed - {}", err)))),
            });
        BlockIterator::new(Box::new(walker))
    }

    fn sync(&self) -> Result<()> {
        File::open(&self.dir)
            .and_then(|dir| dir.sync_all())
            .map_err(|err| Error::Store(format!("sync of {:?} failed - {}", self.dir, err)))
    }

    fn close(&self) -> Result<()> {
        self.sync()
    }
}

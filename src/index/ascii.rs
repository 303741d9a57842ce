use lazy_static::lazy_static;
use regex::Regex;

use crate::store::BlockKey;
use crate::{Error, Result};

use super::{
    BlockFetcher, FetcherClass, HandleClass, HashMethod, IndexHandle, TreeHandle, TreeIndexer,
};

/// ASCII form of an index tuple, one line, safe for URLs and shell use:
///
/// ```text
/// tree_indexer/<K>:<fetcher-class>:<handle-class>/<hex-key>,<root-size>,<total-size>,<leaf|tree>[,<hex-cipher-key>]
/// ```
///
/// Deserialization is two-staged: stage 1 only reads the class prefix (up
/// to and including the final `/`) so the caller knows which classes it
/// is dealing with; stage 2 parses the instance fields from the
/// remainder. The split mirrors how user interfaces report a handle's
/// classes before committing to a restore.

const TREE_INDEXER_TAG: &str = "tree_indexer";

lazy_static! {
    static ref CLASS_PREFIX_RE: Regex =
        Regex::new("^([a-z0-9_]+)/([0-9]+):([a-z0-9_]+):([a-z0-9_]+)/").unwrap();
}

/// The class identities read by stage 1, plus how many input bytes they
/// occupied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexTupleClasses {
    pub indices_per_block: usize,
    pub fetcher_class: FetcherClass,
    pub handle_class: HandleClass,
    pub bytes_read: usize,
}

/// Serialize an index tuple to its ASCII form.
pub fn serialize_index_tuple(indexer: &TreeIndexer, handle: &TreeHandle) -> String {
    let fetcher_tag = match handle.root.class() {
        HandleClass::Hash => FetcherClass::Hash.tag(),
        HandleClass::Chk => FetcherClass::Chk.tag(),
    };
    let root_kind = if handle.root_is_leaf { "leaf" } else { "tree" };
    let mut out = format!(
        "{}/{}:{}:{}/{},{},{},{}",
        TREE_INDEXER_TAG,
        indexer.indices_per_block(),
        fetcher_tag,
        handle.root.class().tag(),
        handle.root.key().to_hex(),
        handle.root.size(),
        handle.total_size,
        root_kind,
    );
    if let Some(cipher_key) = handle.root.cipher_key() {
        out.push(',');
        out.push_str(&hex::encode(cipher_key));
    }
    out
}

/// Stage 1: read the class tags. The returned `bytes_read` points at the
/// first instance-data byte, where stage 2 picks up.
pub fn deserialize_index_tuple_s1(input: &str) -> Result<IndexTupleClasses> {
    let captures = CLASS_PREFIX_RE
        .captures(input)
        .ok_or_else(|| Error::Deserialize("missing class prefix".to_string()))?;

    let indexer_tag = &captures[1];
    if indexer_tag != TREE_INDEXER_TAG {
        return Err(Error::Deserialize(format!(
            "unknown indexer class `{}'",
            indexer_tag
        )));
    }
    let indices_per_block: usize = captures[2]
        .parse()
        .map_err(|_| Error::Deserialize("unreadable fan-out".to_string()))?;
    if indices_per_block == 0 {
        return Err(Error::Deserialize("fan-out of zero".to_string()));
    }

    let fetcher_class = FetcherClass::from_tag(&captures[3])?;
    let handle_class = HandleClass::from_tag(&captures[4])?;
    if fetcher_class.handle_class() != handle_class {
        return Err(Error::Deserialize(format!(
            "handle class `{}' does not belong to fetcher class `{}'",
            handle_class.tag(),
            fetcher_class.tag()
        )));
    }

    Ok(IndexTupleClasses {
        indices_per_block,
        fetcher_class,
        handle_class,
        bytes_read: captures[0].len(),
    })
}

/// Stage 2: parse the instance fields following the class prefix and
/// materialize the indexer, fetcher and handle.
pub fn deserialize_index_tuple_s2(
    remainder: &str,
    classes: &IndexTupleClasses,
) -> Result<(TreeIndexer, BlockFetcher, TreeHandle)> {
    let fields: Vec<&str> = remainder.split(',').collect();
    let expected_fields = match classes.handle_class {
        HandleClass::Hash => 4,
        HandleClass::Chk => 5,
    };
    if fields.len() != expected_fields {
        return Err(Error::Deserialize(format!(
            "expected {} handle fields, got {}",
            expected_fields,
            fields.len()
        )));
    }

    let key_bytes = hex::decode(fields[0])
        .map_err(|err| Error::Deserialize(format!("bad block key - {}", err)))?;
    // the key width must map back to a digest algorithm
    HashMethod::from_key_size(key_bytes.len())?;
    let key = BlockKey::new(key_bytes);

    let root_size: u32 = fields[1]
        .parse()
        .map_err(|_| Error::Deserialize("unreadable root block size".to_string()))?;
    let total_size: u64 = fields[2]
        .parse()
        .map_err(|_| Error::Deserialize("unreadable stream size".to_string()))?;
    let root_is_leaf = match fields[3] {
        "leaf" => true,
        "tree" => false,
        other => {
            return Err(Error::Deserialize(format!(
                "root kind must be `leaf' or `tree', got `{}'",
                other
            )))
        }
    };

    let root = match classes.handle_class {
        HandleClass::Hash => IndexHandle::Hash {
            key,
            size: root_size,
        },
        HandleClass::Chk => {
            let cipher_key = hex::decode(fields[4])
                .map_err(|err| Error::Deserialize(format!("bad cipher key - {}", err)))?;
            HashMethod::from_key_size(cipher_key.len())?;
            IndexHandle::Chk {
                key,
                size: root_size,
                cipher_key,
            }
        }
    };

    let indexer = TreeIndexer::new(classes.indices_per_block)
        .map_err(|err| Error::Deserialize(err.to_string()))?;
    let fetcher = BlockFetcher::for_class(classes.fetcher_class);
    let handle = TreeHandle {
        root,
        root_is_leaf,
        total_size,
    };
    Ok((indexer, fetcher, handle))
}

/// Both stages in one call.
pub fn parse_index_tuple(input: &str) -> Result<(TreeIndexer, BlockFetcher, TreeHandle)> {
    let input = input.trim();
    let classes = deserialize_index_tuple_s1(input)?;
    deserialize_index_tuple_s2(&input[classes.bytes_read..], &classes)
}

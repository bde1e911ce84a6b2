//! Persistent entry log using RocksDB.
//!
//! Entries live under `entry:<seq>` with a zero-padded sequence number, so
//! key order is insertion order. The log is capped: every append that
//! overflows the cap deletes the oldest entries in the same write batch.

use crate::error::{Error, Result};
use resonance_core::{now_millis, Entry, EntryDraft};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const ENTRY_PREFIX: &[u8] = b"entry:";
/// Sorts directly after every `entry:` key
const ENTRY_END: &[u8] = b"entry;";
const SEQ_KEY: &[u8] = b"meta:seq";

/// Storage backend for entries.
pub struct Storage {
    db: DB,
    cap: usize,
    /// Serializes writers; holds the next sequence number and entry count.
    cursor: Mutex<Cursor>,
}

struct Cursor {
    next_seq: u64,
    len: usize,
}

impl Storage {
    /// Open or create storage at the given path, retaining at most `cap`
    /// entries.
    pub fn open<P: AsRef<Path>>(path: P, cap: usize) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;

        let next_seq = match db.get(SEQ_KEY)? {
            Some(bytes) => decode_seq(&bytes)?,
            None => 0,
        };
        let len = entry_keys(&db, usize::MAX)?.len();

        Ok(Self {
            db,
            cap: cap.max(1),
            cursor: Mutex::new(Cursor { next_seq, len }),
        })
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Accept a draft: assign id and timestamp, evict past the cap.
    pub fn append(&self, draft: &EntryDraft) -> Result<Entry> {
        let mut cursor = self.lock()?;
        let seq = cursor.next_seq;
        let timestamp = now_millis();
        let id = entry_id(seq, draft, timestamp);
        let entry = Entry::accept(draft.clone(), Some(id), timestamp);

        let mut batch = WriteBatch::default();
        batch.put(entry_key(seq), serde_json::to_vec(&entry)?);
        batch.put(SEQ_KEY, (seq + 1).to_be_bytes());

        let overflow = (cursor.len + 1).saturating_sub(self.cap);
        let evicted = if overflow > 0 {
            entry_keys(&self.db, overflow)?
        } else {
            Vec::new()
        };
        for key in &evicted {
            batch.delete(key);
        }
        self.db.write(batch)?;

        cursor.next_seq = seq + 1;
        cursor.len = cursor.len + 1 - evicted.len();
        if !evicted.is_empty() {
            debug!("Evicted {} oldest entries", evicted.len());
        }
        Ok(entry)
    }

    /// Up to `limit` entries, most recent first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(ENTRY_END, Direction::Reverse));
        for item in iter {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(ENTRY_PREFIX) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    /// Number of retained entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete every entry. The sequence counter is kept so ids never repeat.
    pub fn clear_all(&self) -> Result<usize> {
        let mut cursor = self.lock()?;
        let keys = entry_keys(&self.db, usize::MAX)?;
        let mut batch = WriteBatch::default();
        for key in &keys {
            batch.delete(key);
        }
        self.db.write(batch)?;
        cursor.len = 0;
        Ok(keys.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Cursor>> {
        self.cursor
            .lock()
            .map_err(|_| Error::Storage("entry cursor lock poisoned".into()))
    }
}

fn entry_key(seq: u64) -> Vec<u8> {
    format!("entry:{:020}", seq).into_bytes()
}

/// Opaque id from the sequence number and content. The sequence number
/// keeps ids distinct even for identical entries in the same millisecond.
fn entry_id(seq: u64, draft: &EntryDraft, timestamp: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seq.to_be_bytes());
    hasher.update(&timestamp.to_be_bytes());
    hasher.update(&[draft.score]);
    for field in [&draft.x, &draft.y, &draft.z] {
        hasher.update(field.as_bytes());
        hasher.update(&[0]);
    }
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage("Invalid stored sequence counter".into()))?;
    Ok(u64::from_be_bytes(raw))
}

/// Oldest-first entry keys, at most `limit`.
fn entry_keys(db: &DB, limit: usize) -> Result<Vec<Box<[u8]>>> {
    let mut keys = Vec::new();
    for item in db.prefix_iterator(ENTRY_PREFIX) {
        if keys.len() >= limit {
            break;
        }
        let (key, _) = item?;
        if !key.starts_with(ENTRY_PREFIX) {
            break;
        }
        keys.push(key);
    }
    Ok(keys)
}

//! Persistent term index on top of sled.
//!
//! Two trees: `terms` maps a term to its bincode posting list (sorted by book id) and `books`
//! maps a big-endian book id to a `BookRecord` listing the terms referencing it. Every record
//! is rewritten with a compare-and-swap loop, so concurrent writers touching the same term never
//! lose each other's postings. The book record orders whole-book rewrites: a writer whose swap
//! of it fails redoes its diff against the winner's term set.

use crate::index::{remove_posting, set_posting, BookId, Posting};
use crate::query::TermMatcher;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{CompareAndSwapError, Tree};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use time::format_description::well_known::Rfc3339;

const TERMS_TREE: &str = "terms";
const BOOKS_TREE: &str = "books";
const META_KEY: &[u8] = b"meta";

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub terms: usize,
    pub books: usize,
    pub created_at: String,
}

/// Terms referencing one book. `generation` grows on every rewrite, so a compare-and-swap
/// never mistakes a rewritten record for the one it read. Removed books keep an empty record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BookRecord {
    generation: u64,
    terms: BTreeSet<String>,
}

/// The full set of term counts produced by one ingestion of a book.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub book_id: BookId,
    pub terms: BTreeMap<String, u32>,
}

#[derive(Clone)]
pub struct IndexStore {
    db: sled::Db,
    terms: Tree,
    books: Tree,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let terms = db.open_tree(TERMS_TREE)?;
        let books = db.open_tree(BOOKS_TREE)?;
        if db.get(META_KEY)?.is_none() {
            let meta = IndexMeta {
                version: FORMAT_VERSION,
                created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            };
            // a concurrent opener may have written it first; either record is fine
            let _ = db.compare_and_swap(META_KEY, None::<&[u8]>, Some(serde_json::to_vec(&meta)?))?;
        }
        Ok(Self { db, terms, books })
    }

    /// Flushes outstanding writes and releases this handle.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        tracing::debug!("index store closed");
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Sets the posting of `book_id` under `term` to `count` and makes it durable.
    pub fn upsert(&self, term: &str, book_id: BookId, count: u32) -> Result<()> {
        let term = term.to_lowercase();
        self.set_term_posting(&term, Posting { book_id, count })?;
        cas_update::<BookRecord, _>(&self.books, &book_key(book_id), |current| {
            let mut record = current.unwrap_or_default();
            record.generation += 1;
            record.terms.insert(term.clone());
            Some(record)
        })?;
        self.flush()
    }

    /// Applies a batch of book updates and flushes once. Returns the number of postings written.
    pub fn apply(&self, updates: &[BookUpdate]) -> Result<usize> {
        let mut written = 0;
        for update in updates {
            written += self.replace_book_unflushed(update)?;
        }
        self.flush()?;
        tracing::debug!(books = updates.len(), postings = written, "applied batch");
        Ok(written)
    }

    /// Makes the index reflect exactly `update.terms` for that book: counts are overwritten and
    /// the book is dropped from terms its new content no longer contains.
    pub fn replace_book(&self, update: &BookUpdate) -> Result<usize> {
        self.apply(std::slice::from_ref(update))
    }

    fn replace_book_unflushed(&self, update: &BookUpdate) -> Result<usize> {
        let book_id = update.book_id;
        let terms: BTreeSet<String> = update.terms.keys().cloned().collect();
        self.rewrite_book(book_id, |previous| {
            for (term, &count) in &update.terms {
                self.set_term_posting(term, Posting { book_id, count })?;
            }
            for stale in previous.difference(&terms) {
                self.remove_term_posting(stale, book_id)?;
            }
            Ok(terms.clone())
        })?;
        Ok(update.terms.len())
    }

    /// Removes every posting of `book_id`. Returns how many terms referenced it.
    pub fn remove_book(&self, book_id: BookId) -> Result<usize> {
        let mut removed = 0;
        self.rewrite_book(book_id, |previous| {
            for term in previous {
                self.remove_term_posting(term, book_id)?;
            }
            removed = previous.len();
            Ok(BTreeSet::new())
        })?;
        self.flush()?;
        Ok(removed)
    }

    /// Runs `diff` against the book's current term set, then swaps in the set it returns. When
    /// another writer replaced the record meanwhile, `diff` runs again against the new set, so
    /// the last successful writer always cleans up after the one before it.
    fn rewrite_book<F>(&self, book_id: BookId, mut diff: F) -> Result<()>
    where
        F: FnMut(&BTreeSet<String>) -> Result<BTreeSet<String>>,
    {
        let key = book_key(book_id);
        let mut seen = self.books.get(key)?;
        loop {
            let previous: BookRecord = match &seen {
                Some(bytes) => bincode::deserialize(bytes)?,
                None => BookRecord::default(),
            };
            let terms = diff(&previous.terms)?;
            let next = bincode::serialize(&BookRecord { generation: previous.generation + 1, terms })?;
            match self.books.compare_and_swap(key, seen.as_ref(), Some(next))? {
                Ok(()) => return Ok(()),
                Err(CompareAndSwapError { current, .. }) => {
                    tracing::trace!(book_id, "book rewritten concurrently, redoing diff");
                    seen = current;
                }
            }
        }
    }

    /// Terms whose posting lists reference `book_id`.
    pub fn terms_for_book(&self, book_id: BookId) -> Result<BTreeSet<String>> {
        match self.books.get(book_key(book_id))? {
            Some(bytes) => Ok(bincode::deserialize::<BookRecord>(&bytes)?.terms),
            None => Ok(BTreeSet::new()),
        }
    }

    pub fn postings(&self, term: &str) -> Result<Vec<Posting>> {
        match self.terms.get(term.as_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Every term accepted by `matcher` together with its posting list.
    ///
    /// Exact matchers are a point read; substring and regex matchers scan the term keys. No
    /// snapshot is taken, so a concurrent ingestion may be partially visible.
    pub fn lookup(&self, matcher: &TermMatcher) -> Result<Vec<(String, Vec<Posting>)>> {
        if let Some(term) = matcher.exact_term() {
            let postings = self.postings(term)?;
            return Ok(if postings.is_empty() { vec![] } else { vec![(term.to_string(), postings)] });
        }
        let mut out = Vec::new();
        for entry in self.terms.iter() {
            let (key, value) = entry?;
            let Ok(term) = std::str::from_utf8(&key) else { continue };
            if matcher.matches(term) {
                out.push((term.to_string(), bincode::deserialize(&value)?));
            }
        }
        Ok(out)
    }

    pub fn meta(&self) -> Result<Option<IndexMeta>> {
        match self.db.get(META_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let created_at = self.meta()?.map(|m| m.created_at).unwrap_or_default();
        let mut books = 0;
        for entry in self.books.iter() {
            let (_, value) = entry?;
            if !bincode::deserialize::<BookRecord>(&value)?.terms.is_empty() {
                books += 1;
            }
        }
        Ok(IndexStats { terms: self.terms.len(), books, created_at })
    }

    fn set_term_posting(&self, term: &str, posting: Posting) -> Result<()> {
        cas_update::<Vec<Posting>, _>(&self.terms, term.as_bytes(), |current| {
            let mut list = current.unwrap_or_default();
            set_posting(&mut list, posting);
            Some(list)
        })
    }

    fn remove_term_posting(&self, term: &str, book_id: BookId) -> Result<()> {
        cas_update::<Vec<Posting>, _>(&self.terms, term.as_bytes(), |current| {
            let mut list = current?;
            remove_posting(&mut list, book_id);
            (!list.is_empty()).then_some(list)
        })
    }
}

fn book_key(book_id: BookId) -> [u8; 4] {
    book_id.to_be_bytes()
}

/// Read-modify-write of one record, retried until the compare-and-swap sees the value it read.
/// `f` maps the current record to the next one; `None` deletes the key. `f` may run more than once.
fn cas_update<T, F>(tree: &Tree, key: &[u8], mut f: F) -> Result<()>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Option<T>,
{
    let mut current = tree.get(key)?;
    loop {
        let decoded = current.as_deref().map(|bytes| bincode::deserialize::<T>(bytes)).transpose()?;
        let next = f(decoded).map(|value| bincode::serialize(&value)).transpose()?;
        if current.is_none() && next.is_none() {
            return Ok(());
        }
        match tree.compare_and_swap(key, current.as_ref(), next)? {
            Ok(()) => return Ok(()),
            Err(CompareAndSwapError { current: actual, .. }) => {
                tracing::trace!(key = %String::from_utf8_lossy(key), "lost compare-and-swap race, retrying");
                current = actual;
            }
        }
    }
}

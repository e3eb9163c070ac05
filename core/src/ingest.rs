//! Concurrent ingestion: fetch, tokenize and count, then flush postings to the store in batches.

use crate::config::IngestConfig;
use crate::error::FetchError;
use crate::index::BookId;
use crate::provider::ContentProvider;
use crate::store::{BookUpdate, IndexStore};
use crate::tokenizer::term_counts;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub book_id: BookId,
    pub not_found: bool,
    pub error: String,
}

impl From<&FetchError> for IngestFailure {
    fn from(e: &FetchError) -> Self {
        Self { book_id: e.book_id(), not_found: e.is_not_found(), error: e.to_string() }
    }
}

/// Per-book outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub requested: usize,
    pub indexed: Vec<BookId>,
    pub failures: Vec<IngestFailure>,
    pub postings_written: usize,
}

type WorkerOutput = (BookId, std::result::Result<BTreeMap<String, u32>, FetchError>);

pub struct Ingestor<P> {
    store: IndexStore,
    provider: Arc<P>,
    config: IngestConfig,
}

impl<P: ContentProvider> Ingestor<P> {
    pub fn new(store: IndexStore, provider: Arc<P>, config: IngestConfig) -> Self {
        Self { store, provider, config }
    }

    /// Ingests every id once. A failed fetch is recorded in the report and the run continues;
    /// only store errors abort it. Re-ingesting a book replaces its previous postings.
    pub async fn ingest<I: IntoIterator<Item = BookId>>(&self, book_ids: I) -> Result<IngestReport> {
        let ids: BTreeSet<BookId> = book_ids.into_iter().collect();
        let mut report = IngestReport { requested: ids.len(), ..IngestReport::default() };
        let concurrency = self.config.concurrency.max(1);
        let mut pending = ids.into_iter();
        let mut inflight: JoinSet<WorkerOutput> = JoinSet::new();
        // a panicked or aborted worker only reports its task id
        let mut workers: HashMap<task::Id, BookId> = HashMap::new();
        let mut batch: Vec<BookUpdate> = Vec::new();
        let mut buffered = 0usize;

        tracing::info!(books = report.requested, concurrency, "ingestion started");
        loop {
            while inflight.len() < concurrency {
                let Some(book_id) = pending.next() else { break };
                let handle = inflight.spawn(fetch_and_count(Arc::clone(&self.provider), book_id, self.config.fetch_timeout));
                workers.insert(handle.id(), book_id);
            }
            let Some(joined) = inflight.join_next_with_id().await else { break };
            match joined {
                Ok((id, (book_id, Ok(terms)))) => {
                    workers.remove(&id);
                    tracing::debug!(book_id, terms = terms.len(), "book tokenized");
                    buffered += terms.len();
                    batch.push(BookUpdate { book_id, terms });
                    if buffered >= self.config.batch_size {
                        self.flush(std::mem::take(&mut batch), &mut report).await?;
                        buffered = 0;
                    }
                }
                Ok((id, (book_id, Err(e)))) => {
                    workers.remove(&id);
                    tracing::warn!(book_id, error = %e, "skipping book");
                    report.failures.push(IngestFailure::from(&e));
                }
                Err(e) => match workers.remove(&e.id()) {
                    Some(book_id) => {
                        tracing::error!(book_id, error = %e, "ingestion worker aborted");
                        report.failures.push(IngestFailure { book_id, not_found: false, error: e.to_string() });
                    }
                    None => tracing::error!(error = %e, "ingestion worker aborted"),
                },
            }
        }
        if !batch.is_empty() {
            self.flush(batch, &mut report).await?;
        }

        report.indexed.sort_unstable();
        report.failures.sort_by_key(|f| f.book_id);
        tracing::info!(
            requested = report.requested,
            indexed = report.indexed.len(),
            failed = report.failures.len(),
            postings = report.postings_written,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn flush(&self, batch: Vec<BookUpdate>, report: &mut IngestReport) -> Result<()> {
        let store = self.store.clone();
        let ids: Vec<BookId> = batch.iter().map(|u| u.book_id).collect();
        let written = tokio::task::spawn_blocking(move || store.apply(&batch)).await??;
        report.indexed.extend(ids);
        report.postings_written += written;
        Ok(())
    }
}

async fn fetch_and_count<P: ContentProvider>(provider: Arc<P>, book_id: BookId, timeout: Duration) -> WorkerOutput {
    let content = match tokio::time::timeout(timeout, provider.fetch_content(book_id)).await {
        Ok(Ok(content)) => content,
        Ok(Err(e)) => return (book_id, Err(e)),
        Err(_) => return (book_id, Err(FetchError::Timeout { book_id, timeout })),
    };
    let counted = tokio::task::spawn_blocking(move || term_counts(&content))
        .await
        .map_err(|e| FetchError::Failed { book_id, reason: format!("tokenizer task failed: {e}") });
    (book_id, counted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Posting;

    struct MapProvider {
        books: HashMap<BookId, String>,
        slow: BTreeSet<BookId>,
    }

    impl ContentProvider for MapProvider {
        async fn fetch_content(&self, book_id: BookId) -> std::result::Result<String, FetchError> {
            if self.slow.contains(&book_id) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.books.get(&book_id).cloned().ok_or(FetchError::NotFound(book_id))
        }
    }

    /// Panics on one book id, as a buggy upstream client might.
    struct PanickingProvider {
        panics_on: BookId,
    }

    impl ContentProvider for PanickingProvider {
        async fn fetch_content(&self, book_id: BookId) -> std::result::Result<String, FetchError> {
            if book_id == self.panics_on {
                panic!("provider blew up on book {book_id}");
            }
            Ok(format!("harpoon chapter{book_id}"))
        }
    }

    fn provider(books: &[(BookId, &str)]) -> Arc<MapProvider> {
        Arc::new(MapProvider {
            books: books.iter().map(|(id, text)| (*id, text.to_string())).collect(),
            slow: BTreeSet::new(),
        })
    }

    #[tokio::test]
    async fn missing_books_are_recorded_and_skipped() {
        let store = IndexStore::temporary().unwrap();
        let ingestor = Ingestor::new(store.clone(), provider(&[(1, "whale whale sea"), (3, "whale")]), IngestConfig::default());
        let report = ingestor.ingest([1, 2, 3]).await.unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.indexed, vec![1, 3]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].book_id, 2);
        assert!(report.failures[0].not_found);
        assert_eq!(
            store.postings("whale").unwrap(),
            vec![Posting { book_id: 1, count: 2 }, Posting { book_id: 3, count: 1 }]
        );
        // "sea" has three characters and survives the filter
        assert_eq!(store.postings("sea").unwrap(), vec![Posting { book_id: 1, count: 1 }]);
    }

    #[tokio::test]
    async fn panicking_worker_is_recorded_as_a_failure() {
        let store = IndexStore::temporary().unwrap();
        let provider = Arc::new(PanickingProvider { panics_on: 2 });
        let report = Ingestor::new(store.clone(), provider, IngestConfig::default()).ingest([1, 2, 3]).await.unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.indexed, vec![1, 3]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].book_id, 2);
        assert!(!report.failures[0].not_found);
        assert_eq!(store.postings("harpoon").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stalled_fetch_times_out_without_blocking_the_batch() {
        let store = IndexStore::temporary().unwrap();
        let mut slow = BTreeSet::new();
        slow.insert(7);
        let provider = Arc::new(MapProvider {
            books: [(7, "kraken".to_string()), (8, "kraken".to_string())].into_iter().collect(),
            slow,
        });
        let config = IngestConfig { fetch_timeout: Duration::from_millis(100), ..IngestConfig::default() };
        let report = Ingestor::new(store.clone(), provider, config).ingest([7, 8]).await.unwrap();

        assert_eq!(report.indexed, vec![8]);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.failures[0].not_found);
        assert_eq!(store.postings("kraken").unwrap(), vec![Posting { book_id: 8, count: 1 }]);
    }

    #[tokio::test]
    async fn reingestion_reflects_only_the_latest_content() {
        let store = IndexStore::temporary().unwrap();
        let first = Ingestor::new(store.clone(), provider(&[(5, "harpoon harpoon harpoon ocean")]), IngestConfig::default());
        first.ingest([5]).await.unwrap();
        first.ingest([5]).await.unwrap();
        assert_eq!(store.postings("harpoon").unwrap(), vec![Posting { book_id: 5, count: 3 }]);

        let second = Ingestor::new(store.clone(), provider(&[(5, "harpoon lantern")]), IngestConfig::default());
        second.ingest([5]).await.unwrap();
        assert_eq!(store.postings("harpoon").unwrap(), vec![Posting { book_id: 5, count: 1 }]);
        assert!(store.postings("ocean").unwrap().is_empty());
        assert_eq!(store.postings("lantern").unwrap(), vec![Posting { book_id: 5, count: 1 }]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_runs_sharing_a_new_term_lose_no_postings() {
        let store = IndexStore::temporary().unwrap();
        let texts: Vec<(BookId, String)> = (0..24).map(|id| (id, format!("leviathan unique{id}"))).collect();
        let books: Vec<(BookId, &str)> = texts.iter().map(|(id, t)| (*id, t.as_str())).collect();
        let config = IngestConfig { batch_size: 1, concurrency: 4, ..IngestConfig::default() };
        let a = Ingestor::new(store.clone(), provider(&books), config.clone());
        let b = Ingestor::new(store.clone(), provider(&books), config);

        let (ra, rb) = tokio::join!(a.ingest((0..24).filter(|id| id % 2 == 0)), b.ingest((0..24).filter(|id| id % 2 == 1)));
        assert_eq!(ra.unwrap().indexed.len() + rb.unwrap().indexed.len(), 24);
        assert_eq!(store.postings("leviathan").unwrap().len(), 24);
    }
}

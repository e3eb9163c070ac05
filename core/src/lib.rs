//! Term index over a corpus of books, ranked by a similarity graph built from shared terms.
//!
//! Write path: [`ingest::Ingestor`] fetches text through a [`provider::ContentProvider`],
//! runs it through [`tokenizer`] and upserts postings into the [`store::IndexStore`].
//! Read path: [`query::QueryEngine`] looks up matching terms, builds a [`graph::SimilarityGraph`]
//! and orders candidates with [`rank`].

pub mod config;
pub mod error;
pub mod graph;
pub mod index;
pub mod ingest;
pub mod provider;
pub mod query;
pub mod rank;
pub mod store;
pub mod tokenizer;

pub use error::{Error, FetchError, Result};
pub use index::{BookId, Posting};

//! Request-scoped search: term matching, candidate collection and the ranking pipeline.

use crate::config::{RankConfig, MAX_PATTERN_LEN, REGEX_SIZE_LIMIT};
use crate::graph::SimilarityGraph;
use crate::index::{BookId, Posting};
use crate::rank;
use crate::store::IndexStore;
use crate::tokenizer::normalize;
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    #[default]
    Substring,
    Regex,
}

/// Predicate over index terms. Constructing one validates the client input, so an invalid
/// query never reaches the store.
#[derive(Debug, Clone)]
pub enum TermMatcher {
    Exact(String),
    Substring(String),
    Pattern(Regex),
}

impl TermMatcher {
    pub fn new(mode: MatchMode, query: &str) -> Result<Self> {
        match mode {
            MatchMode::Exact => Self::exact(query),
            MatchMode::Substring => Self::substring(query),
            MatchMode::Regex => Self::regex(query),
        }
    }

    pub fn exact(query: &str) -> Result<Self> {
        Ok(Self::Exact(normalized_query(query)?))
    }

    pub fn substring(query: &str) -> Result<Self> {
        Ok(Self::Substring(normalized_query(query)?))
    }

    /// Case-insensitive, unanchored regex. The regex engine matches in linear time; pattern
    /// length and compiled size are capped on top of that.
    pub fn regex(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(Error::InvalidQuery("empty pattern".into()));
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(Error::InvalidQuery(format!("pattern longer than {MAX_PATTERN_LEN} bytes")));
        }
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .dfa_size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map(Self::Pattern)
            .map_err(|e| Error::InvalidQuery(e.to_string()))
    }

    pub fn matches(&self, term: &str) -> bool {
        match self {
            Self::Exact(q) => term == q.as_str(),
            Self::Substring(q) => term.contains(q.as_str()),
            Self::Pattern(re) => re.is_match(term),
        }
    }

    pub(crate) fn exact_term(&self) -> Option<&str> {
        match self {
            Self::Exact(q) => Some(q.as_str()),
            _ => None,
        }
    }
}

fn normalized_query(query: &str) -> Result<String> {
    let q = normalize(query.trim());
    if q.is_empty() {
        return Err(Error::InvalidQuery("empty query".into()));
    }
    Ok(q)
}

/// A book reached by at least one matched posting list.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBook {
    pub book_id: BookId,
    pub matched_terms: BTreeSet<String>,
    pub aggregate_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub book_id: BookId,
    pub count: u64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub books: Vec<SearchHit>,
    pub neighbors: Vec<BookId>,
}

/// Inverts matched posting lists into one candidate per book.
pub fn collect_candidates(matches: &[(String, Vec<Posting>)]) -> BTreeMap<BookId, CandidateBook> {
    let mut candidates: BTreeMap<BookId, CandidateBook> = BTreeMap::new();
    for (term, postings) in matches {
        for p in postings {
            let c = candidates.entry(p.book_id).or_insert_with(|| CandidateBook {
                book_id: p.book_id,
                matched_terms: BTreeSet::new(),
                aggregate_count: 0,
            });
            c.matched_terms.insert(term.clone());
            c.aggregate_count += u64::from(p.count);
        }
    }
    candidates
}

pub struct QueryEngine<'a> {
    store: &'a IndexStore,
    config: &'a RankConfig,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a IndexStore, config: &'a RankConfig) -> Self {
        Self { store, config }
    }

    pub fn search(&self, matcher: &TermMatcher) -> Result<SearchResult> {
        self.search_with_cancel(matcher, &AtomicBool::new(false))
    }

    /// Runs the full pipeline. Setting `cancel` stops the ranking loop and yields
    /// [`Error::Cancelled`]; only request-local state is touched.
    pub fn search_with_cancel(&self, matcher: &TermMatcher, cancel: &AtomicBool) -> Result<SearchResult> {
        let matches = self.store.lookup(matcher)?;
        if matches.is_empty() {
            return Ok(SearchResult::default());
        }
        let candidates = collect_candidates(&matches);
        let matched: BTreeMap<String, BTreeSet<BookId>> = matches
            .iter()
            .map(|(term, postings)| (term.clone(), postings.iter().map(|p| p.book_id).collect()))
            .collect();
        let graph = SimilarityGraph::build(&matched);

        let ranking = rank::rank_with_cancel(&graph, self.config, cancel);
        if ranking.cancelled {
            return Err(Error::Cancelled);
        }
        let books = rank::order(candidates.values(), &ranking.scores);
        let top: Vec<BookId> = books.iter().take(self.config.top_k).map(|h| h.book_id).collect();
        let neighbors = rank::expand_neighbors(&graph, &top).into_iter().collect();

        tracing::debug!(
            terms = matches.len(),
            books = books.len(),
            edges = graph.edge_count(),
            iterations = ranking.iterations,
            converged = ranking.converged,
            "search ranked"
        );
        Ok(SearchResult { books, neighbors })
    }
}

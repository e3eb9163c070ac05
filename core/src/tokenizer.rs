use aho_corasick::AhoCorasick;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","ain","all","am","an","and","any","are","aren","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","couldn","couldn't",
            "d","did","didn","didn't","do","does","doesn","doesn't","doing","don","don't","down","during",
            "each","few","for","from","further",
            "had","hadn","hadn't","has","hasn","hasn't","have","haven","haven't","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","isn","isn't","it","it's","its","itself",
            "just","ll","m","ma","me","mightn","mightn't","more","most","mustn","mustn't","my","myself",
            "needn","needn't","no","nor","not","now",
            "o","of","off","on","once","only","or","other","our","ours","ourselves","out","over","own",
            "re","s","same","shan","shan't","she","she's","should","should've","shouldn","shouldn't","so","some","such",
            "t","than","that","that'll","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","wasn","wasn't","we","were","weren","weren't","what","when","where","which","while","who","whom","why","will","with","won","won't","wouldn","wouldn't",
            "y","you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// True when `token` may be stored as a term: more than two word characters and not a stopword.
pub fn is_indexable(token: &str) -> bool {
    token.chars().filter(|c| c.is_alphanumeric() || *c == '_').count() > 2 && !is_stopword(token)
}

/// NFKC-normalized, lowercased copy of `text`. Both tokenizing and counting work on this form.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Distinct indexable terms of `content`.
pub fn tokenize(content: &str) -> BTreeSet<String> {
    terms_of_normalized(&normalize(content))
}

fn terms_of_normalized(normalized: &str) -> BTreeSet<String> {
    RE.find_iter(normalized)
        .map(|m| m.as_str())
        .filter(|t| is_indexable(t))
        .map(str::to_string)
        .collect()
}

/// Case-insensitive substring count of `term` in `content`.
///
/// Counts every non-overlapping occurrence, including inside longer words, so "sea" also
/// counts "season". Ranking only needs relative weights.
pub fn count_occurrences(content: &str, term: &str) -> u32 {
    let needle = normalize(term);
    if needle.is_empty() { return 0; }
    normalize(content).matches(needle.as_str()).count() as u32
}

/// Every indexable term of `content` with its occurrence count, normalizing the text once.
///
/// Counts are non-overlapping substring counts per term, the same as [`count_occurrences`],
/// gathered in a single automaton pass over the text.
pub fn term_counts(content: &str) -> BTreeMap<String, u32> {
    let normalized = normalize(content);
    let terms: Vec<String> = terms_of_normalized(&normalized).into_iter().collect();
    let automaton = match AhoCorasick::new(&terms) {
        Ok(ac) => ac,
        Err(e) => {
            tracing::warn!(error = %e, terms = terms.len(), "automaton build failed, counting term by term");
            return terms
                .into_iter()
                .map(|term| {
                    let count = normalized.matches(term.as_str()).count() as u32;
                    (term, count)
                })
                .collect();
        }
    };

    let mut counts = vec![0u32; terms.len()];
    // end of the last counted match per term; overlapping hits of the same term are skipped
    let mut last_end = vec![0usize; terms.len()];
    for m in automaton.find_overlapping_iter(&normalized) {
        let i = m.pattern().as_usize();
        if m.start() >= last_end[i] {
            counts[i] += 1;
            last_end[i] = m.end();
        }
    }
    terms.into_iter().zip(counts).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Call me Ishmael. Some years ago, never mind how long.");
        assert!(t.contains("ishmael"));
        assert!(t.contains("years"));
        assert!(!t.contains("me"));
        assert!(!t.contains("how"));
    }

    #[test]
    fn substring_counts_overcount_longer_words() {
        assert_eq!(count_occurrences("The sea, the SEA, the season.", "sea"), 3);
        assert_eq!(count_occurrences("nothing here", ""), 0);
    }

    #[test]
    fn term_counts_agree_with_count_occurrences() {
        let text = "Whale! The whale, a WHALE-ship and whalebone.";
        let counts = term_counts(text);
        assert_eq!(counts.get("whale"), Some(&count_occurrences(text, "whale")));
        assert_eq!(counts["whale"], 4);
        assert_eq!(counts["ship"], 1);
    }

    #[test]
    fn self_overlapping_terms_count_like_str_matches() {
        let text = "nanana banana nan ananas";
        let counts = term_counts(text);
        for (term, count) in &counts {
            assert_eq!(*count, count_occurrences(text, term), "term {term}");
        }
        assert_eq!(counts["nanana"], 1);
        assert_eq!(counts["banana"], 1);
        assert_eq!(counts["nan"], 4);
    }
}

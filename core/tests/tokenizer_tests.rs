use bookrank::tokenizer::{is_stopword, tokenize};

#[test]
fn it_lowercases_and_deduplicates() {
    let toks = tokenize("Whale WHALE whale Ahab");
    assert_eq!(toks.into_iter().collect::<Vec<_>>(), vec!["ahab".to_string(), "whale".to_string()]);
}

#[test]
fn it_filters_stopwords_and_short_tokens() {
    let toks = tokenize("The quick brown fox and the lazy dog is on an ox");
    for t in &toks {
        assert!(t.chars().count() > 2, "{t} is too short");
        assert!(!is_stopword(t), "{t} is a stopword");
    }
    assert!(toks.contains("quick"));
    assert!(toks.contains("fox"));
    assert!(!toks.contains("ox"));
    assert!(!toks.contains("the"));
}

#[test]
fn it_keeps_underscores_and_digits_in_tokens() {
    let toks = tokenize("chapter_12 of 1851, vol. II");
    assert!(toks.contains("chapter_12"));
    assert!(toks.contains("1851"));
    assert!(toks.contains("vol"));
    assert!(!toks.contains("ii"));
}

#[test]
fn it_normalizes_compatibility_characters() {
    // U+FB01 LATIN SMALL LIGATURE FI
    let toks = tokenize("\u{FB01}nal chapter");
    assert!(toks.contains("final"));
}

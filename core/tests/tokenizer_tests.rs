use esa_core::tokenizer::{tokenize, Tokenizer, TokenizerConfig};

#[test]
fn it_normalizes_and_lowercases() {
    let words = tokenize("The CAFÉ's menu: «ﬁne» dining!");
    assert_eq!(words, vec!["the", "café's", "menu", "fine", "dining"]);
}

#[test]
fn it_stems_when_enabled() {
    let t = Tokenizer::new(TokenizerConfig { stem: true, remove_stopwords: false });
    let words = t.tokenize("Running Runners RUN!");
    assert!(words.iter().all(|w| w == "run" || w == "runner"));
    assert!(words.contains(&"run".to_string()));
}

#[test]
fn it_filters_stopwords_when_enabled() {
    let t = Tokenizer::new(TokenizerConfig { stem: false, remove_stopwords: true });
    let words = t.tokenize("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(words.contains(&"fox".to_string()));
}

#[test]
fn default_keeps_stopwords() {
    assert!(tokenize("the fox").contains(&"the".to_string()));
}

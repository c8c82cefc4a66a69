use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s'\-]").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenizer settings. Persisted with the model so queries split text the
/// same way the matrix was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub stem: bool,
    pub remove_stopwords: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self { Self { config } }

    pub fn config(&self) -> TokenizerConfig { self.config }

    /// NFKC-normalize, lowercase, drop everything except word characters,
    /// whitespace, apostrophes and hyphens, then split on whitespace.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let cleaned = NON_WORD.replace_all(&normalized, "");
        let mut tokens = Vec::new();
        for token in cleaned.split_whitespace() {
            if self.config.remove_stopwords && is_stopword(token) { continue; }
            if self.config.stem {
                tokens.push(STEMMER.stem(token).into_owned());
            } else {
                tokens.push(token.to_string());
            }
        }
        tokens
    }

    /// Occurrences of each distinct token in `text`.
    pub fn count_terms(&self, text: &str) -> HashMap<String, u32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in self.tokenize(text) {
            *counts.entry(token).or_insert(0) += 1;
        }
        counts
    }
}

/// Tokenize with default settings.
pub fn tokenize(text: &str) -> Vec<String> {
    Tokenizer::default().tokenize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Cats, (dogs) & \"birds\"!");
        assert_eq!(t, vec!["cats", "dogs", "birds"]);
    }

    #[test]
    fn keeps_apostrophes_and_hyphens() {
        let t = tokenize("Don't over-think it");
        assert_eq!(t, vec!["don't", "over-think", "it"]);
    }

    #[test]
    fn punctuation_inside_a_word_is_deleted_not_split() {
        assert_eq!(tokenize("hello,world"), vec!["helloworld"]);
    }

    #[test]
    fn counts_per_distinct_term() {
        let counts = Tokenizer::default().count_terms("cat dog CAT cat");
        assert_eq!(counts.get("cat"), Some(&3));
        assert_eq!(counts.get("dog"), Some(&1));
        assert_eq!(counts.len(), 2);
    }
}

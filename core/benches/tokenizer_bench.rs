use criterion::{criterion_group, criterion_main, Criterion};
use esa_core::tokenizer::{tokenize, Tokenizer, TokenizerConfig};

const TEXT: &str = "Explicit Semantic Analysis represents the meaning of a text as a \
weighted vector of encyclopedia concepts. Each concept's article contributes word \
counts; the word-by-concept matrix is re-weighted with TF-IDF, normalised per word \
and pruned of its long tail. Querying sums the rows of every word in the input, \
so \"The cat sat on the mat\" and \"A feline rested on a rug\" end up comparable.";

fn bench_tokenize(c: &mut Criterion) {
    let text = TEXT.repeat(50);
    c.bench_function("tokenize_plain", |b| b.iter(|| tokenize(&text)));

    let full = Tokenizer::new(TokenizerConfig { stem: true, remove_stopwords: true });
    c.bench_function("count_terms_stem_stopwords", |b| b.iter(|| full.count_terms(&text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);

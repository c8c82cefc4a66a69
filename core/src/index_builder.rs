//! Concept and word id assignment over the link-pruned concept universe.

use crate::corpus::{Corpus, LinkRecord};
use crate::index::{ConceptIndex, IdMap, WordIndex};
use crate::tokenizer::Tokenizer;
use crate::Result;
use std::collections::{BTreeSet, HashMap, HashSet};

pub struct IndexBuilder {
    min_links_in: usize,
    tokenizer: Tokenizer,
    links_in: HashMap<String, HashSet<String>>,
}

impl IndexBuilder {
    pub fn new(min_links_in: usize, tokenizer: Tokenizer) -> Self {
        Self { min_links_in, tokenizer, links_in: HashMap::new() }
    }

    pub fn add_links(&mut self, record: LinkRecord) {
        self.links_in.entry(record.target).or_default().extend(record.sources);
    }

    pub fn add_link_records<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<LinkRecord>>,
    {
        let mut n = 0;
        for record in records {
            self.add_links(record?);
            n += 1;
        }
        Ok(n)
    }

    /// Distinct incoming sources seen so far; zero for unknown concepts.
    pub fn incoming(&self, concept: &str) -> usize {
        self.links_in.get(concept).map_or(0, HashSet::len)
    }

    /// Two passes over `corpus`: the first merges inline `links_in` lists, the
    /// second keeps surviving concepts and collects their vocabulary. Ids are
    /// assigned in sorted key order.
    pub fn build(mut self, corpus: &dyn Corpus) -> Result<(ConceptIndex, WordIndex)> {
        for record in corpus.records()? {
            let record = record?;
            if !record.links_in.is_empty() {
                self.links_in.entry(record.title).or_default().extend(record.links_in);
            }
        }

        let mut concepts: BTreeSet<String> = BTreeSet::new();
        let mut words: BTreeSet<String> = BTreeSet::new();
        let mut dropped = 0usize;
        for record in corpus.records()? {
            let record = record?;
            if self.incoming(&record.title) < self.min_links_in {
                dropped += 1;
                continue;
            }
            words.extend(self.tokenizer.tokenize(&record.text));
            concepts.insert(record.title);
        }
        tracing::info!(
            concepts = concepts.len(),
            words = words.len(),
            dropped,
            min_links_in = self.min_links_in,
            "built concept and word indices"
        );
        Ok((IdMap::from_keys(concepts), IdMap::from_keys(words)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{ConceptRecord, MemoryCorpus};

    #[test]
    fn prunes_by_incoming_links_and_sorts_ids() {
        let mut linked = ConceptRecord::new("Zebra", "stripes grass");
        linked.links_in = vec!["Horse".into()];
        let corpus = MemoryCorpus::new(vec![
            ConceptRecord::new("Horse", "hooves grass"),
            linked,
            ConceptRecord::new("Lonely", "nobody links here"),
        ]);
        let mut builder = IndexBuilder::new(1, Tokenizer::default());
        builder.add_links(LinkRecord { target: "Horse".into(), sources: vec!["Zebra".into(), "Zebra".into()] });
        assert_eq!(builder.incoming("Horse"), 1);
        assert_eq!(builder.incoming("Lonely"), 0);

        let (concepts, words) = builder.build(&corpus).unwrap();
        assert_eq!(concepts.labels(), &["Horse".to_string(), "Zebra".to_string()]);
        assert_eq!(words.labels(), &["grass", "hooves", "stripes"].map(String::from));
        assert_eq!(words.get("nobody"), None);
    }

    #[test]
    fn zero_threshold_keeps_unlinked_concepts() {
        let corpus = MemoryCorpus::new(vec![ConceptRecord::new("Solo", "alone")]);
        let (concepts, words) = IndexBuilder::new(0, Tokenizer::default()).build(&corpus).unwrap();
        assert_eq!(concepts.len(), 1);
        assert_eq!(words.get("alone"), Some(0));
    }
}

//! A small, self-contained BM25 scorer run over a pre-filtered candidate
//! set (spec.md §4.8 step 3: "lexical is approximate over a pre-filtered
//! set"). Not a persisted index — rebuilt fresh per query from whatever
//! candidates the store's filter produced, which is cheap at the sizes
//! `candidate_pool_size` bounds things to.

use std::collections::HashMap;

const K1: f32 = 1.5;
const B: f32 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// A BM25 index built over one query's candidate documents.
pub struct Bm25Index {
    doc_terms: Vec<(String, HashMap<String, u32>, usize)>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl Bm25Index {
    /// Builds an index from `(id, content)` pairs.
    pub fn build(documents: &[(String, String)]) -> Self {
        let mut doc_terms = Vec::with_capacity(documents.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for (id, content) in documents {
            let tokens = tokenize(content);
            total_len += tokens.len();
            let mut counts: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *counts.entry(token.clone()).or_insert(0) += 1;
            }
            for term in counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_terms.push((id.clone(), counts, tokens.len()));
        }

        let avg_doc_len = if doc_terms.is_empty() {
            0.0
        } else {
            total_len as f32 / doc_terms.len() as f32
        };

        Self { doc_terms, doc_freq, avg_doc_len }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_terms.len() as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        // The +0.5/+1.0 smoothing is Robertson-Spärck Jones BM25 idf; it
        // stays non-negative for any df in [0, n].
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Scores every candidate document against `query`, returning
    /// `(id, score)` pairs in no particular order (callers sort/fuse).
    pub fn score(&self, query: &str) -> Vec<(String, f32)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.doc_terms.is_empty() {
            return self.doc_terms.iter().map(|(id, _, _)| (id.clone(), 0.0)).collect();
        }

        self.doc_terms
            .iter()
            .map(|(id, counts, len)| {
                let mut score = 0.0f32;
                for term in &query_terms {
                    let Some(&tf) = counts.get(term) else { continue };
                    let tf = tf as f32;
                    let idf = self.idf(term);
                    let denom = tf + K1 * (1.0 - B + B * (*len as f32) / self.avg_doc_len.max(1.0));
                    score += idf * (tf * (K1 + 1.0)) / denom.max(1e-6);
                }
                (id.clone(), score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_term_match_scores_higher_than_unrelated_document() {
        let docs = vec![
            ("a".to_string(), "fn authenticate(user, password) -> bool".to_string()),
            ("b".to_string(), "fn render_chart(data: Vec<Point>)".to_string()),
        ];
        let index = Bm25Index::build(&docs);
        let scores: HashMap<_, _> = index.score("user authentication").into_iter().collect();
        assert!(scores["a"] > scores["b"]);
    }

    #[test]
    fn empty_query_yields_zero_scores() {
        let docs = vec![("a".to_string(), "some content".to_string())];
        let index = Bm25Index::build(&docs);
        let scores = index.score("   ");
        assert_eq!(scores, vec![("a".to_string(), 0.0)]);
    }

    #[test]
    fn empty_candidate_set_yields_no_scores() {
        let index = Bm25Index::build(&[]);
        assert!(index.score("anything").is_empty());
    }
}

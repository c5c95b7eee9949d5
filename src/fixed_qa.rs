//! Curated fixed answers, matched by fuzzy text similarity.
//!
//! The curated file maps question variants to a canned answer. Matching
//! normalizes away punctuation/whitespace and scores a normalized edit
//! distance, so phrasing noise ("你是谁啊", "你是谁?") still hits the entry.

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FixedEntry {
    pub questions: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
struct FixedAnswersFile {
    #[serde(default)]
    fixed_answers: Vec<FixedEntry>,
}

#[derive(Debug, Clone)]
pub struct FixedMatch {
    pub answer: String,
    pub matched_question: String,
    pub similarity: f64,
}

pub struct FixedAnswerMatcher {
    entries: Vec<FixedEntry>,
    threshold: f64,
}

impl FixedAnswerMatcher {
    /// Load the curated file. A missing or malformed file is not fatal: the
    /// matcher starts empty and every query falls through to the router.
    pub fn load(path: &Path, threshold: f64) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<FixedAnswersFile>(&contents) {
                Ok(file) => {
                    tracing::info!(
                        "loaded {} fixed answer entries from {}",
                        file.fixed_answers.len(),
                        path.display()
                    );
                    file.fixed_answers
                }
                Err(e) => {
                    tracing::error!("failed to parse {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => {
                tracing::warn!("fixed answers file not found: {}", path.display());
                Vec::new()
            }
        };

        Self { entries, threshold }
    }

    pub fn from_entries(entries: Vec<FixedEntry>, threshold: f64) -> Self {
        Self { entries, threshold }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best curated answer for `query`, if any variant reaches the threshold.
    ///
    /// Entries are scanned in file order and a candidate replaces the current
    /// best only on a strictly higher score, so the first entry reaching the
    /// maximum wins.
    pub fn best_match(&self, query: &str) -> Option<FixedMatch> {
        if self.entries.is_empty() {
            return None;
        }

        let cleaned_query = normalize(query);
        let mut best: Option<FixedMatch> = None;
        let mut highest = 0.0f64;

        for entry in &self.entries {
            for question in &entry.questions {
                let similarity = similarity_ratio(&cleaned_query, &normalize(question));
                if similarity > highest {
                    highest = similarity;
                    if similarity >= self.threshold {
                        best = Some(FixedMatch {
                            answer: entry.answer.clone(),
                            matched_question: question.clone(),
                            similarity,
                        });
                    }
                }
            }
        }

        if let Some(found) = &best {
            tracing::info!(
                "query matched fixed answer (question: '{}', similarity: {:.2})",
                found.matched_question,
                found.similarity
            );
        }
        best
    }
}

/// Drop everything but alphanumerics and lowercase the rest. CJK characters
/// are alphanumeric-class, so they pass through unchanged.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized edit-distance similarity in [0, 1]; 1.0 for identical strings
/// (two empty strings included).
fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein(&a_chars, &b_chars);
    1.0 - distance as f64 / max_len as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> FixedAnswerMatcher {
        FixedAnswerMatcher::from_entries(
            vec![
                FixedEntry {
                    questions: vec!["你是谁".to_string(), "自我介绍".to_string()],
                    answer: "我是谢兴".to_string(),
                },
                FixedEntry {
                    questions: vec!["你的爱好是什么".to_string()],
                    answer: "我喜欢写代码和打羽毛球".to_string(),
                },
            ],
            0.7,
        )
    }

    #[test]
    fn close_variant_matches() {
        let found = matcher().best_match("你是谁啊").unwrap();
        assert_eq!(found.answer, "我是谢兴");
        assert_eq!(found.matched_question, "你是谁");
        assert!(found.similarity >= 0.7);
    }

    #[test]
    fn unrelated_query_does_not_match() {
        assert!(matcher().best_match("北京今天天气怎么样").is_none());
    }

    #[test]
    fn normalization_ignores_punctuation_and_whitespace() {
        assert_eq!(normalize("北京,今天天气?"), normalize("北京 今天 天气"));
        assert_eq!(normalize("Hello, World!"), "helloworld");
    }

    #[test]
    fn matching_is_deterministic() {
        let m = matcher();
        let first = m.best_match("你是谁啊").unwrap();
        for _ in 0..5 {
            let again = m.best_match("你是谁啊").unwrap();
            assert_eq!(again.answer, first.answer);
            assert_eq!(again.similarity, first.similarity);
        }
    }

    #[test]
    fn first_entry_wins_on_equal_scores() {
        let m = FixedAnswerMatcher::from_entries(
            vec![
                FixedEntry {
                    questions: vec!["今天吃什么".to_string()],
                    answer: "第一条".to_string(),
                },
                FixedEntry {
                    questions: vec!["今天吃什么".to_string()],
                    answer: "第二条".to_string(),
                },
            ],
            0.7,
        );
        assert_eq!(m.best_match("今天吃什么").unwrap().answer, "第一条");
    }

    #[test]
    fn empty_list_never_matches() {
        let m = FixedAnswerMatcher::from_entries(Vec::new(), 0.7);
        assert!(m.best_match("你是谁").is_none());
    }

    #[test]
    fn levenshtein_basics() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("abc"), &chars("abc")), 0);
        assert_eq!(levenshtein(&chars("abc"), &chars("abd")), 1);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("你是谁啊"), &chars("你是谁")), 1);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let m = FixedAnswerMatcher::load(&dir.path().join("absent.json"), 0.7);
        assert!(m.is_empty());
    }

    #[test]
    fn curated_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixed_answers.json");
        std::fs::write(
            &path,
            r#"{"fixed_answers": [{"questions": ["你是谁"], "answer": "我是谢兴"}]}"#,
        )
        .unwrap();

        let m = FixedAnswerMatcher::load(&path, 0.7);
        assert_eq!(m.best_match("你是谁").unwrap().answer, "我是谢兴");
    }
}

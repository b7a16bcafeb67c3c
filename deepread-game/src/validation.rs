//! Embedding-backed answer validation.
//!
//! The validator never owns its collaborators: an [`Embedder`] turns text into
//! vectors and a [`PassageRetriever`] finds the book passages that ground an
//! answer. Failures of either surface as [`ValidationError`]; an empty
//! retrieval result is an ordinary failed [`ValidationResult`].
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    CLASSIFICATION_ACCEPT_ABOVE, CLOZE_BLANK, CLOZE_CLOSE_CREDIT, CLOZE_EXACT_CREDIT,
    CLOZE_MIN_WORD_CHARS, CLOZE_PARTIAL_CREDIT, CLOZE_QUERY, CRITIQUE_ACCEPT_ABOVE,
    HINT_CONTEXT_CHARS, HINT_FOCUS_CHARS, MATCHED_CONCEPT_ABOVE, MIN_ARGUMENT_PREMISES,
    RETRIEVAL_TOP_K, TERM_ACCEPT_ABOVE, UNITY_ACCEPT_ABOVE, UNITY_MAX_WORDS, UNITY_MIN_WORDS,
    VERDICT_PARTIAL_ABOVE, VERDICT_VALID_ABOVE, VERIFICATION_PASS_SCORE,
};
use crate::data::{Book, CritiqueKind, RetrievedPassage, TocEntry};
use crate::numbers::{similarity_to_percent, usize_to_f64};
use crate::{Embedder, PassageRetriever};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] BoxedSource),
    #[error("passage retrieval failed: {0}")]
    Retrieval(#[source] BoxedSource),
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Cosine similarity of two vectors. A zero-length vector scores 0.
///
/// # Errors
///
/// Returns [`ValidationError::DimensionMismatch`] when the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, ValidationError> {
    if a.len() != b.len() {
        return Err(ValidationError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Partial,
    Invalid,
}

impl Verdict {
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score > VERDICT_VALID_ABOVE {
            Self::Valid
        } else if score > VERDICT_PARTIAL_ABOVE {
            Self::Partial
        } else {
            Self::Invalid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub score: f32,
    pub verdict: Verdict,
}

impl Similarity {
    #[must_use]
    pub fn new(score: f32) -> Self {
        Self {
            score,
            verdict: Verdict::from_score(score),
        }
    }
}

/// Verdict for an answer against the best passage in a book's index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMatch {
    pub score: f32,
    pub verdict: Verdict,
    pub best_match: Option<RetrievedPassage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub score: u8,
    pub feedback: String,
    #[serde(default)]
    pub matched_concepts: Vec<String>,
    #[serde(default)]
    pub missed_concepts: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl ValidationResult {
    fn rejected(feedback: &str, hint: &str) -> Self {
        Self {
            valid: false,
            score: 0,
            feedback: feedback.to_string(),
            hints: vec![hint.to_string()],
            ..Self::default()
        }
    }

    fn scored(valid: bool, score: f32, feedback: &str, hint: impl Into<String>) -> Self {
        Self {
            valid,
            score: similarity_to_percent(score),
            feedback: feedback.to_string(),
            hints: vec![hint.into()],
            ..Self::default()
        }
    }
}

/// Fill-in-the-blank question cut from a retrieved passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationQuestion {
    pub question: String,
    pub expected_answer: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub score: f64,
    pub threshold: f64,
    pub feedback: String,
    pub hints: Vec<String>,
}

fn preview(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn feedback_message(verdict: Verdict, percent: u8) -> String {
    match verdict {
        Verdict::Valid => format!("Excellent! (Score: {percent})"),
        Verdict::Partial => format!("Close, but needs more detail. (Score: {percent})"),
        Verdict::Invalid => format!("Not quite. Try reading the section again. (Score: {percent})"),
    }
}

/// Hints escalating with the attempt count, or anchored on a known passage.
#[must_use]
pub fn generate_hints(attempts: usize, best_match: Option<&RetrievedPassage>) -> Vec<String> {
    const BASIC: [&str; 2] = ["Read the text carefully again.", "Think about the keywords."];

    match best_match {
        Some(passage) => std::iter::once(format!(
            "Focus on this section: \"...{}...\"",
            preview(&passage.text, HINT_FOCUS_CHARS)
        ))
        .chain(BASIC.iter().map(ToString::to_string))
        .collect(),
        None => BASIC
            .iter()
            .take(attempts.saturating_add(1))
            .map(ToString::to_string)
            .collect(),
    }
}

fn is_cloze_candidate(word: &str) -> bool {
    word.chars().count() > CLOZE_MIN_WORD_CHARS && word.chars().all(|c| c.is_ascii_alphabetic())
}

/// Whitespace-separated words with their byte offsets.
fn word_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, &text[s..]));
    }
    spans
}

/// Blank one randomly chosen candidate word. Returns the blanked text and
/// the removed word, or `None` when no word qualifies.
fn blank_one_word<G: Rng + ?Sized>(text: &str, rng: &mut G) -> Option<(String, String)> {
    let candidates: Vec<(usize, &str)> = word_spans(text)
        .into_iter()
        .filter(|(_, word)| is_cloze_candidate(word))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let (start, word) = candidates[rng.gen_range(0..candidates.len())];
    let end = start + word.len();
    let blanked = format!("{}{CLOZE_BLANK}{}", &text[..start], &text[end..]);
    Some((blanked, word.to_string()))
}

/// Scores reader answers with the injected collaborators.
pub struct AnswerValidator<'a, E, R> {
    embedder: &'a E,
    retriever: &'a R,
}

impl<'a, E, R> AnswerValidator<'a, E, R>
where
    E: Embedder,
    R: PassageRetriever,
{
    pub const fn new(embedder: &'a E, retriever: &'a R) -> Self {
        Self {
            embedder,
            retriever,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ValidationError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|err| ValidationError::Embedding(Box::new(err)))
    }

    async fn search(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, ValidationError> {
        self.retriever
            .search_top_k(book_id, query, k)
            .await
            .map_err(|err| ValidationError::Retrieval(Box::new(err)))
    }

    /// Similarity and verdict between an answer and a reference text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the vectors disagree in size.
    pub async fn compute_similarity(
        &self,
        answer: &str,
        reference: &str,
    ) -> Result<Similarity, ValidationError> {
        let a = self.embed(answer).await?;
        let b = self.embed(reference).await?;
        Ok(Similarity::new(cosine_similarity(&a, &b)?))
    }

    /// Score an answer against the best of the top `k` passages in a book.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn validate_against_index(
        &self,
        book_id: &str,
        answer: &str,
        k: usize,
    ) -> Result<IndexMatch, ValidationError> {
        let passages = self.search(book_id, answer, k).await?;
        let best = passages
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));
        Ok(match best {
            Some(passage) => IndexMatch {
                score: passage.score,
                verdict: Verdict::from_score(passage.score),
                best_match: Some(passage),
            },
            None => IndexMatch {
                score: 0.0,
                verdict: Verdict::Invalid,
                best_match: None,
            },
        })
    }

    /// Generic answer check against a reference text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails.
    pub async fn validate_answer(
        &self,
        answer: &str,
        reference: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let similarity = self.compute_similarity(answer, reference).await?;
        let score = similarity.score;
        let percent = similarity_to_percent(score);
        Ok(ValidationResult {
            valid: similarity.verdict == Verdict::Valid,
            score: percent,
            feedback: feedback_message(similarity.verdict, percent),
            matched_concepts: if score > MATCHED_CONCEPT_ABOVE {
                vec!["Key concepts matched".to_string()]
            } else {
                Vec::new()
            },
            missed_concepts: if score < MATCHED_CONCEPT_ABOVE {
                vec!["Key concepts missing".to_string()]
            } else {
                Vec::new()
            },
            hints: if score < VERDICT_VALID_ABOVE {
                vec![
                    "Try to be more specific.".to_string(),
                    "Relate back to the text.".to_string(),
                ]
            } else {
                Vec::new()
            },
        })
    }

    /// # Errors
    ///
    /// Returns an error if embedding fails.
    pub async fn validate_book_classification(
        &self,
        classification: &str,
        book: &Book,
    ) -> Result<ValidationResult, ValidationError> {
        let similarity = self
            .compute_similarity(classification, &book.reference_text())
            .await?;
        let valid = similarity.score > CLASSIFICATION_ACCEPT_ABOVE;
        Ok(ValidationResult::scored(
            valid,
            similarity.score,
            if valid {
                "Classification accepted."
            } else {
                "Ensure your classification matches the book's subject matter."
            },
            "Consider the main theme and genre of the book.",
        ))
    }

    /// Length is checked before any embedding call.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails.
    pub async fn validate_unity_statement(
        &self,
        statement: &str,
        book: &Book,
        toc: &[TocEntry],
    ) -> Result<ValidationResult, ValidationError> {
        let words = statement.split_whitespace().count();
        if !(UNITY_MIN_WORDS..=UNITY_MAX_WORDS).contains(&words) {
            return Ok(ValidationResult::rejected(
                "Length requirement not met (aim for 10-80 words).",
                "Keep it concise but comprehensive.",
            ));
        }

        let toc_summary = toc
            .iter()
            .map(|entry| entry.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let reference = format!(
            "{}. {}. {toc_summary}",
            book.title,
            book.description.as_deref().unwrap_or_default()
        );
        let similarity = self.compute_similarity(statement, &reference).await?;
        let valid = similarity.score > UNITY_ACCEPT_ABOVE;
        Ok(ValidationResult::scored(
            valid,
            similarity.score,
            if valid {
                "Good summary of the whole."
            } else {
                "Your statement doesn't seem to cover the book's full scope."
            },
            "Include the major parts listed in the Table of Contents.",
        ))
    }

    /// Compare a definition against the passage where the term is used.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or embedding fails.
    pub async fn validate_term_definition(
        &self,
        term: &str,
        definition: &str,
        book_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let passages = self.search(book_id, term, RETRIEVAL_TOP_K).await?;
        let Some(best) = passages.first() else {
            return Ok(ValidationResult::rejected(
                "Term not found in our index.",
                "Are you sure this term appears in the book?",
            ));
        };

        let similarity = self.compute_similarity(definition, &best.text).await?;
        let valid = similarity.score > TERM_ACCEPT_ABOVE;
        Ok(ValidationResult::scored(
            valid,
            similarity.score,
            if valid {
                "Definition aligns with context."
            } else {
                "Your definition doesn't fit how the author uses this term."
            },
            format!(
                "The term appears in contexts like: \"...{}...\"",
                preview(&best.text, HINT_CONTEXT_CHARS)
            ),
        ))
    }

    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn validate_proposition(
        &self,
        proposition: &str,
        book_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let found = self
            .validate_against_index(book_id, proposition, RETRIEVAL_TOP_K)
            .await?;
        let valid = found.verdict != Verdict::Invalid;
        Ok(ValidationResult::scored(
            valid,
            found.score,
            if valid {
                "Proposition verified in text."
            } else {
                "Couldn't find support for this proposition in the text."
            },
            "Ensure you are paraphrasing an actual sentence from the book.",
        ))
    }

    /// Conclusion support is checked before premise count.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn validate_argument_chain(
        &self,
        premise_ids: &[String],
        conclusion: &str,
        book_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let found = self
            .validate_against_index(book_id, conclusion, RETRIEVAL_TOP_K)
            .await?;
        if found.verdict == Verdict::Invalid {
            return Ok(ValidationResult::scored(
                false,
                found.score,
                "Conclusion not supported by the text.",
                "The conclusion must be grounded in the book's content.",
            ));
        }
        if premise_ids.len() < MIN_ARGUMENT_PREMISES {
            return Ok(ValidationResult::rejected(
                "An argument needs at least 2 premises.",
                "Add more premises.",
            ));
        }
        Ok(ValidationResult {
            valid: true,
            score: similarity_to_percent(found.score),
            feedback: "Argument chain accepted (based on textual support).".to_string(),
            ..ValidationResult::default()
        })
    }

    /// A critique is only heard once understanding has been verified.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn validate_critique(
        &self,
        kind: CritiqueKind,
        evidence: &str,
        understanding_verified: bool,
        book_id: &str,
    ) -> Result<ValidationResult, ValidationError> {
        if !understanding_verified {
            return Ok(ValidationResult::rejected(
                "You must verify your understanding before critiquing.",
                "Complete the Understanding Verification first.",
            ));
        }

        let found = self
            .validate_against_index(book_id, evidence, RETRIEVAL_TOP_K)
            .await?;
        let valid = found.score > CRITIQUE_ACCEPT_ABOVE;
        log::debug!("critique kind={kind} relevance={:.3}", found.score);
        Ok(ValidationResult::scored(
            valid,
            found.score,
            if valid {
                "Critique recorded."
            } else {
                "Your evidence doesn't seem relevant to the book's content."
            },
            "Cite specific passages or concepts from the book.",
        ))
    }

    /// Cloze questions cut from passages retrieved for a generic query.
    ///
    /// Passages without a usable word are skipped, so fewer than `count`
    /// questions may come back.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn generate_verification_questions<G: Rng + ?Sized>(
        &self,
        book_id: &str,
        count: usize,
        rng: &mut G,
    ) -> Result<Vec<VerificationQuestion>, ValidationError> {
        let passages = self
            .search(book_id, CLOZE_QUERY, count.saturating_mul(2))
            .await?;

        let mut questions = Vec::with_capacity(count);
        for passage in passages {
            if questions.len() >= count {
                break;
            }
            let Some((blanked, target)) = blank_one_word(&passage.text, rng) else {
                continue;
            };
            questions.push(VerificationQuestion {
                question: format!("Complete this sentence from the text:\n\n\"{blanked}\""),
                expected_answer: target,
                context: passage.text.clone(),
            });
        }
        Ok(questions)
    }

    /// Average the per-question credit; an empty question set fails.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails.
    pub async fn evaluate_understanding_verification(
        &self,
        questions: &[VerificationQuestion],
        answers: &[String],
    ) -> Result<VerificationReport, ValidationError> {
        if questions.is_empty() {
            return Ok(VerificationReport::failed(0.0));
        }

        let mut total = 0.0;
        for (idx, question) in questions.iter().enumerate() {
            let Some(answer) = answers.get(idx) else {
                continue;
            };
            if answer.trim().eq_ignore_ascii_case(question.expected_answer.trim()) {
                total += CLOZE_EXACT_CREDIT;
                continue;
            }
            let similarity = self
                .compute_similarity(answer, &question.expected_answer)
                .await?;
            total += match similarity.verdict {
                Verdict::Valid => CLOZE_CLOSE_CREDIT,
                Verdict::Partial => CLOZE_PARTIAL_CREDIT,
                Verdict::Invalid => 0.0,
            };
        }

        let score = total / usize_to_f64(questions.len());
        if score >= VERIFICATION_PASS_SCORE {
            Ok(VerificationReport {
                passed: true,
                score,
                threshold: VERIFICATION_PASS_SCORE,
                feedback: "Understanding verified.".to_string(),
                hints: Vec::new(),
            })
        } else {
            Ok(VerificationReport::failed(score))
        }
    }
}

impl VerificationReport {
    fn failed(score: f64) -> Self {
        Self {
            passed: false,
            score,
            threshold: VERIFICATION_PASS_SCORE,
            feedback: "Please review the section.".to_string(),
            hints: vec!["Pay attention to specific terms used in the text.".to_string()],
        }
    }
}

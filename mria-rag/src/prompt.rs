//! Grounded prompt assembly.
//!
//! [`PromptAssembler`] turns a [`RetrievalResult`] and the user's question
//! into a single prompt string for the generator. Context blocks appear in
//! retrieval order, each delimited and numbered, followed by the question
//! and an instruction to answer only from that context.
//!
//! When there is no context (nothing retrieved, or nothing fits the budget)
//! the prompt says so explicitly and tells the model not to invent grounding.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::retriever::RetrievalResult;

/// Default persona line placed at the top of every prompt.
pub const DEFAULT_INSTRUCTION: &str = "You are MRIA, an assistant that answers questions \
about the user's own uploaded documents.";

const NO_CONTEXT_NOTICE: &str = "No relevant context was found in the user's documents for \
this question. Do not fabricate facts, quotes or sources. Tell the user that their documents \
do not cover the question; you may offer general knowledge only if you clearly label it as \
not coming from their documents.";

const GROUNDING_RULE: &str = "Answer using only the context above. If the context does not \
contain the answer, say that you do not know.";

/// A prompt ready for the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    /// The prompt text.
    pub text: String,
    /// Number of retrieved chunks included as context.
    pub included: usize,
    /// Number of lowest-scoring chunks dropped to meet the budget.
    pub dropped: usize,
}

impl AssembledPrompt {
    /// Whether any context made it into the prompt.
    pub fn is_grounded(&self) -> bool {
        self.included > 0
    }
}

/// Builds bounded, grounded prompts.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_prompt_chars: usize,
    instruction: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(12_000)
    }
}

impl PromptAssembler {
    /// Create an assembler whose prompts never exceed `max_prompt_chars`
    /// characters.
    pub fn new(max_prompt_chars: usize) -> Self {
        Self { max_prompt_chars, instruction: DEFAULT_INSTRUCTION.to_string() }
    }

    /// Replace the persona line.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    /// Assemble a prompt for `query` from `retrieved`.
    ///
    /// Chunks keep their retrieval order. If the full prompt would exceed
    /// the budget, chunks are dropped from the end (lowest score first)
    /// until it fits.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if the query is blank or if the
    /// prompt does not fit the budget even without any context.
    pub fn assemble(&self, retrieved: &RetrievalResult, query: &str) -> Result<AssembledPrompt> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidArgument("query must not be empty".into()));
        }

        let fallback = self.ungrounded(query);
        let fallback_len = fallback.chars().count();
        if fallback_len > self.max_prompt_chars {
            return Err(RagError::InvalidArgument(format!(
                "query does not fit the prompt budget: {fallback_len} > {} chars",
                self.max_prompt_chars
            )));
        }

        let blocks: Vec<String> = retrieved
            .iter()
            .enumerate()
            .map(|(i, chunk)| context_block(i + 1, chunk.score, &chunk.text))
            .collect();

        let frame_len = self.grounded(&[], query).chars().count();
        let mut total = frame_len;
        let mut included = 0;
        for block in &blocks {
            let len = block.chars().count();
            if total + len > self.max_prompt_chars {
                break;
            }
            total += len;
            included += 1;
        }
        let dropped = blocks.len() - included;

        if dropped > 0 {
            warn!(included, dropped, budget = self.max_prompt_chars, "dropped context for budget");
        }

        if included == 0 {
            debug!(retrieved = blocks.len(), "assembling prompt without context");
            return Ok(AssembledPrompt { text: fallback, included: 0, dropped });
        }

        let text = self.grounded(&blocks[..included], query);
        debug!(included, prompt_chars = total, "assembled grounded prompt");
        Ok(AssembledPrompt { text, included, dropped })
    }

    fn grounded(&self, blocks: &[String], query: &str) -> String {
        let mut text = String::with_capacity(self.instruction.len() + query.len() + 256);
        text.push_str(&self.instruction);
        text.push_str("\n\nContext:\n");
        for block in blocks {
            text.push_str(block);
        }
        text.push_str("\nQuestion: ");
        text.push_str(query);
        text.push_str("\n\n");
        text.push_str(GROUNDING_RULE);
        text
    }

    fn ungrounded(&self, query: &str) -> String {
        format!("{}\n\n{NO_CONTEXT_NOTICE}\n\nQuestion: {query}", self.instruction)
    }
}

fn context_block(number: usize, score: f32, text: &str) -> String {
    format!("<<<context {number} (score {score:.3})>>>\n{text}\n<<<end context {number}>>>\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::RetrievedChunk;

    fn result(texts: &[(&str, f32)]) -> RetrievalResult {
        RetrievalResult::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, (text, score))| RetrievedChunk {
                    text: text.to_string(),
                    score: *score,
                    document_id: "doc".into(),
                    chunk_index: i,
                })
                .collect(),
        )
    }

    #[test]
    fn empty_result_states_no_context() {
        let prompt = PromptAssembler::default().assemble(&RetrievalResult::empty(), "What is X?");
        let prompt = prompt.unwrap();
        assert!(prompt.text.contains("No relevant context was found"));
        assert!(prompt.text.contains("Do not fabricate"));
        assert!(prompt.text.contains("What is X?"));
        assert!(!prompt.is_grounded());
    }

    #[test]
    fn blocks_follow_retrieval_order() {
        let retrieved = result(&[("second", 0.4), ("first", 0.9)]);
        let prompt = PromptAssembler::default().assemble(&retrieved, "q").unwrap();
        let first = prompt.text.find("first").unwrap();
        let second = prompt.text.find("second").unwrap();
        assert!(first < second);
        assert!(prompt.text.contains("<<<context 1 (score 0.900)>>>"));
        assert!(prompt.text.contains(GROUNDING_RULE));
        assert_eq!(prompt.included, 2);
    }

    #[test]
    fn lowest_scores_are_dropped_to_fit_budget() {
        let retrieved = result(&[("a".repeat(100).as_str(), 0.9), ("b".repeat(100).as_str(), 0.1)]);
        let assembler = PromptAssembler::new(0);
        let frame = assembler.grounded(&[], "q").chars().count();
        let one_block = context_block(1, 0.9, &"a".repeat(100)).chars().count();

        let assembler = PromptAssembler::new(frame + one_block + 10);
        let prompt = assembler.assemble(&retrieved, "q").unwrap();
        assert_eq!((prompt.included, prompt.dropped), (1, 1));
        assert!(prompt.text.contains(&"a".repeat(100)));
        assert!(!prompt.text.contains(&"b".repeat(100)));
        assert!(prompt.text.chars().count() <= assembler.max_prompt_chars());
    }

    #[test]
    fn everything_dropped_falls_back_to_no_context() {
        let retrieved = result(&[("x".repeat(500).as_str(), 0.9)]);
        let prompt = PromptAssembler::new(400).assemble(&retrieved, "q").unwrap();
        assert_eq!((prompt.included, prompt.dropped), (0, 1));
        assert!(prompt.text.contains("No relevant context was found"));
    }

    #[test]
    fn oversized_query_is_rejected() {
        let err = PromptAssembler::new(50).assemble(&RetrievalResult::empty(), "q").unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert!(PromptAssembler::default().assemble(&RetrievalResult::empty(), "  ").is_err());
    }
}

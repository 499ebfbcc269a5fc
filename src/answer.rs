//! Retrieval-grounded question answering.
//!
//! Pipeline: spell-correct the query, retrieve top-k chunks through the
//! vector index, compute a retrieval confidence score, then ask the
//! generative model to answer strictly from the retrieved context. When the
//! model declines (no-information reply) the confidence and citations are
//! zeroed so the caller never presents sources for an answer that used none.

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Config;
use crate::llm::{GenerateOptions, LlmClient};
use crate::models::{AnswerResponse, RetrievedChunk, SourceSnippet};
use crate::spell::SpellCorrector;
use crate::store::VectorIndex;

const SNIPPET_CHARS: usize = 300;

/// Replies that mean the model found nothing in the provided context. Matched
/// case-insensitively as substrings of the model output.
const NO_INFO_PHRASES: &[&str] = &[
    "no relevant information",
    "i don't have information",
    "i do not have information",
    "not mentioned in the provided",
    "cannot find information",
    "no information available",
    "the provided documents do not",
    "the context does not contain",
];

pub struct AnswerEngine<'a> {
    config: &'a Config,
    index: &'a dyn VectorIndex,
    llm: &'a LlmClient,
    spell: Option<&'a SpellCorrector>,
}

impl<'a> AnswerEngine<'a> {
    pub fn new(
        config: &'a Config,
        index: &'a dyn VectorIndex,
        llm: &'a LlmClient,
        spell: Option<&'a SpellCorrector>,
    ) -> Self {
        Self {
            config,
            index,
            llm,
            spell,
        }
    }

    pub async fn ask(&self, query: &str, top_k: usize) -> Result<AnswerResponse> {
        let query = match self.spell {
            Some(corrector) => {
                let corrected = corrector.correct(query);
                for c in &corrected.corrections {
                    info!(
                        original = c.original.as_str(),
                        corrected = c.corrected.as_str(),
                        confidence = c.confidence,
                        "query term corrected"
                    );
                }
                corrected.text
            }
            None => query.to_string(),
        };

        let chunks = self.index.query(&query, top_k).await?;
        debug!(retrieved = chunks.len(), "retrieval complete");

        if chunks.is_empty() {
            return Ok(AnswerResponse {
                answer: "No matching documents were found for this question.".to_string(),
                sources: Vec::new(),
                confidence: 0,
                snippets: Vec::new(),
            });
        }

        let confidence = compute_confidence(&chunks);
        let snippets = build_snippets(&chunks);
        let sources = cited_filenames(&chunks);

        if !self.llm.is_enabled() {
            return Ok(AnswerResponse {
                answer: "No generative model is configured; showing the matching passages instead."
                    .to_string(),
                sources,
                confidence,
                snippets,
            });
        }
        if !self.llm.available().await {
            return Ok(AnswerResponse {
                answer:
                    "The generative model is unreachable; showing the matching passages instead."
                        .to_string(),
                sources,
                confidence,
                snippets,
            });
        }

        let prompt = build_prompt(&query, &chunks);
        let options = GenerateOptions {
            temperature: self.config.llm.answer_temperature,
            max_tokens: self.config.llm.answer_max_tokens,
            context_window: self.config.llm.context_window,
        };
        let answer = self.llm.generate(&prompt, &options).await?;

        if is_no_info_answer(&answer) {
            // The model used none of the context: drop citations so the
            // response does not imply grounding that never happened.
            return Ok(AnswerResponse {
                answer,
                sources: Vec::new(),
                confidence: 0,
                snippets: Vec::new(),
            });
        }

        Ok(AnswerResponse {
            answer,
            sources,
            confidence,
            snippets,
        })
    }
}

/// Blend of three retrieval signals, as an integer percentage:
/// average similarity (40%), result-count saturation at five (30%),
/// and average distance folded to `[0, 1]` (30%).
pub fn compute_confidence(chunks: &[RetrievedChunk]) -> u8 {
    if chunks.is_empty() {
        return 0;
    }

    let n = chunks.len() as f64;
    let avg_sim = chunks.iter().map(|c| c.similarity).sum::<f64>() / n;
    let avg_dist = chunks.iter().map(|c| c.distance).sum::<f64>() / n;

    let count_factor = (n / 5.0).min(1.0);
    let distance_factor = (1.0 - avg_dist / 2.0).clamp(0.0, 1.0);

    let score = 0.4 * avg_sim + 0.3 * count_factor + 0.3 * distance_factor;
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}

fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let mut context = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        context.push_str(&format!(
            "[Source {}: {}]\n{}\n\n",
            i + 1,
            chunk.filename,
            chunk.text
        ));
    }

    format!(
        "Answer the question using only the sources below. Cite sources as [Source N]. \
         If the sources do not contain the answer, reply exactly: \
         \"No relevant information was found in the documents.\"\n\n\
         Sources:\n{}Question: {}\n\nAnswer:",
        context, query
    )
}

fn is_no_info_answer(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    NO_INFO_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn build_snippets(chunks: &[RetrievedChunk]) -> Vec<SourceSnippet> {
    chunks
        .iter()
        .map(|chunk| {
            let text: String = chunk.text.chars().take(SNIPPET_CHARS).collect();
            SourceSnippet {
                filename: chunk.filename.clone(),
                category: chunk.category.clone(),
                text,
                relevance_pct: (chunk.similarity * 100.0).round().clamp(0.0, 100.0) as u8,
            }
        })
        .collect()
}

/// Cited filenames in retrieval order, deduplicated.
fn cited_filenames(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut sources = Vec::new();
    for chunk in chunks {
        if !sources.contains(&chunk.filename) {
            sources.push(chunk.filename.clone());
        }
    }
    sources
}

// Response synthesis
// Prompt composition from retrieved chunks and the generation service seam


use anyhow::Result;
use async_trait::async_trait;

/// Produces an answer for a fully composed prompt
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

const CONTEXT_DIVIDER: &str = "---------------------";

/// Build the question-answering prompt, putting every retrieved chunk into one context block
#[inline]
pub fn compose_prompt<S: AsRef<str>>(query: &str, context_chunks: &[S]) -> String {
    let context = context_chunks
        .iter()
        .map(|chunk| chunk.as_ref().trim())
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n{divider}\n{context}\n{divider}\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {query}\nAnswer: ",
        divider = CONTEXT_DIVIDER,
        context = context,
        query = query.trim(),
    )
}

/// The context block of a prompt built by [`compose_prompt`]
#[inline]
pub fn prompt_context(prompt: &str) -> Option<&str> {
    let (_, rest) = prompt.split_once(CONTEXT_DIVIDER)?;
    let (context, _) = rest.split_once(CONTEXT_DIVIDER)?;
    Some(context.trim_matches('\n'))
}

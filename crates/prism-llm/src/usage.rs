//! Token usage estimates
//!
//! Flattened-prompt backends do not report usage, so counts are estimated
//! locally with the `o200k_base` encoding.

use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, o200k_base};

use crate::types::Usage;

static ENCODING: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Estimate the token count of `text`
///
/// Falls back to one token per four bytes when the encoding cannot load.
pub fn estimate_tokens(text: &str) -> usize {
    ENCODING
        .get_or_init(|| o200k_base().ok())
        .as_ref()
        .map_or_else(|| text.len() / 4, |bpe| bpe.encode_with_special_tokens(text).len())
}

impl Usage {
    /// Estimated usage for a prompt and its completion
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = saturate(estimate_tokens(prompt));
        let completion_tokens = saturate(estimate_tokens(completion));

        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

//! cl100k_base token decoding.
//!
//! Clients following the OpenAI SDK conventions may submit embedding input
//! pre-tokenized with cl100k_base. The backend only accepts text, so those
//! token sequences are decoded back to the original string first.

use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;

use crate::error::{LlmError, LlmResult};

static CL100K_BASE: LazyLock<CoreBPE> =
    LazyLock::new(|| tiktoken_rs::cl100k_base().expect("Failed to load cl100k_base tokenizer"));

/// Decode a cl100k_base token sequence back to text.
pub(crate) fn decode(tokens: &[u32]) -> LlmResult<String> {
    CL100K_BASE
        .decode(tokens.to_vec())
        .map_err(|e| LlmError::BadRequest(format!("Invalid cl100k_base token sequence: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hello_world() {
        assert_eq!(decode(&[15339, 1917]).unwrap(), "hello world");
    }

    #[test]
    fn round_trips_through_the_encoder() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let tokens = CL100K_BASE.encode_with_special_tokens(text);

        assert_eq!(decode(&tokens).unwrap(), text);
    }
}

#![cfg_attr(doc, forbid(broken_intra_doc_links, private_intra_doc_links))]
//! A pretrained tokenizer behind a small, uniform interface.
//!
//! The [`TokenizerAdapter`] loads a tokenizer by name, encodes batches of sequences into token
//! ids, decodes token ids back into sequences and detects the end-of-sequence token. Token ids are
//! exchanged as [`NumericBuffer`]s, which are copied to and from the [`ExternalArray`]s of the
//! tokenizer backend without any transformation of the values.
//!
//! ```no_run
//! use hub_tokenizer::TokenizerAdapter;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokenizer = TokenizerAdapter::new("gpt2")?;
//!
//!     let token_ids = tokenizer.encode(&["hello world"])?;
//!     assert_eq!(token_ids.shape()[0], 1);
//!
//!     let sequences = tokenizer.decode(&token_ids)?;
//!     assert_eq!(sequences, ["hello world"]);
//!
//!     let last = token_ids.as_slice()[token_ids.len() - 1];
//!     let _ = tokenizer.is_end_of_text(last)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The huggingface binding is the default backend. Other tokenizer libraries can be plugged in by
//! implementing [`TokenizerLoader`] and [`TokenizerBackend`].

mod adapter;
mod array;
mod backend;
mod buffer;
mod config;
mod huggingface;

pub use crate::{
    adapter::{
        AttentionMasks,
        DecodeError,
        EncodeError,
        Encodings,
        QueryError,
        TokenIds,
        TokenizerAdapter,
    },
    array::{ArrayDtype, ConversionError, ExternalArray, UnsupportedDtypeError},
    backend::{
        BackendError,
        BatchEncoding,
        LoadError,
        TokenizerBackend,
        TokenizerLoader,
        ATTENTION_MASK,
        INPUT_IDS,
    },
    buffer::{BufferError, Dtype, Element, NumericBuffer},
    config::{ConfigurationError, PaddingPolicy, TokenizerConfig},
    huggingface::{HfTokenizer, HubClient, TokenizerMetadata, TOKENIZER_CONFIG_FILE, TOKENIZER_FILE},
};

/// Re-export of the array library of [`ExternalArray`].
pub use ndarray;

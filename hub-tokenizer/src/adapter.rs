use derive_more::{Deref, From};
use displaydoc::Display;
use thiserror::Error;

use crate::{
    array::{ConversionError, ExternalArray, UnsupportedDtypeError},
    backend::{
        BackendError,
        LoadError,
        TokenizerBackend,
        TokenizerLoader,
        ATTENTION_MASK,
        INPUT_IDS,
    },
    buffer::{Element, NumericBuffer},
    config::TokenizerConfig,
    huggingface::{HfTokenizer, HubClient},
};

/// The potential errors of querying the tokenizer.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The tokenizer has no end-of-sequence token
    MissingEos,
}

/// The potential errors of encoding sequences.
#[derive(Debug, Display, Error)]
pub enum EncodeError {
    /// Failed to tokenize the sequences: {0}
    Tokenize(#[from] BackendError),
    /// The tokenizer result has no {0} field
    MissingField(&'static str),
    /// Failed to convert the {field}: {source}
    Conversion {
        field: &'static str,
        source: ConversionError,
    },
    /// Expected a batch of {expected} sequences, but got the shape {shape:?}
    BatchSize { expected: usize, shape: Vec<usize> },
    /// The attention masks of shape {masks:?} don't match the token ids of shape {ids:?}
    MaskShape { ids: Vec<usize>, masks: Vec<usize> },
}

/// The potential errors of decoding token ids.
#[derive(Debug, Display, Error)]
pub enum DecodeError {
    /// {0}
    UnsupportedDtype(#[from] UnsupportedDtypeError),
    /// Failed to convert the token ids: {0}
    Conversion(ConversionError),
    /// Failed to detokenize the token ids: {0}
    Detokenize(#[from] BackendError),
    /// Expected {expected} decoded sequences, but got {got}
    BatchSize { expected: usize, got: usize },
}

impl From<ConversionError> for DecodeError {
    fn from(error: ConversionError) -> Self {
        match error {
            ConversionError::UnsupportedDtype(error) => Self::UnsupportedDtype(error),
            error => Self::Conversion(error),
        }
    }
}

/// The token ids of the encoded sequences.
#[derive(Clone, Debug, Deref, From, PartialEq)]
pub struct TokenIds(pub NumericBuffer<i64>);

/// The attention masks of the encoded sequences.
#[derive(Clone, Debug, Deref, From, PartialEq)]
pub struct AttentionMasks(pub NumericBuffer<i64>);

/// The encoded sequences.
#[derive(Clone, Debug, PartialEq)]
pub struct Encodings {
    pub token_ids: TokenIds,
    pub attention_masks: AttentionMasks,
}

/// A pretrained tokenizer behind a uniform interface.
///
/// The adapter owns the loaded tokenizer for its whole lifetime. All operations are blocking and
/// leave the tokenizer usable after a failure.
pub struct TokenizerAdapter<T = HfTokenizer> {
    tokenizer: T,
}

impl TokenizerAdapter {
    /// Loads the named tokenizer from the huggingface hub with the default configuration.
    ///
    /// The name is either a hub repository like `"gpt2"` or a local directory which contains a
    /// `tokenizer.json`.
    pub fn new(name: &str) -> Result<Self, LoadError> {
        Self::with_config(name, TokenizerConfig::default())
    }

    /// Loads the named tokenizer from the huggingface hub.
    pub fn with_config(name: &str, config: TokenizerConfig) -> Result<Self, LoadError> {
        Self::load(&HubClient::new(config), name)
    }
}

impl<T: TokenizerBackend> TokenizerAdapter<T> {
    /// Loads the named tokenizer with the loader.
    pub fn load<L>(loader: &L, name: &str) -> Result<Self, LoadError>
    where
        L: TokenizerLoader<Tokenizer = T>,
    {
        loader.load(name).map(Self::from_tokenizer)
    }

    /// Wraps an already loaded tokenizer.
    pub fn from_tokenizer(tokenizer: T) -> Self {
        Self { tokenizer }
    }

    /// Gets the wrapped tokenizer.
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Gets the id of the end-of-sequence token.
    pub fn end_of_text(&self) -> Result<i64, QueryError> {
        self.tokenizer.eos_token_id().ok_or(QueryError::MissingEos)
    }

    /// Checks whether the token is the end-of-sequence token.
    pub fn is_end_of_text(&self, token: i64) -> Result<bool, QueryError> {
        self.end_of_text().map(|eos| token == eos)
    }

    /// Encodes the batch of sequences into token ids.
    ///
    /// The shape of the token ids is `[batch, sequence]`, where the sequence length is determined
    /// by the padding and truncation policy of the tokenizer.
    pub fn encode(&self, inputs: &[impl AsRef<str>]) -> Result<NumericBuffer<i64>, EncodeError> {
        self.encodings(inputs)
            .map(|encodings| encodings.token_ids.0)
    }

    /// Encodes the batch of sequences into token ids and attention masks.
    ///
    /// The attention masks are all ones if the tokenizer doesn't provide any.
    pub fn encodings(&self, inputs: &[impl AsRef<str>]) -> Result<Encodings, EncodeError> {
        let inputs = inputs
            .iter()
            .map(|input| input.as_ref().to_string())
            .collect::<Vec<_>>();
        let batch = self.tokenizer.batch_tokenize(&inputs)?;

        let token_ids = batch
            .input_ids()
            .ok_or(EncodeError::MissingField(INPUT_IDS))
            .and_then(|ids| to_i64_buffer(ids, INPUT_IDS))?;
        if token_ids.shape().first() != Some(&inputs.len()) {
            return Err(EncodeError::BatchSize {
                expected: inputs.len(),
                shape: token_ids.shape().to_vec(),
            });
        }

        let attention_masks = if let Some(masks) = batch.attention_mask() {
            let masks = to_i64_buffer(masks, ATTENTION_MASK)?;
            if masks.shape() != token_ids.shape() {
                return Err(EncodeError::MaskShape {
                    ids: token_ids.shape().to_vec(),
                    masks: masks.shape().to_vec(),
                });
            }
            masks
        } else {
            // only fails if the token ids violate their own invariant
            NumericBuffer::from_shape_vec(token_ids.shape(), vec![1; token_ids.len()])
                .map_err(|error| EncodeError::Conversion {
                    field: INPUT_IDS,
                    source: error.into(),
                })?
        };

        Ok(Encodings {
            token_ids: token_ids.into(),
            attention_masks: attention_masks.into(),
        })
    }

    /// Decodes the batch of token ids into sequences.
    ///
    /// The token ids are expected in the shape `[batch, sequence]`, one sequence is decoded per
    /// row. Only element types with an array counterpart are supported, which is checked before
    /// the tokenizer is called.
    pub fn decode<E: Element>(&self, tokens: &NumericBuffer<E>) -> Result<Vec<String>, DecodeError> {
        let ids = ExternalArray::from_buffer(tokens)?;
        let sequences = self.tokenizer.batch_decode(&ids)?;

        if let Some(&expected) = tokens.shape().first() {
            if sequences.len() != expected {
                return Err(DecodeError::BatchSize {
                    expected,
                    got: sequences.len(),
                });
            }
        }

        Ok(sequences)
    }
}

fn to_i64_buffer(
    array: &ExternalArray,
    field: &'static str,
) -> Result<NumericBuffer<i64>, EncodeError> {
    array
        .to_i64_buffer()
        .map_err(|source| EncodeError::Conversion { field, source })
}

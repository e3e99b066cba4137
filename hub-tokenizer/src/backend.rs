use std::{collections::BTreeMap, io};

use displaydoc::Display;
use thiserror::Error;

use crate::array::ExternalArray;

/// The name of the token ids field of a [`BatchEncoding`].
pub const INPUT_IDS: &str = "input_ids";

/// The name of the attention mask field of a [`BatchEncoding`].
pub const ATTENTION_MASK: &str = "attention_mask";

/// An error raised by the tokenizer library: {0}
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl ToString) -> Self {
        Self(message.to_string())
    }
}

/// The potential errors of loading a tokenizer.
#[derive(Debug, Display, Error)]
pub enum LoadError {
    /// Failed to fetch the tokenizer {name}: {reason}
    Fetch { name: String, reason: String },
    /// Failed to read a tokenizer file: {0}
    Io(#[from] io::Error),
    /// Failed to parse the tokenizer: {0}
    Parse(String),
    /// Failed to parse the tokenizer metadata: {0}
    Metadata(#[from] serde_json::Error),
    /// The token {0} is not part of the vocabulary
    MissingToken(String),
    /// Failed to set up the tokenizer: {0}
    Setup(String),
}

/// The named arrays of a batch tokenization.
///
/// Contains at least the [`INPUT_IDS`] and usually the [`ATTENTION_MASK`] field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchEncoding {
    fields: BTreeMap<String, ExternalArray>,
}

impl BatchEncoding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the field, replacing a previous one of the same name.
    pub fn with_field(mut self, name: impl Into<String>, array: impl Into<ExternalArray>) -> Self {
        self.insert(name, array);
        self
    }

    /// Inserts the field and returns the previous one of the same name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        array: impl Into<ExternalArray>,
    ) -> Option<ExternalArray> {
        self.fields.insert(name.into(), array.into())
    }

    pub fn get(&self, name: &str) -> Option<&ExternalArray> {
        self.fields.get(name)
    }

    pub fn input_ids(&self) -> Option<&ExternalArray> {
        self.get(INPUT_IDS)
    }

    pub fn attention_mask(&self) -> Option<&ExternalArray> {
        self.get(ATTENTION_MASK)
    }

    /// Iterates over the field names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// A loaded tokenizer of an external library.
///
/// This is the only surface through which the adapter talks to the library. Implementations
/// receive and return [`ExternalArray`]s, the shape of the token ids is `[batch, sequence]`.
#[cfg_attr(test, mockall::automock)]
pub trait TokenizerBackend {
    /// Gets the id of the end-of-sequence token, if the tokenizer has one.
    fn eos_token_id(&self) -> Option<i64>;

    /// Tokenizes the batch of sequences.
    fn batch_tokenize(&self, inputs: &[String]) -> Result<BatchEncoding, BackendError>;

    /// Detokenizes the batch of token ids.
    fn batch_decode(&self, ids: &ExternalArray) -> Result<Vec<String>, BackendError>;
}

/// Loads named tokenizers, e.g. from a model hub.
pub trait TokenizerLoader {
    type Tokenizer: TokenizerBackend;

    /// Loads the tokenizer.
    ///
    /// This may block on network or disk access.
    fn load(&self, name: &str) -> Result<Self::Tokenizer, LoadError>;
}

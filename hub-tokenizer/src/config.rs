use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum ConfigurationError {
    /// The maximum number of tokens per sequence must be greater than zero
    MaxLength,
    /// The fixed padding length must be greater than zero
    PaddingLength,
    /// The maximum number of tokens {max_length} exceeds the fixed padding length {padding}
    FixedPadding { padding: usize, max_length: usize },
    /// Failed to load the configuration file: {0}
    Io(#[from] std::io::Error),
    /// Failed to parse the configuration: {0}
    Json(#[from] serde_json::Error),
}

/// How a batch of sequences is padded to a rectangular shape.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Sequences keep their lengths, a batch of different lengths fails to encode.
    None,
    /// Sequences are padded to the longest sequence of the batch.
    Longest,
    /// Sequences are padded to a fixed number of tokens.
    Fixed(usize),
}

/// The configuration of a hub tokenizer.
///
/// Makes the tokenizer policy explicit instead of relying on library defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub(crate) revision: String,
    pub(crate) cache_dir: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub(crate) auth_token: Option<String>,
    pub(crate) padding: PaddingPolicy,
    pub(crate) max_length: Option<usize>,
    pub(crate) add_special_tokens: bool,
    pub(crate) skip_special_tokens: bool,
    pub(crate) eos_token: Option<String>,
    pub(crate) pad_token: Option<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            revision: "main".into(),
            cache_dir: None,
            auth_token: None,
            padding: PaddingPolicy::Longest,
            max_length: None,
            add_special_tokens: true,
            skip_special_tokens: true,
            eos_token: None,
            pad_token: None,
        }
    }
}

impl TokenizerConfig {
    /// Reads the configuration from json.
    ///
    /// Missing fields take their default values.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigurationError> {
        serde_json::from_reader::<_, Self>(reader)?.validate()
    }

    /// Reads the configuration from a json file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    fn validate(self) -> Result<Self, ConfigurationError> {
        if self.max_length == Some(0) {
            return Err(ConfigurationError::MaxLength);
        }
        match (self.padding, self.max_length) {
            (PaddingPolicy::Fixed(0), _) => Err(ConfigurationError::PaddingLength),
            (PaddingPolicy::Fixed(padding), Some(max_length)) if max_length > padding => {
                Err(ConfigurationError::FixedPadding {
                    padding,
                    max_length,
                })
            }
            _ => Ok(self),
        }
    }

    /// The revision of the hub repository.
    ///
    /// Defaults to `"main"`.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// The directory of the hub cache.
    ///
    /// Defaults to the cache directory of the hub client.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// The access token for private hub repositories.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the padding policy.
    ///
    /// Defaults to [`PaddingPolicy::Longest`]. A fixed padding also truncates to its length unless
    /// a shorter maximum length is set.
    ///
    /// # Errors
    /// Fails if the policy is a fixed padding of zero tokens or shorter than the maximum length.
    pub fn with_padding(mut self, padding: PaddingPolicy) -> Result<Self, ConfigurationError> {
        self.padding = padding;
        self.validate()
    }

    /// Truncates sequences to the maximum number of tokens, including special tokens.
    ///
    /// Defaults to no truncation, or to the length of a fixed padding.
    ///
    /// # Errors
    /// Fails if `max_length` is zero or exceeds a fixed padding length.
    pub fn with_max_length(mut self, max_length: usize) -> Result<Self, ConfigurationError> {
        self.max_length = Some(max_length);
        self.validate()
    }

    /// Whether the tokenizer adds its special tokens when encoding.
    ///
    /// Defaults to `true`.
    pub fn with_special_tokens(mut self, add: bool) -> Self {
        self.add_special_tokens = add;
        self
    }

    /// Whether the tokenizer skips special tokens, including padding, when decoding.
    ///
    /// Defaults to `true`.
    pub fn with_skip_special_tokens(mut self, skip: bool) -> Self {
        self.skip_special_tokens = skip;
        self
    }

    /// Overrides the end-of-sequence token.
    ///
    /// Defaults to the token declared by the tokenizer.
    pub fn with_eos_token(mut self, token: impl Into<String>) -> Self {
        self.eos_token = Some(token.into());
        self
    }

    /// Overrides the padding token.
    ///
    /// Defaults to the token declared by the tokenizer.
    pub fn with_pad_token(mut self, token: impl Into<String>) -> Self {
        self.pad_token = Some(token.into());
        self
    }

    pub fn padding(&self) -> PaddingPolicy {
        self.padding
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// The number of tokens sequences are truncated to, if any.
    pub(crate) fn truncation(&self) -> Option<usize> {
        match (self.max_length, self.padding) {
            (Some(max_length), _) => Some(max_length),
            (None, PaddingPolicy::Fixed(padding)) => Some(padding),
            (None, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reader_defaults() {
        let config = TokenizerConfig::from_reader("{}".as_bytes()).unwrap();
        assert_eq!(config, TokenizerConfig::default());
        assert_eq!(config.revision, "main");
        assert_eq!(config.padding(), PaddingPolicy::Longest);
        assert!(config.add_special_tokens);
        assert!(config.skip_special_tokens);
    }

    #[test]
    fn test_from_reader() {
        let json = r#"{
            "revision": "v1.0",
            "padding": { "fixed": 32 },
            "max_length": 32,
            "skip_special_tokens": false,
            "eos_token": "<|endoftext|>"
        }"#;
        let config = TokenizerConfig::from_reader(json.as_bytes()).unwrap();
        assert_eq!(config.revision, "v1.0");
        assert_eq!(config.padding(), PaddingPolicy::Fixed(32));
        assert_eq!(config.max_length(), Some(32));
        assert!(!config.skip_special_tokens);
        assert_eq!(config.eos_token.as_deref(), Some("<|endoftext|>"));

        let config = TokenizerConfig::from_reader(r#"{"padding":"none"}"#.as_bytes()).unwrap();
        assert_eq!(config.padding(), PaddingPolicy::None);
    }

    #[test]
    fn test_from_reader_invalid() {
        assert!(matches!(
            TokenizerConfig::from_reader(r#"{"max_length":0}"#.as_bytes()).unwrap_err(),
            ConfigurationError::MaxLength,
        ));
        assert!(matches!(
            TokenizerConfig::from_reader(r#"{"padding":"sideways"}"#.as_bytes()).unwrap_err(),
            ConfigurationError::Json(_),
        ));
    }

    #[test]
    fn test_builder() {
        let config = TokenizerConfig::default()
            .with_revision("refs/pr/1")
            .with_cache_dir("/tmp/hub")
            .with_padding(PaddingPolicy::Fixed(8))
            .unwrap()
            .with_max_length(8)
            .unwrap()
            .with_special_tokens(false)
            .with_pad_token("<pad>");
        assert_eq!(config.revision, "refs/pr/1");
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/hub")));
        assert_eq!(config.padding(), PaddingPolicy::Fixed(8));
        assert_eq!(config.max_length(), Some(8));
        assert!(!config.add_special_tokens);
        assert_eq!(config.pad_token.as_deref(), Some("<pad>"));

        assert!(TokenizerConfig::default().with_max_length(0).is_err());
        assert!(TokenizerConfig::default()
            .with_padding(PaddingPolicy::Fixed(0))
            .is_err());
    }

    #[test]
    fn test_fixed_padding_truncation() {
        let config = TokenizerConfig::default()
            .with_padding(PaddingPolicy::Fixed(8))
            .unwrap();
        assert_eq!(config.truncation(), Some(8));
        assert_eq!(config.with_max_length(4).unwrap().truncation(), Some(4));
        assert_eq!(TokenizerConfig::default().truncation(), None);

        assert!(matches!(
            TokenizerConfig::default()
                .with_padding(PaddingPolicy::Fixed(8))
                .unwrap()
                .with_max_length(16)
                .unwrap_err(),
            ConfigurationError::FixedPadding {
                padding: 8,
                max_length: 16,
            },
        ));
        assert!(matches!(
            TokenizerConfig::from_reader(r#"{"padding":{"fixed":4},"max_length":5}"#.as_bytes())
                .unwrap_err(),
            ConfigurationError::FixedPadding { .. },
        ));
    }

    #[test]
    fn test_auth_token_not_serialized() {
        let config = TokenizerConfig::default().with_auth_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}

//! The binding to huggingface's `tokenizers` and `hf-hub` crates.

use std::{
    convert::TryFrom,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use hf_hub::{
    api::sync::{ApiBuilder, ApiError, ApiRepo},
    Repo,
    RepoType,
};
use log::{debug, trace};
use ndarray::Array2;
use serde::Deserialize;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::{
    array::ExternalArray,
    backend::{
        BackendError,
        BatchEncoding,
        LoadError,
        TokenizerBackend,
        TokenizerLoader,
        ATTENTION_MASK,
        INPUT_IDS,
    },
    config::{PaddingPolicy, TokenizerConfig},
};

/// The serialized tokenizer of a hub repository.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// The optional tokenizer metadata of a hub repository.
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// Conventional end-of-sequence tokens, in order of precedence.
const EOS_TOKENS: &[&str] = &["</s>", "<|endoftext|>", "<eos>", "<|end_of_text|>"];

/// Conventional padding tokens, in order of precedence.
const PAD_TOKENS: &[&str] = &["[PAD]", "<pad>", "<|pad|>"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    fn as_str(&self) -> &str {
        match self {
            Self::Plain(content) | Self::Added { content } => content,
        }
    }
}

/// The special tokens declared in a `tokenizer_config.json`.
///
/// All other entries of the file are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct TokenizerMetadata {
    #[serde(default)]
    eos_token: Option<SpecialToken>,
    #[serde(default)]
    pad_token: Option<SpecialToken>,
}

impl TokenizerMetadata {
    pub fn from_reader(reader: impl Read) -> Result<Self, LoadError> {
        serde_json::from_reader(reader).map_err(Into::into)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_ref().map(SpecialToken::as_str)
    }

    pub fn pad_token(&self) -> Option<&str> {
        self.pad_token.as_ref().map(SpecialToken::as_str)
    }
}

/// Loads tokenizers from the huggingface hub or from local directories.
#[derive(Clone, Debug, Default)]
pub struct HubClient {
    config: TokenizerConfig,
}

impl HubClient {
    pub fn new(config: TokenizerConfig) -> Self {
        Self { config }
    }

    /// Resolves the paths of the tokenizer file and of the optional metadata file.
    ///
    /// Names of existing directories are read locally, everything else is a hub repository.
    fn fetch(&self, name: &str) -> Result<(PathBuf, Option<PathBuf>), LoadError> {
        let dir = Path::new(name);
        if dir.is_dir() {
            debug!("Loading the tokenizer from {}", dir.display());
            let metadata = dir.join(TOKENIZER_CONFIG_FILE);
            return Ok((dir.join(TOKENIZER_FILE), metadata.is_file().then(|| metadata)));
        }

        let fetch_error = |error: ApiError| LoadError::Fetch {
            name: name.into(),
            reason: error.to_string(),
        };
        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(cache_dir) = &self.config.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        if let Some(token) = &self.config.auth_token {
            builder = builder.with_token(Some(token.clone()));
        }
        let repo = builder.build().map_err(fetch_error)?.repo(Repo::with_revision(
            name.into(),
            RepoType::Model,
            self.config.revision.clone(),
        ));

        debug!("Fetching {}@{}", name, self.config.revision);
        fetch_remote(&repo, name)
    }
}

/// A remote repository of tokenizer files.
#[cfg_attr(test, mockall::automock)]
trait RemoteRepo {
    /// Lists the files of the repository.
    fn files(&self) -> Result<Vec<String>, ApiError>;

    /// Downloads the file into the local cache.
    fn get(&self, file: &str) -> Result<PathBuf, ApiError>;
}

impl RemoteRepo for ApiRepo {
    fn files(&self) -> Result<Vec<String>, ApiError> {
        self.info().map(|info| {
            info.siblings
                .into_iter()
                .map(|sibling| sibling.rfilename)
                .collect()
        })
    }

    fn get(&self, file: &str) -> Result<PathBuf, ApiError> {
        ApiRepo::get(self, file)
    }
}

/// Downloads the tokenizer file and, if the repository has one, the metadata file.
fn fetch_remote(
    repo: &impl RemoteRepo,
    name: &str,
) -> Result<(PathBuf, Option<PathBuf>), LoadError> {
    let fetch_error = |error: ApiError| LoadError::Fetch {
        name: name.into(),
        reason: error.to_string(),
    };

    let files = repo.files().map_err(fetch_error)?;
    let tokenizer = repo.get(TOKENIZER_FILE).map_err(fetch_error)?;
    let metadata = if files.iter().any(|file| file == TOKENIZER_CONFIG_FILE) {
        Some(repo.get(TOKENIZER_CONFIG_FILE).map_err(fetch_error)?)
    } else {
        debug!("{} has no {}", name, TOKENIZER_CONFIG_FILE);
        None
    };

    Ok((tokenizer, metadata))
}

impl TokenizerLoader for HubClient {
    type Tokenizer = HfTokenizer;

    fn load(&self, name: &str) -> Result<HfTokenizer, LoadError> {
        let (tokenizer, metadata) = self.fetch(name)?;
        let metadata = metadata
            .map(TokenizerMetadata::from_file)
            .transpose()?
            .unwrap_or_default();
        let tokenizer = Tokenizer::from_file(tokenizer)
            .map_err(|error| LoadError::Parse(error.to_string()))?;

        HfTokenizer::new(tokenizer, &self.config, &metadata)
    }
}

/// A huggingface tokenizer configured with an explicit padding and truncation policy.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
    eos_token_id: Option<u32>,
    add_special_tokens: bool,
    skip_special_tokens: bool,
}

impl HfTokenizer {
    /// Wraps the tokenizer.
    ///
    /// The configuration takes precedence over the metadata, which takes precedence over the
    /// conventional special tokens of the vocabulary.
    ///
    /// # Errors
    /// Fails if a configured special token isn't part of the vocabulary or if the truncation
    /// can't be applied.
    pub fn new(
        mut tokenizer: Tokenizer,
        config: &TokenizerConfig,
        metadata: &TokenizerMetadata,
    ) -> Result<Self, LoadError> {
        let eos_token_id = eos_token_id(&tokenizer, config, metadata)?;
        let padding = padding(&tokenizer, config, metadata, eos_token_id)?;
        tokenizer.with_padding(padding);

        let truncation = config.truncation().map(|max_length| TruncationParams {
            max_length,
            ..TruncationParams::default()
        });
        tokenizer
            .with_truncation(truncation)
            .map_err(|error| LoadError::Setup(error.to_string()))?;

        Ok(Self {
            tokenizer,
            eos_token_id,
            add_special_tokens: config.add_special_tokens,
            skip_special_tokens: config.skip_special_tokens,
        })
    }

    /// Reads the tokenizer from a `tokenizer.json` file without metadata.
    pub fn from_file(path: impl AsRef<Path>, config: &TokenizerConfig) -> Result<Self, LoadError> {
        let tokenizer =
            Tokenizer::from_file(path).map_err(|error| LoadError::Parse(error.to_string()))?;
        Self::new(tokenizer, config, &TokenizerMetadata::default())
    }

    /// Gets the wrapped tokenizer.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }
}

fn eos_token_id(
    tokenizer: &Tokenizer,
    config: &TokenizerConfig,
    metadata: &TokenizerMetadata,
) -> Result<Option<u32>, LoadError> {
    if let Some(token) = &config.eos_token {
        return tokenizer
            .token_to_id(token)
            .map(Some)
            .ok_or_else(|| LoadError::MissingToken(token.clone()));
    }

    let id = metadata
        .eos_token()
        .and_then(|token| tokenizer.token_to_id(token))
        .or_else(|| {
            EOS_TOKENS
                .iter()
                .find_map(|token| tokenizer.token_to_id(token))
        });
    trace!("Resolved the end-of-sequence token id {:?}", id);

    Ok(id)
}

fn padding(
    tokenizer: &Tokenizer,
    config: &TokenizerConfig,
    metadata: &TokenizerMetadata,
    eos_token_id: Option<u32>,
) -> Result<Option<PaddingParams>, LoadError> {
    let strategy = match config.padding {
        PaddingPolicy::None => return Ok(None),
        PaddingPolicy::Longest => PaddingStrategy::BatchLongest,
        PaddingPolicy::Fixed(length) => PaddingStrategy::Fixed(length),
    };

    let pad_token = if let Some(token) = &config.pad_token {
        if tokenizer.token_to_id(token).is_none() {
            return Err(LoadError::MissingToken(token.clone()));
        }
        Some(token.clone())
    } else {
        metadata
            .pad_token()
            .map(ToString::to_string)
            .or_else(|| {
                tokenizer
                    .get_padding()
                    .map(|padding| padding.pad_token.clone())
            })
            .into_iter()
            .chain(PAD_TOKENS.iter().map(ToString::to_string))
            .chain(eos_token_id.and_then(|id| tokenizer.id_to_token(id)))
            .find(|token| tokenizer.token_to_id(token).is_some())
    };

    let pad_token = match pad_token {
        Some(pad_token) => pad_token,
        None => {
            debug!("The tokenizer has no padding token, padding is disabled");
            return Ok(None);
        }
    };
    let pad_id = tokenizer
        .token_to_id(&pad_token)
        .ok_or_else(|| LoadError::MissingToken(pad_token.clone()))?;
    trace!("Padding with {} ({}) by {:?}", pad_token, pad_id, strategy);

    Ok(Some(PaddingParams {
        strategy,
        pad_id,
        pad_token,
        ..tokenizer.get_padding().cloned().unwrap_or_default()
    }))
}

/// Collects the rows of the encodings into a `[batch, sequence]` array.
fn to_array(
    encodings: &[Encoding],
    row: impl Fn(&Encoding) -> &[u32],
) -> Result<Array2<i64>, BackendError> {
    let width = encodings.first().map_or(0, |encoding| row(encoding).len());
    if let Some(ragged) = encodings
        .iter()
        .map(|encoding| row(encoding).len())
        .find(|&len| len != width)
    {
        return Err(BackendError(format!(
            "the sequences of the batch have different lengths of {} and {} tokens",
            width, ragged,
        )));
    }

    let data = encodings
        .iter()
        .flat_map(|encoding| row(encoding).iter().copied().map(i64::from))
        .collect();
    Array2::from_shape_vec((encodings.len(), width), data).map_err(BackendError::new)
}

impl TokenizerBackend for HfTokenizer {
    fn eos_token_id(&self) -> Option<i64> {
        self.eos_token_id.map(i64::from)
    }

    fn batch_tokenize(&self, inputs: &[String]) -> Result<BatchEncoding, BackendError> {
        if inputs.is_empty() {
            let empty = Array2::<i64>::zeros((0, 0)).into_dyn();
            return Ok(BatchEncoding::new()
                .with_field(INPUT_IDS, empty.clone())
                .with_field(ATTENTION_MASK, empty));
        }

        let encodings = self
            .tokenizer
            .encode_batch(inputs.to_vec(), self.add_special_tokens)
            .map_err(BackendError::new)?;
        let ids = to_array(&encodings, Encoding::get_ids)?;
        let masks = to_array(&encodings, Encoding::get_attention_mask)?;

        Ok(BatchEncoding::new()
            .with_field(INPUT_IDS, ids.into_dyn())
            .with_field(ATTENTION_MASK, masks.into_dyn()))
    }

    fn batch_decode(&self, ids: &ExternalArray) -> Result<Vec<String>, BackendError> {
        let ids = ids.to_i64_buffer().map_err(BackendError::new)?;
        let rows = ids.rows().ok_or_else(|| {
            BackendError(format!(
                "expected token ids of shape [batch, sequence], but got {:?}",
                ids.shape(),
            ))
        })?;
        let sequences = rows
            .map(|row| {
                row.iter()
                    .map(|&id| {
                        u32::try_from(id)
                            .map_err(|_| BackendError(format!("invalid token id {}", id)))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sequences = sequences.iter().map(Vec::as_slice).collect::<Vec<_>>();

        self.tokenizer
            .decode_batch(&sequences, self.skip_special_tokens)
            .map_err(BackendError::new)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ndarray::{arr1, arr2};
    use tempfile::tempdir;
    use test_utils::tokenizer::{id, word_level, write_fixture, EOS, PAD};

    use super::*;

    fn hf_tokenizer(config: &TokenizerConfig) -> HfTokenizer {
        HfTokenizer::new(word_level(), config, &TokenizerMetadata::default()).unwrap()
    }

    fn input_ids(encoding: &BatchEncoding) -> &ndarray::ArrayD<i64> {
        match encoding.input_ids() {
            Some(ExternalArray::Int64(ids)) => ids,
            other => panic!("unexpected input ids {:?}", other),
        }
    }

    fn strings(inputs: &[&str]) -> Vec<String> {
        inputs.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_metadata() {
        let metadata = TokenizerMetadata::from_reader(
            r#"{"eos_token": "</s>", "pad_token": {"content": "<pad>", "lstrip": false}, "model_max_length": 8}"#
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(metadata.eos_token(), Some("</s>"));
        assert_eq!(metadata.pad_token(), Some("<pad>"));

        let metadata = TokenizerMetadata::from_reader(r#"{"eos_token": null}"#.as_bytes()).unwrap();
        assert_eq!(metadata.eos_token(), None);
        assert_eq!(metadata.pad_token(), None);

        assert!(matches!(
            TokenizerMetadata::from_reader("not json".as_bytes()).unwrap_err(),
            LoadError::Metadata(_),
        ));
        assert!(matches!(
            TokenizerMetadata::from_reader(r#"{"eos_token": 1}"#.as_bytes()).unwrap_err(),
            LoadError::Metadata(_),
        ));
    }

    #[test]
    fn test_eos_token_id() {
        let tokenizer = hf_tokenizer(&TokenizerConfig::default());
        assert_eq!(tokenizer.eos_token_id(), Some(i64::from(id(EOS))));

        let config = TokenizerConfig::default().with_eos_token("fox");
        assert_eq!(hf_tokenizer(&config).eos_token_id(), Some(i64::from(id("fox"))));

        let config = TokenizerConfig::default().with_eos_token("<|endoftext|>");
        assert!(matches!(
            HfTokenizer::new(word_level(), &config, &TokenizerMetadata::default()),
            Err(LoadError::MissingToken(token)) if token == "<|endoftext|>",
        ));
    }

    #[test]
    fn test_eos_token_id_from_metadata() {
        let metadata = TokenizerMetadata::from_reader(r#"{"eos_token": "the"}"#.as_bytes()).unwrap();
        let tokenizer =
            HfTokenizer::new(word_level(), &TokenizerConfig::default(), &metadata).unwrap();
        assert_eq!(tokenizer.eos_token_id(), Some(i64::from(id("the"))));
    }

    #[test]
    fn test_batch_tokenize() {
        let tokenizer = hf_tokenizer(&TokenizerConfig::default());
        let encoding = tokenizer
            .batch_tokenize(&strings(&["hello world", "the quick brown fox"]))
            .unwrap();

        let pad = i64::from(id(PAD));
        let expected = arr2(&[
            [
                i64::from(id("hello")),
                i64::from(id("world")),
                pad,
                pad,
            ],
            [
                i64::from(id("the")),
                i64::from(id("quick")),
                i64::from(id("brown")),
                i64::from(id("fox")),
            ],
        ]);
        assert_eq!(*input_ids(&encoding), expected.into_dyn());
        assert_eq!(
            encoding.attention_mask(),
            Some(&ExternalArray::Int64(
                arr2(&[[1_i64, 1, 0, 0], [1, 1, 1, 1]]).into_dyn()
            )),
        );
    }

    #[test]
    fn test_batch_tokenize_empty() {
        let tokenizer = hf_tokenizer(&TokenizerConfig::default());
        let encoding = tokenizer.batch_tokenize(&[]).unwrap();
        assert_eq!(input_ids(&encoding).shape(), [0, 0]);
    }

    #[test]
    fn test_batch_tokenize_fixed_padding_and_truncation() {
        let config = TokenizerConfig::default()
            .with_padding(PaddingPolicy::Fixed(3))
            .unwrap()
            .with_max_length(3)
            .unwrap();
        let tokenizer = hf_tokenizer(&config);
        let encoding = tokenizer
            .batch_tokenize(&strings(&["a", "the quick brown fox"]))
            .unwrap();
        assert_eq!(input_ids(&encoding).shape(), [2, 3]);
        assert_eq!(
            input_ids(&encoding).iter().copied().collect::<Vec<_>>(),
            [
                i64::from(id("a")),
                i64::from(id(PAD)),
                i64::from(id(PAD)),
                i64::from(id("the")),
                i64::from(id("quick")),
                i64::from(id("brown")),
            ],
        );
    }

    #[test]
    fn test_batch_tokenize_fixed_padding_truncates() {
        let config = TokenizerConfig::default()
            .with_padding(PaddingPolicy::Fixed(2))
            .unwrap();
        let tokenizer = hf_tokenizer(&config);
        let encoding = tokenizer
            .batch_tokenize(&strings(&["the quick brown fox", "a"]))
            .unwrap();
        assert_eq!(
            *input_ids(&encoding),
            arr2(&[
                [i64::from(id("the")), i64::from(id("quick"))],
                [i64::from(id("a")), i64::from(id(PAD))],
            ])
            .into_dyn(),
        );
    }

    #[test]
    fn test_batch_tokenize_ragged() {
        let config = TokenizerConfig::default()
            .with_padding(PaddingPolicy::None)
            .unwrap();
        let tokenizer = hf_tokenizer(&config);
        assert!(tokenizer
            .batch_tokenize(&strings(&["a b", "c"]))
            .unwrap_err()
            .to_string()
            .contains("different lengths of 2 and 1 tokens"));
        assert!(tokenizer.batch_tokenize(&strings(&["a b", "b c"])).is_ok());
    }

    #[test]
    fn test_batch_decode() {
        let tokenizer = hf_tokenizer(&TokenizerConfig::default());
        let pad = i64::from(id(PAD));
        let ids = ExternalArray::from(
            arr2(&[
                [i64::from(id("hello")), i64::from(id("world"))],
                [i64::from(id("fox")), pad],
            ])
            .into_dyn(),
        );
        assert_eq!(tokenizer.batch_decode(&ids).unwrap(), ["hello world", "fox"]);

        let ids = ExternalArray::from(arr2(&[[id("a") as i32, id("b") as i32]]).into_dyn());
        assert_eq!(tokenizer.batch_decode(&ids).unwrap(), ["a b"]);
    }

    #[test]
    fn test_batch_decode_keeps_special_tokens() {
        let config = TokenizerConfig::default().with_skip_special_tokens(false);
        let tokenizer = hf_tokenizer(&config);
        let ids = ExternalArray::from(arr2(&[[i64::from(id("a")), i64::from(id(EOS))]]).into_dyn());
        assert_eq!(tokenizer.batch_decode(&ids).unwrap(), [format!("a {}", EOS)]);
    }

    #[test]
    fn test_batch_decode_invalid() {
        let tokenizer = hf_tokenizer(&TokenizerConfig::default());

        let ids = ExternalArray::from(arr1(&[1_i64, 2]).into_dyn());
        assert!(tokenizer.batch_decode(&ids).is_err());

        let ids = ExternalArray::from(arr2(&[[-1_i64]]).into_dyn());
        assert_eq!(
            tokenizer.batch_decode(&ids).unwrap_err(),
            BackendError("invalid token id -1".into()),
        );

        let ids = ExternalArray::from(arr2(&[[1.0_f32]]).into_dyn());
        assert!(tokenizer.batch_decode(&ids).is_err());
    }

    #[test]
    fn test_hub_client_local_dir() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path(), Some("fox")).unwrap();

        let name = dir.path().to_str().unwrap();
        let tokenizer = HubClient::default().load(name).unwrap();
        assert_eq!(tokenizer.eos_token_id(), Some(i64::from(id("fox"))));

        let encoding = tokenizer.batch_tokenize(&strings(&["hello"])).unwrap();
        assert_eq!(
            *input_ids(&encoding),
            arr2(&[[i64::from(id("hello"))]]).into_dyn(),
        );
    }

    #[test]
    fn test_hub_client_local_dir_without_metadata() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path(), None).unwrap();
        fs::remove_file(dir.path().join(TOKENIZER_CONFIG_FILE)).unwrap();

        let tokenizer = HubClient::default()
            .load(dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(tokenizer.eos_token_id(), Some(i64::from(id(EOS))));
    }

    #[test]
    fn test_hub_client_local_dir_without_tokenizer() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            HubClient::default().load(dir.path().to_str().unwrap()),
            Err(LoadError::Parse(_)),
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        write_fixture(dir.path(), None).unwrap();

        let tokenizer =
            HfTokenizer::from_file(dir.path().join(TOKENIZER_FILE), &TokenizerConfig::default())
                .unwrap();
        assert_eq!(
            tokenizer.tokenizer().token_to_id("world"),
            Some(id("world")),
        );
    }

    fn api_error() -> ApiError {
        ApiError::IoError(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))
    }

    fn cached(file: &str) -> PathBuf {
        Path::new("/cache").join(file)
    }

    #[test]
    fn test_fetch_remote() {
        let mut repo = MockRemoteRepo::new();
        repo.expect_files()
            .returning(|| Ok(vec![TOKENIZER_FILE.into(), TOKENIZER_CONFIG_FILE.into()]));
        repo.expect_get().times(2).returning(|file| Ok(cached(file)));

        let (tokenizer, metadata) = fetch_remote(&repo, "gpt2").unwrap();
        assert_eq!(tokenizer, cached(TOKENIZER_FILE));
        assert_eq!(metadata, Some(cached(TOKENIZER_CONFIG_FILE)));
    }

    #[test]
    fn test_fetch_remote_without_metadata() {
        let mut repo = MockRemoteRepo::new();
        repo.expect_files()
            .returning(|| Ok(vec![TOKENIZER_FILE.into(), "config.json".into()]));
        repo.expect_get()
            .withf(|file| file.to_string() == TOKENIZER_FILE)
            .times(1)
            .returning(|file| Ok(cached(file)));

        let (_, metadata) = fetch_remote(&repo, "gpt2").unwrap();
        assert!(metadata.is_none());
    }

    #[test]
    fn test_fetch_remote_metadata_failure() {
        let mut repo = MockRemoteRepo::new();
        repo.expect_files()
            .returning(|| Ok(vec![TOKENIZER_FILE.into(), TOKENIZER_CONFIG_FILE.into()]));
        repo.expect_get().returning(|file| {
            if file.to_string() == TOKENIZER_FILE {
                Ok(cached(file))
            } else {
                Err(api_error())
            }
        });

        assert!(matches!(
            fetch_remote(&repo, "gpt2"),
            Err(LoadError::Fetch { name, reason })
                if name == "gpt2" && reason.contains("connection reset"),
        ));
    }

    #[test]
    fn test_fetch_remote_listing_failure() {
        let mut repo = MockRemoteRepo::new();
        repo.expect_files().returning(|| Err(api_error()));
        repo.expect_get().never();

        assert!(matches!(
            fetch_remote(&repo, "gpt2"),
            Err(LoadError::Fetch { .. }),
        ));
    }
}

use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Error, ErrorKind, Result},
    path::Path,
};

use serde_json::json;
use tokenizers::{
    models::{wordlevel::WordLevel, ModelWrapper},
    normalizers::{utils::Lowercase, NormalizerWrapper},
    pre_tokenizers::{whitespace::Whitespace, PreTokenizerWrapper},
    processors::PostProcessorWrapper,
    AddedToken,
    DecoderWrapper,
    Tokenizer,
    TokenizerBuilder,
    TokenizerImpl,
};

/// The padding token.
pub const PAD: &str = "[PAD]";

/// The unknown token.
pub const UNK: &str = "[UNK]";

/// The end-of-sequence token.
pub const EOS: &str = "</s>";

/// The vocabulary of the fixture, the position of a token is its id.
pub const VOCAB: &[&str] = &[
    PAD, UNK, EOS, "hello", "world", "the", "quick", "brown", "fox", "a", "b", "c",
];

/// Gets the id of a token of the [`VOCAB`].
///
/// # Panics
/// Panics if the token isn't part of the vocabulary.
pub fn id(token: &str) -> u32 {
    VOCAB
        .iter()
        .position(|&t| t == token)
        .map(|id| id as u32)
        .unwrap_or_else(|| panic!("{} is not part of the vocabulary", token))
}

/// Builds a lowercasing, whitespace splitting word level tokenizer over the [`VOCAB`].
///
/// The padding, unknown and end-of-sequence tokens are special tokens. No padding or truncation
/// is configured.
pub fn word_level() -> Tokenizer {
    let vocab = VOCAB
        .iter()
        .enumerate()
        .map(|(id, token)| (token.to_string(), id as u32))
        .collect::<HashMap<_, _>>();
    let model = WordLevel::builder()
        .vocab(vocab)
        .unk_token(UNK.into())
        .build()
        .unwrap();

    let tokenizer: TokenizerImpl<
        ModelWrapper,
        NormalizerWrapper,
        PreTokenizerWrapper,
        PostProcessorWrapper,
        DecoderWrapper,
    > = TokenizerBuilder::new()
        .with_model(model.into())
        .with_normalizer(Some(Lowercase.into()))
        .with_pre_tokenizer(Some(Whitespace::default().into()))
        .build()
        .unwrap();

    let mut tokenizer = Tokenizer::from(tokenizer);
    tokenizer.add_special_tokens(&[
        AddedToken::from(PAD, true),
        AddedToken::from(UNK, true),
        AddedToken::from(EOS, true),
    ]);
    tokenizer
}

/// Writes the [`word_level()`] tokenizer as a hub repository into the directory.
///
/// The directory contains a `tokenizer.json` and a `tokenizer_config.json` which declares the
/// end-of-sequence token.
pub fn write_fixture(dir: &Path, eos_token: Option<&str>) -> Result<()> {
    word_level()
        .save(dir.join("tokenizer.json"), false)
        .map_err(|error| Error::new(ErrorKind::Other, error.to_string()))?;

    let metadata = json!({
        "eos_token": eos_token,
        "model_max_length": VOCAB.len(),
    });
    serde_json::to_writer(
        BufWriter::new(File::create(dir.join("tokenizer_config.json"))?),
        &metadata,
    )
    .map_err(Into::into)
}

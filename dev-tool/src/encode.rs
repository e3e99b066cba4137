use anyhow::Error;
use hub_tokenizer::{NumericBuffer, TokenizerAdapter, TokenizerBackend};
use log::debug;
use serde::Serialize;
use structopt::StructOpt;

use crate::{
    exit_code::NO_ERROR,
    utils::{print_json, TokenizerArgs},
};

/// Encode sequences into token ids.
#[derive(StructOpt, Debug)]
pub struct EncodeCmd {
    #[structopt(flatten)]
    tokenizer: TokenizerArgs,

    /// Also prints the attention masks.
    #[structopt(short, long)]
    masks: bool,

    #[structopt(long)]
    pretty: bool,

    /// The sequences to encode as one batch.
    inputs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EncodeCmdResult {
    token_ids: NumericBuffer<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attention_masks: Option<NumericBuffer<i64>>,
}

impl EncodeCmd {
    pub fn run(self) -> Result<i32, Error> {
        let adapter = self.tokenizer.load()?;
        let result = self.encode(&adapter)?;
        print_json(&result, self.pretty)?;

        Ok(NO_ERROR)
    }

    fn encode<T>(&self, adapter: &TokenizerAdapter<T>) -> Result<EncodeCmdResult, Error>
    where
        T: TokenizerBackend,
    {
        let result = if self.masks {
            let encodings = adapter.encodings(self.inputs.as_slice())?;
            EncodeCmdResult {
                token_ids: encodings.token_ids.0,
                attention_masks: Some(encodings.attention_masks.0),
            }
        } else {
            EncodeCmdResult {
                token_ids: adapter.encode(self.inputs.as_slice())?,
                attention_masks: None,
            }
        };
        debug!("Encoded into token ids of shape {:?}", result.token_ids.shape());

        Ok(result)
    }
}

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::PathBuf,
};

use anyhow::{Context, Error};
use hub_tokenizer::{NumericBuffer, TokenizerAdapter, TokenizerBackend};
use log::debug;
use structopt::StructOpt;

use crate::{
    exit_code::NO_ERROR,
    utils::{print_json, TokenizerArgs},
};

/// Decode token ids into sequences.
#[derive(StructOpt, Debug)]
pub struct DecodeCmd {
    #[structopt(flatten)]
    tokenizer: TokenizerArgs,

    #[structopt(long)]
    pretty: bool,

    /// A json file with the token ids, as printed by the `encode` command.
    ///
    /// The token ids are read from stdin if no file is given.
    token_ids: Option<PathBuf>,
}

impl DecodeCmd {
    pub fn run(self) -> Result<i32, Error> {
        let token_ids = match &self.token_ids {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Opening {} failed.", path.display()))?;
                read_token_ids(BufReader::new(file))?
            }
            None => read_token_ids(io::stdin().lock())?,
        };

        let adapter = self.tokenizer.load()?;
        let sequences = decode(&adapter, &token_ids)?;
        print_json(&sequences, self.pretty)?;

        Ok(NO_ERROR)
    }
}

/// Reads either a plain token ids buffer or the token ids field of the `encode` output.
fn read_token_ids(reader: impl Read) -> Result<NumericBuffer<i64>, Error> {
    let mut json = serde_json::from_reader::<_, serde_json::Value>(reader)
        .context("Parsing the token ids failed.")?;
    if let Some(token_ids) = json.get_mut("token_ids") {
        json = token_ids.take();
    }

    serde_json::from_value(json).context("Parsing the token ids failed.")
}

fn decode<T>(
    adapter: &TokenizerAdapter<T>,
    token_ids: &NumericBuffer<i64>,
) -> Result<Vec<String>, Error>
where
    T: TokenizerBackend,
{
    debug!("Decoding token ids of shape {:?}", token_ids.shape());
    adapter.decode(token_ids).map_err(Into::into)
}

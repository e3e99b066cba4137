use anyhow::Error;
use hub_tokenizer::{QueryError, TokenizerAdapter, TokenizerBackend};
use serde::Serialize;
use structopt::StructOpt;

use crate::{
    exit_code::{NON_FATAL_ERROR, NO_ERROR},
    utils::{print_json, TokenizerArgs},
};

/// Print the end-of-sequence token id and check token ids against it.
#[derive(StructOpt, Debug)]
pub struct EosCmd {
    #[structopt(flatten)]
    tokenizer: TokenizerArgs,

    #[structopt(long)]
    pretty: bool,

    /// The token ids to check.
    token_ids: Vec<i64>,
}

#[derive(Debug, PartialEq, Serialize)]
struct EosCmdResult {
    eos_token_id: i64,
    end_of_text: Vec<bool>,
}

impl EosCmd {
    pub fn run(self) -> Result<i32, Error> {
        let adapter = self.tokenizer.load()?;

        match self.check(&adapter) {
            Ok(result) => {
                print_json(&result, self.pretty)?;
                Ok(NO_ERROR)
            }
            Err(error) => {
                eprintln!("{}", error);
                Ok(NON_FATAL_ERROR)
            }
        }
    }

    fn check<T>(&self, adapter: &TokenizerAdapter<T>) -> Result<EosCmdResult, QueryError>
    where
        T: TokenizerBackend,
    {
        let eos_token_id = adapter.end_of_text()?;
        let end_of_text = self
            .token_ids
            .iter()
            .map(|&token| adapter.is_end_of_text(token))
            .collect::<Result<_, _>>()?;

        Ok(EosCmdResult {
            eos_token_id,
            end_of_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_utils::tokenizer::{id, EOS};

    use super::*;
    use crate::utils::tests::fixture_args;

    #[test]
    fn test_check() {
        let (_dir, tokenizer) = fixture_args();
        let eos = i64::from(id(EOS));
        let cmd = EosCmd {
            tokenizer,
            pretty: false,
            token_ids: vec![eos, i64::from(id("hello")), -1],
        };

        let result = cmd.check(&cmd.tokenizer.load().unwrap()).unwrap();
        assert_eq!(
            result,
            EosCmdResult {
                eos_token_id: eos,
                end_of_text: vec![true, false, false],
            },
        );
    }
}

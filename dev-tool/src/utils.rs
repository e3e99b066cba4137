use std::path::PathBuf;

use anyhow::{Context, Error};
use hub_tokenizer::{TokenizerAdapter, TokenizerConfig};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use serde::Serialize;
use structopt::StructOpt;

pub(crate) fn progress_spin_until_done<R>(msg: &'static str, func: impl FnOnce() -> R) -> R {
    let progress_bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::default_bar().template("{msg}: {elapsed:>10} {spinner:.green}"));
    progress_bar.set_message(msg);
    progress_bar.enable_steady_tick(100);
    let res = func();
    progress_bar.finish_and_clear();
    res
}

/// Selects and configures the tokenizer.
#[derive(StructOpt, Debug)]
pub struct TokenizerArgs {
    /// The hub repository or the local directory of the tokenizer.
    #[structopt(short, long, default_value = "gpt2")]
    pub tokenizer: String,

    /// A json file with the tokenizer configuration.
    #[structopt(short, long)]
    pub config: Option<PathBuf>,
}

impl TokenizerArgs {
    pub fn load(&self) -> Result<TokenizerAdapter, Error> {
        let config = self
            .config
            .as_ref()
            .map(TokenizerConfig::from_file)
            .transpose()
            .context("Loading the tokenizer configuration failed.")?
            .unwrap_or_default();
        debug!("Loading {} with {:?}", self.tokenizer, config);

        progress_spin_until_done("Loading tokenizer", || {
            TokenizerAdapter::with_config(&self.tokenizer, config)
        })
        .with_context(|| format!("Loading the tokenizer {} failed.", self.tokenizer))
    }
}

pub fn print_json(value: &impl Serialize, pretty: bool) -> Result<(), Error> {
    let serialized = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", serialized);
    Ok(())
}

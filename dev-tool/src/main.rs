use std::process::exit;

use anyhow::Error;
use structopt::StructOpt;

use crate::exit_code::FATAL_ERROR;

mod decode;
mod encode;
mod eos;
mod exit_code;
mod utils;

/// Tooling for the developers of the hub tokenizer.
#[derive(StructOpt, Debug)]
enum CommandArgs {
    Encode(encode::EncodeCmd),
    Decode(decode::DecodeCmd),
    Eos(eos::EosCmd),
}

impl CommandArgs {
    fn run(self) -> Result<i32, Error> {
        match self {
            CommandArgs::Encode(cmd) => cmd.run(),
            CommandArgs::Decode(cmd) => cmd.run(),
            CommandArgs::Eos(cmd) => cmd.run(),
        }
    }
}

fn main() {
    env_logger::init();

    let exit_code = match CommandArgs::from_args().run() {
        Ok(exit_code) => exit_code,
        Err(error) => {
            eprintln!("{:?}", error);
            FATAL_ERROR
        }
    };

    exit(exit_code);
}

pub mod args;

pub use args::{Arguments, InputType, RunnerKind};

use clap::Parser;

pub fn parse() -> Arguments {
    Arguments::parse()
}

use crate::cli::run;

pub mod cli;
mod config;
pub mod domain;
pub mod http;
pub mod remote;
pub mod storage;

fn main() {
    if let Err(e) = run() {
        log::error!("{e:?}");
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

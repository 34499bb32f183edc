use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use std::path::Path;

/// Write a config file with every default spelled out. An existing file is left untouched.
#[derive(Debug, Parser)]
pub(crate) struct Init {}

impl Init {
    pub(crate) fn run(self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Config::default_path()?,
        };
        Config::starter().write_new(&path)?;
        println!("Wrote '{}'", path.display());
        Ok(())
    }
}

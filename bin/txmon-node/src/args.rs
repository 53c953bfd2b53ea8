use std::path::PathBuf;

use argh::FromArgs;

/// Bitcoin transaction monitor and signed-callback dispatcher.
#[derive(Debug, Clone, FromArgs)]
#[argh(description = "txmon node")]
pub struct Args {
    /// path to the TOML configuration file
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: PathBuf,
}

//! Platforms command - list buildable targets

use crate::builder::PlatformSet;
use crate::config::Config;
use crate::error::BinsmithResult;

/// Execute the platforms command
pub async fn execute(config: &Config) -> BinsmithResult<()> {
    let platforms = PlatformSet::parse(&config.builder.platforms);
    for target in platforms.iter() {
        println!("{}", target);
    }
    Ok(())
}

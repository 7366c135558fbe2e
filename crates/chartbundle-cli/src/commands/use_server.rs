//! Use command - switch the default server

use chartbundle_repo::ServerConfig;
use console::style;

use crate::error::Result;

pub fn run(server_id: &str) -> Result<()> {
    let mut config = ServerConfig::load()?;
    config.use_server(server_id)?;
    config.save()?;

    println!("Using server \"{}\"", style(server_id).cyan());
    Ok(())
}

//! Server configuration commands

use chartbundle_repo::{ServerConfig, ServerDetails};
use console::style;

use super::{ConnectionArgs, mask};
use crate::error::{CliError, Result};

/// Add or replace a server
pub fn add(server_id: &str, connection: &ConnectionArgs, make_default: bool) -> Result<()> {
    let mut config = ServerConfig::load()?;
    let details = connection.to_details(Some(server_id)).normalized();

    if details.url.is_none() && details.distribution_url.is_none() {
        return Err(CliError::validation_with_help(
            format!("Server '{}' needs a URL", server_id),
            "Pass --url and/or --dist-url",
        ));
    }

    let replaced = config.get(server_id).is_some();
    config.upsert(details, make_default)?;
    config.save()?;

    println!(
        "{} server \"{}\"{}",
        if replaced { "Updated" } else { "Added" },
        style(server_id).cyan(),
        if config.default_server.as_deref() == Some(server_id) {
            " (default)"
        } else {
            ""
        }
    );
    Ok(())
}

/// Show one server, or all of them
pub fn show(server_id: Option<&str>) -> Result<()> {
    let config = ServerConfig::load()?;

    let servers: Vec<&ServerDetails> = match server_id {
        Some(id) => vec![config.get(id).ok_or_else(|| {
            CliError::from(chartbundle_repo::RepoError::ServerNotFound { id: id.to_string() })
        })?],
        None => config.servers.iter().collect(),
    };

    if servers.is_empty() {
        println!("No servers configured.");
        println!();
        println!("Add one with: chartbundle config add <server-id> --url <url> --dist-url <url>");
        return Ok(());
    }

    for (i, details) in servers.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_details(details, config.default_server.as_deref() == Some(details.server_id.as_str()));
    }
    Ok(())
}

fn print_details(details: &ServerDetails, is_default: bool) {
    let marker = if is_default {
        format!(" {}", style("(default)").green())
    } else {
        String::new()
    };
    println!("{}{}", style(&details.server_id).cyan().bold(), marker);

    let field = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            println!("  {}: {}", style(label).bold(), value);
        }
    };
    field("Artifactory URL", details.url.clone());
    field("Distribution URL", details.distribution_url.clone());
    field("User", details.user.clone());
    field("Password", details.password.as_deref().map(mask));
    field("API key", details.api_key.as_deref().map(mask));
    field("Access token", details.access_token.as_deref().map(mask));
    if details.insecure_tls {
        field("Insecure TLS", Some("true".to_string()));
    }
}

/// Delete a server
pub fn delete(server_id: &str) -> Result<()> {
    let mut config = ServerConfig::load()?;
    config.remove(server_id)?;
    config.save()?;

    println!("Removed server \"{}\"", server_id);
    if let Some(default) = &config.default_server {
        println!("Default server is now \"{}\"", style(default).cyan());
    }
    Ok(())
}

/// Delete every server
pub fn clear() -> Result<()> {
    let mut config = ServerConfig::load()?;
    let count = config.servers.len();
    config.clear();
    config.save()?;

    println!("Removed {} server(s)", count);
    Ok(())
}

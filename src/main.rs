mod ptm_config;
mod ptm_controllers;
mod ptm_models;
mod ptm_views;

use anyhow::Context;
use clap::Parser;
use ptm_config::{Args, PTMConfig};
use ptm_controllers::PTMControllers;

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PTMConfig::from(Args::parse());

    if let Err(e) = run(&config) {
        eprintln!("{}", diagnostic(&e));
        std::process::exit(1);
    }
}

/// The error with its full cause chain on one line.
fn diagnostic(error: &anyhow::Error) -> String {
    format!("Error: {:#}", error)
}

fn run(config: &PTMConfig) -> anyhow::Result<()> {
    let path = PTMControllers::run(config)
        .with_context(|| format!("Failed to generate map at {}", config.output.display()))?;
    println!("✓ Paris transit map ready: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptm_models::PTMError;

    #[test]
    fn test_diagnostic_is_the_error_chain() {
        let error = anyhow::Error::new(PTMError::NetworkError("transit stops endpoint returned error: 500".to_string()))
            .context("Failed to generate map at paris_map.html");

        assert_eq!(
            diagnostic(&error),
            "Error: Failed to generate map at paris_map.html: Network error: transit stops endpoint returned error: 500"
        );
    }
}

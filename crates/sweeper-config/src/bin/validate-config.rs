//! Config validation CLI tool
//!
//! Validates a sweeper configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use sweeper_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a sweeper configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match sweeper_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", sweeper_config::CURRENT_CONFIG_VERSION);
            println!("  Record store:   {}", config.paths.store_path.display());
            println!("  Audit log:      {}", config.paths.log_path.display());
            println!("  Lock marker:    {}", config.paths.lock_path.display());
            println!("  Home root:      {}", config.paths.home_root.display());
            println!("  Admin user:     {}", config.accounts.admin_user);
            println!("  Command timeout: {}s", config.command_timeout.as_secs());
            println!("  Session kind:   {}", config.sessions.session_kind.as_str());

            if !config.accounts.extra_exclusions.is_empty() {
                println!();
                println!("Extra exclusions:");
                for name in &config.accounts.extra_exclusions {
                    println!("  - {}", name);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                sweeper_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                sweeper_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                sweeper_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                sweeper_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        sweeper_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}

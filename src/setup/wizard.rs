//! First-run interactive setup wizard.
//!
//! Steps:
//! 1. Display banner
//! 2. Collect language-model endpoint and credential
//! 3. Collect receiving address & wallet-connection project id
//! 4. Choose the record store
//! 5. Write oportuna.toml

use crate::config::{self, OportunaConfig, StoreBackend};
use crate::payment::address;
use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// ASCII banner displayed during setup.
const BANNER: &str = r#"
   ___                   _
  / _ \ _ __   ___  _ __| |_ _   _ _ __   __ _
 | | | | '_ \ / _ \| '__| __| | | | '_ \ / _` |
 | |_| | |_) | (_) | |  | |_| |_| | | | | (_| |
  \___/| .__/ \___/|_|   \__|\__,_|_| |_|\__,_|
       |_|
            Your AI-powered business card
"#;

/// Run the interactive setup wizard against stdin.
pub fn run_setup_wizard(home_dir: &Path) -> Result<OportunaConfig> {
    println!("{}", BANNER);
    println!("Welcome to Oportuna setup.\n");

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let config = collect_config(&mut reader)?;

    println!("\n[5/5] Writing configuration...");
    std::fs::create_dir_all(home_dir)?;
    let config_path = home_dir.join(config::CONFIG_FILE);
    config::save_config(&config, &config_path)?;
    println!("  Written: {}", config::CONFIG_FILE);

    let missing = config.missing_fields();
    if missing.is_empty() {
        println!("\nSetup complete! Run `oportuna serve` to start.\n");
    } else {
        println!(
            "\nSaved, but still missing: {}. Set them in the file or environment before serving.\n",
            missing.join(", ")
        );
    }

    Ok(config)
}

/// Ask every question and build the configuration.
fn collect_config(reader: &mut impl BufRead) -> Result<OportunaConfig> {
    let defaults = OportunaConfig::default();

    println!("[1/5] Language model");
    let llm_api_url = prompt_with_default(reader, "  API URL", &defaults.llm_api_url)?;
    let llm_api_key = prompt(reader, "  API key (or press Enter to use OPENAI_API_KEY)")?;
    let llm_model = prompt_with_default(reader, "  Model", &defaults.llm_model)?;

    println!("\n[2/5] Payments");
    let receiving_address = prompt_address(reader)?;
    let wallet_project_id = prompt(
        reader,
        "  Wallet-connection project id (Enter to disable payments)",
    )?;

    println!("\n[3/5] Storage");
    let backend = prompt_with_default(reader, "  Backend (sqlite/supabase)", "sqlite")?;
    let mut config = OportunaConfig {
        llm_api_url,
        llm_api_key,
        llm_model,
        receiving_address,
        wallet_project_id,
        ..defaults
    };
    if backend.eq_ignore_ascii_case("supabase") {
        config.store_backend = StoreBackend::Supabase;
        config.supabase_url = prompt(reader, "  Supabase URL")?;
        config.supabase_key = prompt(reader, "  Supabase anon key")?;
    } else {
        config.db_path = prompt_with_default(reader, "  Database path", &config.db_path)?;
    }

    println!("\n[4/5] Server");
    config.listen_addr = prompt_with_default(reader, "  Listen address", &config.listen_addr)?;

    Ok(config)
}

/// Ask until the address is empty or a valid checksummed account.
fn prompt_address(reader: &mut impl BufRead) -> Result<String> {
    loop {
        let raw = prompt(reader, "  Receiving address (0x...)")?;
        if raw.is_empty() {
            return Ok(raw);
        }
        match address::normalize(&raw) {
            Ok(addr) => return Ok(addr),
            Err(e) => println!("  {}", e),
        }
    }
}

/// Prompt the user for input with a label. EOF reads as empty.
fn prompt(reader: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    reader.read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Prompt with a default value.
fn prompt_with_default(reader: &mut impl BufRead, label: &str, default: &str) -> Result<String> {
    print!("{} [{}]: ", label, default);
    io::stdout().flush()?;
    let mut input = String::new();
    reader.read_line(&mut input)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

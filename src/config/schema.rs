//! Configuration schema for oportuna.toml, with environment overrides.

use crate::payment::address;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Which record store backs agents and conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local SQLite file at `db_path`.
    #[default]
    Sqlite,
    /// Hosted Supabase project (PostgREST).
    Supabase,
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OportunaConfig {
    /// OpenAI-compatible API base URL.
    pub llm_api_url: String,

    /// Language model credential. Required for any reply generation.
    pub llm_api_key: String,

    /// Completion model name.
    pub llm_model: String,

    /// Response-length cap passed to the provider.
    pub max_response_tokens: u32,

    /// Sampling temperature passed to the provider.
    pub temperature: f64,

    /// Address that collects agent fees.
    pub receiving_address: String,

    /// Wallet-connection project identifier. Payments are disabled without it.
    pub wallet_project_id: String,

    pub store_backend: StoreBackend,

    /// Path to the SQLite database (sqlite backend).
    pub db_path: String,

    /// Supabase project URL (supabase backend).
    pub supabase_url: String,

    /// Supabase API key (supabase backend).
    pub supabase_key: String,

    /// Address the HTTP API binds to.
    pub listen_addr: String,

    /// Visitor messages answered before a fee-charging agent asks for payment.
    pub free_visitor_turns: usize,

    /// Idle minutes before an HTTP chat session is dropped.
    pub session_idle_minutes: u64,

    /// Upper bound on open HTTP chat sessions; the least recently used goes first.
    pub max_open_sessions: usize,

    /// Log level used when `--log-level` is not given.
    pub log_level: String,
}

impl Default for OportunaConfig {
    fn default() -> Self {
        Self {
            llm_api_url: "https://api.openai.com".into(),
            llm_api_key: String::new(),
            llm_model: "gpt-3.5-turbo".into(),
            max_response_tokens: 500,
            temperature: 0.7,
            receiving_address: String::new(),
            wallet_project_id: String::new(),
            store_backend: StoreBackend::Sqlite,
            db_path: "~/.oportuna/oportuna.db".into(),
            supabase_url: String::new(),
            supabase_key: String::new(),
            listen_addr: "127.0.0.1:8080".into(),
            free_visitor_turns: 3,
            session_idle_minutes: 30,
            max_open_sessions: 10_000,
            log_level: "info".into(),
        }
    }
}

/// Environment variables that override file settings.
const ENV_OVERRIDES: &[&str] = &[
    "OPENAI_API_KEY",
    "OPORTUNA_LLM_API_URL",
    "OPORTUNA_LLM_MODEL",
    "RECEIVING_ADDRESS",
    "WALLETCONNECT_PROJECT_ID",
    "SUPABASE_URL",
    "SUPABASE_ANON_KEY",
    "OPORTUNA_DB_PATH",
    "OPORTUNA_LISTEN_ADDR",
];

impl OportunaConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in ENV_OVERRIDES {
            let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let slot = match *key {
                "OPENAI_API_KEY" => &mut self.llm_api_key,
                "OPORTUNA_LLM_API_URL" => &mut self.llm_api_url,
                "OPORTUNA_LLM_MODEL" => &mut self.llm_model,
                "RECEIVING_ADDRESS" => &mut self.receiving_address,
                "WALLETCONNECT_PROJECT_ID" => &mut self.wallet_project_id,
                "SUPABASE_URL" => &mut self.supabase_url,
                "SUPABASE_ANON_KEY" => &mut self.supabase_key,
                "OPORTUNA_DB_PATH" => &mut self.db_path,
                "OPORTUNA_LISTEN_ADDR" => &mut self.listen_addr,
                _ => continue,
            };
            *slot = value.trim().to_string();
        }
    }

    /// Required fields that are currently unset, by name.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.llm_api_key.trim().is_empty() {
            missing.push("llm_api_key (OPENAI_API_KEY)");
        }
        if self.receiving_address.trim().is_empty() {
            missing.push("receiving_address (RECEIVING_ADDRESS)");
        }
        if self.store_backend == StoreBackend::Supabase {
            if self.supabase_url.trim().is_empty() {
                missing.push("supabase_url (SUPABASE_URL)");
            }
            if self.supabase_key.trim().is_empty() {
                missing.push("supabase_key (SUPABASE_ANON_KEY)");
            }
        }
        missing
    }

    /// Fail fast on missing or malformed settings before serving visitors.
    ///
    /// Normalizes the receiving address to its checksummed form.
    pub fn validate(&mut self) -> Result<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be between 0 and 2, got {}", self.temperature);
        }
        if self.max_response_tokens == 0 {
            bail!("max_response_tokens must be positive");
        }
        self.receiving_address = address::normalize(&self.receiving_address)?;
        Ok(())
    }

    /// Whether a wallet-connection project is configured.
    pub fn payments_enabled(&self) -> bool {
        !self.wallet_project_id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ADDR: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    #[test]
    fn test_defaults() {
        let cfg = OportunaConfig::default();
        assert_eq!(cfg.llm_model, "gpt-3.5-turbo");
        assert_eq!(cfg.max_response_tokens, 500);
        assert_eq!(cfg.free_visitor_turns, 3);
        assert_eq!(cfg.store_backend, StoreBackend::Sqlite);
        assert!(!cfg.payments_enabled());
    }

    #[test]
    fn test_env_overrides_skip_empty_values() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("RECEIVING_ADDRESS", "  "),
            ("OPORTUNA_LISTEN_ADDR", "0.0.0.0:9000"),
        ]
        .into_iter()
        .collect();

        let mut cfg = OportunaConfig {
            receiving_address: ADDR.into(),
            ..OportunaConfig::default()
        };
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.llm_api_key, "sk-test");
        assert_eq!(cfg.receiving_address, ADDR);
        assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_validate_lists_every_missing_field() {
        let mut cfg = OportunaConfig {
            store_backend: StoreBackend::Supabase,
            ..OportunaConfig::default()
        };
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("llm_api_key"));
        assert!(err.contains("receiving_address"));
        assert!(err.contains("supabase_url"));
        assert!(err.contains("supabase_key"));
    }

    #[test]
    fn test_validate_checksums_receiving_address() {
        let mut cfg = OportunaConfig {
            llm_api_key: "sk-test".into(),
            receiving_address: ADDR.into(),
            ..OportunaConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(
            cfg.receiving_address,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let mut cfg = OportunaConfig {
            llm_api_key: "sk-test".into(),
            receiving_address: "not-an-address".into(),
            ..OportunaConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_backend() {
        let cfg = OportunaConfig {
            store_backend: StoreBackend::Supabase,
            supabase_url: "https://x.supabase.co".into(),
            ..OportunaConfig::default()
        };
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("store_backend = \"supabase\""));
        let back: OportunaConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.store_backend, StoreBackend::Supabase);
        assert_eq!(back.supabase_url, "https://x.supabase.co");
    }
}

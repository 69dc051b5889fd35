//! Agent create/update with ownership checks and form validation.

use super::Dashboard;
use crate::error::{SettingsError, StoreError};
use crate::payment::{format_fee, parse_ether};
use crate::types::*;
use chrono::Utc;
use tracing::info;

type Result<T> = std::result::Result<T, SettingsError>;

/// Lowercase and hyphenate a slug; only `[a-z0-9-]` survives validation.
pub fn normalize_slug(raw: &str) -> Result<String> {
    let slug = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();

    if slug.is_empty() {
        return Err(SettingsError::Validation("slug is required".into()));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(SettingsError::Validation(format!(
            "slug '{slug}' may only contain letters, digits and hyphens"
        )));
    }
    Ok(slug)
}

/// Split a comma-separated interests field, dropping blank entries.
pub fn parse_interests(raw: &str) -> Vec<String> {
    clean_list(raw.split(','))
}

fn clean_list<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validated fields ready to be written onto an agent row.
struct CleanDraft {
    name: String,
    slug: String,
    description: Option<String>,
    personality: Option<String>,
    interests: Vec<String>,
    facts: Vec<String>,
    system_prompt: Option<String>,
    fee_amount: Option<f64>,
    fee_token: String,
}

fn validate(draft: &AgentDraft) -> Result<CleanDraft> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(SettingsError::Validation("name is required".into()));
    }

    if let Some(fee) = draft.fee_amount {
        if !fee.is_finite() || fee < 0.0 {
            return Err(SettingsError::Validation(format!(
                "fee must be a non-negative number, got {fee}"
            )));
        }
        // A positive fee must survive the same conversion the pay action uses.
        if fee > 0.0 {
            match parse_ether(&format_fee(fee)) {
                Ok(wei) if wei > 0 => {}
                Ok(_) => {
                    return Err(SettingsError::Validation(format!(
                        "fee {fee} is smaller than one base unit"
                    )))
                }
                Err(e) => {
                    return Err(SettingsError::Validation(format!("fee cannot be paid: {e}")))
                }
            }
        }
    }

    let fee_token = draft
        .fee_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_FEE_TOKEN)
        .to_string();

    Ok(CleanDraft {
        name: name.to_string(),
        slug: normalize_slug(&draft.slug)?,
        description: clean_text(&draft.description),
        personality: clean_text(&draft.personality),
        interests: clean_list(draft.interests.iter().map(String::as_str)),
        facts: clean_list(draft.facts.iter().map(String::as_str)),
        system_prompt: clean_text(&draft.system_prompt),
        fee_amount: draft.fee_amount,
        fee_token,
    })
}

impl Dashboard {
    /// The owner's agents, newest first.
    pub async fn list_agents(&self, owner: &str) -> Result<Vec<Agent>> {
        Ok(self.store.agents_for_owner(owner).await?)
    }

    /// Read one agent, refusing agents owned by someone else.
    pub async fn get_agent(&self, owner: &str, agent_id: &str) -> Result<Agent> {
        let agent = self
            .store
            .agent_by_id(agent_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("agent {agent_id}")))?;
        if agent.user_id != owner {
            return Err(SettingsError::NotOwner);
        }
        Ok(agent)
    }

    /// Create an agent for an owner with an existing profile.
    pub async fn create_agent(&self, owner: &str, draft: &AgentDraft) -> Result<Agent> {
        if self.store.profile(owner).await?.is_none() {
            return Err(SettingsError::Validation(format!(
                "no profile exists for user '{owner}'"
            )));
        }

        let clean = validate(draft)?;
        let now = Utc::now();
        let agent = Agent {
            id: new_id(),
            user_id: owner.to_string(),
            slug: clean.slug,
            name: clean.name,
            description: clean.description,
            personality: clean.personality,
            interests: clean.interests,
            facts: clean.facts,
            system_prompt: clean.system_prompt,
            fee_amount: clean.fee_amount,
            fee_token: clean.fee_token,
            is_active: draft.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_agent(&agent).await?;
        info!("Created agent '{}' ({}) for {}", agent.slug, agent.id, owner);
        Ok(agent)
    }

    /// Replace an agent's editable fields. Only the owner may update.
    pub async fn update_agent(
        &self,
        owner: &str,
        agent_id: &str,
        draft: &AgentDraft,
    ) -> Result<Agent> {
        let mut agent = self.get_agent(owner, agent_id).await?;
        let clean = validate(draft)?;

        agent.slug = clean.slug;
        agent.name = clean.name;
        agent.description = clean.description;
        agent.personality = clean.personality;
        agent.interests = clean.interests;
        agent.facts = clean.facts;
        agent.system_prompt = clean.system_prompt;
        agent.fee_amount = clean.fee_amount;
        agent.fee_token = clean.fee_token;
        if let Some(active) = draft.is_active {
            agent.is_active = active;
        }
        agent.updated_at = Utc::now();

        self.store.update_agent(&agent).await?;
        info!("Updated agent '{}' ({})", agent.slug, agent.id);
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SqliteStore, Store};
    use std::sync::Arc;

    async fn dashboard_with_owner(owner: &str) -> (Dashboard, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        store
            .upsert_profile(&Profile {
                id: owner.into(),
                username: Some("owner".into()),
                full_name: None,
                role: ProfileRole::User,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        (Dashboard::new(store.clone()), store)
    }

    fn draft(name: &str, slug: &str) -> AgentDraft {
        AgentDraft {
            name: name.into(),
            slug: slug.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("  My Agent  ").unwrap(), "my-agent");
        assert_eq!(normalize_slug("rex-2").unwrap(), "rex-2");
        assert!(normalize_slug("   ").is_err());
        assert!(normalize_slug("ava/../x").is_err());
        assert!(normalize_slug("café").is_err());
    }

    #[test]
    fn test_parse_interests() {
        assert_eq!(
            parse_interests(" rust, ,design ,  ai "),
            vec!["rust", "design", "ai"]
        );
        assert!(parse_interests("").is_empty());
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let (dash, _) = dashboard_with_owner("u1").await;
        let mut d = draft(" Ava ", "Ava Agent");
        d.interests = vec![" ai ".into(), "".into()];
        d.description = Some("   ".into());

        let agent = dash.create_agent("u1", &d).await.unwrap();
        assert_eq!(agent.name, "Ava");
        assert_eq!(agent.slug, "ava-agent");
        assert_eq!(agent.interests, vec!["ai"]);
        assert_eq!(agent.description, None);
        assert_eq!(agent.fee_token, "ETH");
        assert!(agent.is_active);
        assert_eq!(dash.list_agents("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_profile() {
        let (dash, _) = dashboard_with_owner("u1").await;
        let err = dash.create_agent("ghost", &draft("Ava", "ava")).await.unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_fee_and_duplicate_slug() {
        let (dash, _) = dashboard_with_owner("u1").await;
        let mut d = draft("Rex", "rex");
        d.fee_amount = Some(-0.5);
        assert!(matches!(
            dash.create_agent("u1", &d).await,
            Err(SettingsError::Validation(_))
        ));
        d.fee_amount = Some(f64::INFINITY);
        assert!(dash.create_agent("u1", &d).await.is_err());

        d.fee_amount = Some(0.01);
        dash.create_agent("u1", &d).await.unwrap();
        assert!(matches!(
            dash.create_agent("u1", &d).await,
            Err(SettingsError::Store(StoreError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_checks_owner() {
        let (dash, store) = dashboard_with_owner("u1").await;
        let agent = dash.create_agent("u1", &draft("Rex", "rex")).await.unwrap();

        let mut d = draft("Rex Prime", "rex");
        d.fee_amount = Some(0.02);
        d.is_active = Some(false);
        let updated = dash.update_agent("u1", &agent.id, &d).await.unwrap();
        assert_eq!(updated.name, "Rex Prime");
        assert!(!updated.is_active);

        assert!(matches!(
            dash.update_agent("u2", &agent.id, &draft("Hijack", "rex")).await,
            Err(SettingsError::NotOwner)
        ));
        assert!(matches!(
            dash.get_agent("u1", "missing").await,
            Err(SettingsError::Store(StoreError::NotFound(_)))
        ));
        let stored = store.agent_by_id(&agent.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Rex Prime");
        assert_eq!(stored.fee_amount, Some(0.02));
    }

    #[tokio::test]
    async fn test_create_rejects_unpayable_fees() {
        let (dash, _) = dashboard_with_owner("u1").await;
        for fee in [1e-19, 1e21] {
            let mut d = draft("Rex", "rex");
            d.fee_amount = Some(fee);
            let err = dash.create_agent("u1", &d).await.unwrap_err();
            assert!(matches!(err, SettingsError::Validation(_)), "fee {fee}: {err:?}");
        }

        let mut d = draft("Rex", "rex");
        d.fee_amount = Some(0.000000000000000001);
        assert_eq!(dash.create_agent("u1", &d).await.unwrap().fee_amount, Some(1e-18));
        assert!(dash.list_agents("u1").await.unwrap().len() == 1);
    }
}

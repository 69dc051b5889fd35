//! Hosted store over Supabase's PostgREST interface.

use crate::error::StoreError;
use crate::state::store::{Store, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supabase REST client implementing [`Store`].
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesPatch<'a> {
    messages: &'a [ChatMessage],
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AmountRow {
    amount: f64,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn get(&self, table: &str) -> RequestBuilder {
        self.authed(self.http.get(self.table_url(table)))
    }

    /// Run a select and decode every returned row.
    async fn select<T: DeserializeOwned>(&self, req: RequestBuilder) -> StoreResult<Vec<T>> {
        let resp = check(req.send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn select_one<T: DeserializeOwned>(&self, req: RequestBuilder) -> StoreResult<Option<T>> {
        let rows: Vec<T> = self.select(req.query(&[("limit", "1")])).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> StoreResult<()> {
        debug!("Supabase insert into {}", table);
        let req = self
            .authed(self.http.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(row);
        check(req.send().await?).await?;
        Ok(())
    }

    /// PATCH rows matching `filters`; an empty representation means nothing matched.
    async fn patch<T: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &T,
        what: &str,
    ) -> StoreResult<()> {
        let req = self
            .authed(self.http.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body);
        let resp = check(req.send().await?).await?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&resp.text().await?)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(what.to_string()));
        }
        Ok(())
    }

    /// Exact row count for agents in `agent_ids`, read from `Content-Range`.
    async fn count_for(&self, table: &str, agent_ids: &[String]) -> StoreResult<u64> {
        if agent_ids.is_empty() {
            return Ok(0);
        }
        let req = self
            .authed(self.http.head(self.table_url(table)))
            .header("Prefer", "count=exact")
            .query(&[("select", "id".to_string()), ("agent_id", in_filter(agent_ids))]);
        let resp = check(req.send().await?).await?;
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode("missing Content-Range header".into()))?;
        parse_content_range_total(range)
    }
}

/// Map non-success responses onto the store taxonomy.
async fn check(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status.as_u16() {
        404 => Err(StoreError::NotFound(body)),
        409 if !is_foreign_key_violation(&body) => Err(StoreError::Conflict(body)),
        _ => Err(StoreError::Backend(format!("Supabase request failed ({status}): {body}"))),
    }
}

/// PostgREST answers 409 for both unique and foreign-key violations.
fn is_foreign_key_violation(body: &str) -> bool {
    #[derive(Deserialize)]
    struct PgError {
        #[serde(default)]
        code: String,
    }
    serde_json::from_str::<PgError>(body).is_ok_and(|e| e.code == "23503")
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// PostgREST `in.(...)` filter; values are quoted so commas stay literal.
fn in_filter(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Total from a `Content-Range` value such as `0-24/3573` or `*/0`.
fn parse_content_range_total(value: &str) -> StoreResult<u64> {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
        .ok_or_else(|| StoreError::Decode(format!("unexpected Content-Range '{value}'")))
}

const NEWEST_FIRST: (&str, &str) = ("order", "created_at.desc");

#[async_trait]
impl Store for SupabaseStore {
    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>> {
        self.select_one(self.get("agents").query(&[("select", "*".into()), ("slug", eq(slug))]))
            .await
    }

    async fn agent_by_id(&self, id: &str) -> StoreResult<Option<Agent>> {
        self.select_one(self.get("agents").query(&[("select", "*".into()), ("id", eq(id))]))
            .await
    }

    async fn agents_for_owner(&self, user_id: &str) -> StoreResult<Vec<Agent>> {
        self.select(
            self.get("agents")
                .query(&[("select", "*".into()), ("user_id", eq(user_id))])
                .query(&[NEWEST_FIRST]),
        )
        .await
    }

    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.insert("agents", agent).await
    }

    async fn update_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.patch(
            "agents",
            &[("id", eq(&agent.id)), ("user_id", eq(&agent.user_id))],
            agent,
            &format!("agent {}", agent.id),
        )
        .await
    }

    async fn latest_conversation(&self, agent_id: &str) -> StoreResult<Option<Conversation>> {
        self.select_one(
            self.get("agent_conversations")
                .query(&[("select", "*".into()), ("agent_id", eq(agent_id))])
                .query(&[NEWEST_FIRST]),
        )
        .await
    }

    async fn conversations_for_agent(&self, agent_id: &str) -> StoreResult<Vec<Conversation>> {
        self.select(
            self.get("agent_conversations")
                .query(&[("select", "*".into()), ("agent_id", eq(agent_id))])
                .query(&[NEWEST_FIRST]),
        )
        .await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        self.insert("agent_conversations", conversation).await
    }

    async fn update_conversation_messages(
        &self,
        id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.patch(
            "agent_conversations",
            &[("id", eq(id))],
            &MessagesPatch {
                messages,
                updated_at,
            },
            &format!("conversation {id}"),
        )
        .await
    }

    async fn count_conversations(&self, agent_ids: &[String]) -> StoreResult<u64> {
        self.count_for("agent_conversations", agent_ids).await
    }

    async fn record_visit(&self, visit: &AgentVisit) -> StoreResult<()> {
        self.insert("agent_visits", visit).await
    }

    async fn count_visits(&self, agent_ids: &[String]) -> StoreResult<u64> {
        self.count_for("agent_visits", agent_ids).await
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        self.insert("transactions", tx).await
    }

    async fn completed_amounts(&self, agent_ids: &[String]) -> StoreResult<Vec<f64>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<AmountRow> = self
            .select(self.get("transactions").query(&[
                ("select", "amount".to_string()),
                ("status", eq("completed")),
                ("agent_id", in_filter(agent_ids)),
            ]))
            .await?;
        Ok(rows.into_iter().map(|r| r.amount).collect())
    }

    async fn profile(&self, id: &str) -> StoreResult<Option<Profile>> {
        self.select_one(self.get("profiles").query(&[("select", "*".into()), ("id", eq(id))]))
            .await
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        let req = self
            .authed(self.http.post(self.table_url("profiles")))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(profile);
        check(req.send().await?).await?;
        Ok(())
    }
}

use super::Dashboard;
use crate::types::{Agent, DashboardStats, DEFAULT_FEE_TOKEN};
use tracing::error;

/// Token of the newest fee-charging agent; earnings are summed in it.
fn earnings_token(agents: &[Agent]) -> &str {
    agents
        .iter()
        .find(|a| a.charges_fee())
        .map(|a| a.fee_token.as_str())
        .unwrap_or(DEFAULT_FEE_TOKEN)
}

impl Dashboard {
    /// Visits, conversations and completed earnings across the owner's agents.
    ///
    /// The three aggregate reads run concurrently. If any of them fails the
    /// whole set is discarded and zeroed stats are returned.
    pub async fn stats(&self, owner: &str) -> DashboardStats {
        let agents = match self.store.agents_for_owner(owner).await {
            Ok(agents) => agents,
            Err(e) => {
                error!("Error fetching agents for stats: {}", e);
                return DashboardStats::default();
            }
        };
        let agent_ids: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        if agent_ids.is_empty() {
            return DashboardStats::default();
        }

        let (visits, conversations, amounts) = tokio::join!(
            self.store.count_visits(&agent_ids),
            self.store.count_conversations(&agent_ids),
            self.store.completed_amounts(&agent_ids),
        );

        match (visits, conversations, amounts) {
            (Ok(visits), Ok(conversations), Ok(amounts)) => {
                DashboardStats::new(visits, conversations, amounts.iter().sum())
                    .with_token(earnings_token(&agents))
            }
            (visits, conversations, amounts) => {
                let failures = [visits.err(), conversations.err(), amounts.err()];
                for e in failures.iter().flatten() {
                    error!("Error fetching stats: {}", e);
                }
                DashboardStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{save_transcript, SqliteStore, Store};
    use crate::testutil::{agent, seed_agent, Aggregate, FailingStore};
    use crate::types::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn visit(agent_id: &str) -> AgentVisit {
        AgentVisit {
            id: new_id(),
            agent_id: agent_id.into(),
            info: VisitInfo::default(),
            created_at: Utc::now(),
        }
    }

    fn tx(agent_id: &str, amount: f64, status: TransactionStatus) -> Transaction {
        Transaction {
            id: new_id(),
            agent_id: agent_id.into(),
            conversation_id: None,
            from_address: "0xabc".into(),
            amount,
            token: "ETH".into(),
            tx_hash: new_id(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stats_aggregate_owner_agents_only() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let ava = agent("Ava", "ava", None);
        let mut rex = agent("Rex", "rex", Some(0.01));
        rex.fee_token = "USDC".into();
        let mut other = agent("Other", "other", None);
        other.user_id = "owner-2".into();
        for a in [&ava, &rex, &other] {
            seed_agent(store.as_ref(), a).await;
        }

        for id in [&ava.id, &ava.id, &rex.id, &rex.id, &other.id] {
            store.record_visit(&visit(id)).await.unwrap();
        }
        save_transcript(store.as_ref(), &ava.id, None, &[ChatMessage::user("Hi")])
            .await
            .unwrap();
        store.insert_transaction(&tx(&rex.id, 0.01, TransactionStatus::Completed)).await.unwrap();
        store.insert_transaction(&tx(&rex.id, 0.02, TransactionStatus::Completed)).await.unwrap();
        store.insert_transaction(&tx(&rex.id, 5.0, TransactionStatus::Pending)).await.unwrap();
        store.insert_transaction(&tx(&other.id, 9.0, TransactionStatus::Completed)).await.unwrap();

        let stats = Dashboard::new(store).stats("owner-1").await;
        assert_eq!(stats.total_visits, 4);
        assert_eq!(stats.total_conversations, 1);
        assert!((stats.total_earnings - 0.03).abs() < 1e-9);
        assert_eq!(stats.conversion_rate, 25.0);
        assert_eq!(stats.earnings_token, "USDC");
    }

    #[tokio::test]
    async fn test_stats_default_for_owner_without_agents() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let stats = Dashboard::new(store).stats("nobody").await;
        assert_eq!(stats, DashboardStats::default());
    }

    #[tokio::test]
    async fn test_any_failed_aggregate_zeroes_all_stats() {
        for broken in [Aggregate::Visits, Aggregate::Conversations, Aggregate::Earnings] {
            let store = Arc::new(FailingStore::new(broken));
            let rex = agent("Rex", "rex", Some(0.01));
            seed_agent(store.as_ref(), &rex).await;
            store.record_visit(&visit(&rex.id)).await.unwrap();
            save_transcript(store.as_ref(), &rex.id, None, &[ChatMessage::user("Hi")])
                .await
                .unwrap();
            store
                .insert_transaction(&tx(&rex.id, 0.01, TransactionStatus::Completed))
                .await
                .unwrap();

            let stats = Dashboard::new(store).stats("owner-1").await;
            assert_eq!(stats, DashboardStats::default(), "broken {broken:?}");
        }
    }
}

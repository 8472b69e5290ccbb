//! Agent directory and permission checks
//!
//! Role evaluation is external to the messaging core; it is consumed here
//! through a narrow trait so the core never inspects role semantics beyond
//! an opaque permission name.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use chatdesk_shared::{permission, Agent, AgentId, AgentRole, CompanyId, CoreError, CoreResult};

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn agent(&self, id: AgentId) -> CoreResult<Agent>;

    /// Resolve a bearer token to an agent, or None for an unknown token.
    async fn agent_by_token(&self, token: &str) -> CoreResult<Option<Agent>>;

    /// All agents of a company, in a stable order.
    async fn company_agents(&self, company_id: CompanyId) -> CoreResult<Vec<Agent>>;

    async fn has_permission(&self, agent_id: AgentId, permission: &str) -> CoreResult<bool>;
}

/// Default role-to-permission mapping, shared by directory implementations.
pub fn role_grants(role: AgentRole, permission_name: &str) -> bool {
    match permission_name {
        permission::HANDLE_CONVERSATIONS => true,
        permission::SUPERVISE_CONVERSATIONS => {
            matches!(role, AgentRole::Supervisor | AgentRole::Admin)
        }
        _ => false,
    }
}

/// In-memory directory, used by tests and single-process deployments.
pub struct InMemoryDirectory {
    // Insertion order per company is preserved; auto-routing relies on a
    // stable agent ordering for deterministic tie-breaks.
    agents: RwLock<Vec<Agent>>,
    tokens: RwLock<HashMap<String, AgentId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_agent(&self, agent: Agent, token: impl Into<String>) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.into(), agent.id);
        drop(tokens);

        let mut agents = self.agents.write().await;
        agents.retain(|a| a.id != agent.id);
        agents.push(agent);
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
    async fn agent(&self, id: AgentId) -> CoreResult<Agent> {
        let agents = self.agents.read().await;
        agents
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(CoreError::NotFound("agent"))
    }

    async fn agent_by_token(&self, token: &str) -> CoreResult<Option<Agent>> {
        let tokens = self.tokens.read().await;
        let Some(id) = tokens.get(token).copied() else {
            return Ok(None);
        };
        drop(tokens);

        let agents = self.agents.read().await;
        Ok(agents.iter().find(|a| a.id == id).cloned())
    }

    async fn company_agents(&self, company_id: CompanyId) -> CoreResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents
            .iter()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn has_permission(&self, agent_id: AgentId, permission_name: &str) -> CoreResult<bool> {
        let agent = self.agent(agent_id).await?;
        Ok(role_grants(agent.role, permission_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(company_id: CompanyId, role: AgentRole) -> Agent {
        Agent {
            id: AgentId::new(),
            company_id,
            display_name: "rep".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_token_lookup() {
        let directory = InMemoryDirectory::new();
        let company_id = CompanyId::new();
        let rep = agent(company_id, AgentRole::CustomerCare);
        let rep_id = rep.id;
        directory.add_agent(rep, "tok-1").await;

        let found = directory.agent_by_token("tok-1").await.unwrap().unwrap();
        assert_eq!(found.id, rep_id);
        assert!(directory.agent_by_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_role_grants() {
        let directory = InMemoryDirectory::new();
        let company_id = CompanyId::new();
        let rep = agent(company_id, AgentRole::CustomerCare);
        let boss = agent(company_id, AgentRole::Supervisor);
        directory.add_agent(rep.clone(), "rep").await;
        directory.add_agent(boss.clone(), "boss").await;

        assert!(directory
            .has_permission(rep.id, permission::HANDLE_CONVERSATIONS)
            .await
            .unwrap());
        assert!(!directory
            .has_permission(rep.id, permission::SUPERVISE_CONVERSATIONS)
            .await
            .unwrap());
        assert!(directory
            .has_permission(boss.id, permission::SUPERVISE_CONVERSATIONS)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_company_agents_preserves_insertion_order() {
        let directory = InMemoryDirectory::new();
        let company_id = CompanyId::new();
        let a = agent(company_id, AgentRole::CustomerCare);
        let b = agent(company_id, AgentRole::CustomerCare);
        directory.add_agent(a.clone(), "a").await;
        directory.add_agent(b.clone(), "b").await;
        directory.add_agent(agent(CompanyId::new(), AgentRole::CustomerCare), "x").await;

        let listed = directory.company_agents(company_id).await.unwrap();
        assert_eq!(
            listed.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![a.id, b.id]
        );
    }
}

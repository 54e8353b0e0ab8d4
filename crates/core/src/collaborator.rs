//! Contracts for the collaborators the orchestration core consumes but does
//! not own: the RAG/context store and the tenant persistence layer.

use crate::error::CollaboratorError;
use crate::tenant::{ActiveIntegrations, PlanTier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A chunk of knowledge returned by the retrieval layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    /// Similarity score, higher is more relevant
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Best-effort retrieval of tenant knowledge for prompt enrichment.
///
/// Results are ordered by relevance and may be empty. Callers treat
/// errors as "no context".
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve_context(
        &self,
        query: &str,
        tenant_id: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, CollaboratorError>;
}

/// Read-only, eventually-consistent tenant entitlements.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn get_active_integrations(
        &self,
        tenant_id: &str,
    ) -> Result<ActiveIntegrations, CollaboratorError>;

    async fn get_plan(&self, tenant_id: &str) -> Result<PlanTier, CollaboratorError>;
}

#[derive(Debug, Clone)]
struct TenantRecord {
    plan: PlanTier,
    integrations: ActiveIntegrations,
}

/// In-memory tenant directory for tests, demos and single-tenant setups.
#[derive(Debug, Default)]
pub struct StaticTenantDirectory {
    tenants: RwLock<HashMap<String, TenantRecord>>,
}

impl StaticTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant.
    pub fn upsert(
        &self,
        tenant_id: impl Into<String>,
        plan: PlanTier,
        integrations: ActiveIntegrations,
    ) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.insert(tenant_id.into(), TenantRecord { plan, integrations });
        }
    }

    fn record(&self, tenant_id: &str) -> Result<TenantRecord, CollaboratorError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| CollaboratorError::Unavailable("tenant directory poisoned".into()))?;
        tenants
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::TenantNotFound(tenant_id.to_string()))
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn get_active_integrations(
        &self,
        tenant_id: &str,
    ) -> Result<ActiveIntegrations, CollaboratorError> {
        self.record(tenant_id).map(|r| r.integrations)
    }

    async fn get_plan(&self, tenant_id: &str) -> Result<PlanTier, CollaboratorError> {
        self.record(tenant_id).map(|r| r.plan)
    }
}

/// Keyword-overlap retriever over a fixed set of documents per tenant.
///
/// Stands in for the vector store when none is wired up.
#[derive(Debug, Default)]
pub struct StaticContextRetriever {
    documents: HashMap<String, Vec<String>>,
}

impl StaticContextRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, tenant_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents
            .entry(tenant_id.into())
            .or_default()
            .push(text.into());
        self
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ContextRetriever for StaticContextRetriever {
    async fn retrieve_context(
        &self,
        query: &str,
        tenant_id: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, CollaboratorError> {
        let Some(docs) = self.documents.get(tenant_id) else {
            return Ok(Vec::new());
        };
        let query_words = words(query);
        if query_words.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<RetrievedChunk> = docs
            .iter()
            .filter_map(|doc| {
                let doc_words = words(doc);
                let hits = query_words.iter().filter(|w| doc_words.contains(w)).count();
                (hits > 0).then(|| RetrievedChunk {
                    content: doc.clone(),
                    score: hits as f32 / query_words.len() as f32,
                    metadata: serde_json::Map::new(),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{Credentials, IntegrationKey};

    #[tokio::test]
    async fn static_directory_returns_plan_and_integrations() {
        let dir = StaticTenantDirectory::new();
        let integrations: ActiveIntegrations =
            [(IntegrationKey::Stripe, Credentials::new().with("secret_key", "sk"))]
                .into_iter()
                .collect();
        dir.upsert("acme", PlanTier::Pro, integrations);

        assert_eq!(dir.get_plan("acme").await.unwrap(), PlanTier::Pro);
        let active = dir.get_active_integrations("acme").await.unwrap();
        assert!(active.contains_key(&IntegrationKey::Stripe));
    }

    #[tokio::test]
    async fn unknown_tenant_is_an_error() {
        let dir = StaticTenantDirectory::new();
        assert!(matches!(
            dir.get_plan("ghost").await,
            Err(CollaboratorError::TenantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn static_retriever_ranks_by_overlap() {
        let retriever = StaticContextRetriever::new()
            .with_document("acme", "Nuestro horario es de lunes a viernes de 9 a 18")
            .with_document("acme", "Aceptamos pagos con tarjeta y transferencia")
            .with_document("other", "Horario de fin de semana");

        let chunks = retriever
            .retrieve_context("¿Cuál es el horario de lunes?", "acme", 5)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("lunes"));

        let none = retriever.retrieve_context("hola", "nobody", 5).await.unwrap();
        assert!(none.is_empty());
    }
}

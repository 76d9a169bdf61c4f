use async_trait::async_trait;

use crate::db::models::opportunity::Opportunity;

/// Optional LLM-assisted re-rendering of a formatter message. No-op-default
/// (§9 design note): a future implementation can plug in without changing
/// the manager's call sites. On `None`, the manager uses the deterministic
/// formatter output unchanged.
#[async_trait]
pub trait DecisionAdvisor: Send + Sync {
    async fn maybe_rewrite(
        &self,
        org_name: &str,
        opportunities: &[Opportunity],
        deterministic_message: &str,
    ) -> Option<String>;
}

pub struct NoOpAdvisor;

#[async_trait]
impl DecisionAdvisor for NoOpAdvisor {
    async fn maybe_rewrite(
        &self,
        _org_name: &str,
        _opportunities: &[Opportunity],
        _deterministic_message: &str,
    ) -> Option<String> {
        None
    }
}

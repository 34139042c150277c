//! Multi-agent coordination
//!
//! The coordinator owns the agent, conversation and match-history tables.
//! Candidate search scores a user against every other registered agent under
//! every domain matcher and keeps the best domain per pair; negotiations run
//! sequentially with a pacing delay, or in parallel for distinct pairs.

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agents::domain::{DomainMatcher, DomainRegistry, MatchPotential};
use crate::agents::negotiation::{Agreement, Conversation, ConversationStatus, NegotiationFacilitator, NegotiationOutcome};
use crate::agents::profile::{complementarity, UserProfile};
use crate::agents::representative::{Negotiator, UserRepresentativeAgent};
use crate::agents::AgentError;
use crate::config::BrokerConfig;
use crate::{BrokerError, Result};

/// Weight of the best domain score in the overall score
const DOMAIN_WEIGHT: f64 = 0.6;
/// Weight of the general compatibility score in the overall score
const GENERAL_WEIGHT: f64 = 0.4;

/// A scored pairing proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub user_id: String,
    pub target_id: String,
    /// Best-scoring domain for the pair
    pub domain: String,
    pub domain_score: f64,
    pub general_score: f64,
    /// `0.6·domain_score + 0.4·general_score`
    pub overall_score: f64,
    pub recommended: bool,
    pub potential: MatchPotential,
}

/// Result of a full matching run for one user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingReport {
    pub user_id: String,
    pub candidates: Vec<Candidate>,
    pub results: Vec<NegotiationOutcome>,
    pub agreements: Vec<Agreement>,
    /// Negotiations that could not be run, as `(target, error)`
    pub errors: Vec<(String, String)>,
}

/// Aggregate view over every conversation the coordinator has run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatistics {
    pub agents: usize,
    pub matchers: usize,
    pub conversations: usize,
    pub agreements: usize,
    pub success_rate: f64,
    pub average_rounds: f64,
    pub average_mutual_benefit: f64,
}

/// Registers agents, finds candidates and drives negotiations
pub struct MultiAgentCoordinator {
    agents: Arc<DashMap<String, Arc<dyn Negotiator>>>,
    registry: Arc<DomainRegistry>,
    facilitator: NegotiationFacilitator,
    conversations: Arc<DashMap<Uuid, Conversation>>,
    match_history: Arc<DashMap<String, Vec<Candidate>>>,
    config: BrokerConfig,
}

impl MultiAgentCoordinator {
    pub fn new(config: BrokerConfig, registry: Arc<DomainRegistry>) -> Self {
        Self {
            agents: Arc::new(DashMap::new()),
            facilitator: NegotiationFacilitator::new(config.negotiation.clone(), registry.clone()),
            registry,
            conversations: Arc::new(DashMap::new()),
            match_history: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Coordinator with the four built-in domain matchers
    pub fn with_default_matchers(config: BrokerConfig) -> Self {
        Self::new(config, Arc::new(DomainRegistry::with_defaults()))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// Create and register a representative agent for a user
    pub fn register_user(&self, user_id: &str, profile: UserProfile) -> Result<Arc<UserRepresentativeAgent>> {
        if profile.user_id != user_id {
            return Err(AgentError::InvalidProfile(format!(
                "profile belongs to {}, not {user_id}",
                profile.user_id
            ))
            .into());
        }
        let agent = Arc::new(UserRepresentativeAgent::new(
            profile,
            self.config.negotiation.acceptance_threshold,
        )?);
        self.register_negotiator(agent.clone())?;
        Ok(agent)
    }

    /// Register any negotiator under its user id
    pub fn register_negotiator(&self, agent: Arc<dyn Negotiator>) -> Result<()> {
        let user_id = agent.user_id().to_string();
        match self.agents.entry(user_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(AgentError::AlreadyRegistered(entry.key().clone()).into())
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                info!(user_id = %entry.key(), "registered agent");
                entry.insert(agent);
                Ok(())
            }
        }
    }

    /// Register or replace a domain matcher
    pub fn register_matcher(&self, matcher: Arc<dyn DomainMatcher>) {
        self.registry.register(matcher);
    }

    pub fn agent(&self, user_id: &str) -> Option<Arc<dyn Negotiator>> {
        self.agents.get(user_id).map(|entry| entry.value().clone())
    }

    fn require_agent(&self, user_id: &str) -> std::result::Result<Arc<dyn Negotiator>, AgentError> {
        self.agent(user_id)
            .ok_or_else(|| AgentError::NotFound(user_id.to_string()))
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Score a user against every other agent, best first
    #[instrument(skip(self))]
    pub async fn find_candidates(&self, user_id: &str) -> Result<Vec<Candidate>> {
        let focal = self.require_agent(user_id)?;
        let matchers = self.registry.matchers();
        let others: Vec<Arc<dyn Negotiator>> = self
            .agents
            .iter()
            .filter(|entry| entry.key() != user_id)
            .map(|entry| entry.value().clone())
            .collect();

        let threshold = self.config.coordinator.recommendation_threshold;
        let scored = join_all(
            others
                .iter()
                .map(|other| score_pair(focal.as_ref(), other.as_ref(), &matchers, threshold)),
        )
        .await;

        let mut candidates: Vec<Candidate> = scored.into_iter().flatten().collect();
        candidates.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.target_id.cmp(&b.target_id))
        });

        info!(
            candidates = candidates.len(),
            recommended = candidates.iter().filter(|c| c.recommended).count(),
            "candidate search finished"
        );
        self.match_history
            .insert(user_id.to_string(), candidates.clone());
        Ok(candidates)
    }

    /// Negotiate one candidate pairing under its best domain
    pub async fn negotiate(&self, candidate: &Candidate) -> Result<NegotiationOutcome> {
        let agent1 = self.require_agent(&candidate.user_id)?;
        let agent2 = self.require_agent(&candidate.target_id)?;
        let outcome = self
            .facilitator
            .negotiate(agent1, agent2, &candidate.domain)
            .await?;
        self.conversations
            .insert(outcome.conversation_id, outcome.conversation.clone());
        Ok(outcome)
    }

    /// Negotiate distinct pairings in parallel, bounded by `max_concurrency`
    pub async fn negotiate_concurrently(&self, candidates: &[Candidate]) -> Vec<Result<NegotiationOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.coordinator.max_concurrency.max(1)));
        join_all(candidates.iter().map(|candidate| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| BrokerError::Internal(format!("semaphore closed: {e}")))?;
                self.negotiate(candidate).await
            }
        }))
        .await
    }

    /// Find candidates and negotiate the recommended ones in order, pausing
    /// between negotiations. A failing negotiation is recorded and the run
    /// moves on to the next candidate.
    #[instrument(skip(self))]
    pub async fn run_full_matching_process(&self, user_id: &str, max_negotiations: usize) -> Result<MatchingReport> {
        let candidates = self.find_candidates(user_id).await?;
        let mut report = MatchingReport {
            user_id: user_id.to_string(),
            ..MatchingReport::default()
        };

        let recommended: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.recommended)
            .take(max_negotiations)
            .collect();
        for (i, candidate) in recommended.into_iter().enumerate() {
            if i > 0 && !self.config.coordinator.pacing_delay.is_zero() {
                tokio::time::sleep(self.config.coordinator.pacing_delay).await;
            }
            match self.negotiate(candidate).await {
                Ok(outcome) => {
                    if let Some(agreement) = &outcome.agreement {
                        report.agreements.push(agreement.clone());
                    }
                    report.results.push(outcome);
                }
                Err(e) => {
                    warn!(target_id = %candidate.target_id, error = %e, "negotiation failed");
                    report.errors.push((candidate.target_id.clone(), e.to_string()));
                }
            }
        }

        info!(
            negotiations = report.results.len(),
            agreements = report.agreements.len(),
            "matching process finished"
        );
        report.candidates = candidates;
        Ok(report)
    }

    pub fn conversation(&self, id: &Uuid) -> Option<Conversation> {
        self.conversations.get(id).map(|entry| entry.value().clone())
    }

    /// Conversations a user took part in, oldest first
    pub fn conversations_of(&self, user_id: &str) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|entry| entry.value().involves(user_id))
            .map(|entry| entry.value().clone())
            .collect();
        conversations.sort_by_key(|c| c.started_at);
        conversations
    }

    /// Candidates of the user's latest search
    pub fn match_history(&self, user_id: &str) -> Vec<Candidate> {
        self.match_history
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn statistics(&self) -> CoordinatorStatistics {
        let conversations: Vec<Conversation> = self.conversations.iter().map(|e| e.value().clone()).collect();
        let total = conversations.len();
        let agreements: Vec<&Agreement> = conversations
            .iter()
            .filter(|c| c.status == ConversationStatus::AgreementReached)
            .filter_map(|c| c.agreement.as_ref())
            .collect();

        let mean = |sum: f64, count: usize| if count == 0 { 0.0 } else { sum / count as f64 };
        CoordinatorStatistics {
            agents: self.agents.len(),
            matchers: self.registry.len(),
            conversations: total,
            agreements: agreements.len(),
            success_rate: mean(agreements.len() as f64, total),
            average_rounds: mean(conversations.iter().map(|c| c.rounds as f64).sum(), total),
            average_mutual_benefit: mean(
                agreements.iter().map(|a| a.mutual_benefit.overall_score).sum(),
                agreements.len(),
            ),
        }
    }
}

/// Best domain for a pair combined with general compatibility
async fn score_pair(
    focal: &dyn Negotiator,
    other: &dyn Negotiator,
    matchers: &[Arc<dyn DomainMatcher>],
    threshold: f64,
) -> Option<Candidate> {
    let (a, b) = (focal.profile(), other.profile());
    let potentials = join_all(matchers.iter().map(|m| m.identify_match_potential(a, b))).await;

    // First in domain order wins a tie
    let best = potentials.into_iter().fold(None::<MatchPotential>, |best, p| match best {
        Some(b) if b.score >= p.score => Some(b),
        _ => Some(p),
    })?;

    let general = general_compatibility(a, b);
    let overall = DOMAIN_WEIGHT * best.score + GENERAL_WEIGHT * general;
    Some(Candidate {
        user_id: focal.user_id().to_string(),
        target_id: other.user_id().to_string(),
        domain: best.domain.clone(),
        domain_score: best.score,
        general_score: general,
        overall_score: overall,
        recommended: overall >= threshold,
        potential: best,
    })
}

/// `0.5·complementarity + 0.2·shared-goal ratio + 0.15·industry + 0.15·location`
pub fn general_compatibility(a: &UserProfile, b: &UserProfile) -> f64 {
    let goals = a.goals.len().max(b.goals.len());
    let goal_ratio = if goals == 0 {
        0.0
    } else {
        a.shared_goals(b) as f64 / goals as f64
    };
    let indicator = |same: Option<bool>| if same == Some(true) { 1.0 } else { 0.0 };

    (0.5 * complementarity(a, b)
        + 0.2 * goal_ratio
        + 0.15 * indicator(a.same_industry(b))
        + 0.15 * indicator(a.same_location(b)))
    .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> BrokerConfig {
        let mut config = BrokerConfig::default();
        config.coordinator.pacing_delay = Duration::ZERO;
        config
    }

    fn founder() -> UserProfile {
        UserProfile::builder("founder")
            .industry("fintech")
            .location("Berlin")
            .need_critical("funding")
            .offering("talent")
            .goal("scale payments")
            .build()
    }

    fn investor() -> UserProfile {
        UserProfile::builder("investor")
            .industry("fintech")
            .location("Berlin")
            .need_high("talent")
            .offering("funding")
            .goal("scale payments")
            .build()
    }

    #[test]
    fn test_registration_rules() {
        let coordinator = MultiAgentCoordinator::with_default_matchers(config());
        coordinator.register_user("founder", founder()).unwrap();

        assert!(matches!(
            coordinator.register_user("founder", founder()),
            Err(BrokerError::Agent(AgentError::AlreadyRegistered(_)))
        ));
        assert!(matches!(
            coordinator.register_user("someone", investor()),
            Err(BrokerError::Agent(AgentError::InvalidProfile(_)))
        ));
        assert_eq!(coordinator.agent_count(), 1);
    }

    #[test]
    fn test_general_compatibility_of_complementary_pair() {
        assert!((general_compatibility(&founder(), &investor()) - 1.0).abs() < 1e-12);
        let stranger = UserProfile::builder("x").offering("poetry").build();
        assert_eq!(general_compatibility(&founder(), &stranger), 0.0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let coordinator = MultiAgentCoordinator::with_default_matchers(config());
        assert!(matches!(
            coordinator.find_candidates("ghost").await,
            Err(BrokerError::Agent(AgentError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_full_matching_records_conversations() {
        let coordinator = MultiAgentCoordinator::with_default_matchers(config());
        coordinator.register_user("founder", founder()).unwrap();
        coordinator.register_user("investor", investor()).unwrap();

        let report = coordinator.run_full_matching_process("founder", 3).await.unwrap();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].domain, "investor_startup");
        assert!(report.candidates[0].recommended);
        assert_eq!(report.agreements.len(), 1);

        let stats = coordinator.statistics();
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(coordinator.conversations_of("investor").len(), 1);
        assert_eq!(coordinator.match_history("founder").len(), 1);
    }
}

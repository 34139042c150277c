//! Per-user negotiating agent

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::agents::domain::UtilityWeights;
use crate::agents::negotiation::{Agreement, ConversationStatus, MatchTerms, Side};
use crate::agents::profile::{keywords_match, UserProfile};
use crate::agents::AgentError;

/// Result of evaluating proposed terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalEvaluation {
    /// Utility in `[0, 1]`
    pub score: f64,
    pub should_accept: bool,
    pub counter_offer: Option<MatchTerms>,
    pub concerns: Vec<String>,
}

impl ProposalEvaluation {
    /// Flat rejection without a counter-offer
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            should_accept: false,
            counter_offer: None,
            concerns: vec![reason.into()],
        }
    }
}

/// Entry of an agent's append-only negotiation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    pub conversation_id: Uuid,
    pub counterpart_id: String,
    pub domain: String,
    pub status: ConversationStatus,
    pub agreement: Option<Agreement>,
    pub rounds: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Contract the facilitator negotiates through
#[async_trait]
pub trait Negotiator: Send + Sync {
    fn user_id(&self) -> &str;

    /// Profile used for benefit attribution
    fn profile(&self) -> &UserProfile;

    /// Opening message to the counterpart
    async fn introduce(&self, counterpart_id: &str) -> String {
        let profile = self.profile();
        format!(
            "Hello {counterpart_id}, {} here. Looking for {}; offering {}.",
            self.user_id(),
            join_or(&profile.need_descriptions(), "new opportunities"),
            join_or(&profile.offerings, "collaboration"),
        )
    }

    /// Opening terms: give every offering, ask for every need
    async fn initial_proposal(&self, side: Side) -> MatchTerms {
        let profile = self.profile();
        MatchTerms::from_perspective(
            side,
            profile.offerings.clone(),
            profile.need_descriptions(),
            Vec::new(),
            None,
        )
    }

    /// Judge terms from the given side
    async fn evaluate_proposal(&self, terms: &MatchTerms, side: Side, weights: &UtilityWeights) -> ProposalEvaluation;

    /// Append a finished negotiation to the history
    async fn record_outcome(&self, record: NegotiationRecord);
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

/// Agent holding a private profile snapshot and its negotiation history
#[derive(Debug)]
pub struct UserRepresentativeAgent {
    profile: UserProfile,
    acceptance_threshold: f64,
    history: RwLock<Vec<NegotiationRecord>>,
    created_at: DateTime<Utc>,
}

impl UserRepresentativeAgent {
    /// Create an agent for a validated profile
    pub fn new(profile: UserProfile, acceptance_threshold: f64) -> Result<Self, AgentError> {
        profile.validate()?;
        Ok(Self {
            profile,
            acceptance_threshold,
            history: RwLock::new(Vec::new()),
            created_at: Utc::now(),
        })
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.acceptance_threshold
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the history
    pub fn history(&self) -> Vec<NegotiationRecord> {
        self.history.read().clone()
    }

    /// Agreements reached so far
    pub fn agreements(&self) -> Vec<Agreement> {
        self.history
            .read()
            .iter()
            .filter_map(|r| r.agreement.clone())
            .collect()
    }

    pub fn negotiation_count(&self) -> usize {
        self.history.read().len()
    }

    /// Utility of terms for this user:
    /// `needs·coverage + feasibility·offered-share + constraints·no-conflict`
    pub fn evaluate(&self, terms: &MatchTerms, side: Side, weights: &UtilityWeights) -> ProposalEvaluation {
        let gets = terms.gets(side);
        let gives = terms.gives(side);
        let mut concerns = Vec::new();

        let total: f64 = self.profile.needs.iter().map(|n| n.priority.value()).sum();
        let coverage = if total > 0.0 {
            let covered: f64 = self
                .profile
                .needs
                .iter()
                .filter(|n| gets.iter().any(|g| keywords_match(g, &n.description)))
                .map(|n| n.priority.value())
                .sum();
            covered / total
        } else {
            0.5
        };
        for need in &self.profile.needs {
            if need.priority.is_pressing() && !gets.iter().any(|g| keywords_match(g, &need.description)) {
                concerns.push(format!("unmet need: {}", need.description));
            }
        }

        let feasibility = if gives.is_empty() {
            1.0
        } else {
            let offered = gives.iter().filter(|g| self.profile.offers(g)).count();
            for give in gives.iter().filter(|g| !self.profile.offers(g)) {
                concerns.push(format!("cannot provide: {give}"));
            }
            offered as f64 / gives.len() as f64
        };

        let conflicts: Vec<&String> = gives
            .iter()
            .chain(terms.conditions.iter())
            .filter(|item| self.profile.forbids(item))
            .collect();
        for item in &conflicts {
            concerns.push(format!("conflicts with a constraint: {item}"));
        }
        let constraint_score = if conflicts.is_empty() { 1.0 } else { 0.0 };

        let score = (weights.needs * coverage + weights.feasibility * feasibility + weights.constraints * constraint_score)
            .clamp(0.0, 1.0);
        let should_accept = score >= self.acceptance_threshold && conflicts.is_empty();
        let counter_offer = if should_accept {
            None
        } else {
            self.counter_offer(terms, side)
        };

        debug!(
            user_id = %self.profile.user_id,
            score,
            should_accept,
            countered = counter_offer.is_some(),
            "evaluated proposal"
        );
        ProposalEvaluation {
            score,
            should_accept,
            counter_offer,
            concerns,
        }
    }

    /// Keep the gets that meet a need, add pressing needs still missing, and
    /// give only what this user actually offers. `None` when nothing is left
    /// to propose or the result equals the incoming terms.
    pub fn counter_offer(&self, terms: &MatchTerms, side: Side) -> Option<MatchTerms> {
        let profile = &self.profile;

        let mut gets: Vec<String> = terms
            .gets(side)
            .iter()
            .filter(|g| profile.need_matching(g).is_some())
            .cloned()
            .collect();
        for need in profile.needs.iter().filter(|n| n.priority.is_pressing()) {
            if !gets.iter().any(|g| keywords_match(g, &need.description)) {
                gets.push(need.description.clone());
            }
        }

        let mut gives: Vec<String> = terms
            .gives(side)
            .iter()
            .filter(|g| profile.offers(g) && !profile.forbids(g))
            .cloned()
            .collect();
        if gives.is_empty() {
            gives = profile
                .offerings
                .iter()
                .filter(|o| !profile.forbids(o))
                .cloned()
                .collect();
        }

        if gets.is_empty() && gives.is_empty() {
            return None;
        }

        let conditions = terms
            .conditions
            .iter()
            .filter(|c| !profile.forbids(c))
            .cloned()
            .collect();
        let counter = MatchTerms::from_perspective(side, gives, gets, conditions, terms.timeline.clone());
        (counter != *terms).then_some(counter)
    }
}

#[async_trait]
impl Negotiator for UserRepresentativeAgent {
    fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    fn profile(&self) -> &UserProfile {
        &self.profile
    }

    async fn evaluate_proposal(&self, terms: &MatchTerms, side: Side, weights: &UtilityWeights) -> ProposalEvaluation {
        self.evaluate(terms, side, weights)
    }

    async fn record_outcome(&self, record: NegotiationRecord) {
        self.history.write().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(profile: UserProfile) -> UserRepresentativeAgent {
        UserRepresentativeAgent::new(profile, 0.7).unwrap()
    }

    #[test]
    fn test_complementary_terms_are_accepted() {
        let startup = agent(UserProfile::builder("s").need_critical("funding").offering("talent").build());
        let investor = agent(UserProfile::builder("i").need_high("talent").offering("funding").build());

        let terms = MatchTerms::from_perspective(
            Side::First,
            startup.profile().offerings.clone(),
            startup.profile().need_descriptions(),
            Vec::new(),
            None,
        );
        let evaluation = investor.evaluate(&terms, Side::Second, &UtilityWeights::default());
        assert!(evaluation.should_accept);
        assert!((evaluation.score - 1.0).abs() < 1e-12);
        assert!(evaluation.counter_offer.is_none());
    }

    #[test]
    fn test_constraint_conflict_blocks_acceptance() {
        let cautious = agent(
            UserProfile::builder("c")
                .need_critical("funding")
                .offering("equity")
                .constraint("no equity")
                .build(),
        );
        let terms = MatchTerms::from_perspective(
            Side::Second,
            vec!["equity".to_string()],
            vec!["funding".to_string()],
            Vec::new(),
            None,
        );
        let evaluation = cautious.evaluate(&terms, Side::Second, &UtilityWeights::default());
        assert!(!evaluation.should_accept);
        assert!(evaluation.concerns.iter().any(|c| c.contains("constraint")));
    }

    #[test]
    fn test_counter_offer_asks_for_pressing_needs() {
        let buyer = agent(
            UserProfile::builder("b")
                .need_critical("analytics platform")
                .offering("case study")
                .build(),
        );
        let terms = MatchTerms::from_perspective(
            Side::First,
            vec!["consulting".to_string()],
            vec!["case study".to_string(), "payment".to_string()],
            Vec::new(),
            None,
        );
        let evaluation = buyer.evaluate(&terms, Side::Second, &UtilityWeights::default());
        assert!(!evaluation.should_accept);

        let counter = evaluation.counter_offer.unwrap();
        assert_eq!(counter.gets(Side::Second), &["analytics platform".to_string()]);
        assert_eq!(counter.gives(Side::Second), &["case study".to_string()]);
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let a = agent(UserProfile::builder("a").offering("x").build());
        assert_eq!(a.negotiation_count(), 0);
        a.record_outcome(NegotiationRecord {
            conversation_id: Uuid::new_v4(),
            counterpart_id: "b".to_string(),
            domain: "partnership".to_string(),
            status: ConversationStatus::NoAgreement,
            agreement: None,
            rounds: 2,
            recorded_at: Utc::now(),
        })
        .await;
        assert_eq!(a.history().len(), 1);
        assert!(a.agreements().is_empty());
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        assert!(UserRepresentativeAgent::new(UserProfile::builder("").build(), 0.7).is_err());
    }
}

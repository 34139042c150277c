//! Bilateral negotiation protocol
//!
//! A [`NegotiationSession`] is an explicit state machine over one
//! [`Conversation`]. Each call to [`NegotiationSession::advance`] performs
//! exactly one step:
//!
//! ```text
//! Opening -> Proposing -> Evaluating --accept--> Finalizing -> Closed
//!                            |   ^
//!                 counter    |   |  next round
//!                            v   |
//!                         Countering
//!                            |
//!     score improved and a   |   both accept -> Finalizing
//!     common "get" item  --> Compromising
//!                                either rejects -> Countering (pending counter)
//! ```
//!
//! Only a counter-offer can open a compromise; the counter is held back and
//! tabled in the next round if either side rejects the merged terms.
//!
//! A rejection without a counter-offer, the round cap and the wall-clock
//! timeout all close the conversation with `NoAgreement`. The timeout is
//! checked once per round, before the next counter-offer is put on the table.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::agents::domain::{DomainRegistry, UtilityWeights};
use crate::agents::profile::UserProfile;
use crate::agents::representative::{NegotiationRecord, Negotiator};
use crate::agents::AgentError;
use crate::config::NegotiationConfig;
use crate::engine::MetricsCollector;

/// Which side of a conversation an agent sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    fn index(&self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }
}

/// What each side gives and gets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTerms {
    pub side1_gives: Vec<String>,
    pub side1_gets: Vec<String>,
    pub side2_gives: Vec<String>,
    pub side2_gets: Vec<String>,
    pub conditions: Vec<String>,
    pub timeline: Option<String>,
}

impl MatchTerms {
    /// Terms written by one side: what it gives goes to the other side, what
    /// it gets comes from the other side
    pub fn from_perspective(
        side: Side,
        gives: Vec<String>,
        gets: Vec<String>,
        conditions: Vec<String>,
        timeline: Option<String>,
    ) -> Self {
        let (side1_gives, side1_gets) = match side {
            Side::First => (gives, gets),
            Side::Second => (gets, gives),
        };
        Self {
            side2_gives: side1_gets.clone(),
            side2_gets: side1_gives.clone(),
            side1_gives,
            side1_gets,
            conditions,
            timeline,
        }
    }

    pub fn gives(&self, side: Side) -> &[String] {
        match side {
            Side::First => &self.side1_gives,
            Side::Second => &self.side2_gives,
        }
    }

    pub fn gets(&self, side: Side) -> &[String] {
        match side {
            Side::First => &self.side1_gets,
            Side::Second => &self.side2_gets,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.side1_gives.is_empty() && self.side1_gets.is_empty() && self.side2_gives.is_empty() && self.side2_gets.is_empty()
    }

    /// Whether both terms ask for a common item on either side
    pub fn shares_get_item(&self, other: &MatchTerms) -> bool {
        let common = |a: &[String], b: &[String]| a.iter().any(|x| b.iter().any(|y| x.eq_ignore_ascii_case(y)));
        common(&self.side1_gets, &other.side1_gets) || common(&self.side2_gets, &other.side2_gets)
    }

    /// Union of both terms, keeping first-seen order
    pub fn union(&self, other: &MatchTerms) -> MatchTerms {
        MatchTerms {
            side1_gives: merge(&self.side1_gives, &other.side1_gives),
            side1_gets: merge(&self.side1_gets, &other.side1_gets),
            side2_gives: merge(&self.side2_gives, &other.side2_gives),
            side2_gets: merge(&self.side2_gets, &other.side2_gets),
            conditions: merge(&self.conditions, &other.conditions),
            timeline: self.timeline.clone().or_else(|| other.timeline.clone()),
        }
    }
}

fn merge(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    a.iter()
        .chain(b)
        .filter(|item| seen.insert(item.to_lowercase()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Initial,
    Counter,
    Compromise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
}

/// One revision of the terms on the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedTerms {
    pub id: Uuid,
    pub proposer_id: String,
    pub kind: ProposalKind,
    pub round: usize,
    pub terms: MatchTerms,
    pub status: ProposalStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Introduction,
    Proposal,
    Evaluation,
    CounterOffer,
    Compromise,
    Acceptance,
    Rejection,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationMessage {
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Initiated,
    InProgress,
    AgreementReached,
    NoAgreement,
    Paused,
    Cancelled,
}

impl ConversationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationStatus::AgreementReached | ConversationStatus::NoAgreement | ConversationStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversationStatus::Initiated => "initiated",
            ConversationStatus::InProgress => "in_progress",
            ConversationStatus::AgreementReached => "agreement_reached",
            ConversationStatus::NoAgreement => "no_agreement",
            ConversationStatus::Paused => "paused",
            ConversationStatus::Cancelled => "cancelled",
        }
    }
}

/// A promised item and its estimated value to the receiving side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitItem {
    pub item: String,
    pub value: f64,
    /// Need the item was attributed to, if any
    pub matched_need: Option<String>,
}

/// How much, and how evenly, an agreement benefits both sides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutualBenefit {
    pub side1_benefits: Vec<BenefitItem>,
    pub side2_benefits: Vec<BenefitItem>,
    pub side1_score: f64,
    pub side2_score: f64,
    /// Mean of the two side scores
    pub overall_score: f64,
    /// `1 − |side1_score − side2_score|`
    pub balance_score: f64,
}

impl MutualBenefit {
    /// Attribute every received item to the receiver's needs by keyword;
    /// unmatched items are worth 0.5
    pub fn compute(terms: &MatchTerms, side1: &UserProfile, side2: &UserProfile) -> Self {
        let side1_benefits = attribute(&terms.side1_gets, side1);
        let side2_benefits = attribute(&terms.side2_gets, side2);
        let side1_score = mean_value(&side1_benefits);
        let side2_score = mean_value(&side2_benefits);
        Self::from_scores(side1_benefits, side2_benefits, side1_score, side2_score)
    }

    fn from_scores(side1_benefits: Vec<BenefitItem>, side2_benefits: Vec<BenefitItem>, side1_score: f64, side2_score: f64) -> Self {
        Self {
            side1_benefits,
            side2_benefits,
            overall_score: (side1_score + side2_score) / 2.0,
            balance_score: (1.0 - (side1_score - side2_score).abs()).clamp(0.0, 1.0),
            side1_score,
            side2_score,
        }
    }
}

fn attribute(items: &[String], receiver: &UserProfile) -> Vec<BenefitItem> {
    items
        .iter()
        .map(|item| match receiver.need_matching(item) {
            Some(need) => BenefitItem {
                item: item.clone(),
                value: need.priority.value(),
                matched_need: Some(need.description.clone()),
            },
            None => BenefitItem {
                item: item.clone(),
                value: 0.5,
                matched_need: None,
            },
        })
        .collect()
}

/// Empty lists divide by one
fn mean_value(items: &[BenefitItem]) -> f64 {
    items.iter().map(|b| b.value).sum::<f64>() / items.len().max(1) as f64
}

/// Finalized, immutable terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub domain: String,
    pub participants: (String, String),
    pub terms: MatchTerms,
    pub mutual_benefit: MutualBenefit,
    pub next_steps: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub rounds: usize,
    pub duration: Duration,
    pub message_count: usize,
}

/// Full record of one negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub domain: String,
    pub agent1_id: String,
    pub agent2_id: String,
    pub status: ConversationStatus,
    pub messages: Vec<NegotiationMessage>,
    pub proposals: Vec<ProposedTerms>,
    pub agreement: Option<Agreement>,
    pub rounds: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Conversation {
    fn new(domain: &str, agent1_id: &str, agent2_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.to_string(),
            agent1_id: agent1_id.to_string(),
            agent2_id: agent2_id.to_string(),
            status: ConversationStatus::Initiated,
            messages: Vec::new(),
            proposals: Vec::new(),
            agreement: None,
            rounds: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    fn say(&mut self, sender_id: &str, kind: MessageKind, content: impl Into<String>) {
        self.messages.push(NegotiationMessage {
            sender_id: sender_id.to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    fn table(&mut self, proposer_id: &str, kind: ProposalKind, terms: MatchTerms) {
        let round = self.rounds;
        self.proposals.push(ProposedTerms {
            id: Uuid::new_v4(),
            proposer_id: proposer_id.to_string(),
            kind,
            round,
            terms,
            status: ProposalStatus::Pending,
            timestamp: Utc::now(),
        });
    }

    fn settle_latest(&mut self, status: ProposalStatus) {
        if let Some(latest) = self.proposals.last_mut() {
            latest.status = status;
        }
    }

    /// Whether a user takes part
    pub fn involves(&self, user_id: &str) -> bool {
        self.agent1_id == user_id || self.agent2_id == user_id
    }
}

/// Step of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationPhase {
    Opening,
    Proposing,
    Evaluating,
    Countering,
    Compromising,
    Finalizing,
    Closed,
}

/// Bookkeeping of a finished negotiation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NegotiationMetrics {
    pub rounds: usize,
    pub proposals_considered: usize,
    pub messages: usize,
    pub duration: Duration,
    /// Score of the last evaluation
    pub final_score: Option<f64>,
}

/// Result of a negotiation, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOutcome {
    pub conversation_id: Uuid,
    pub domain: String,
    pub success: bool,
    pub status: ConversationStatus,
    pub agreement: Option<Agreement>,
    pub failure_reason: Option<String>,
    pub improvement_suggestions: Vec<String>,
    pub metrics: NegotiationMetrics,
    pub conversation: Conversation,
}

/// What [`NegotiationSession::advance`] did
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// One step taken, now in this phase
    Continue(NegotiationPhase),
    /// Nothing done until resumed
    Paused,
    Finished(Box<NegotiationOutcome>),
}

/// One conversation between two negotiators
pub struct NegotiationSession {
    conversation: Conversation,
    agents: [Arc<dyn Negotiator>; 2],
    weights: UtilityWeights,
    config: NegotiationConfig,
    phase: NegotiationPhase,
    started: Instant,
    on_table: Option<(Side, MatchTerms)>,
    previous: Option<MatchTerms>,
    pending_counter: Option<(Side, MatchTerms)>,
    agreed: Option<MatchTerms>,
    last_score: Option<f64>,
    last_concerns: Vec<String>,
    proposals_considered: usize,
}

impl NegotiationSession {
    /// Session in the `Opening` phase
    pub fn new(
        agent1: Arc<dyn Negotiator>,
        agent2: Arc<dyn Negotiator>,
        domain: &str,
        weights: UtilityWeights,
        config: NegotiationConfig,
    ) -> Self {
        Self {
            conversation: Conversation::new(domain, agent1.user_id(), agent2.user_id()),
            agents: [agent1, agent2],
            weights,
            config,
            phase: NegotiationPhase::Opening,
            started: Instant::now(),
            on_table: None,
            previous: None,
            pending_counter: None,
            agreed: None,
            last_score: None,
            last_concerns: Vec::new(),
            proposals_considered: 0,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    pub fn status(&self) -> ConversationStatus {
        self.conversation.status
    }

    pub fn rounds(&self) -> usize {
        self.conversation.rounds
    }

    pub fn proposals_considered(&self) -> usize {
        self.proposals_considered
    }

    /// Stop advancing until [`NegotiationSession::resume`]
    pub fn pause(&mut self) -> Result<(), AgentError> {
        self.ensure_open()?;
        self.conversation.status = ConversationStatus::Paused;
        self.conversation.say("facilitator", MessageKind::System, "negotiation paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), AgentError> {
        self.ensure_open()?;
        if self.conversation.status != ConversationStatus::Paused {
            return Err(AgentError::InvalidState("conversation is not paused".to_string()));
        }
        self.conversation.status = if self.phase == NegotiationPhase::Opening {
            ConversationStatus::Initiated
        } else {
            ConversationStatus::InProgress
        };
        self.conversation.say("facilitator", MessageKind::System, "negotiation resumed");
        Ok(())
    }

    /// Close the conversation as `Cancelled`
    pub async fn cancel(&mut self, reason: &str) -> Result<NegotiationOutcome, AgentError> {
        self.ensure_open()?;
        Ok(self
            .close_without_agreement(ConversationStatus::Cancelled, format!("cancelled: {reason}"))
            .await)
    }

    fn ensure_open(&self) -> Result<(), AgentError> {
        if self.phase == NegotiationPhase::Closed {
            Err(AgentError::InvalidState(format!(
                "conversation {} is already closed",
                self.conversation.id
            )))
        } else {
            Ok(())
        }
    }

    fn agent(&self, side: Side) -> &Arc<dyn Negotiator> {
        &self.agents[side.index()]
    }

    fn id_of(&self, side: Side) -> String {
        self.agent(side).user_id().to_string()
    }

    /// Perform one protocol step
    pub async fn advance(&mut self) -> Result<Step, AgentError> {
        self.ensure_open()?;
        if self.conversation.status == ConversationStatus::Paused {
            return Ok(Step::Paused);
        }

        match self.phase {
            NegotiationPhase::Opening => {
                self.conversation.status = ConversationStatus::InProgress;
                for side in [Side::First, Side::Second] {
                    let counterpart = self.id_of(side.other());
                    let greeting = self.agent(side).introduce(&counterpart).await;
                    let sender = self.id_of(side);
                    self.conversation.say(&sender, MessageKind::Introduction, greeting);
                }
                self.phase = NegotiationPhase::Proposing;
            }
            NegotiationPhase::Proposing => {
                let terms = self.agent(Side::First).initial_proposal(Side::First).await;
                let proposer = self.id_of(Side::First);
                self.conversation.table(&proposer, ProposalKind::Initial, terms.clone());
                self.conversation.say(&proposer, MessageKind::Proposal, "initial proposal");
                self.proposals_considered += 1;
                self.on_table = Some((Side::First, terms));
                self.phase = NegotiationPhase::Evaluating;
            }
            NegotiationPhase::Evaluating => return Ok(self.evaluate().await),
            NegotiationPhase::Countering => return Ok(self.counter().await),
            NegotiationPhase::Compromising => return Ok(self.compromise().await),
            NegotiationPhase::Finalizing => {
                return Ok(Step::Finished(Box::new(self.finalize().await)));
            }
            NegotiationPhase::Closed => {
                return Err(AgentError::InvalidState("conversation is closed".to_string()));
            }
        }
        Ok(Step::Continue(self.phase))
    }

    async fn evaluate(&mut self) -> Step {
        let Some((proposer, terms)) = self.on_table.clone() else {
            return self.fail("no proposal on the table").await;
        };
        let evaluator = proposer.other();
        let evaluation = self
            .agent(evaluator)
            .evaluate_proposal(&terms, evaluator, &self.weights)
            .await;
        let evaluator_id = self.id_of(evaluator);
        self.conversation.say(
            &evaluator_id,
            MessageKind::Evaluation,
            format!("utility {:.2}", evaluation.score),
        );

        let improved = self.last_score.is_some_and(|last| evaluation.score > last);
        self.last_score = Some(evaluation.score);
        self.last_concerns = evaluation.concerns.clone();

        if evaluation.should_accept {
            self.conversation.settle_latest(ProposalStatus::Accepted);
            self.conversation.say(&evaluator_id, MessageKind::Acceptance, "terms accepted");
            self.agreed = Some(terms);
            self.phase = NegotiationPhase::Finalizing;
            return Step::Continue(self.phase);
        }

        let can_compromise = improved
            && self
                .previous
                .as_ref()
                .is_some_and(|previous| previous.shares_get_item(&terms));

        match evaluation.counter_offer {
            Some(counter) => {
                self.conversation.settle_latest(ProposalStatus::Countered);
                self.pending_counter = Some((evaluator, counter));
                self.phase = if can_compromise {
                    NegotiationPhase::Compromising
                } else {
                    NegotiationPhase::Countering
                };
                Step::Continue(self.phase)
            }
            None => {
                self.conversation.settle_latest(ProposalStatus::Rejected);
                self.conversation
                    .say(&evaluator_id, MessageKind::Rejection, "rejected without a counter-offer");
                self.fail(&format!("{evaluator_id} rejected the proposal without a counter-offer"))
                    .await
            }
        }
    }

    async fn counter(&mut self) -> Step {
        if self.conversation.rounds >= self.config.max_rounds {
            let reason = format!("round limit of {} reached", self.config.max_rounds);
            return self.fail(&reason).await;
        }
        if self.started.elapsed() > self.config.timeout {
            let reason = format!("timed out after {:?}", self.started.elapsed());
            return self.fail(&reason).await;
        }
        let Some((side, counter)) = self.pending_counter.take() else {
            return self.fail("no counter-offer to continue with").await;
        };

        self.conversation.rounds += 1;
        let proposer = self.id_of(side);
        self.conversation.table(&proposer, ProposalKind::Counter, counter.clone());
        self.conversation.say(
            &proposer,
            MessageKind::CounterOffer,
            format!("counter-offer for round {}", self.conversation.rounds),
        );
        self.proposals_considered += 1;
        self.previous = self.on_table.take().map(|(_, terms)| terms);
        self.on_table = Some((side, counter));
        self.phase = NegotiationPhase::Evaluating;
        Step::Continue(self.phase)
    }

    async fn compromise(&mut self) -> Step {
        let (Some(previous), Some((_, current))) = (self.previous.clone(), self.on_table.clone()) else {
            self.phase = NegotiationPhase::Countering;
            return Step::Continue(self.phase);
        };
        let merged = previous.union(&current);
        self.conversation.table("facilitator", ProposalKind::Compromise, merged.clone());
        self.conversation
            .say("facilitator", MessageKind::Compromise, "compromise merging both proposals");
        self.proposals_considered += 1;

        let mut accepted = true;
        for side in [Side::First, Side::Second] {
            let evaluation = self.agent(side).evaluate_proposal(&merged, side, &self.weights).await;
            let id = self.id_of(side);
            self.conversation.say(
                &id,
                MessageKind::Evaluation,
                format!("compromise utility {:.2}", evaluation.score),
            );
            accepted &= evaluation.should_accept;
        }

        if accepted {
            self.conversation.settle_latest(ProposalStatus::Accepted);
            self.agreed = Some(merged);
            self.phase = NegotiationPhase::Finalizing;
            return Step::Continue(self.phase);
        }

        // the counter that triggered the compromise stays on hold for the next round
        self.conversation.settle_latest(ProposalStatus::Rejected);
        self.phase = NegotiationPhase::Countering;
        Step::Continue(self.phase)
    }

    async fn finalize(&mut self) -> NegotiationOutcome {
        let terms = self.agreed.take().unwrap_or_default();
        let benefit = MutualBenefit::compute(
            &terms,
            self.agent(Side::First).profile(),
            self.agent(Side::Second).profile(),
        );
        self.conversation
            .say("facilitator", MessageKind::System, "agreement finalized");

        let agreement = Agreement {
            id: Uuid::new_v4(),
            conversation_id: self.conversation.id,
            domain: self.conversation.domain.clone(),
            participants: (self.id_of(Side::First), self.id_of(Side::Second)),
            next_steps: next_steps(&terms),
            terms,
            mutual_benefit: benefit,
            created_at: Utc::now(),
            rounds: self.conversation.rounds,
            duration: self.started.elapsed(),
            message_count: self.conversation.messages.len(),
        };

        self.conversation.status = ConversationStatus::AgreementReached;
        self.conversation.agreement = Some(agreement.clone());
        self.close().await;
        info!(
            conversation_id = %self.conversation.id,
            rounds = self.conversation.rounds,
            benefit = agreement.mutual_benefit.overall_score,
            "agreement reached"
        );
        self.outcome(None, Vec::new())
    }

    async fn fail(&mut self, reason: &str) -> Step {
        let outcome = self
            .close_without_agreement(ConversationStatus::NoAgreement, reason.to_string())
            .await;
        Step::Finished(Box::new(outcome))
    }

    async fn close_without_agreement(&mut self, status: ConversationStatus, reason: String) -> NegotiationOutcome {
        self.conversation.status = status;
        self.conversation.say("facilitator", MessageKind::System, reason.clone());
        self.close().await;
        info!(
            conversation_id = %self.conversation.id,
            status = status.label(),
            reason = %reason,
            "negotiation ended without agreement"
        );
        let suggestions = self.suggestions(&reason);
        self.outcome(Some(reason), suggestions)
    }

    /// Mark closed and append the result to both histories
    async fn close(&mut self) {
        self.phase = NegotiationPhase::Closed;
        self.conversation.ended_at = Some(Utc::now());
        for side in [Side::First, Side::Second] {
            let record = NegotiationRecord {
                conversation_id: self.conversation.id,
                counterpart_id: self.id_of(side.other()),
                domain: self.conversation.domain.clone(),
                status: self.conversation.status,
                agreement: self.conversation.agreement.clone(),
                rounds: self.conversation.rounds,
                recorded_at: Utc::now(),
            };
            self.agent(side).record_outcome(record).await;
        }
    }

    fn suggestions(&self, reason: &str) -> Vec<String> {
        let mut suggestions: Vec<String> = self
            .last_concerns
            .iter()
            .map(|concern| {
                if let Some(need) = concern.strip_prefix("unmet need: ") {
                    format!("look for a counterpart who can offer {need}")
                } else if let Some(item) = concern.strip_prefix("cannot provide: ") {
                    format!("drop the request for {item}")
                } else if let Some(item) = concern.strip_prefix("conflicts with a constraint: ") {
                    format!("rework terms touching {item}")
                } else {
                    concern.clone()
                }
            })
            .collect();
        if reason.starts_with("round limit") {
            suggestions.push("narrow the opening asks so fewer rounds are needed".to_string());
        }
        if reason.starts_with("timed out") {
            suggestions.push("allow a longer negotiation window".to_string());
        }
        if suggestions.is_empty() {
            suggestions.push("broaden offerings to cover more of the counterpart's needs".to_string());
        }
        suggestions.dedup();
        suggestions
    }

    fn outcome(&self, failure_reason: Option<String>, improvement_suggestions: Vec<String>) -> NegotiationOutcome {
        let agreement = self.conversation.agreement.clone();
        NegotiationOutcome {
            conversation_id: self.conversation.id,
            domain: self.conversation.domain.clone(),
            success: agreement.is_some(),
            status: self.conversation.status,
            agreement,
            failure_reason,
            improvement_suggestions,
            metrics: NegotiationMetrics {
                rounds: self.conversation.rounds,
                proposals_considered: self.proposals_considered,
                messages: self.conversation.messages.len(),
                duration: self.started.elapsed(),
                final_score: self.last_score,
            },
            conversation: self.conversation.clone(),
        }
    }
}

fn next_steps(terms: &MatchTerms) -> Vec<String> {
    let mut steps = vec!["schedule an introductory call".to_string()];
    if !terms.conditions.is_empty() {
        steps.push(format!("confirm conditions: {}", terms.conditions.join(", ")));
    }
    if let Some(timeline) = &terms.timeline {
        steps.push(format!("agree on milestones for {timeline}"));
    }
    steps.push("review progress after the first deliverables".to_string());
    steps
}

/// Drives negotiations for the domains of a registry
pub struct NegotiationFacilitator {
    config: NegotiationConfig,
    registry: Arc<DomainRegistry>,
    metrics: MetricsCollector,
}

impl NegotiationFacilitator {
    pub fn new(config: NegotiationConfig, registry: Arc<DomainRegistry>) -> Self {
        Self {
            config,
            registry,
            metrics: MetricsCollector::new("negotiation"),
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// New session using the domain's utility weights
    pub fn open(
        &self,
        agent1: Arc<dyn Negotiator>,
        agent2: Arc<dyn Negotiator>,
        domain: &str,
    ) -> Result<NegotiationSession, AgentError> {
        let matcher = self.registry.get(domain)?;
        Ok(NegotiationSession::new(
            agent1,
            agent2,
            domain,
            matcher.utility_weights(),
            self.config.clone(),
        ))
    }

    /// Run a session to completion
    pub async fn drive(&self, session: &mut NegotiationSession) -> Result<NegotiationOutcome, AgentError> {
        self.metrics.record_negotiation_start();
        let domain = session.conversation().domain.clone();
        let result = loop {
            match session.advance().await {
                Ok(Step::Continue(phase)) => debug!(phase = ?phase, "negotiation step"),
                Ok(Step::Finished(outcome)) => break Ok(*outcome),
                Ok(Step::Paused) => {
                    break Err(AgentError::InvalidState(format!(
                        "conversation {} is paused",
                        session.conversation().id
                    )))
                }
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(outcome) => {
                self.metrics
                    .record_negotiation_end(&domain, outcome.status.label(), outcome.metrics.rounds);
                if let Some(agreement) = &outcome.agreement {
                    self.metrics
                        .record_agreement(&domain, agreement.mutual_benefit.overall_score);
                }
            }
            Err(_) => self
                .metrics
                .record_negotiation_end(&domain, "error", session.rounds()),
        }
        result
    }

    /// Open and run a negotiation between two agents
    #[instrument(skip(self, agent1, agent2), fields(agent1 = agent1.user_id(), agent2 = agent2.user_id()))]
    pub async fn negotiate(
        &self,
        agent1: Arc<dyn Negotiator>,
        agent2: Arc<dyn Negotiator>,
        domain: &str,
    ) -> Result<NegotiationOutcome, AgentError> {
        let mut session = self.open(agent1, agent2, domain)?;
        self.drive(&mut session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::representative::UserRepresentativeAgent;

    fn profile(id: &str, need: &str, offer: &str) -> UserProfile {
        UserProfile::builder(id).need_critical(need).offering(offer).build()
    }

    #[test]
    fn test_terms_from_perspective_mirror() {
        let terms = MatchTerms::from_perspective(
            Side::Second,
            vec!["funding".to_string()],
            vec!["talent".to_string()],
            Vec::new(),
            None,
        );
        assert_eq!(terms.side2_gives, vec!["funding"]);
        assert_eq!(terms.side1_gets, vec!["funding"]);
        assert_eq!(terms.side1_gives, vec!["talent"]);
        assert_eq!(terms.gets(Side::Second), &["talent".to_string()]);
    }

    #[test]
    fn test_union_and_common_gets() {
        let a = MatchTerms::from_perspective(Side::First, vec!["x".into()], vec!["y".into()], vec!["c1".into()], None);
        let b = MatchTerms::from_perspective(Side::First, vec!["z".into()], vec!["Y".into()], vec!["c2".into()], None);
        assert!(a.shares_get_item(&b));

        let merged = a.union(&b);
        assert_eq!(merged.side1_gives, vec!["x", "z"]);
        assert_eq!(merged.side1_gets, vec!["y"]);
        assert_eq!(merged.conditions, vec!["c1", "c2"]);
    }

    #[test]
    fn test_mutual_benefit_balance() {
        let p1 = UserProfile::builder("a").need_critical("funding").build();
        let p2 = UserProfile::builder("b").need_high("talent").build();
        let terms = MatchTerms::from_perspective(Side::First, vec!["talent".into()], vec!["funding".into()], Vec::new(), None);

        let benefit = MutualBenefit::compute(&terms, &p1, &p2);
        assert_eq!(benefit.side1_score, 1.0);
        assert_eq!(benefit.side2_score, 0.8);
        assert!((benefit.overall_score - 0.9).abs() < 1e-12);
        assert!((benefit.balance_score - 0.8).abs() < 1e-12);

        let empty = MutualBenefit::compute(&MatchTerms::default(), &p1, &p2);
        assert_eq!(empty.overall_score, 0.0);
        assert_eq!(empty.balance_score, 1.0);
    }

    #[tokio::test]
    async fn test_step_by_step_acceptance() {
        let a1: Arc<dyn Negotiator> = Arc::new(UserRepresentativeAgent::new(profile("a", "funding", "talent"), 0.7).unwrap());
        let a2: Arc<dyn Negotiator> = Arc::new(UserRepresentativeAgent::new(profile("b", "talent", "funding"), 0.7).unwrap());
        let mut session = NegotiationSession::new(a1, a2, "partnership", UtilityWeights::default(), NegotiationConfig::default());

        assert_eq!(session.advance().await.unwrap(), Step::Continue(NegotiationPhase::Proposing));
        assert_eq!(session.status(), ConversationStatus::InProgress);
        assert_eq!(session.advance().await.unwrap(), Step::Continue(NegotiationPhase::Evaluating));
        assert_eq!(session.advance().await.unwrap(), Step::Continue(NegotiationPhase::Finalizing));

        let Step::Finished(outcome) = session.advance().await.unwrap() else {
            panic!("expected the negotiation to finish");
        };
        assert!(outcome.success);
        assert_eq!(outcome.metrics.rounds, 0);
        assert!(session.advance().await.is_err());
    }

    #[tokio::test]
    async fn test_pause_resume_cancel() {
        let a1: Arc<dyn Negotiator> = Arc::new(UserRepresentativeAgent::new(profile("a", "funding", "talent"), 0.7).unwrap());
        let a2: Arc<dyn Negotiator> = Arc::new(UserRepresentativeAgent::new(profile("b", "talent", "funding"), 0.7).unwrap());
        let mut session = NegotiationSession::new(a1, a2, "partnership", UtilityWeights::default(), NegotiationConfig::default());

        session.advance().await.unwrap();
        session.pause().unwrap();
        assert_eq!(session.advance().await.unwrap(), Step::Paused);
        assert_eq!(session.phase(), NegotiationPhase::Proposing);

        session.resume().unwrap();
        assert!(session.resume().is_err());

        let outcome = session.cancel("user left").await.unwrap();
        assert_eq!(outcome.status, ConversationStatus::Cancelled);
        assert!(!outcome.success);
        assert!(session.cancel("again").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_domain_fails_fast() {
        let facilitator = NegotiationFacilitator::new(NegotiationConfig::default(), Arc::new(DomainRegistry::with_defaults()));
        let a1: Arc<dyn Negotiator> = Arc::new(UserRepresentativeAgent::new(profile("a", "x", "y"), 0.7).unwrap());
        let a2: Arc<dyn Negotiator> = Arc::new(UserRepresentativeAgent::new(profile("b", "y", "x"), 0.7).unwrap());

        let result = facilitator.negotiate(a1, a2, "astrology").await;
        assert!(matches!(result, Err(AgentError::InvalidDomain(_))));
    }
}

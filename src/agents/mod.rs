//! Negotiating agents
//!
//! Every registered user is represented by a [`UserRepresentativeAgent`]
//! holding an immutable copy of the user's profile and an append-only
//! negotiation history. Domain matchers score pairs under a particular
//! lens (investor–startup, sales–client, partnership, mentorship), the
//! [`NegotiationFacilitator`] drives the bilateral protocol and the
//! [`MultiAgentCoordinator`] ties them together.

use thiserror::Error;

pub mod coordinator;
pub mod domain;
pub mod negotiation;
pub mod profile;
pub mod representative;

pub use coordinator::{Candidate, CoordinatorStatistics, MatchingReport, MultiAgentCoordinator};
pub use domain::{
    DomainMatcher, DomainRegistry, InvestorStartupMatcher, MatchPotential, MentorMenteeMatcher, PartnershipMatcher,
    SalesClientMatcher, UtilityWeights,
};
pub use negotiation::{
    Agreement, BenefitItem, Conversation, ConversationStatus, MatchTerms, MessageKind, MutualBenefit,
    NegotiationFacilitator, NegotiationMessage, NegotiationMetrics, NegotiationOutcome, NegotiationPhase,
    NegotiationSession, ProposalKind, ProposalStatus, ProposedTerms, Side, Step,
};
pub use profile::{CareerStage, Need, Priority, UserProfile, UserProfileBuilder};
pub use representative::{NegotiationRecord, Negotiator, ProposalEvaluation, UserRepresentativeAgent};

/// Errors related to agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("No matcher registered for domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Agent already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid conversation state: {0}")]
    InvalidState(String),
}

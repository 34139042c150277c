//! Domain-specific compatibility scorers
//!
//! A [`DomainMatcher`] scores a pair of profiles under one lens and supplies
//! the utility weights the representative agents use when they evaluate
//! proposals in that domain. Matchers live in a [`DomainRegistry`] keyed by
//! their domain tag.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::agents::profile::{complementarity, keywords_match, UserProfile};
use crate::agents::AgentError;

/// Weights of the proposal utility function, summing to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilityWeights {
    /// Priority-weighted coverage of the evaluator's needs
    pub needs: f64,
    /// Share of requested gives the evaluator actually offers
    pub feasibility: f64,
    /// No give or condition hits a "no X" constraint
    pub constraints: f64,
}

impl Default for UtilityWeights {
    fn default() -> Self {
        Self {
            needs: 0.6,
            feasibility: 0.3,
            constraints: 0.1,
        }
    }
}

/// Detailed assessment of a pair under one domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPotential {
    pub domain: String,
    pub score: f64,
    pub strengths: Vec<String>,
    pub risks: Vec<String>,
}

/// Capability contract of a domain matcher
#[async_trait]
pub trait DomainMatcher: Send + Sync {
    /// Registry key, e.g. `investor_startup`
    fn domain(&self) -> &str;

    /// Compatibility in `[0, 1]`
    async fn calculate_match_score(&self, a: &UserProfile, b: &UserProfile) -> f64;

    /// Score with the strengths and risks behind it
    async fn identify_match_potential(&self, a: &UserProfile, b: &UserProfile) -> MatchPotential;

    /// Utility weights for proposals negotiated in this domain
    fn utility_weights(&self) -> UtilityWeights {
        UtilityWeights::default()
    }
}

const CAPITAL: [&str; 4] = ["funding", "investment", "capital", "financing"];
const COMMERCE: [&str; 5] = ["customers", "clients", "sales", "leads", "buyers"];

fn mentions_any(items: &[String], keywords: &[&str]) -> bool {
    items
        .iter()
        .any(|item| keywords.iter().any(|k| keywords_match(item, k)))
}

fn needs_any(profile: &UserProfile, keywords: &[&str]) -> bool {
    profile
        .needs
        .iter()
        .any(|n| keywords.iter().any(|k| keywords_match(&n.description, k)))
}

fn attribute_bonus(same: Option<bool>) -> f64 {
    if same == Some(true) {
        1.0
    } else {
        0.0
    }
}

/// Investors offering capital meeting startups that need it
#[derive(Debug, Default)]
pub struct InvestorStartupMatcher;

impl InvestorStartupMatcher {
    /// `(investor, startup)` when one side offers capital the other needs
    fn roles<'a>(a: &'a UserProfile, b: &'a UserProfile) -> Option<(&'a UserProfile, &'a UserProfile)> {
        if mentions_any(&a.offerings, &CAPITAL) && needs_any(b, &CAPITAL) {
            Some((a, b))
        } else if mentions_any(&b.offerings, &CAPITAL) && needs_any(a, &CAPITAL) {
            Some((b, a))
        } else {
            None
        }
    }
}

#[async_trait]
impl DomainMatcher for InvestorStartupMatcher {
    fn domain(&self) -> &str {
        "investor_startup"
    }

    async fn calculate_match_score(&self, a: &UserProfile, b: &UserProfile) -> f64 {
        self.identify_match_potential(a, b).await.score
    }

    async fn identify_match_potential(&self, a: &UserProfile, b: &UserProfile) -> MatchPotential {
        let mut potential = MatchPotential {
            domain: self.domain().to_string(),
            ..MatchPotential::default()
        };
        let Some((investor, startup)) = Self::roles(a, b) else {
            potential.risks.push("no capital offered against a funding need".to_string());
            return potential;
        };
        potential
            .strengths
            .push(format!("{} offers capital {} is looking for", investor.user_id, startup.user_id));

        let industry = attribute_bonus(investor.same_industry(startup));
        if industry > 0.0 {
            potential.strengths.push("investor knows the industry".to_string());
        }
        let stage = match (investor.career_stage, startup.career_stage) {
            (Some(i), Some(s)) if i.seniority() >= 3 && s.seniority() >= 2 => 1.0,
            (Some(_), Some(_)) => 0.4,
            _ => 0.5,
        };
        if stage < 0.5 {
            potential.risks.push("career stages are a poor fit for investment".to_string());
        }
        let location = attribute_bonus(investor.same_location(startup));
        let traction = startup.needs_covered_by(investor);

        potential.score = (0.4 + 0.2 * traction + 0.15 * industry + 0.15 * stage + 0.1 * location).min(1.0);
        potential
    }

    fn utility_weights(&self) -> UtilityWeights {
        UtilityWeights {
            needs: 0.6,
            feasibility: 0.25,
            constraints: 0.15,
        }
    }
}

/// Sellers whose offerings meet a buyer's needs
#[derive(Debug, Default)]
pub struct SalesClientMatcher;

#[async_trait]
impl DomainMatcher for SalesClientMatcher {
    fn domain(&self) -> &str {
        "sales_client"
    }

    async fn calculate_match_score(&self, a: &UserProfile, b: &UserProfile) -> f64 {
        self.identify_match_potential(a, b).await.score
    }

    async fn identify_match_potential(&self, a: &UserProfile, b: &UserProfile) -> MatchPotential {
        let mut potential = MatchPotential {
            domain: self.domain().to_string(),
            ..MatchPotential::default()
        };

        // the seller is whichever side covers more of the other's needs
        let (seller, buyer, fit) = {
            let ab = b.needs_covered_by(a);
            let ba = a.needs_covered_by(b);
            if ab >= ba {
                (a, b, ab)
            } else {
                (b, a, ba)
            }
        };
        if fit == 0.0 {
            potential.risks.push("no offering meets the other side's needs".to_string());
            return potential;
        }
        potential
            .strengths
            .push(format!("{} can serve {:.0}% of {}'s needs", seller.user_id, fit * 100.0, buyer.user_id));

        let wants_clients = if needs_any(seller, &COMMERCE) { 1.0 } else { 0.0 };
        if wants_clients > 0.0 {
            potential.strengths.push("seller is actively looking for clients".to_string());
        }
        let industry = attribute_bonus(seller.same_industry(buyer));
        if buyer.constraints.iter().any(|c| seller.offerings.iter().any(|o| keywords_match(c, o))) {
            potential.risks.push("buyer constraints touch the offering".to_string());
        }

        potential.score = (0.6 * fit + 0.2 * wants_clients + 0.2 * industry).min(1.0);
        potential
    }

    fn utility_weights(&self) -> UtilityWeights {
        UtilityWeights {
            needs: 0.5,
            feasibility: 0.4,
            constraints: 0.1,
        }
    }
}

/// Peers with complementary skills and shared goals
#[derive(Debug, Default)]
pub struct PartnershipMatcher;

#[async_trait]
impl DomainMatcher for PartnershipMatcher {
    fn domain(&self) -> &str {
        "partnership"
    }

    async fn calculate_match_score(&self, a: &UserProfile, b: &UserProfile) -> f64 {
        self.identify_match_potential(a, b).await.score
    }

    async fn identify_match_potential(&self, a: &UserProfile, b: &UserProfile) -> MatchPotential {
        let mut potential = MatchPotential {
            domain: self.domain().to_string(),
            ..MatchPotential::default()
        };

        let complement = complementarity(a, b);
        let goal_count = a.goals.len().max(b.goals.len());
        let goals = if goal_count == 0 {
            0.0
        } else {
            a.shared_goals(b) as f64 / goal_count as f64
        };
        let skills = if a.expertise.is_empty() || b.expertise.is_empty() {
            0.0
        } else {
            1.0 - a.expertise_overlap(b)
        };

        if complement > 0.0 {
            potential.strengths.push("each side offers what the other needs".to_string());
        }
        if goals > 0.0 {
            potential.strengths.push("shared goals".to_string());
        } else {
            potential.risks.push("no shared goals".to_string());
        }
        if skills > 0.5 {
            potential.strengths.push("complementary expertise".to_string());
        }

        potential.score = (0.4 * complement + 0.3 * goals + 0.3 * skills).min(1.0);
        potential
    }
}

/// Senior users whose expertise covers a junior user's needs
#[derive(Debug, Default)]
pub struct MentorMenteeMatcher;

#[async_trait]
impl DomainMatcher for MentorMenteeMatcher {
    fn domain(&self) -> &str {
        "mentor_mentee"
    }

    async fn calculate_match_score(&self, a: &UserProfile, b: &UserProfile) -> f64 {
        self.identify_match_potential(a, b).await.score
    }

    async fn identify_match_potential(&self, a: &UserProfile, b: &UserProfile) -> MatchPotential {
        let mut potential = MatchPotential {
            domain: self.domain().to_string(),
            ..MatchPotential::default()
        };
        let (Some(sa), Some(sb)) = (a.career_stage, b.career_stage) else {
            potential.risks.push("career stage unknown".to_string());
            return potential;
        };
        let (mentor, mentee) = if sa.seniority() >= sb.seniority() { (a, b) } else { (b, a) };
        let gap = sa.seniority().abs_diff(sb.seniority());
        let seniority = match gap {
            0 => {
                potential.risks.push("no seniority gap".to_string());
                return potential;
            }
            1 => 0.6,
            _ => 1.0,
        };
        potential
            .strengths
            .push(format!("{} is {} stage(s) ahead of {}", mentor.user_id, gap, mentee.user_id));

        let guidance = if mentee.needs.is_empty() {
            0.0
        } else {
            let covered = mentee
                .needs
                .iter()
                .filter(|n| {
                    mentor
                        .expertise
                        .iter()
                        .chain(mentor.offerings.iter())
                        .any(|e| keywords_match(e, &n.description))
                })
                .count();
            covered as f64 / mentee.needs.len() as f64
        };
        if guidance > 0.0 {
            potential.strengths.push("mentor expertise covers mentee needs".to_string());
        }
        let industry = attribute_bonus(mentor.same_industry(mentee));

        potential.score = (0.5 * seniority + 0.3 * guidance + 0.2 * industry).min(1.0);
        potential
    }

    fn utility_weights(&self) -> UtilityWeights {
        UtilityWeights {
            needs: 0.7,
            feasibility: 0.2,
            constraints: 0.1,
        }
    }
}

/// Matchers keyed by domain tag
#[derive(Default)]
pub struct DomainRegistry {
    matchers: DashMap<String, Arc<dyn DomainMatcher>>,
}

impl DomainRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in matchers
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(InvestorStartupMatcher));
        registry.register(Arc::new(SalesClientMatcher));
        registry.register(Arc::new(PartnershipMatcher));
        registry.register(Arc::new(MentorMenteeMatcher));
        registry
    }

    /// Register or replace a matcher under its own domain tag
    pub fn register(&self, matcher: Arc<dyn DomainMatcher>) {
        self.matchers.insert(matcher.domain().to_string(), matcher);
    }

    /// Matcher for a domain; unknown domains are a configuration error
    pub fn get(&self, domain: &str) -> Result<Arc<dyn DomainMatcher>, AgentError> {
        self.matchers
            .get(domain)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::InvalidDomain(domain.to_string()))
    }

    /// Registered domain tags, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.matchers.iter().map(|e| e.key().clone()).collect();
        domains.sort();
        domains
    }

    /// Every matcher, in domain order
    pub fn matchers(&self) -> Vec<Arc<dyn DomainMatcher>> {
        let mut matchers: Vec<Arc<dyn DomainMatcher>> = self.matchers.iter().map(|e| e.value().clone()).collect();
        matchers.sort_by(|a, b| a.domain().cmp(b.domain()));
        matchers
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::profile::CareerStage;

    fn founder() -> UserProfile {
        UserProfile::builder("founder")
            .industry("fintech")
            .need_critical("seed funding")
            .offering("equity")
            .career_stage(CareerStage::Founder)
            .build()
    }

    fn investor() -> UserProfile {
        UserProfile::builder("investor")
            .industry("fintech")
            .need_high("deal flow")
            .offering("seed funding")
            .career_stage(CareerStage::Executive)
            .build()
    }

    #[tokio::test]
    async fn test_investor_startup_is_symmetric() {
        let matcher = InvestorStartupMatcher;
        let ab = matcher.calculate_match_score(&founder(), &investor()).await;
        let ba = matcher.calculate_match_score(&investor(), &founder()).await;
        assert!(ab > 0.6);
        assert_eq!(ab, ba);

        let nobody = UserProfile::builder("x").build();
        assert_eq!(matcher.calculate_match_score(&founder(), &nobody).await, 0.0);
    }

    #[tokio::test]
    async fn test_mentor_requires_seniority_gap() {
        let matcher = MentorMenteeMatcher;
        let senior = UserProfile::builder("s")
            .expertise("system design")
            .career_stage(CareerStage::Senior)
            .build();
        let junior = UserProfile::builder("j")
            .need_high("system design guidance")
            .career_stage(CareerStage::Junior)
            .build();

        let potential = matcher.identify_match_potential(&junior, &senior).await;
        assert!(potential.score > 0.75);
        assert!(!potential.strengths.is_empty());
        assert_eq!(matcher.calculate_match_score(&senior, &senior).await, 0.0);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = DomainRegistry::with_defaults();
        assert_eq!(
            registry.domains(),
            vec!["investor_startup", "mentor_mentee", "partnership", "sales_client"]
        );
        assert!(registry.get("partnership").is_ok());
        assert!(matches!(registry.get("dating"), Err(AgentError::InvalidDomain(d)) if d == "dating"));
    }
}

//! User profiles as seen by the representative agents

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agents::AgentError;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").unwrap();
}

/// Priority of a declared need
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Estimated value of satisfying a need of this priority
    pub fn value(&self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 0.8,
            Priority::Medium => 0.6,
            Priority::Low => 0.4,
        }
    }

    /// Critical and high needs are pushed into counter-offers
    pub fn is_pressing(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Something a user is looking for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Need {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

impl Need {
    pub fn new(description: impl Into<String>, priority: Priority) -> Self {
        Self {
            description: description.into(),
            priority,
        }
    }
}

/// Career stage, used by the mentorship matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareerStage {
    Student,
    Junior,
    MidLevel,
    Senior,
    Executive,
    Founder,
}

impl CareerStage {
    /// Rough seniority rank; founders rank with executives
    pub fn seniority(&self) -> u8 {
        match self {
            CareerStage::Student => 0,
            CareerStage::Junior => 1,
            CareerStage::MidLevel => 2,
            CareerStage::Senior => 3,
            CareerStage::Executive | CareerStage::Founder => 4,
        }
    }
}

/// Externally owned profile attributes of a user.
///
/// The core never mutates a profile; agents hold an immutable copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub user_id: String,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub expertise: Vec<String>,
    pub needs: Vec<Need>,
    pub offerings: Vec<String>,
    /// Hard constraints, e.g. "no equity", "remote only"
    pub constraints: Vec<String>,
    pub goals: Vec<String>,
    pub career_stage: Option<CareerStage>,
}

impl UserProfile {
    /// Start building a profile
    pub fn builder(user_id: impl Into<String>) -> UserProfileBuilder {
        UserProfileBuilder {
            profile: UserProfile {
                user_id: user_id.into(),
                ..UserProfile::default()
            },
        }
    }

    /// Reject profiles the agents cannot work with
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.user_id.trim().is_empty() {
            return Err(AgentError::InvalidProfile("user id is empty".to_string()));
        }
        let blank = self
            .needs
            .iter()
            .map(|n| n.description.as_str())
            .chain(self.offerings.iter().map(String::as_str))
            .any(|item| item.trim().is_empty());
        if blank {
            return Err(AgentError::InvalidProfile(format!(
                "{} declares a blank need or offering",
                self.user_id
            )));
        }
        Ok(())
    }

    /// Share of optional attributes that are filled in, in `[0, 1]`
    pub fn completeness(&self) -> f64 {
        let filled = [
            self.industry.is_some(),
            self.location.is_some(),
            !self.expertise.is_empty(),
            !self.needs.is_empty(),
            !self.offerings.is_empty(),
            !self.goals.is_empty(),
            self.career_stage.is_some(),
        ];
        filled.iter().filter(|f| **f).count() as f64 / filled.len() as f64
    }

    /// Need descriptions only
    pub fn need_descriptions(&self) -> Vec<String> {
        self.needs.iter().map(|n| n.description.clone()).collect()
    }

    /// Whether this user offers something matching `item`
    pub fn offers(&self, item: &str) -> bool {
        self.offerings.iter().any(|o| keywords_match(o, item))
    }

    /// Need matched by `item`, highest priority first
    pub fn need_matching(&self, item: &str) -> Option<&Need> {
        self.needs
            .iter()
            .filter(|n| keywords_match(&n.description, item))
            .max_by_key(|n| n.priority)
    }

    /// Whether `item` is ruled out by a "no X" / "not X" / "without X" constraint
    pub fn forbids(&self, item: &str) -> bool {
        self.constraints.iter().any(|c| {
            let c = c.trim().to_lowercase();
            ["no ", "not ", "without "]
                .iter()
                .find_map(|prefix| c.strip_prefix(prefix))
                .map(|banned| keywords_match(banned, item))
                .unwrap_or(false)
        })
    }

    /// Same industry, case-insensitive; `None` when either side is unknown
    pub fn same_industry(&self, other: &UserProfile) -> Option<bool> {
        same_attribute(self.industry.as_deref(), other.industry.as_deref())
    }

    /// Same location, case-insensitive; `None` when either side is unknown
    pub fn same_location(&self, other: &UserProfile) -> Option<bool> {
        same_attribute(self.location.as_deref(), other.location.as_deref())
    }

    /// Expertise of `other` this user does not have
    pub fn novel_expertise<'a>(&self, other: &'a UserProfile) -> Vec<&'a str> {
        other
            .expertise
            .iter()
            .filter(|e| !self.expertise.iter().any(|mine| mine.eq_ignore_ascii_case(e)))
            .map(String::as_str)
            .collect()
    }

    /// Jaccard overlap of the two expertise sets
    pub fn expertise_overlap(&self, other: &UserProfile) -> f64 {
        let mine: Vec<String> = self.expertise.iter().map(|e| e.to_lowercase()).collect();
        let theirs: Vec<String> = other.expertise.iter().map(|e| e.to_lowercase()).collect();
        let shared = mine.iter().filter(|e| theirs.contains(e)).count();
        let union = mine.len() + theirs.len() - shared;
        if union == 0 {
            0.0
        } else {
            shared as f64 / union as f64
        }
    }

    /// Share of this user's needs covered by `other`'s offerings
    pub fn needs_covered_by(&self, other: &UserProfile) -> f64 {
        if self.needs.is_empty() {
            return 0.0;
        }
        let covered = self
            .needs
            .iter()
            .filter(|n| other.offers(&n.description))
            .count();
        covered as f64 / self.needs.len() as f64
    }

    /// Goals shared with `other`
    pub fn shared_goals(&self, other: &UserProfile) -> usize {
        self.goals
            .iter()
            .filter(|g| other.goals.iter().any(|o| keywords_match(g, o)))
            .count()
    }
}

/// Mean coverage of each side's needs by the other side's offerings
pub fn complementarity(a: &UserProfile, b: &UserProfile) -> f64 {
    (a.needs_covered_by(b) + b.needs_covered_by(a)) / 2.0
}

/// Whether either side's offerings meet the other side's needs
pub fn has_synergy(a: &UserProfile, b: &UserProfile) -> bool {
    a.needs.iter().any(|n| b.offers(&n.description)) || b.needs.iter().any(|n| a.offers(&n.description))
}

/// Keyword correspondence: case-insensitive containment either way, or a
/// shared word of at least four characters
pub fn keywords_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.contains(&b) || b.contains(&a) {
        return true;
    }
    WORD.find_iter(&a)
        .map(|m| m.as_str())
        .filter(|w| w.len() >= 4)
        .any(|w| WORD.find_iter(&b).any(|o| o.as_str() == w))
}

fn same_attribute(a: Option<&str>, b: Option<&str>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.trim().eq_ignore_ascii_case(b.trim())),
        _ => None,
    }
}

/// Builder for [`UserProfile`]
#[derive(Debug, Clone)]
pub struct UserProfileBuilder {
    profile: UserProfile,
}

impl UserProfileBuilder {
    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.profile.industry = Some(industry.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.profile.location = Some(location.into());
        self
    }

    pub fn expertise(mut self, skill: impl Into<String>) -> Self {
        self.profile.expertise.push(skill.into());
        self
    }

    /// Add a need with an explicit priority
    pub fn need(mut self, description: impl Into<String>, priority: Priority) -> Self {
        self.profile.needs.push(Need::new(description, priority));
        self
    }

    pub fn need_critical(self, description: impl Into<String>) -> Self {
        self.need(description, Priority::Critical)
    }

    pub fn need_high(self, description: impl Into<String>) -> Self {
        self.need(description, Priority::High)
    }

    pub fn offering(mut self, offering: impl Into<String>) -> Self {
        self.profile.offerings.push(offering.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.profile.constraints.push(constraint.into());
        self
    }

    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.profile.goals.push(goal.into());
        self
    }

    pub fn career_stage(mut self, stage: CareerStage) -> Self {
        self.profile.career_stage = Some(stage);
        self
    }

    pub fn build(self) -> UserProfile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_matching() {
        assert!(keywords_match("Seed funding", "funding"));
        assert!(keywords_match("enterprise sales leads", "qualified leads for sales"));
        assert!(!keywords_match("design", "funding"));
        // short shared words do not count
        assert!(!keywords_match("ux of app", "app store"));
        assert!(!keywords_match("", "anything"));
    }

    #[test]
    fn test_constraints_forbid_items() {
        let profile = UserProfile::builder("u")
            .constraint("No equity")
            .constraint("without relocation")
            .build();
        assert!(profile.forbids("equity stake"));
        assert!(profile.forbids("relocation package"));
        assert!(!profile.forbids("funding"));
    }

    #[test]
    fn test_validation_and_completeness() {
        assert!(UserProfile::builder(" ").build().validate().is_err());
        assert!(UserProfile::builder("u").offering("").build().validate().is_err());

        let full = UserProfile::builder("u")
            .industry("fintech")
            .location("Berlin")
            .expertise("payments")
            .need_high("funding")
            .offering("talent")
            .goal("grow")
            .career_stage(CareerStage::Founder)
            .build();
        assert!(full.validate().is_ok());
        assert_eq!(full.completeness(), 1.0);
        assert_eq!(UserProfile::builder("u").build().completeness(), 0.0);
    }

    #[test]
    fn test_complementarity() {
        let a = UserProfile::builder("a").need_critical("funding").offering("talent").build();
        let b = UserProfile::builder("b").need_high("talent").offering("funding").build();
        assert_eq!(complementarity(&a, &b), 1.0);
        assert!(has_synergy(&a, &b));
        assert_eq!(a.need_matching("seed funding").map(|n| n.priority), Some(Priority::Critical));
    }
}

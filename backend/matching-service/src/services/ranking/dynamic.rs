use super::distance::DistanceBand;
use crate::models::{Gender, Presence, WealthStatus};
use chrono::{DateTime, Duration, Utc};

const PENALTY_FREE_KM: f64 = 50.0;
const PENALTY_PER_KM: f64 = 0.1;
const MAX_DISTANCE_PENALTY: f64 = 20.0;

/// How recently a candidate was around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Online,
    SeenWithinHour,
    SeenWithinDay,
    Inactive,
}

impl Activity {
    pub fn from_presence(presence: Option<&Presence>, now: DateTime<Utc>) -> Self {
        match presence {
            None => Activity::Inactive,
            Some(p) if p.is_online => Activity::Online,
            Some(p) if p.last_seen > now - Duration::hours(1) => Activity::SeenWithinHour,
            Some(p) if p.last_seen > now - Duration::days(1) => Activity::SeenWithinDay,
            Some(_) => Activity::Inactive,
        }
    }
}

/// Which weight table applies to a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringBranch {
    Standard,
    /// A woman browsing men: paid tier dominates the ordering.
    FemaleViewingMales,
}

impl ScoringBranch {
    pub fn select(viewer_gender: Gender, wanted_gender: Option<Gender>) -> Self {
        match (viewer_gender, wanted_gender) {
            (Gender::Female, Some(Gender::Male)) => ScoringBranch::FemaleViewingMales,
            _ => ScoringBranch::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DynamicInputs {
    pub profile_score: f64,
    pub wealth_status: WealthStatus,
    pub person_verified: bool,
    pub activity: Activity,
    pub has_liked_me: bool,
    pub distance: DistanceBand,
}

fn distance_penalty(distance: DistanceBand) -> f64 {
    match distance.km() {
        Some(km) if km > PENALTY_FREE_KM => {
            ((km - PENALTY_FREE_KM) * PENALTY_PER_KM).min(MAX_DISTANCE_PENALTY)
        }
        _ => 0.0,
    }
}

fn tier_bonus(status: WealthStatus) -> f64 {
    match status {
        WealthStatus::High => 300.0,
        WealthStatus::Medium => 200.0,
        WealthStatus::Low => 100.0,
        WealthStatus::None => 0.0,
    }
}

/// Per-query ordering score. Never persisted.
pub fn dynamic_score(branch: ScoringBranch, c: &DynamicInputs) -> f64 {
    let score = match branch {
        ScoringBranch::FemaleViewingMales => {
            let activity = match c.activity {
                Activity::Online => 30.0,
                Activity::SeenWithinHour => 20.0,
                Activity::SeenWithinDay => 10.0,
                Activity::Inactive => 0.0,
            };
            tier_bonus(c.wealth_status)
                + if c.person_verified { 50.0 } else { 0.0 }
                + activity
                + if c.has_liked_me { 40.0 } else { 0.0 }
                + c.profile_score * 0.5
        }
        ScoringBranch::Standard => {
            let activity = match c.activity {
                Activity::Online => 15.0,
                Activity::SeenWithinHour => 5.0,
                Activity::SeenWithinDay => 2.0,
                Activity::Inactive => 0.0,
            };
            c.profile_score + activity + if c.has_liked_me { 30.0 } else { 0.0 }
        }
    };

    score - distance_penalty(c.distance)
}

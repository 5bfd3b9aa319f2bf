use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(format!("unknown gender: {other}")),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paid tier. Ordering follows the tier, so `High > Medium > Low > None`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WealthStatus {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl WealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WealthStatus::None => "none",
            WealthStatus::Low => "low",
            WealthStatus::Medium => "medium",
            WealthStatus::High => "high",
        }
    }

    /// Parse a stored value; unknown text is treated as no tier.
    pub fn from_db(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => WealthStatus::Low,
            "medium" => WealthStatus::Medium,
            "high" => WealthStatus::High,
            _ => WealthStatus::None,
        }
    }
}

impl fmt::Display for WealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub gender: Gender,
    pub email_verified: bool,
    pub wealth_status: WealthStatus,
    pub wealth_status_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Tier after applying expiry: an expired tier reads as `None`.
    pub fn effective_wealth_status(&self, now: DateTime<Utc>) -> WealthStatus {
        match self.wealth_status_expires_at {
            Some(expires_at) if expires_at <= now => WealthStatus::None,
            _ => self.wealth_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub person_verified: bool,
    pub profile_score: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub is_complete: bool,
    pub age: Option<i32>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub bio: Option<String>,
    pub salary_range: Option<String>,
}

impl Profile {
    /// `(0, 0)` is the "never set" marker for coordinates.
    pub fn has_location(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// A user together with their profile, as the gate and ranking see them.
#[derive(Debug, Clone)]
pub struct Member {
    pub user: User,
    pub profile: Profile,
}

impl Member {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn gender(&self) -> Gender {
        self.user.gender
    }

    pub fn wealth_status(&self, now: DateTime<Utc>) -> WealthStatus {
        self.user.effective_wealth_status(now)
    }

    pub fn can_view_messages(&self, now: DateTime<Utc>) -> bool {
        can_view(self.gender(), self.wealth_status(now))
    }
}

/// Whether a recipient may read incoming messages.
pub fn can_view(gender: Gender, wealth_status: WealthStatus) -> bool {
    gender == Gender::Female || wealth_status != WealthStatus::None
}

/// The slice of another user's profile shown next to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: Uuid,
    pub display_name: String,
    pub age: Option<i32>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub first_image: Option<String>,
    pub is_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(status: WealthStatus, expires: Option<DateTime<Utc>>) -> User {
        User {
            id: Uuid::new_v4(),
            display_name: "sam".into(),
            gender: Gender::Male,
            email_verified: true,
            wealth_status: status,
            wealth_status_expires_at: expires,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expired_tier_reads_as_none() {
        let now = Utc::now();
        let expired = user(WealthStatus::High, Some(now - Duration::minutes(1)));
        assert_eq!(expired.effective_wealth_status(now), WealthStatus::None);

        let at_boundary = user(WealthStatus::Low, Some(now));
        assert_eq!(at_boundary.effective_wealth_status(now), WealthStatus::None);

        let active = user(WealthStatus::Medium, Some(now + Duration::days(3)));
        assert_eq!(active.effective_wealth_status(now), WealthStatus::Medium);

        let forever = user(WealthStatus::Low, None);
        assert_eq!(forever.effective_wealth_status(now), WealthStatus::Low);
    }

    #[test]
    fn test_can_view_matrix() {
        assert!(can_view(Gender::Female, WealthStatus::None));
        assert!(can_view(Gender::Female, WealthStatus::High));
        assert!(!can_view(Gender::Male, WealthStatus::None));
        assert!(can_view(Gender::Male, WealthStatus::Low));
        assert!(can_view(Gender::Male, WealthStatus::High));
    }

    #[test]
    fn test_wealth_ordering_and_parsing() {
        assert!(WealthStatus::High > WealthStatus::Medium);
        assert!(WealthStatus::Low > WealthStatus::None);
        assert_eq!(WealthStatus::from_db("MEDIUM"), WealthStatus::Medium);
        assert_eq!(WealthStatus::from_db("platinum"), WealthStatus::None);
        assert_eq!("Female".parse::<Gender>(), Ok(Gender::Female));
        assert!("other".parse::<Gender>().is_err());
    }
}

use chrono::{DateTime, Utc};

const NEW_USER_BOOST_DAYS: f64 = 7.0;
const DEFAULT_RESPONSE_RATE_PCT: f64 = 50.0;

/// Everything the static score depends on for one profile.
#[derive(Debug, Clone)]
pub struct ScoreInputs {
    pub email_verified: bool,
    pub person_verified: bool,
    pub photo_count: u32,
    /// Bio length in characters.
    pub bio_len: usize,
    pub has_salary_range: bool,
    pub likes_received: u32,
    /// Conversations in which someone else sent this user a message.
    pub conversations_received: u32,
    /// Of those, conversations where this user answered after receiving.
    pub conversations_replied: u32,
    pub created_at: DateTime<Utc>,
}

impl ScoreInputs {
    pub fn response_rate_pct(&self) -> f64 {
        if self.conversations_received == 0 {
            return DEFAULT_RESPONSE_RATE_PCT;
        }
        self.conversations_replied as f64 / self.conversations_received as f64 * 100.0
    }
}

pub fn static_score(inputs: &ScoreInputs, now: DateTime<Utc>) -> f64 {
    let mut score = 0.0;

    if inputs.email_verified {
        score += 10.0;
    }
    if inputs.person_verified {
        score += 25.0;
    }

    // completeness
    score += (inputs.photo_count as f64 / 5.0 * 10.0).min(10.0);
    score += (inputs.bio_len as f64 / 300.0 * 5.0).min(5.0);
    if inputs.has_salary_range {
        score += 5.0;
    }

    score += (inputs.likes_received as f64 * 0.5).min(15.0);
    score += inputs.response_rate_pct() * 0.15;

    let age_days = (now - inputs.created_at).num_seconds() as f64 / 86_400.0;
    score += 10.0 * (1.0 - age_days / NEW_USER_BOOST_DAYS).max(0.0);

    score
}

//! Profile search: static filters from the directory, then distance,
//! presence and mutual-interest factors applied per request.

use crate::error::{AppError, AppResult};
use crate::models::{Gender, Member, WealthStatus};
use crate::services::presence::PresenceTracker;
use crate::services::ranking::{dynamic_score, Activity, DistanceBand, DynamicInputs, ScoringBranch};
use crate::store::ProfileDirectory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const MAX_SEARCH_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub gender: Option<Gender>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub online_only: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Radius around the viewer. Candidates without a location sit at
/// `UNSET_DISTANCE_KM`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub max_km: f64,
}

/// Filters the store applies before any ranking, so nothing that matches is
/// lost to a row cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    pub gender: Option<Gender>,
    /// Lowercased substring.
    pub city: Option<String>,
    /// Lowercased substring.
    pub state: Option<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub near: Option<NearFilter>,
    /// Checked by the store against its presence rows.
    pub online_only: bool,
}

fn normalize_text(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl From<&SearchQuery> for CandidateFilter {
    fn from(q: &SearchQuery) -> Self {
        Self {
            gender: q.gender,
            city: normalize_text(&q.city),
            state: normalize_text(&q.state),
            min_age: q.min_age,
            max_age: q.max_age,
            near: None,
            online_only: q.online_only,
        }
    }
}

impl CandidateFilter {
    /// Every static filter except `online_only`.
    pub fn matches(&self, member: &Member) -> bool {
        let profile = &member.profile;
        let contains = |field: &Option<String>, needle: &Option<String>| match needle {
            None => true,
            Some(needle) => field
                .as_ref()
                .map(|f| f.to_lowercase().contains(needle.as_str()))
                .unwrap_or(false),
        };
        let age_ok = match (profile.age, self.min_age, self.max_age) {
            (_, None, None) => true,
            (None, _, _) => false,
            (Some(age), min, max) => {
                min.map(|m| age >= m).unwrap_or(true) && max.map(|m| age <= m).unwrap_or(true)
            }
        };

        let near_ok = self.near.map_or(true, |near| {
            DistanceBand::between(Some((near.latitude, near.longitude)), location_of(member))
                .within(Some(near.max_km))
        });

        self.gender.map(|g| g == member.gender()).unwrap_or(true)
            && contains(&profile.city, &self.city)
            && contains(&profile.state, &self.state)
            && age_ok
            && near_ok
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileCard {
    pub user_id: Uuid,
    pub display_name: String,
    pub gender: Gender,
    pub age: Option<i32>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub bio: Option<String>,
    pub first_image: Option<String>,
    pub is_verified: bool,
    pub wealth_status: WealthStatus,
    pub distance_km: Option<f64>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_liked: bool,
    pub has_liked_me: bool,
    pub dynamic_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub profiles: Vec<ProfileCard>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

pub struct DiscoveryService {
    directory: Arc<dyn ProfileDirectory>,
    presence: PresenceTracker,
}

fn location_of(member: &Member) -> Option<(f64, f64)> {
    member
        .profile
        .has_location()
        .then_some((member.profile.latitude, member.profile.longitude))
}

/// `None` when the offset does not fit, which can only be past the end.
fn page_offset(page: i64, limit: i64) -> Option<usize> {
    (page - 1)
        .checked_mul(limit)
        .and_then(|offset| usize::try_from(offset).ok())
}

fn rank_order(a: &ProfileCard, b: &ProfileCard) -> Ordering {
    b.dynamic_score
        .total_cmp(&a.dynamic_score)
        .then_with(|| {
            let da = a.distance_km.unwrap_or(0.0);
            let db = b.distance_km.unwrap_or(0.0);
            da.total_cmp(&db)
        })
        .then_with(|| a.user_id.cmp(&b.user_id))
}

impl DiscoveryService {
    pub fn new(directory: Arc<dyn ProfileDirectory>, presence: PresenceTracker) -> Self {
        Self {
            directory,
            presence,
        }
    }

    pub async fn search(&self, viewer_id: Uuid, query: &SearchQuery) -> AppResult<SearchPage> {
        if let (Some(min), Some(max)) = (query.min_age, query.max_age) {
            if min > max {
                return Err(AppError::Validation("min_age exceeds max_age".into()));
            }
        }
        if query.max_distance_km.is_some_and(|d| !d.is_finite() || d < 0.0) {
            return Err(AppError::Validation("max_distance_km must be positive".into()));
        }

        let viewer = self
            .directory
            .get_member(viewer_id)
            .await?
            .ok_or(AppError::NotFound("profile"))?;

        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .map(|l| l.clamp(1, MAX_SEARCH_LIMIT))
            .unwrap_or(DEFAULT_SEARCH_LIMIT);

        let viewer_location = location_of(&viewer);
        let mut filter = CandidateFilter::from(query);
        filter.near = viewer_location
            .zip(query.max_distance_km)
            .map(|((latitude, longitude), max_km)| NearFilter {
                latitude,
                longitude,
                max_km,
            });

        let candidates = self.directory.search_candidates(viewer_id, &filter).await?;
        let ids: Vec<Uuid> = candidates.iter().map(|(m, _)| m.id()).collect();
        let presence = self.presence.lookup(&ids).await?;
        let likes = self.directory.like_edges(viewer_id).await?;

        let now = Utc::now();
        let branch = ScoringBranch::select(viewer.gender(), query.gender);

        let mut ranked: Vec<ProfileCard> = candidates
            .into_iter()
            .filter_map(|(member, first_image)| {
                let distance = DistanceBand::between(viewer_location, location_of(&member));
                if !distance.within(query.max_distance_km) {
                    return None;
                }

                let seen = presence.get(&member.id());
                let is_online = seen.map(|p| p.is_online).unwrap_or(false);
                if query.online_only && !is_online {
                    return None;
                }

                let wealth_status = member.wealth_status(now);
                let has_liked_me = likes.liked_viewer.contains(&member.id());
                let score = dynamic_score(
                    branch,
                    &DynamicInputs {
                        profile_score: member.profile.profile_score,
                        wealth_status,
                        person_verified: member.profile.person_verified,
                        activity: Activity::from_presence(seen, now),
                        has_liked_me,
                        distance,
                    },
                );

                Some(ProfileCard {
                    user_id: member.id(),
                    display_name: member.user.display_name.clone(),
                    gender: member.gender(),
                    age: member.profile.age,
                    city: member.profile.city.clone(),
                    state: member.profile.state.clone(),
                    bio: member.profile.bio.clone(),
                    first_image,
                    is_verified: member.profile.person_verified,
                    wealth_status,
                    distance_km: distance.km(),
                    is_online,
                    last_seen: seen.map(|p| p.last_seen),
                    is_liked: likes.liked_by_viewer.contains(&member.id()),
                    has_liked_me,
                    dynamic_score: score,
                })
            })
            .collect();

        ranked.sort_by(rank_order);

        let total = ranked.len() as i64;
        let profiles = match page_offset(page, limit) {
            Some(offset) => ranked.into_iter().skip(offset).take(limit as usize).collect(),
            None => Vec::new(),
        };

        Ok(SearchPage {
            profiles,
            total,
            page,
            limit,
        })
    }
}

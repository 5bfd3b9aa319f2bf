//! Profile ranking: the periodic static score and the per-query dynamic score.

pub mod distance;
pub mod dynamic;
pub mod static_score;

pub use distance::{haversine_km, DistanceBand, UNSET_DISTANCE_KM};
pub use dynamic::{dynamic_score, Activity, DynamicInputs, ScoringBranch};
pub use static_score::{static_score, ScoreInputs};

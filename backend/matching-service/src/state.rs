use crate::config::Config;
use crate::middleware::TokenVerifier;
use crate::services::{ConversationGate, DiscoveryService, LikeService, PresenceTracker};
use crate::websocket::Hub;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ConversationGate>,
    pub discovery: Arc<DiscoveryService>,
    pub likes: Arc<LikeService>,
    pub presence: PresenceTracker,
    pub hub: Hub,
    pub auth: Arc<dyn TokenVerifier>,
    pub config: Arc<Config>,
}

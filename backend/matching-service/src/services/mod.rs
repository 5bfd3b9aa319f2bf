pub mod conversation_gate;
pub mod discovery;
pub mod feature_flags;
pub mod likes;
pub mod notifier;
pub mod presence;
pub mod ranking;

pub use conversation_gate::ConversationGate;
pub use discovery::DiscoveryService;
pub use feature_flags::{FlagSnapshot, PolledFlags};
pub use likes::{LikeOutcome, LikeService};
pub use notifier::{LogNotifier, Notifier, UnreadNotice, WebhookNotifier};
pub use presence::PresenceTracker;

pub mod strategy;
pub mod surface;
pub mod transport;

pub use strategy::CommentStrategy;
pub use surface::{ChallengeProbe, ScrollState, ScrollSurface};
pub use transport::{ApiReply, ApiTransport};

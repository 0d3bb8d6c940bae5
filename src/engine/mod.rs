pub mod captcha;
pub mod context;
pub mod harvester;
pub mod pacing;
pub mod scroll;

pub use harvester::{Harvester, ScrapeRequest};

mod extrapolator;
mod store;

pub use extrapolator::Extrapolator;
pub use store::{LyricsStatus, PlaybackStore, StoreSnapshot};

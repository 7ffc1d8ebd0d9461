//! Discord presentation: embeds, buttons and the notifier seam the engine talks through.

pub mod buttons;
pub mod embeds;
pub mod notifier;

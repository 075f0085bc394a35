//! attune Context - Context Loader
//!
//! Resolves a user's personalization context for the request path:
//! cache first, then a concurrent fetch of profile, memory notes and learned
//! preferences, written through to the cache. Also renders the agent-specific
//! prompt blocks and wraps profile writes so they invalidate the cache.

mod loader;
mod prompt;
mod view;
mod writer;

pub use loader::{ContextLoader, ResolvedContext};
pub use prompt::{preference_directive, DerivedPrompt, PromptSection, PromptSectionKind};
pub use view::PreferenceView;
pub use writer::ContextWriter;

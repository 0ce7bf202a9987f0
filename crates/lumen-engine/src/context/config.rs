use crate::onscreen::OnscreenConfig;

/// Context creation parameters.
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    /// Template applied to every onscreen created on the context.
    pub onscreen_template: OnscreenConfig,

    /// Forces [`crate::WinsysFeatures::DIRTY_EVENTS`] on or off regardless of
    /// what the winsys advertises.
    ///
    /// `Some(false)` makes the core queue a full dirty region on every resize
    /// even when the platform reports expose events itself.
    pub dirty_events_override: Option<bool>,
}

//! Memory scope control.
//!
//! Maps the policy state to the narrowest scope it demands and applies it to
//! the conversation. Scope only narrows here; widening happens solely
//! through an explicit operator reset on the pipeline.

use tracing::info;

use crate::conversation::{ConversationState, MemoryScope};
use crate::error::PipelineResult;
use crate::policy::PolicyState;

/// Applies state-mandated scope narrowing.
#[derive(Debug, Clone, Default)]
pub struct MemoryScopeController;

impl MemoryScopeController {
    pub fn new() -> Self {
        Self
    }

    /// The narrowest scope a policy state requires.
    pub fn required_scope(&self, state: PolicyState) -> MemoryScope {
        match state {
            PolicyState::Monitoring | PolicyState::SoftMitigation | PolicyState::Contained => {
                MemoryScope::Default
            }
            PolicyState::Paused => MemoryScope::Limited,
            PolicyState::Referred | PolicyState::ExternalEscalated => MemoryScope::Restricted,
        }
    }

    /// Narrow the conversation's scope if the state demands it. A scope
    /// already narrower than required is left alone.
    pub fn apply(&self, conversation: &mut ConversationState) -> PipelineResult<()> {
        let required = self.required_scope(conversation.policy_state());
        if required > conversation.scope() {
            info!(
                conversation_id = %conversation.id,
                from = %conversation.scope(),
                to = %required,
                "Narrowing memory scope"
            );
            conversation.narrow_scope(required)?;
        }
        Ok(())
    }
}

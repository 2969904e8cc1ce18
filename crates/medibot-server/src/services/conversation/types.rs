/// What the bot remembers about one sender
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Literal text of the last medical question
    pub last_topic: Option<String>,

    /// Last query worth re-asking (medical text or rewritten follow-up)
    pub last_query: Option<String>,
}

impl ConversationState {
    pub fn has_topic(&self) -> bool {
        self.last_topic.is_some()
    }
}

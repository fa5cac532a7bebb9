//! AI companion replies.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use moderation::{
    sanitize_html, to_plain_text, ChatTurn, CompletionRequest, LlmBackend, LlmError,
};

use crate::config::CompanionConfig;
use crate::error::{CommunityError, Result};
use crate::store::{Caller, Store};
use crate::types::{Conversation, ConversationKind, Message, MessageRole};

/// Persona used when the conversation's agent type has none configured.
const FALLBACK_PERSONA: &str = "You are a compassionate listener for someone who is grieving. \
     Respond warmly and briefly, and do not give medical or legal advice.";

/// Outcome of one companion exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionReply {
    /// The member's message, always stored
    pub user_message: Message,
    /// The companion's answer, absent when the backend failed
    pub reply: Option<Message>,
    pub degraded: bool,
}

/// Generates companion replies in AI conversations.
pub struct CompanionService {
    store: Arc<dyn Store>,
    backend: Arc<dyn LlmBackend>,
    config: CompanionConfig,
}

impl CompanionService {
    pub fn new(store: Arc<dyn Store>, backend: Arc<dyn LlmBackend>, config: CompanionConfig) -> Self {
        Self {
            store,
            backend,
            config,
        }
    }

    /// Store the member's message and answer it.
    ///
    /// Backend failures never lose the member's message; the reply is just
    /// missing and `degraded` is set.
    pub async fn reply(
        &self,
        caller: &Caller,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<CompanionReply> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;

        let conversation = self
            .store
            .get_conversation(caller, conversation_id)
            .await?
            .ok_or(CommunityError::NotFound)?;
        if conversation.kind != ConversationKind::Ai {
            return Err(CommunityError::validation(
                "conversation_id",
                "not a companion conversation",
            ));
        }
        let participants = self.store.list_participants(caller, conversation_id).await?;
        if !participants.iter().any(|p| p.user_id == user) {
            return Err(CommunityError::Forbidden);
        }

        let content = sanitize_html(text.trim());
        if to_plain_text(&content).is_empty() {
            return Err(CommunityError::required("content"));
        }

        let user_message = self
            .store
            .insert_message(caller, Message::from_user(conversation_id, user, content))
            .await?;

        let history = self
            .store
            .list_messages(caller, conversation_id, self.config.history_window)
            .await?;

        let started = Instant::now();
        let reply = match self.generate(&conversation, &history).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    backend = self.backend.id(),
                    error = %e,
                    "Companion reply unavailable"
                );
                return Ok(CompanionReply {
                    user_message,
                    reply: None,
                    degraded: true,
                });
            }
        };

        let reply = self
            .store
            .insert_message(
                &Caller::Service,
                Message::from_assistant(conversation_id, sanitize_html(&reply)),
            )
            .await?;

        if let Err(e) = self
            .store
            .update_conversation(&Caller::Service, conversation)
            .await
        {
            debug!(conversation_id = %conversation_id, error = %e, "Failed to bump conversation activity");
        }

        info!(
            conversation_id = %conversation_id,
            history = history.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Companion replied"
        );

        Ok(CompanionReply {
            user_message,
            reply: Some(reply),
            degraded: false,
        })
    }

    /// System prompt for a conversation: persona plus what the member shared.
    pub fn system_prompt(&self, conversation: &Conversation) -> String {
        let persona = conversation
            .ai_agent_type
            .as_deref()
            .and_then(|agent| self.config.persona(agent))
            .unwrap_or(FALLBACK_PERSONA);

        let mut prompt = String::from(persona);
        if let Some(loss_type) = conversation.loss_type.as_deref() {
            prompt.push_str(&format!("\n\nThe person is grieving the loss of: {}.", loss_type));
        }
        if let Some(worldview) = conversation.worldview.as_deref() {
            prompt.push_str(&format!("\nTheir worldview: {}.", worldview));
        }
        prompt
    }

    async fn generate(
        &self,
        conversation: &Conversation,
        history: &[Message],
    ) -> std::result::Result<String, LlmError> {
        let turns = history
            .iter()
            .map(|m| {
                let text = to_plain_text(&m.content);
                match m.role {
                    MessageRole::User => ChatTurn::user(text),
                    MessageRole::Assistant => ChatTurn::assistant(text),
                }
            })
            .collect();

        let request = CompletionRequest::from_turns(turns)
            .with_system(self.system_prompt(conversation))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        let response = tokio::time::timeout(self.config.timeout(), self.backend.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.config.timeout_ms))??;

        let content = response.content.trim();
        if content.is_empty() {
            return Err(LlmError::ParseError("empty reply".to_string()));
        }
        Ok(content.to_string())
    }
}

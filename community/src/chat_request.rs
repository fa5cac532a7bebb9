//! Chat-request handshake.
//!
//! ```text
//! create_request ──► PENDING ──respond(ACCEPTED)──► ACCEPTED ──► provision
//!                       │                                        conversation
//!                       └────respond(REJECTED)──► REJECTED        + 2 participants
//! ```
//!
//! Acceptance records the conversation id on the request in the same write
//! that changes its status. Provisioning then creates that conversation and
//! both participants with the service credential. Every provisioning step is
//! idempotent, so a partial failure is reported as retryable and
//! [`ChatRequestService::retry_provisioning`] finishes the job without ever
//! creating a second conversation.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::{CommunityError, ConflictKind, Result};
use crate::store::{Caller, ChatRequestFilter, Store};
use crate::types::{
    ChatRequest, ChatRequestDecision, ChatRequestStatus, Conversation, Participant,
};

/// Result of answering a chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondOutcome {
    pub request: ChatRequest,
    /// Provisioned conversation, on acceptance
    pub conversation: Option<Conversation>,
}

/// Drives chat requests between members.
pub struct ChatRequestService {
    store: Arc<dyn Store>,
    config: ChatConfig,
}

impl ChatRequestService {
    pub fn new(store: Arc<dyn Store>, config: ChatConfig) -> Self {
        Self { store, config }
    }

    /// Ask `receiver_id` for a private conversation.
    ///
    /// The duplicate check is read-then-write: two concurrent requests
    /// between the same pair can both pass it.
    pub async fn create_request(
        &self,
        caller: &Caller,
        receiver_id: Uuid,
        message: &str,
    ) -> Result<ChatRequest> {
        let sender_id = caller.user_id().ok_or(CommunityError::Unauthorized)?;

        if sender_id == receiver_id {
            return Err(CommunityError::validation(
                "receiver_id",
                "cannot send a chat request to yourself",
            ));
        }

        let message = message.trim();
        if message.chars().count() > self.config.max_message_len {
            return Err(CommunityError::validation(
                "message",
                format!("must be at most {} characters", self.config.max_message_len),
            ));
        }

        let open = ChatRequestFilter::default()
            .status(ChatRequestStatus::Pending)
            .between(sender_id, receiver_id);
        if !self.store.list_chat_requests(caller, &open).await?.is_empty() {
            return Err(CommunityError::Conflict(ConflictKind::DuplicatePending));
        }

        let request = self
            .store
            .insert_chat_request(caller, ChatRequest::new(sender_id, receiver_id, message))
            .await?;

        info!(
            request_id = %request.id,
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            "Chat request created"
        );

        Ok(request)
    }

    /// Accept or decline a request. Only the receiver may answer.
    pub async fn respond(
        &self,
        caller: &Caller,
        request_id: Uuid,
        decision: ChatRequestDecision,
    ) -> Result<RespondOutcome> {
        let responder = caller.user_id().ok_or(CommunityError::Unauthorized)?;

        let mut request = self
            .store
            .get_chat_request(caller, request_id)
            .await?
            .ok_or(CommunityError::NotFound)?;

        if request.receiver_id != responder {
            return Err(CommunityError::Forbidden);
        }
        if request.status.is_terminal() {
            return Err(CommunityError::Conflict(ConflictKind::AlreadyResolved));
        }

        request.status = decision.into();
        if decision == ChatRequestDecision::Accepted {
            request.conversation_id = Some(Uuid::new_v4());
        }
        let request = self.store.update_chat_request(caller, request).await?;

        info!(
            request_id = %request.id,
            status = ?request.status,
            "Chat request answered"
        );

        let conversation = match request.conversation_id {
            Some(conversation_id) if request.status == ChatRequestStatus::Accepted => {
                Some(self.provision(&request, conversation_id).await?)
            }
            _ => None,
        };

        Ok(RespondOutcome {
            request,
            conversation,
        })
    }

    /// Finish provisioning for an accepted request.
    ///
    /// Safe to call repeatedly; creates whatever is missing.
    pub async fn retry_provisioning(&self, caller: &Caller, request_id: Uuid) -> Result<RespondOutcome> {
        caller.user_id().ok_or(CommunityError::Unauthorized)?;

        let mut request = self
            .store
            .get_chat_request(caller, request_id)
            .await?
            .ok_or(CommunityError::NotFound)?;

        if request.status != ChatRequestStatus::Accepted {
            return Err(CommunityError::validation(
                "status",
                "only accepted requests are provisioned",
            ));
        }

        let conversation_id = match request.conversation_id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                request.conversation_id = Some(id);
                request = self
                    .store
                    .update_chat_request(&Caller::Service, request)
                    .await
                    .map_err(|e| self.provisioning_error(request_id, e.to_string()))?;
                id
            }
        };

        let conversation = self.provision(&request, conversation_id).await?;
        Ok(RespondOutcome {
            request,
            conversation: Some(conversation),
        })
    }

    /// Pending requests waiting on the caller, newest first.
    pub async fn incoming(&self, caller: &Caller) -> Result<Vec<ChatRequest>> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        let filter = ChatRequestFilter::default()
            .status(ChatRequestStatus::Pending)
            .receiver(user);
        Ok(self.store.list_chat_requests(caller, &filter).await?)
    }

    /// Pending requests the caller sent, newest first.
    pub async fn outgoing(&self, caller: &Caller) -> Result<Vec<ChatRequest>> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        let filter = ChatRequestFilter::default()
            .status(ChatRequestStatus::Pending)
            .sender(user);
        Ok(self.store.list_chat_requests(caller, &filter).await?)
    }

    /// Create the conversation and both participants if missing.
    async fn provision(&self, request: &ChatRequest, conversation_id: Uuid) -> Result<Conversation> {
        let service = Caller::Service;

        let existing = self
            .store
            .get_conversation(&service, conversation_id)
            .await
            .map_err(|e| self.provisioning_error(request.id, e.to_string()))?;

        let conversation = match existing {
            Some(conversation) => conversation,
            None => self
                .store
                .insert_conversation(&service, Conversation::human().with_id(conversation_id))
                .await
                .map_err(|e| self.provisioning_error(request.id, e.to_string()))?,
        };

        for user_id in [request.sender_id, request.receiver_id] {
            self.store
                .insert_participant(
                    &service,
                    Participant {
                        conversation_id,
                        user_id,
                    },
                )
                .await
                .map_err(|e| self.provisioning_error(request.id, e.to_string()))?;
        }

        info!(
            request_id = %request.id,
            conversation_id = %conversation_id,
            "Conversation provisioned"
        );

        Ok(conversation)
    }

    fn provisioning_error(&self, request_id: Uuid, detail: String) -> CommunityError {
        error!(
            request_id = %request_id,
            error = %detail,
            "Conversation provisioning failed; retryable"
        );
        CommunityError::Provisioning {
            request_id,
            message: "conversation was not fully created".to_string(),
        }
    }
}

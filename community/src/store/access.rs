//! Row-level access rules.
//!
//! Each rule answers one question about one row for one caller. The
//! in-memory store consults these before every read and write; a hosted
//! store would express the same rules as table policies.

use moderation::{ContentType, ModerationCandidate, ModerationStatus};

use super::Caller;
use crate::types::{ChatRequest, Conversation, Participant, Profile, Visibility};

/// Row-level access rules for every table.
pub struct AccessPolicy;

impl AccessPolicy {
    /// Whether an item is meant for the community at all. Private journal
    /// entries belong to their author alone.
    pub fn is_shared(candidate: &ModerationCandidate) -> bool {
        candidate.content_type != ContentType::JournalEntry
            || candidate
                .structured_fields
                .get("is_public")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }

    /// Authors see their own items, staff see shared items, everyone sees
    /// approved shared items.
    pub fn can_read_candidate(caller: &Caller, candidate: &ModerationCandidate) -> bool {
        if caller.is_service() || caller.is(candidate.author_id) {
            return true;
        }
        Self::is_shared(candidate)
            && (caller.is_staff() || candidate.status == ModerationStatus::Approved)
    }

    /// Members may only create their own items, and only as pending.
    pub fn can_insert_candidate(caller: &Caller, candidate: &ModerationCandidate) -> bool {
        if caller.is_service() {
            return true;
        }
        caller.is(candidate.author_id) && candidate.status == ModerationStatus::Pending
    }

    /// Members may edit their own items but never decide them.
    pub fn can_update_candidate(
        caller: &Caller,
        existing: &ModerationCandidate,
        updated: &ModerationCandidate,
    ) -> bool {
        if caller.is_privileged() {
            return true;
        }
        caller.is(existing.author_id)
            && updated.author_id == existing.author_id
            && updated.status == ModerationStatus::Pending
    }

    pub fn can_read_chat_request(caller: &Caller, request: &ChatRequest) -> bool {
        caller.is_service() || caller.user_id().is_some_and(|id| request.involves(id))
    }

    pub fn can_insert_chat_request(caller: &Caller, request: &ChatRequest) -> bool {
        caller.is_service() || caller.is(request.sender_id)
    }

    /// Only the receiver answers; the parties themselves never change.
    pub fn can_update_chat_request(
        caller: &Caller,
        existing: &ChatRequest,
        updated: &ChatRequest,
    ) -> bool {
        if caller.is_service() {
            return true;
        }
        caller.is(existing.receiver_id)
            && updated.sender_id == existing.sender_id
            && updated.receiver_id == existing.receiver_id
    }

    /// Visibility check given the conversation's participant list.
    pub fn can_read_conversation(
        caller: &Caller,
        conversation: &Conversation,
        participants: &[Participant],
    ) -> bool {
        if caller.is_service() {
            return true;
        }
        let is_participant = caller
            .user_id()
            .is_some_and(|id| participants.iter().any(|p| p.user_id == id));

        match conversation.visibility {
            Visibility::Private => is_participant,
            Visibility::Shared => is_participant || caller.is_staff(),
            Visibility::Public => true,
        }
    }

    /// Any signed-in member may open a conversation.
    pub fn can_insert_conversation(caller: &Caller) -> bool {
        caller.is_service() || caller.user_id().is_some()
    }

    /// Only the service cleans up conversations.
    pub fn can_delete_conversation(caller: &Caller) -> bool {
        caller.is_service()
    }

    pub fn can_update_conversation(caller: &Caller, participants: &[Participant]) -> bool {
        Self::is_participant(caller, participants)
    }

    /// Members may only add themselves, and only to a conversation nobody
    /// has joined yet.
    pub fn can_insert_participant(
        caller: &Caller,
        participant: &Participant,
        existing: &[Participant],
    ) -> bool {
        caller.is_service() || (caller.is(participant.user_id) && existing.is_empty())
    }

    pub fn can_insert_message(caller: &Caller, participants: &[Participant]) -> bool {
        Self::is_participant(caller, participants)
    }

    pub fn can_read_profile(caller: &Caller, profile: &Profile) -> bool {
        !profile.is_private || caller.is_privileged() || caller.is(profile.user_id)
    }

    pub fn can_write_profile(caller: &Caller, profile: &Profile) -> bool {
        caller.is_service() || caller.is(profile.user_id)
    }

    fn is_participant(caller: &Caller, participants: &[Participant]) -> bool {
        caller.is_service()
            || caller
                .user_id()
                .is_some_and(|id| participants.iter().any(|p| p.user_id == id))
    }
}

//! Member profiles.

use std::sync::Arc;
use tracing::debug;

use moderation::{sanitize_html, to_plain_text};

use crate::error::{CommunityError, Result};
use crate::store::{Caller, Store};
use crate::types::{Profile, UserId};

/// Maximum characters in a display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 80;

pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create or replace the caller's own profile.
    pub async fn upsert(&self, caller: &Caller, mut profile: Profile) -> Result<Profile> {
        let user = caller.user_id().ok_or(CommunityError::Unauthorized)?;
        if profile.user_id != user {
            return Err(CommunityError::Forbidden);
        }

        profile.display_name = profile.display_name.trim().to_string();
        if profile.display_name.is_empty() {
            return Err(CommunityError::required("display_name"));
        }
        if profile.display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(CommunityError::validation(
                "display_name",
                format!("must be at most {} characters", MAX_DISPLAY_NAME_LEN),
            ));
        }

        profile.bio = profile
            .bio
            .map(|bio| sanitize_html(bio.trim()))
            .filter(|bio| !to_plain_text(bio).is_empty());

        let saved = self.store.upsert_profile(caller, profile).await?;
        debug!(user_id = %saved.user_id, "Profile saved");
        Ok(saved)
    }

    /// A profile, if the caller may see it. Private profiles of other
    /// members are reported as not found.
    pub async fn get(&self, caller: &Caller, user_id: UserId) -> Result<Profile> {
        self.store
            .get_profile(caller, user_id)
            .await?
            .ok_or(CommunityError::NotFound)
    }
}

//! Identity and relationship service.
//!
//! Friendships and track grants live as denormalised copies on both users.
//! Every multi-document mutation here is a sequence of single-entry writes
//! and is not atomic: a failure part way leaves one side updated. Such drift
//! is repaired lazily by [`RelationshipService::propagate_profile`] or
//! explicitly by [`RelationshipService::reconcile`].

use std::sync::Arc;

use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::domain::ports::{
    AvatarStore, ConversationRepository, NotificationLog, PasswordHasher, UserRepository,
};
use crate::domain::service_support::{
    map_avatar_error, map_conversation_error, map_hash_error, map_notification_error,
    map_user_error, parse_username, require_user,
};
use crate::domain::{
    Avatar, Email, Error, FriendSummary, GeoPoint, ParticipantPair, Registration, User, UserId,
    UserUpdate, Username, looks_like_email,
};

/// Maximum number of users returned by a search.
pub const SEARCH_LIMIT: usize = 20;

/// Optional profile changes submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<Username>,
    pub full_name: Option<String>,
    pub avatar: Option<Avatar>,
}

impl ProfileUpdate {
    fn into_updates(self, current: &User) -> Vec<UserUpdate> {
        let mut updates = Vec::new();
        if let Some(username) = self.username.filter(|name| *name != current.username) {
            updates.push(UserUpdate::SetUsername(username));
        }
        if let Some(full_name) = self.full_name.filter(|name| *name != current.full_name) {
            updates.push(UserUpdate::SetFullName(full_name));
        }
        if let Some(avatar) = self.avatar.filter(|avatar| *avatar != current.avatar) {
            updates.push(UserUpdate::SetAvatar(avatar));
        }
        updates
    }
}

/// Counts of repairs performed by [`RelationshipService::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileReport {
    /// Friend entries dropped because the account no longer exists.
    pub stale_friends_removed: u32,
    /// Cached summaries rewritten from the live record.
    pub summaries_refreshed: u32,
    /// Grant entries dropped because their inverse was missing.
    pub grants_removed: u32,
}

/// A user matched by [`RelationshipService::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub id: UserId,
    pub username: Username,
    pub full_name: String,
    pub avatar: Avatar,
    pub is_friend: bool,
}

/// A friend with the unread-message badge used by the friends list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FriendOverview {
    #[serde(flatten)]
    pub summary: FriendSummary,
    pub unread_messages: bool,
}

/// Domain service for accounts, friendships, and track grants.
#[derive(Clone)]
pub struct RelationshipService {
    users: Arc<dyn UserRepository>,
    conversations: Arc<dyn ConversationRepository>,
    notifications: Arc<dyn NotificationLog>,
    hasher: Arc<dyn PasswordHasher>,
    avatars: Arc<dyn AvatarStore>,
    clock: Arc<dyn Clock>,
}

impl RelationshipService {
    /// Create a service over the supplied ports.
    pub fn new(
        users: Arc<dyn UserRepository>,
        conversations: Arc<dyn ConversationRepository>,
        notifications: Arc<dyn NotificationLog>,
        hasher: Arc<dyn PasswordHasher>,
        avatars: Arc<dyn AvatarStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            conversations,
            notifications,
            hasher,
            avatars,
            clock,
        }
    }

    /// Load a user or fail with `NotFound`.
    pub async fn load(&self, id: &UserId) -> Result<User, Error> {
        let user = self.users.find_by_id(id).await.map_err(map_user_error)?;
        require_user(user, id)
    }

    pub async fn find_by_username(&self, raw: &str) -> Result<Option<User>, Error> {
        let Some(username) = parse_username(raw) else {
            return Ok(None);
        };
        self.users
            .find_by_username(&username)
            .await
            .map_err(map_user_error)
    }

    pub async fn find_by_email(&self, email: &Email) -> Result<Option<User>, Error> {
        self.users.find_by_email(email).await.map_err(map_user_error)
    }

    /// Resolve an email address or username typed by a user.
    pub async fn find_by_reference(&self, raw: &str) -> Result<Option<User>, Error> {
        if looks_like_email(raw) {
            match Email::new(raw) {
                Ok(email) => self.find_by_email(&email).await,
                Err(_) => Ok(None),
            }
        } else {
            self.find_by_username(raw).await
        }
    }

    /// Register a new account with a hashed password.
    pub async fn register(&self, registration: &Registration) -> Result<User, Error> {
        let hash = self
            .hasher
            .hash(registration.password())
            .await
            .map_err(map_hash_error)?;
        let user = User::register(
            UserId::random(),
            registration.username().clone(),
            registration.full_name().to_owned(),
            registration.email().clone(),
            hash,
            self.clock.utc(),
        );
        self.users.insert(&user).await.map_err(map_user_error)?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Make two users friends by writing a summary into each side.
    ///
    /// A one-sided friendship is completed by writing only the missing side.
    /// Only a pair that already lists each other is rejected.
    pub async fn add_friend(&self, user_id: &UserId, friend_id: &UserId) -> Result<(), Error> {
        if user_id == friend_id {
            return Err(Error::invalid_request("You cannot add yourself as a friend!"));
        }
        let user = self.load(user_id).await?;
        let friend = self.load(friend_id).await?;
        let user_lists_friend = user.is_friend_of(friend_id);
        let friend_lists_user = friend.is_friend_of(user_id);
        if user_lists_friend && friend_lists_user {
            return Err(Error::conflict(format!(
                "{} is already your friend",
                friend.username
            )));
        }

        if !user_lists_friend {
            self.users
                .put_friend(user_id, &friend.friend_summary())
                .await
                .map_err(map_user_error)?;
        }
        if !friend_lists_user {
            self.users
                .put_friend(friend_id, &user.friend_summary())
                .await
                .map_err(map_user_error)?;
        }
        info!(
            user_id = %user_id,
            friend_id = %friend_id,
            repaired = user_lists_friend || friend_lists_user,
            "friendship created"
        );
        Ok(())
    }

    /// Remove `friend_ref` (an id or username) from the caller's friends.
    ///
    /// When the friend account is gone the cached username inside the
    /// caller's map is matched instead. Any track grants between the two are
    /// dropped in both directions. Returns the removed friend id.
    pub async fn remove_friend(&self, user_id: &UserId, friend_ref: &str) -> Result<UserId, Error> {
        let user = self.load(user_id).await?;
        let friend_ref = friend_ref.trim();

        let live = self.resolve_friend_ref(friend_ref).await?;
        let friend_id = match live {
            Some(friend) if user.is_friend_of(&friend.id) => friend.id,
            Some(friend) => {
                return Err(Error::not_found(format!(
                    "{} is not your friend",
                    friend.username
                )));
            }
            None => user
                .friend_by_username(friend_ref)
                .map(|summary| summary.id)
                .or_else(|| {
                    UserId::new(friend_ref)
                        .ok()
                        .filter(|id| user.is_friend_of(id))
                })
                .ok_or_else(|| Error::not_found(format!("{friend_ref} is not your friend")))?,
        };

        self.users
            .remove_friend(user_id, &friend_id)
            .await
            .map_err(map_user_error)?;
        self.drop_grants_between(user_id, &friend_id).await?;
        info!(user_id = %user_id, friend_id = %friend_id, "friend removed");
        Ok(friend_id)
    }

    async fn resolve_friend_ref(&self, friend_ref: &str) -> Result<Option<User>, Error> {
        if let Ok(id) = UserId::new(friend_ref) {
            return self.users.find_by_id(&id).await.map_err(map_user_error);
        }
        self.find_by_username(friend_ref).await
    }

    async fn drop_grants_between(&self, a: &UserId, b: &UserId) -> Result<(), Error> {
        for (owner, other) in [(a, b), (b, a)] {
            self.users
                .remove_allowed_track(owner, other)
                .await
                .map_err(map_user_error)?;
            self.users
                .remove_tracking_me(owner, other)
                .await
                .map_err(map_user_error)?;
        }
        Ok(())
    }

    /// Let `friend_id` see the caller's location. Idempotent.
    pub async fn allow_track(&self, user_id: &UserId, friend_id: &UserId) -> Result<(), Error> {
        let user = self.load(user_id).await?;
        if !user.is_friend_of(friend_id) {
            return Err(Error::invalid_request("Invalid friend"));
        }
        let friend = self.load(friend_id).await?;
        if friend.allowed_tracks.contains_key(user_id) && user.tracking_me.contains_key(friend_id)
        {
            debug!(user_id = %user_id, friend_id = %friend_id, "track grant already present");
            return Ok(());
        }

        self.users
            .put_allowed_track(friend_id, user_id, &user.track_grant())
            .await
            .map_err(map_user_error)?;
        self.users
            .put_tracking_me(user_id, friend_id, &friend.track_grantee())
            .await
            .map_err(map_user_error)?;
        info!(user_id = %user_id, friend_id = %friend_id, "track access granted");
        Ok(())
    }

    /// Withdraw a grant made by the caller. Fails when none exists.
    pub async fn revoke_track(&self, user_id: &UserId, friend_id: &UserId) -> Result<(), Error> {
        let friend = self.load(friend_id).await?;
        if !friend.allowed_tracks.contains_key(user_id) {
            return Err(Error::not_found(format!(
                "{} cannot track you",
                friend.username
            )));
        }
        self.users
            .remove_allowed_track(friend_id, user_id)
            .await
            .map_err(map_user_error)?;
        self.users
            .remove_tracking_me(user_id, friend_id)
            .await
            .map_err(map_user_error)?;
        info!(user_id = %user_id, friend_id = %friend_id, "track access revoked");
        Ok(())
    }

    /// Live location of a friend who granted the caller access.
    pub async fn friend_location(
        &self,
        user_id: &UserId,
        friend_username: &str,
    ) -> Result<GeoPoint, Error> {
        let no_access = || Error::invalid_request("Invalid friend/ no track access");
        let user = self.load(user_id).await?;
        let friend = self.find_by_username(friend_username).await?.ok_or_else(no_access)?;
        if !user.allowed_tracks.contains_key(&friend.id) {
            return Err(no_access());
        }
        friend
            .location
            .ok_or_else(|| Error::not_found("Friend has no location"))
    }

    /// Rewrite every cached copy of `user` held by friends and grant partners.
    ///
    /// Entries are only refreshed where they still exist, so removed
    /// relationships are never resurrected. Returns the number of writes.
    pub async fn propagate_profile(&self, user: &User) -> Result<u32, Error> {
        let mut writes = 0;
        let summary = user.friend_summary();
        for friend_id in user.friends.keys() {
            let Some(friend) = self.find_optional(friend_id).await? else {
                continue;
            };
            if friend.friends.get(&user.id).is_some_and(|cached| *cached != summary) {
                self.users
                    .put_friend(friend_id, &summary)
                    .await
                    .map_err(map_user_error)?;
                writes += 1;
            }
        }

        let grant = user.track_grant();
        for grantee_id in user.tracking_me.keys() {
            let Some(grantee) = self.find_optional(grantee_id).await? else {
                continue;
            };
            if grantee.allowed_tracks.get(&user.id).is_some_and(|cached| *cached != grant) {
                self.users
                    .put_allowed_track(grantee_id, &user.id, &grant)
                    .await
                    .map_err(map_user_error)?;
                writes += 1;
            }
        }

        let grantee_entry = user.track_grantee();
        for granter_id in user.allowed_tracks.keys() {
            let Some(granter) = self.find_optional(granter_id).await? else {
                continue;
            };
            if granter
                .tracking_me
                .get(&user.id)
                .is_some_and(|cached| *cached != grantee_entry)
            {
                self.users
                    .put_tracking_me(granter_id, &user.id, &grantee_entry)
                    .await
                    .map_err(map_user_error)?;
                writes += 1;
            }
        }

        debug!(user_id = %user.id, writes, "profile propagated");
        Ok(writes)
    }

    async fn find_optional(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.users.find_by_id(id).await.map_err(map_user_error)
    }

    /// Repair relationship drift around `user_id`. Safe to re-run.
    pub async fn reconcile(&self, user_id: &UserId) -> Result<ReconcileReport, Error> {
        let user = self.load(user_id).await?;
        let mut report = ReconcileReport::default();

        for (friend_id, cached) in &user.friends {
            let Some(friend) = self.find_optional(friend_id).await? else {
                self.users
                    .remove_friend(user_id, friend_id)
                    .await
                    .map_err(map_user_error)?;
                report.stale_friends_removed += 1;
                continue;
            };
            let live = friend.friend_summary();
            if *cached != live {
                self.users
                    .put_friend(user_id, &live)
                    .await
                    .map_err(map_user_error)?;
                report.summaries_refreshed += 1;
            }
            let mine = user.friend_summary();
            if friend.friends.get(user_id).is_some_and(|theirs| *theirs != mine) {
                self.users
                    .put_friend(friend_id, &mine)
                    .await
                    .map_err(map_user_error)?;
                report.summaries_refreshed += 1;
            }
            self.reconcile_inverse_grants(&user, &friend, &mut report)
                .await?;
        }

        for (granter_id, cached) in &user.allowed_tracks {
            match self.find_optional(granter_id).await? {
                Some(granter) if granter.tracking_me.contains_key(user_id) => {
                    let live = granter.track_grant();
                    if *cached != live {
                        self.users
                            .put_allowed_track(user_id, granter_id, &live)
                            .await
                            .map_err(map_user_error)?;
                        report.summaries_refreshed += 1;
                    }
                }
                _ => {
                    self.users
                        .remove_allowed_track(user_id, granter_id)
                        .await
                        .map_err(map_user_error)?;
                    report.grants_removed += 1;
                }
            }
        }

        for (grantee_id, cached) in &user.tracking_me {
            match self.find_optional(grantee_id).await? {
                Some(grantee) if grantee.allowed_tracks.contains_key(user_id) => {
                    let live = grantee.track_grantee();
                    if *cached != live {
                        self.users
                            .put_tracking_me(user_id, grantee_id, &live)
                            .await
                            .map_err(map_user_error)?;
                        report.summaries_refreshed += 1;
                    }
                }
                _ => {
                    self.users
                        .remove_tracking_me(user_id, grantee_id)
                        .await
                        .map_err(map_user_error)?;
                    report.grants_removed += 1;
                }
            }
        }

        info!(
            user_id = %user_id,
            stale_friends_removed = report.stale_friends_removed,
            summaries_refreshed = report.summaries_refreshed,
            grants_removed = report.grants_removed,
            "relationships reconciled"
        );
        Ok(report)
    }

    /// Drop entries a friend holds about `user` whose inverse on `user` is gone.
    async fn reconcile_inverse_grants(
        &self,
        user: &User,
        friend: &User,
        report: &mut ReconcileReport,
    ) -> Result<(), Error> {
        if friend.allowed_tracks.contains_key(&user.id) && !user.tracking_me.contains_key(&friend.id)
        {
            self.users
                .remove_allowed_track(&friend.id, &user.id)
                .await
                .map_err(map_user_error)?;
            report.grants_removed += 1;
        }
        if friend.tracking_me.contains_key(&user.id) && !user.allowed_tracks.contains_key(&friend.id)
        {
            self.users
                .remove_tracking_me(&friend.id, &user.id)
                .await
                .map_err(map_user_error)?;
            report.grants_removed += 1;
        }
        Ok(())
    }

    async fn apply_and_propagate(
        &self,
        user_id: &UserId,
        update: &UserUpdate,
    ) -> Result<User, Error> {
        let updated = self
            .users
            .apply(user_id, update, self.clock.utc())
            .await
            .map_err(map_user_error)?;
        let updated = require_user(updated, user_id)?;
        if update.affects_summaries() {
            self.propagate_profile(&updated).await?;
        }
        Ok(updated)
    }

    pub async fn update_location(&self, user_id: &UserId, point: GeoPoint) -> Result<User, Error> {
        self.apply_and_propagate(user_id, &UserUpdate::SetLocation(point))
            .await
    }

    pub async fn clear_location(&self, user_id: &UserId) -> Result<User, Error> {
        self.apply_and_propagate(user_id, &UserUpdate::ClearLocation)
            .await
    }

    /// Record activity, refreshing the `last_seen` friends observe.
    pub async fn touch_last_seen(&self, user_id: &UserId) -> Result<User, Error> {
        self.apply_and_propagate(user_id, &UserUpdate::TouchLastSeen)
            .await
    }

    /// Apply profile edits, remove a replaced custom avatar, and propagate.
    pub async fn update_profile(
        &self,
        user_id: &UserId,
        changes: ProfileUpdate,
    ) -> Result<User, Error> {
        let current = self.load(user_id).await?;
        let updates = changes.into_updates(&current);
        let mut latest = current.clone();
        for update in &updates {
            let updated = self
                .users
                .apply(user_id, update, self.clock.utc())
                .await
                .map_err(map_user_error)?;
            latest = require_user(updated, user_id)?;
        }

        if latest.avatar != current.avatar && !current.avatar.is_default() {
            if let Err(error) = self.avatars.remove(&current.avatar).await {
                warn!(user_id = %user_id, error = %error, "failed to remove replaced avatar");
            }
        }
        if updates.iter().any(UserUpdate::affects_summaries) {
            self.propagate_profile(&latest).await?;
        }
        if latest.username != current.username {
            self.conversations
                .rename_participant(
                    user_id,
                    current.username.as_str(),
                    latest.username.as_str(),
                )
                .await
                .map_err(map_conversation_error)?;
        }
        Ok(latest)
    }

    /// Delete an account and cascade to relationships, conversations, the
    /// notification log, and the avatar file.
    pub async fn delete_account(&self, user_id: &UserId) -> Result<(), Error> {
        let user = self.load(user_id).await?;

        // Conversation deletion is decided before friends lose their entries.
        let conversations = self
            .conversations
            .list_for_user(user_id)
            .await
            .map_err(map_conversation_error)?;
        for conversation in conversations {
            let Some(partner_id) = conversation.participants.other(user_id) else {
                continue;
            };
            let partner_keeps = self
                .find_optional(&partner_id)
                .await?
                .is_some_and(|partner| partner.is_friend_of(user_id));
            if !partner_keeps {
                self.conversations
                    .delete(&conversation.id)
                    .await
                    .map_err(map_conversation_error)?;
            }
        }

        for friend_id in user.friends.keys() {
            self.users
                .remove_friend(friend_id, user_id)
                .await
                .map_err(map_user_error)?;
        }
        for granter_id in user.allowed_tracks.keys() {
            self.users
                .remove_tracking_me(granter_id, user_id)
                .await
                .map_err(map_user_error)?;
        }
        for grantee_id in user.tracking_me.keys() {
            self.users
                .remove_allowed_track(grantee_id, user_id)
                .await
                .map_err(map_user_error)?;
        }

        self.notifications
            .delete_all(user_id)
            .await
            .map_err(map_notification_error)?;
        if !user.avatar.is_default() {
            self.avatars
                .remove(&user.avatar)
                .await
                .map_err(map_avatar_error)?;
        }
        self.users.delete(user_id).await.map_err(map_user_error)?;
        info!(user_id = %user_id, "account deleted");
        Ok(())
    }

    /// Username search excluding the caller.
    pub async fn search(&self, user_id: &UserId, query: &str) -> Result<Vec<SearchResult>, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid_request("Empty or invalid search query"));
        }
        let user = self.load(user_id).await?;
        let matches = self
            .users
            .search(query, user_id, SEARCH_LIMIT)
            .await
            .map_err(map_user_error)?;
        Ok(matches
            .into_iter()
            .map(|found| SearchResult {
                is_friend: user.is_friend_of(&found.id),
                id: found.id,
                username: found.username,
                full_name: found.full_name,
                avatar: found.avatar,
            })
            .collect())
    }

    /// Friends with a flag for unread messages addressed to the caller.
    pub async fn friends_overview(&self, user_id: &UserId) -> Result<Vec<FriendOverview>, Error> {
        let user = self.load(user_id).await?;
        let mut overview = Vec::with_capacity(user.friends.len());
        for summary in user.friends.values() {
            let unread_messages = match ParticipantPair::new(user.id, summary.id) {
                Some(pair) => self
                    .conversations
                    .find_by_participants(&pair)
                    .await
                    .map_err(map_conversation_error)?
                    .is_some_and(|conversation| conversation.has_unread_for(user.username.as_str())),
                None => false,
            };
            overview.push(FriendOverview {
                summary: summary.clone(),
                unread_messages,
            });
        }
        Ok(overview)
    }
}

#[cfg(test)]
#[path = "relationship_service_tests.rs"]
mod tests;

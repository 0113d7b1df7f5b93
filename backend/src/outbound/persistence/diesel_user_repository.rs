//! PostgreSQL-backed `UserRepository`.
//!
//! A user document is one `users` row plus its owned rows in `friends`,
//! `allowed_tracks` and `tracking_me`. Map entries are upserted or deleted
//! one row at a time, so concurrent writes to different entries never
//! overwrite each other.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{UserPersistenceError, UserRepository};
use crate::domain::{
    Avatar, Email, FriendSummary, GeoPoint, SessionToken, TrackGrant, TrackGrantee, User, UserId,
    UserUpdate, Username,
};

use super::diesel_error_mapping::{Failure, classify, pool_message};
use super::models::{AllowedTrackRow, FriendRow, NewUserRow, TrackingMeRow, UserRow};
use super::pool::{DbPool, PoolError};
use super::schema::{allowed_tracks, friends, tracking_me, users};

#[derive(Clone)]
pub struct DieselUserRepository {
    pool: DbPool,
}

impl DieselUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> UserPersistenceError {
    UserPersistenceError::connection(pool_message(error))
}

fn map_failure(failure: Failure) -> UserPersistenceError {
    match failure {
        Failure::Connection(message) => UserPersistenceError::connection(message),
        Failure::Query(message) => UserPersistenceError::query(message),
        Failure::UniqueViolation { constraint } => match constraint.as_deref() {
            Some("users_username_key") => UserPersistenceError::duplicate("username"),
            Some("users_email_key") => UserPersistenceError::duplicate("email"),
            Some("users_session_token_key") => UserPersistenceError::duplicate("session token"),
            _ => UserPersistenceError::query("unique constraint violated"),
        },
        Failure::ForeignKeyViolation => UserPersistenceError::query("foreign key violation"),
    }
}

fn map_diesel_error(error: diesel::result::Error) -> UserPersistenceError {
    map_failure(classify(error))
}

/// Map a write on an owned table, reporting a missing owner as `false`.
fn owned_write(result: Result<usize, diesel::result::Error>) -> Result<bool, UserPersistenceError> {
    match result {
        Ok(rows) => Ok(rows > 0),
        Err(error) => match classify(error) {
            Failure::ForeignKeyViolation => Ok(false),
            other => Err(map_failure(other)),
        },
    }
}

fn invalid_row(column: &str, error: impl std::fmt::Display) -> UserPersistenceError {
    UserPersistenceError::query(format!("stored {column} is invalid: {error}"))
}

fn point_from_columns(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<GeoPoint>, UserPersistenceError> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude)
            .map(Some)
            .map_err(|err| invalid_row("location", err)),
        _ => Ok(None),
    }
}

#[derive(Default)]
struct OwnedRows {
    friends: Vec<FriendRow>,
    allowed_tracks: Vec<AllowedTrackRow>,
    tracking_me: Vec<TrackingMeRow>,
}

fn row_to_user(row: UserRow, owned: OwnedRows) -> Result<User, UserPersistenceError> {
    let mut friends = BTreeMap::new();
    for entry in owned.friends {
        let id = UserId::from_uuid(entry.friend_id);
        friends.insert(
            id,
            FriendSummary {
                id,
                username: Username::new(entry.username)
                    .map_err(|err| invalid_row("friend username", err))?,
                avatar: Avatar::new(entry.avatar).map_err(|err| invalid_row("avatar", err))?,
                last_seen: entry.last_seen,
            },
        );
    }

    let mut allowed_tracks = BTreeMap::new();
    for entry in owned.allowed_tracks {
        allowed_tracks.insert(
            UserId::from_uuid(entry.granter_id),
            TrackGrant {
                username: Username::new(entry.username)
                    .map_err(|err| invalid_row("granter username", err))?,
                avatar: Avatar::new(entry.avatar).map_err(|err| invalid_row("avatar", err))?,
                location: point_from_columns(entry.latitude, entry.longitude)?,
            },
        );
    }

    let mut tracking_me = BTreeMap::new();
    for entry in owned.tracking_me {
        tracking_me.insert(
            UserId::from_uuid(entry.grantee_id),
            TrackGrantee {
                username: Username::new(entry.username)
                    .map_err(|err| invalid_row("grantee username", err))?,
                avatar: Avatar::new(entry.avatar).map_err(|err| invalid_row("avatar", err))?,
            },
        );
    }

    Ok(User {
        id: UserId::from_uuid(row.id),
        username: Username::new(row.username).map_err(|err| invalid_row("username", err))?,
        full_name: row.full_name,
        email: Email::new(row.email).map_err(|err| invalid_row("email", err))?,
        password_hash: row.password_hash,
        avatar: Avatar::new(row.avatar).map_err(|err| invalid_row("avatar", err))?,
        friends,
        allowed_tracks,
        tracking_me,
        location: point_from_columns(row.latitude, row.longitude)?,
        session_token: row.session_token.map(SessionToken::from_uuid),
        reset_token: row.reset_token,
        last_seen: row.last_seen,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Load the owned rows for `rows` in three queries and assemble users in the
/// same order.
async fn hydrate(
    conn: &mut AsyncPgConnection,
    rows: Vec<UserRow>,
) -> Result<Vec<User>, UserPersistenceError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

    let friend_rows: Vec<FriendRow> = friends::table
        .filter(friends::owner_id.eq_any(&ids))
        .select(FriendRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;
    let allowed_rows: Vec<AllowedTrackRow> = allowed_tracks::table
        .filter(allowed_tracks::owner_id.eq_any(&ids))
        .select(AllowedTrackRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;
    let tracking_rows: Vec<TrackingMeRow> = tracking_me::table
        .filter(tracking_me::owner_id.eq_any(&ids))
        .select(TrackingMeRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;

    let mut owned: HashMap<Uuid, OwnedRows> = HashMap::new();
    for row in friend_rows {
        owned.entry(row.owner_id).or_default().friends.push(row);
    }
    for row in allowed_rows {
        owned.entry(row.owner_id).or_default().allowed_tracks.push(row);
    }
    for row in tracking_rows {
        owned.entry(row.owner_id).or_default().tracking_me.push(row);
    }

    rows.into_iter()
        .map(|row| {
            let entries = owned.remove(&row.id).unwrap_or_default();
            row_to_user(row, entries)
        })
        .collect()
}

async fn hydrate_one(
    conn: &mut AsyncPgConnection,
    row: Option<UserRow>,
) -> Result<Option<User>, UserPersistenceError> {
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(hydrate(conn, vec![row]).await?.pop())
}

/// Run one `UPDATE users` for `$id`, always bumping `updated_at`.
macro_rules! update_user {
    ($conn:expr, $id:expr, $now:expr, $($assignment:expr),+ $(,)?) => {
        diesel::update(users::table.find($id))
            .set(($($assignment,)+ users::updated_at.eq($now)))
            .execute($conn)
            .await
    };
}

async fn apply_update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    update: &UserUpdate,
    now: DateTime<Utc>,
) -> Result<usize, diesel::result::Error> {
    match update {
        UserUpdate::SetUsername(username) => {
            update_user!(conn, id, now, users::username.eq(username.as_str()))
        }
        UserUpdate::SetFullName(name) => {
            update_user!(conn, id, now, users::full_name.eq(name.as_str()))
        }
        UserUpdate::SetAvatar(avatar) => {
            update_user!(conn, id, now, users::avatar.eq(avatar.as_str()))
        }
        UserUpdate::SetLocation(point) => update_user!(
            conn,
            id,
            now,
            users::latitude.eq(Some(point.latitude())),
            users::longitude.eq(Some(point.longitude())),
        ),
        UserUpdate::ClearLocation => update_user!(
            conn,
            id,
            now,
            users::latitude.eq(None::<f64>),
            users::longitude.eq(None::<f64>),
        ),
        UserUpdate::SetSessionToken(token) => {
            update_user!(conn, id, now, users::session_token.eq(Some(*token.as_uuid())))
        }
        UserUpdate::ClearSessionToken => {
            update_user!(conn, id, now, users::session_token.eq(None::<Uuid>))
        }
        UserUpdate::SetResetToken(token) => {
            update_user!(conn, id, now, users::reset_token.eq(Some(token.as_str())))
        }
        UserUpdate::SetPasswordHash(hash) => update_user!(
            conn,
            id,
            now,
            users::password_hash.eq(hash.as_str()),
            users::reset_token.eq(None::<String>),
        ),
        UserUpdate::TouchLastSeen => {
            update_user!(conn, id, now, users::last_seen.eq(Some(now)))
        }
    }
}

fn friend_row(owner: &UserId, friend: &FriendSummary) -> FriendRow {
    FriendRow {
        owner_id: *owner.as_uuid(),
        friend_id: *friend.id.as_uuid(),
        username: friend.username.as_str().to_owned(),
        avatar: friend.avatar.as_str().to_owned(),
        last_seen: friend.last_seen,
    }
}

fn allowed_track_row(owner: &UserId, granter: &UserId, grant: &TrackGrant) -> AllowedTrackRow {
    AllowedTrackRow {
        owner_id: *owner.as_uuid(),
        granter_id: *granter.as_uuid(),
        username: grant.username.as_str().to_owned(),
        avatar: grant.avatar.as_str().to_owned(),
        latitude: grant.location.map(|point| point.latitude()),
        longitude: grant.location.map(|point| point.longitude()),
    }
}

fn tracking_me_row(owner: &UserId, grantee: &UserId, entry: &TrackGrantee) -> TrackingMeRow {
    TrackingMeRow {
        owner_id: *owner.as_uuid(),
        grantee_id: *grantee.as_uuid(),
        username: entry.username.as_str().to_owned(),
        avatar: entry.avatar.as_str().to_owned(),
    }
}

/// Escape LIKE metacharacters so the query is matched literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl UserRepository for DieselUserRepository {
    async fn insert(&self, user: &User) -> Result<(), UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let new_row = NewUserRow {
            id: *user.id.as_uuid(),
            username: user.username.as_str(),
            full_name: &user.full_name,
            email: user.email.as_str(),
            password_hash: &user.password_hash,
            avatar: user.avatar.as_str(),
            latitude: user.location.map(|point| point.latitude()),
            longitude: user.location.map(|point| point.longitude()),
            session_token: user.session_token.map(|token| *token.as_uuid()),
            reset_token: user.reset_token.as_deref(),
            last_seen: user.last_seen,
            created_at: user.created_at,
            updated_at: user.updated_at,
        };
        let friend_rows: Vec<FriendRow> = user
            .friends
            .values()
            .map(|friend| friend_row(&user.id, friend))
            .collect();
        let allowed_rows: Vec<AllowedTrackRow> = user
            .allowed_tracks
            .iter()
            .map(|(granter, grant)| allowed_track_row(&user.id, granter, grant))
            .collect();
        let tracking_rows: Vec<TrackingMeRow> = user
            .tracking_me
            .iter()
            .map(|(grantee, entry)| tracking_me_row(&user.id, grantee, entry))
            .collect();

        conn.transaction(|conn| {
            async move {
                diesel::insert_into(users::table)
                    .values(&new_row)
                    .execute(conn)
                    .await?;
                if !friend_rows.is_empty() {
                    diesel::insert_into(friends::table)
                        .values(&friend_rows)
                        .execute(conn)
                        .await?;
                }
                if !allowed_rows.is_empty() {
                    diesel::insert_into(allowed_tracks::table)
                        .values(&allowed_rows)
                        .execute(conn)
                        .await?;
                }
                if !tracking_rows.is_empty() {
                    diesel::insert_into(tracking_me::table)
                        .values(&tracking_rows)
                        .execute(conn)
                        .await?;
                }
                Ok::<_, diesel::result::Error>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .find(*id.as_uuid())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        hydrate_one(&mut conn, row).await
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .filter(users::username.eq(username.as_str()))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        hydrate_one(&mut conn, row).await
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .filter(users::email.eq(email.as_str()))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        hydrate_one(&mut conn, row).await
    }

    async fn find_by_session_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .filter(users::session_token.eq(token.as_uuid()))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        hydrate_one(&mut conn, row).await
    }

    async fn apply(
        &self,
        id: &UserId,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = apply_update(&mut conn, *id.as_uuid(), update, now)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Ok(None);
        }
        let row: Option<UserRow> = users::table
            .find(*id.as_uuid())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        hydrate_one(&mut conn, row).await
    }

    async fn delete(&self, id: &UserId) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::delete(users::table.find(*id.as_uuid()))
            .execute(&mut conn)
            .await
            .map(|rows| rows > 0)
            .map_err(map_diesel_error)
    }

    async fn put_friend(
        &self,
        owner: &UserId,
        friend: &FriendSummary,
    ) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = friend_row(owner, friend);
        owned_write(
            diesel::insert_into(friends::table)
                .values(&row)
                .on_conflict((friends::owner_id, friends::friend_id))
                .do_update()
                .set((
                    friends::username.eq(&row.username),
                    friends::avatar.eq(&row.avatar),
                    friends::last_seen.eq(row.last_seen),
                ))
                .execute(&mut conn)
                .await,
        )
    }

    async fn remove_friend(
        &self,
        owner: &UserId,
        friend: &UserId,
    ) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::delete(
            friends::table
                .filter(friends::owner_id.eq(owner.as_uuid()))
                .filter(friends::friend_id.eq(friend.as_uuid())),
        )
        .execute(&mut conn)
        .await
        .map(|rows| rows > 0)
        .map_err(map_diesel_error)
    }

    async fn put_allowed_track(
        &self,
        owner: &UserId,
        granter: &UserId,
        grant: &TrackGrant,
    ) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = allowed_track_row(owner, granter, grant);
        owned_write(
            diesel::insert_into(allowed_tracks::table)
                .values(&row)
                .on_conflict((allowed_tracks::owner_id, allowed_tracks::granter_id))
                .do_update()
                .set((
                    allowed_tracks::username.eq(&row.username),
                    allowed_tracks::avatar.eq(&row.avatar),
                    allowed_tracks::latitude.eq(row.latitude),
                    allowed_tracks::longitude.eq(row.longitude),
                ))
                .execute(&mut conn)
                .await,
        )
    }

    async fn remove_allowed_track(
        &self,
        owner: &UserId,
        granter: &UserId,
    ) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::delete(
            allowed_tracks::table
                .filter(allowed_tracks::owner_id.eq(owner.as_uuid()))
                .filter(allowed_tracks::granter_id.eq(granter.as_uuid())),
        )
        .execute(&mut conn)
        .await
        .map(|rows| rows > 0)
        .map_err(map_diesel_error)
    }

    async fn put_tracking_me(
        &self,
        owner: &UserId,
        grantee: &UserId,
        entry: &TrackGrantee,
    ) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = tracking_me_row(owner, grantee, entry);
        owned_write(
            diesel::insert_into(tracking_me::table)
                .values(&row)
                .on_conflict((tracking_me::owner_id, tracking_me::grantee_id))
                .do_update()
                .set((
                    tracking_me::username.eq(&row.username),
                    tracking_me::avatar.eq(&row.avatar),
                ))
                .execute(&mut conn)
                .await,
        )
    }

    async fn remove_tracking_me(
        &self,
        owner: &UserId,
        grantee: &UserId,
    ) -> Result<bool, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::delete(
            tracking_me::table
                .filter(tracking_me::owner_id.eq(owner.as_uuid()))
                .filter(tracking_me::grantee_id.eq(grantee.as_uuid())),
        )
        .execute(&mut conn)
        .await
        .map(|rows| rows > 0)
        .map_err(map_diesel_error)
    }

    async fn search(
        &self,
        query: &str,
        exclude: &UserId,
        limit: usize,
    ) -> Result<Vec<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<UserRow> = users::table
            .filter(users::username.ilike(like_pattern(query)))
            .filter(users::id.ne(exclude.as_uuid()))
            .order_by(users::username)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        hydrate(&mut conn, rows).await
    }
}

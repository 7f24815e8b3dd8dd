use crate::record::{
    AuthenticationRecord, CommentRecord, FeedPostRecord, FollowRecord, FullPostRecord,
    ProfileRecord, UserPostCountRecord, UserRecord,
};
use plaza_common::{
    model::{
        Id, ModelValidationError, PlazaSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CommentMarker},
        counter_from_db,
        follow::{Follow, FollowMarker},
        page::{Page, PageOutOfRangeError, PageRequest},
        post::{Content, FeedPost, Post, PostMarker},
        user::{CreateUser, Profile, ProfileMarker, User, UserHandle, UserMarker, UserPostCount},
    },
    snowflake::{ProcessId, SnowflakeTimestampFromDateTimeError, WorkerId},
    util::PositiveDuration,
};
use sqlx::{
    SqlitePool,
    error::DatabaseError,
    migrate::{MigrateError, Migrator},
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    str::FromStr,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

static MIGRATOR: Migrator = sqlx::migrate!();

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampFromDateTimeError),
    #[error("Migrating the database failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    PageOutOfRange(#[from] PageOutOfRangeError),
    #[error("The handle {0:?} is already taken")]
    HandleTaken(UserHandle),
    #[error("A concurrent write conflicted with this one")]
    Conflict,
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(database_error) if is_write_conflict(&**database_error) => {
                debug!(error = %database_error, "Write conflict");
                DbError::Conflict
            }
            _ => DbError::Sqlx(error),
        }
    }
}

/// Lock contention and uniqueness races both mean another writer got there first.
fn is_write_conflict(error: &dyn DatabaseError) -> bool {
    let primary_code = error
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xFF);

    error.is_unique_violation() || matches!(primary_code, Some(SQLITE_BUSY | SQLITE_LOCKED))
}

fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `SELECT` list shared by every query returning [`FullPostRecord`]s.
macro_rules! select_full_post {
    () => {
        "
        SELECT
            posts.post_snowflake,
            posts.content,
            posts.created_at,
            posts.likes,
            posts.dislikes,
            users.user_snowflake,
            users.handle
        FROM
            posts JOIN users ON users.user_snowflake = posts.user_snowflake
        "
    };
}
pub(crate) use select_full_post;

macro_rules! select_comment {
    () => {
        "
        SELECT
            comments.comment_snowflake,
            comments.post_snowflake,
            comments.content,
            comments.created_at,
            users.user_snowflake,
            users.handle
        FROM
            comments JOIN users ON users.user_snowflake = comments.user_snowflake
        "
    };
}

macro_rules! select_follow {
    () => {
        "
        SELECT
            follows.follow_snowflake,
            follows.created_at,
            follower.user_snowflake AS follower_snowflake,
            follower.handle AS follower_handle,
            followed.user_snowflake AS followed_snowflake,
            followed.handle AS followed_handle
        FROM
            follows
            JOIN users AS follower ON follower.user_snowflake = follows.follower_snowflake
            JOIN users AS followed ON followed.user_snowflake = follows.followed_snowflake
        "
    };
}

#[derive(Debug)]
pub struct DbClient {
    pub(crate) pool: SqlitePool,
    snowflake_generator: Mutex<PlazaSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(PlazaSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    /// Opens a pool on `database_url` and brings the schema up to date.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        info!(database_url, "Database ready");

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub(crate) fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake.into())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.handle
            FROM
                users
            WHERE
                users.user_snowflake = ?
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_handle(&self, handle: &UserHandle) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.handle
            FROM
                users
            WHERE
                users.handle = ?
            ",
        )
        .bind(handle.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    /// Creates a user together with their profile; neither exists without the other.
    pub async fn create_user(&self, user: &CreateUser) -> Result<(User, Profile)> {
        let user_id = self.next_id::<UserMarker>()?;
        let profile_id = self.next_id::<ProfileMarker>()?;

        let mut transaction = self.pool.begin().await?;

        let inserted = query(
            "
            INSERT INTO users (user_snowflake, handle)
            VALUES (?, ?)
            ",
        )
        .bind(user_id.to_db())
        .bind(user.handle.get())
        .execute(&mut *transaction)
        .await;

        match inserted {
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                return Err(DbError::HandleTaken(user.handle.clone()));
            }
            inserted => inserted?,
        };

        let profile = query_as::<_, ProfileRecord>(
            "
            INSERT INTO profiles (profile_snowflake, user_snowflake)
            VALUES (?, ?)
            RETURNING profile_snowflake, user_snowflake
            ",
        )
        .bind(profile_id.to_db())
        .bind(user_id.to_db())
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        let created = User {
            id: user_id,
            handle: user.handle.clone(),
        };
        Ok((created, profile.into()))
    }

    pub async fn fetch_profile(&self, user_id: Id<UserMarker>) -> Result<Option<Profile>> {
        let record = query_as::<_, ProfileRecord>(
            "
            SELECT
                profiles.profile_snowflake,
                profiles.user_snowflake
            FROM
                profiles
            WHERE
                profiles.user_snowflake = ?
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Profile::from))
    }

    /// Users with the most posts, most first.
    pub async fn fetch_top_authors(&self, limit: u64) -> Result<Vec<UserPostCount>> {
        let records = query_as::<_, UserPostCountRecord>(
            "
            SELECT
                users.user_snowflake,
                users.handle,
                COUNT(*) AS post_count
            FROM
                posts JOIN users ON users.user_snowflake = posts.user_snowflake
            GROUP BY
                users.user_snowflake
            ORDER BY
                post_count DESC,
                users.user_snowflake ASC
            LIMIT ?
            ",
        )
        .bind(to_db_count(limit))
        .fetch_all(&self.pool)
        .await?;

        let authors = records
            .into_iter()
            .map(UserPostCount::try_from)
            .collect::<Result<_, _>>()?;
        Ok(authors)
    }

    pub async fn create_auth(
        &self,
        user_id: Id<UserMarker>,
        token_hash: &AuthTokenHash,
        expires_after: Option<PositiveDuration>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO authentications (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(token_hash.as_bytes())
        .bind(user_id.to_db())
        .bind(OffsetDateTime::now_utc())
        .bind(expires_after.map(|duration| duration.whole_seconds()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                authentications.user_snowflake,
                authentications.token_hash,
                authentications.created_at,
                authentications.expires_after_seconds
            FROM
                authentications
            WHERE
                authentications.token_hash = ?
            ",
        )
        .bind(token_hash.as_bytes())
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(concat!(
            select_full_post!(),
            "WHERE posts.post_snowflake = ?"
        ))
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn create_post(&self, author: Id<UserMarker>, content: &Content) -> Result<Post> {
        let post_id = self.next_id::<PostMarker>()?;

        query(
            "
            INSERT INTO posts (post_snowflake, user_snowflake, content, created_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(post_id.to_db())
        .bind(author.to_db())
        .bind(content.get())
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;

        self.fetch_post(post_id)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Replaces the content; returns `None` if the post does not exist.
    pub async fn update_post_content(
        &self,
        post_id: Id<PostMarker>,
        content: &Content,
    ) -> Result<Option<Post>> {
        let updated = query(
            "
            UPDATE posts
            SET content = ?
            WHERE post_snowflake = ?
            ",
        )
        .bind(content.get())
        .bind(post_id.to_db())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        self.fetch_post(post_id).await
    }

    /// Deletes a post with its comments and preferences; returns whether it existed.
    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let deleted = query("DELETE FROM posts WHERE post_snowflake = ?")
            .bind(post_id.to_db())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    /// Posts by one author, newest first.
    pub async fn fetch_user_posts(
        &self,
        user_id: Id<UserMarker>,
        page: PageRequest,
    ) -> Result<Page<Post>> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM posts WHERE user_snowflake = ?")
            .bind(user_id.to_db())
            .fetch_one(&self.pool)
            .await?;
        let total = counter_from_db(total)?;
        page.check(total)?;

        let records = query_as::<_, FullPostRecord>(concat!(
            select_full_post!(),
            "
            WHERE posts.user_snowflake = ?
            ORDER BY posts.post_snowflake DESC
            LIMIT ? OFFSET ?
            "
        ))
        .bind(user_id.to_db())
        .bind(to_db_count(page.size()))
        .bind(to_db_count(page.offset()))
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Page::new(posts, page, total))
    }

    /// Posts by the reader and everyone they follow, newest first, each with
    /// the reader's own preference.
    pub async fn fetch_feed(
        &self,
        reader: Id<UserMarker>,
        page: PageRequest,
    ) -> Result<Page<FeedPost>> {
        let total: i64 = query_scalar(
            "
            SELECT COUNT(*)
            FROM posts
            WHERE
                posts.user_snowflake = ?1
                OR posts.user_snowflake IN (
                    SELECT followed_snowflake FROM follows WHERE follower_snowflake = ?1
                )
            ",
        )
        .bind(reader.to_db())
        .fetch_one(&self.pool)
        .await?;
        let total = counter_from_db(total)?;
        page.check(total)?;

        let records = query_as::<_, FeedPostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.content,
                posts.created_at,
                posts.likes,
                posts.dislikes,
                users.user_snowflake,
                users.handle,
                preferences.value AS own_value
            FROM
                posts
                JOIN users ON users.user_snowflake = posts.user_snowflake
                LEFT JOIN preferences
                    ON preferences.post_snowflake = posts.post_snowflake
                    AND preferences.user_snowflake = ?1
            WHERE
                posts.user_snowflake = ?1
                OR posts.user_snowflake IN (
                    SELECT followed_snowflake FROM follows WHERE follower_snowflake = ?1
                )
            ORDER BY posts.post_snowflake DESC
            LIMIT ?2 OFFSET ?3
            ",
        )
        .bind(reader.to_db())
        .bind(to_db_count(page.size()))
        .bind(to_db_count(page.offset()))
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(FeedPost::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Page::new(posts, page, total))
    }

    /// Adds a comment; returns `None` if the post does not exist.
    pub async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author: Id<UserMarker>,
        content: &Content,
    ) -> Result<Option<Comment>> {
        let comment_id = self.next_id::<CommentMarker>()?;

        let inserted = query(
            "
            INSERT INTO comments (comment_snowflake, post_snowflake, user_snowflake, content, created_at)
            SELECT ?1, posts.post_snowflake, ?2, ?3, ?4
            FROM posts
            WHERE posts.post_snowflake = ?5
            ",
        )
        .bind(comment_id.to_db())
        .bind(author.to_db())
        .bind(content.get())
        .bind(OffsetDateTime::now_utc())
        .bind(post_id.to_db())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(None);
        }
        self.fetch_comment(comment_id).await
    }

    pub async fn fetch_comment(&self, comment_id: Id<CommentMarker>) -> Result<Option<Comment>> {
        let record = query_as::<_, CommentRecord>(concat!(
            select_comment!(),
            "WHERE comments.comment_snowflake = ?"
        ))
        .bind(comment_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let comment = record.map(Comment::try_from).transpose()?;
        Ok(comment)
    }

    /// Comments under a post, newest first.
    pub async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(concat!(
            select_comment!(),
            "
            WHERE comments.post_snowflake = ?
            ORDER BY comments.comment_snowflake DESC
            "
        ))
        .bind(post_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Returns whether a new follow was created; following twice is a no-op.
    pub async fn follow(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        let follow_id = self.next_id::<FollowMarker>()?;

        let inserted = query(
            "
            INSERT INTO follows (follow_snowflake, follower_snowflake, followed_snowflake, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (follower_snowflake, followed_snowflake) DO NOTHING
            ",
        )
        .bind(follow_id.to_db())
        .bind(follower.to_db())
        .bind(followed.to_db())
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted > 0)
    }

    /// Returns whether a follow was removed; unfollowing twice is a no-op.
    pub async fn unfollow(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        let deleted = query(
            "
            DELETE FROM follows
            WHERE follower_snowflake = ? AND followed_snowflake = ?
            ",
        )
        .bind(follower.to_db())
        .bind(followed.to_db())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted > 0)
    }

    pub async fn is_following(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        let following: i64 = query_scalar(
            "
            SELECT EXISTS (
                SELECT 1 FROM follows
                WHERE follower_snowflake = ? AND followed_snowflake = ?
            )
            ",
        )
        .bind(follower.to_db())
        .bind(followed.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(following != 0)
    }

    /// Everyone `user_id` follows, most recently followed first.
    pub async fn fetch_follows(&self, user_id: Id<UserMarker>) -> Result<Vec<Follow>> {
        let records = query_as::<_, FollowRecord>(concat!(
            select_follow!(),
            "
            WHERE follows.follower_snowflake = ?
            ORDER BY follows.follow_snowflake DESC
            "
        ))
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let follows = records
            .into_iter()
            .map(Follow::try_from)
            .collect::<Result<_, _>>()?;
        Ok(follows)
    }

    /// Everyone following `user_id`, most recent first.
    pub async fn fetch_followers(&self, user_id: Id<UserMarker>) -> Result<Vec<Follow>> {
        let records = query_as::<_, FollowRecord>(concat!(
            select_follow!(),
            "
            WHERE follows.followed_snowflake = ?
            ORDER BY follows.follow_snowflake DESC
            "
        ))
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let followers = records
            .into_iter()
            .map(Follow::try_from)
            .collect::<Result<_, _>>()?;
        Ok(followers)
    }
}

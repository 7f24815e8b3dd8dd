use plaza_common::model::{
    Id, ModelValidationError,
    auth::Authentication,
    comment::Comment,
    counter_from_db,
    follow::Follow,
    post::{Content, FeedPost, Post},
    preference::{Preference, PreferenceValue},
    user::{Profile, User, UserHandle, UserPostCount},
};
use plaza_common::util::PositiveDuration;
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub handle: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct ProfileRecord {
    pub profile_snowflake: i64,
    pub user_snowflake: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserPostCountRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub post_count: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    pub post_snowflake: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub likes: i64,
    pub dislikes: i64,
    #[sqlx(flatten)]
    pub author: UserRecord,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FeedPostRecord {
    #[sqlx(flatten)]
    pub post: FullPostRecord,
    pub own_value: Option<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_snowflake: i64,
    pub post_snowflake: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
    #[sqlx(flatten)]
    pub author: UserRecord,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct PreferenceRecord {
    pub preference_snowflake: i64,
    pub user_snowflake: i64,
    pub post_snowflake: i64,
    pub value: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FollowRecord {
    pub follow_snowflake: i64,
    pub created_at: OffsetDateTime,
    pub follower_snowflake: i64,
    pub follower_handle: String,
    pub followed_snowflake: i64,
    pub followed_handle: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_after_seconds: Option<i64>,
}

fn user(user_snowflake: i64, handle: String) -> Result<User, ModelValidationError> {
    Ok(User {
        id: Id::from_db(user_snowflake),
        handle: UserHandle::new(handle)?,
    })
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        user(value.user_snowflake, value.handle)
    }
}

impl From<ProfileRecord> for Profile {
    fn from(value: ProfileRecord) -> Self {
        Self {
            id: Id::from_db(value.profile_snowflake),
            user_id: Id::from_db(value.user_snowflake),
        }
    }
}

impl TryFrom<UserPostCountRecord> for UserPostCount {
    type Error = ModelValidationError;

    fn try_from(value: UserPostCountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            post_count: counter_from_db(value.post_count)?,
        })
    }
}

impl TryFrom<FullPostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            author: value.author.try_into()?,
            content: Content::new(value.content)?,
            created_at: value.created_at,
            likes: counter_from_db(value.likes)?,
            dislikes: counter_from_db(value.dislikes)?,
        })
    }
}

impl TryFrom<FeedPostRecord> for FeedPost {
    type Error = ModelValidationError;

    fn try_from(value: FeedPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            post: value.post.try_into()?,
            own_preference: value
                .own_value
                .map(PreferenceValue::try_from)
                .transpose()?,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_snowflake),
            post_id: Id::from_db(value.post_snowflake),
            author: value.author.try_into()?,
            content: Content::new(value.content)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<PreferenceRecord> for Preference {
    type Error = ModelValidationError;

    fn try_from(value: PreferenceRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.preference_snowflake),
            user_id: Id::from_db(value.user_snowflake),
            post_id: Id::from_db(value.post_snowflake),
            value: value.value.try_into()?,
        })
    }
}

impl TryFrom<FollowRecord> for Follow {
    type Error = ModelValidationError;

    fn try_from(value: FollowRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.follow_snowflake),
            follower: user(value.follower_snowflake, value.follower_handle)?,
            followed: user(value.followed_snowflake, value.followed_handle)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at,
            expires_after: value
                .expires_after_seconds
                .map(PositiveDuration::from_seconds)
                .transpose()?,
        })
    }
}

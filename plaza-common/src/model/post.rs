use crate::model::{
    Id,
    preference::PreferenceValue,
    user::{User, UserMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: User,
    pub content: Content,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub likes: u64,
    pub dislikes: u64,
}

/// A post as seen in a listing by a particular reader.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    pub own_preference: Option<PreferenceValue>,
}

/// Request body for creating or editing a post, and for commenting.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostContent {
    pub content: Content,
}

/// Non-blank user-written text.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Content(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Content must not be blank")]
pub struct InvalidContentError;

impl Content {
    pub fn new(content: String) -> Result<Self, InvalidContentError> {
        if content.trim().is_empty() {
            Err(InvalidContentError)
        } else {
            Ok(Self(content))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Content::new(inner).map_err(|_| {
            Error::invalid_value(Unexpected::Other("blank string"), &"non-blank content")
        })
    }
}

/// Something written by a single user.
pub trait Authored {
    fn author_id(&self) -> Id<UserMarker>;
}

impl Authored for Post {
    fn author_id(&self) -> Id<UserMarker> {
        self.author.id
    }
}

/// Only the author of a resource may edit or delete it.
#[must_use]
pub fn can_modify(actor: Id<UserMarker>, resource: &impl Authored) -> bool {
    resource.author_id() == actor
}

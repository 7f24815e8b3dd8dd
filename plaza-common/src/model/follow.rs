use crate::model::{Id, user::User};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct FollowMarker;

/// `follower` sees the posts of `followed` in their feed.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Follow {
    pub id: Id<FollowMarker>,
    pub follower: User,
    pub followed: User,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

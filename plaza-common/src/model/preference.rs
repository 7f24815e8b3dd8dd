//! Likes and dislikes.
//!
//! A user holds at most one [`Preference`] per post. Applying a value is a
//! toggle: the same value again retracts it, the other value switches to it.
//! [`PreferenceState::apply`] is the whole state machine; persistence layers
//! apply the returned [`CounterDelta`] to the post's denormalized counters.

use crate::model::{Id, post::Post, post::PostMarker, user::UserMarker};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PreferenceMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PreferenceValue {
    Like = 1,
    Dislike = 2,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Preference value must be 1 (like) or 2 (dislike), got {0}")]
pub struct InvalidPreferenceValueError(pub i64);

impl PreferenceValue {
    #[must_use]
    pub fn get(self) -> u8 {
        self as u8
    }
}

impl From<PreferenceValue> for u8 {
    fn from(value: PreferenceValue) -> Self {
        value.get()
    }
}

impl TryFrom<i64> for PreferenceValue {
    type Error = InvalidPreferenceValueError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Like),
            2 => Ok(Self::Dislike),
            _ => Err(InvalidPreferenceValueError(value)),
        }
    }
}

impl TryFrom<u8> for PreferenceValue {
    type Error = InvalidPreferenceValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        i64::from(value).try_into()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Preference {
    pub id: Id<PreferenceMarker>,
    pub user_id: Id<UserMarker>,
    pub post_id: Id<PostMarker>,
    pub value: PreferenceValue,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub enum PreferenceState {
    #[default]
    NoPreference,
    Liked,
    Disliked,
}

/// Signed change to a post's like and dislike counters.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CounterDelta {
    pub likes: i64,
    pub dislikes: i64,
}

impl CounterDelta {
    fn counting(value: PreferenceValue, amount: i64) -> Self {
        match value {
            PreferenceValue::Like => Self {
                likes: amount,
                dislikes: 0,
            },
            PreferenceValue::Dislike => Self {
                likes: 0,
                dislikes: amount,
            },
        }
    }
}

impl std::ops::Add for CounterDelta {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            likes: self.likes + rhs.likes,
            dislikes: self.dislikes + rhs.dislikes,
        }
    }
}

impl PreferenceState {
    #[must_use]
    pub fn value(self) -> Option<PreferenceValue> {
        match self {
            Self::NoPreference => None,
            Self::Liked => Some(PreferenceValue::Like),
            Self::Disliked => Some(PreferenceValue::Dislike),
        }
    }

    /// Next state and counter change after the user asks for `desired`.
    #[must_use]
    pub fn apply(self, desired: PreferenceValue) -> (Self, CounterDelta) {
        match self.value() {
            None => (desired.into(), CounterDelta::counting(desired, 1)),
            Some(current) if current == desired => (
                Self::NoPreference,
                CounterDelta::counting(current, -1),
            ),
            Some(current) => (
                desired.into(),
                CounterDelta::counting(current, -1) + CounterDelta::counting(desired, 1),
            ),
        }
    }
}

impl From<PreferenceValue> for PreferenceState {
    fn from(value: PreferenceValue) -> Self {
        match value {
            PreferenceValue::Like => Self::Liked,
            PreferenceValue::Dislike => Self::Disliked,
        }
    }
}

impl From<Option<PreferenceValue>> for PreferenceState {
    fn from(value: Option<PreferenceValue>) -> Self {
        value.map_or(Self::NoPreference, Self::from)
    }
}

/// Result of applying a preference: the post with its updated counters and
/// what the caller now holds for it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct PreferenceOutcome {
    pub post: Post,
    pub preference: Option<PreferenceValue>,
}

#[cfg(test)]
mod tests {
    use crate::model::preference::{
        CounterDelta, PreferenceState, PreferenceValue, PreferenceValue::Dislike,
        PreferenceValue::Like,
    };

    fn delta(likes: i64, dislikes: i64) -> CounterDelta {
        CounterDelta { likes, dislikes }
    }

    #[test]
    fn transitions() {
        use PreferenceState::{Disliked, Liked, NoPreference};

        let table = [
            (NoPreference, Like, Liked, delta(1, 0)),
            (NoPreference, Dislike, Disliked, delta(0, 1)),
            (Liked, Like, NoPreference, delta(-1, 0)),
            (Liked, Dislike, Disliked, delta(-1, 1)),
            (Disliked, Dislike, NoPreference, delta(0, -1)),
            (Disliked, Like, Liked, delta(1, -1)),
        ];

        for (state, desired, next, change) in table {
            assert_eq!(
                state.apply(desired),
                (next, change),
                "{state:?} --{desired:?}-->"
            );
        }
    }

    #[test]
    fn repeated_value_returns_to_start() {
        for value in [Like, Dislike] {
            let (once, first) = PreferenceState::default().apply(value);
            let (twice, second) = once.apply(value);

            assert_eq!(twice, PreferenceState::NoPreference);
            assert_eq!(first + second, CounterDelta::default());
        }
    }

    #[test]
    fn value_parsing() {
        assert_eq!(PreferenceValue::try_from(1_u8), Ok(Like));
        assert_eq!(PreferenceValue::try_from(2_i64), Ok(Dislike));
        assert!(PreferenceValue::try_from(0_u8).is_err());
        assert!(PreferenceValue::try_from(3_i64).is_err());

        assert_eq!(serde_json::to_string(&Dislike).unwrap(), "2");
        assert_eq!(serde_json::from_str::<PreferenceValue>("1").unwrap(), Like);
        assert!(serde_json::from_str::<PreferenceValue>("7").is_err());
    }
}

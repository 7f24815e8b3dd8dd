pub mod auth;
pub mod comment;
pub mod follow;
pub mod page;
pub mod post;
pub mod preference;
pub mod user;

use crate::{
    model::{
        auth::InvalidAuthTokenHashError, post::InvalidContentError,
        preference::InvalidPreferenceValueError, user::InvalidUserHandleError,
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserHandle(#[from] InvalidUserHandleError),
    #[error(transparent)]
    Content(#[from] InvalidContentError),
    #[error(transparent)]
    PreferenceValue(#[from] InvalidPreferenceValueError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error("Counter value was negative: {0}")]
    NegativeCounter(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PlazaEpoch;
impl Epoch for PlazaEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type PlazaSnowflake = Snowflake<PlazaEpoch>;
pub type PlazaSnowflakeGenerator = SnowflakeGenerator<PlazaEpoch>;

/// A snowflake tagged with the kind of row it identifies.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(PlazaSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: PlazaSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> PlazaSnowflake {
        self.0
    }

    /// The id as stored in a signed 64-bit database column.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<PlazaSnowflake> for Id<Marker> {
    fn from(value: PlazaSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(PlazaSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

/// Narrows a database counter to the non-negative range the model promises.
pub fn counter_from_db(value: i64) -> Result<u64, ModelValidationError> {
    u64::try_from(value).map_err(|_| ModelValidationError::NegativeCounter(value))
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, ModelValidationError, counter_from_db, user::UserMarker};

    #[test]
    fn db_representation_keeps_high_bit() {
        let id = Id::<UserMarker>::from(u64::MAX - 5);
        assert_eq!(id.to_db(), -6);
        assert_eq!(Id::<UserMarker>::from_db(id.to_db()), id);
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let id = Id::<UserMarker>::from(1234);
        assert_eq!(serde_json::to_string(&id).unwrap(), "1234");
        assert_eq!(serde_json::from_str::<Id<UserMarker>>("1234").unwrap(), id);
    }

    #[test]
    fn negative_counters_are_rejected() {
        assert_eq!(counter_from_db(3), Ok(3));
        assert_eq!(
            counter_from_db(-1),
            Err(ModelValidationError::NegativeCounter(-1))
        );
    }
}

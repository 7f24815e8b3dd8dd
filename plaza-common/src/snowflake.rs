//! Time-ordered 64-bit ids.
//!
//! Layout, most significant bit first:
//!
//! | bits | field                                 |
//! |------|---------------------------------------|
//! | 42   | milliseconds since the [`Epoch`]      |
//! | 5    | worker id                             |
//! | 5    | process id                            |
//! | 12   | per-generator increment               |
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_LENGTH: u32 = 42;
pub const WORKER_ID_LENGTH: u32 = 5;
pub const PROCESS_ID_LENGTH: u32 = 5;
pub const INCREMENT_LENGTH: u32 = 12;

pub const INCREMENT_OFFSET: u32 = 0;
pub const PROCESS_ID_OFFSET: u32 = INCREMENT_OFFSET + INCREMENT_LENGTH;
pub const WORKER_ID_OFFSET: u32 = PROCESS_ID_OFFSET + PROCESS_ID_LENGTH;
pub const TIMESTAMP_OFFSET: u32 = WORKER_ID_OFFSET + WORKER_ID_LENGTH;

const fn field(snowflake: u64, offset: u32, length: u32) -> u64 {
    (snowflake >> offset) & ((1 << length) - 1)
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampFromDateTimeError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Snowflake part was out of range: {0}")]
pub struct SnowflakePartOutOfRangeError(u64);

/// Declares a bounded unsigned newtype for one of the fixed-width snowflake fields.
macro_rules! bounded_part {
    ($(#[$meta:meta])* $name:ident: $repr:ty, $length:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const MAX: $repr = (1 << $length) - 1;

            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (value <= Self::MAX).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError(value.into()))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = <$repr>::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

bounded_part!(
    /// Identifies the machine generating ids.
    WorkerId: u8, WORKER_ID_LENGTH
);
bounded_part!(
    /// Identifies the process on a worker generating ids.
    ProcessId: u8, PROCESS_ID_LENGTH
);
bounded_part!(SnowflakeIncrement: u16, INCREMENT_LENGTH);

impl SnowflakeIncrement {
    /// The following increment, or `None` once [`Self::MAX`] is used up.
    #[must_use]
    pub fn checked_next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnowflakeTimestamp<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> SnowflakeTimestamp<SnowflakeEpoch> {
    pub const MAX: u64 = (1 << TIMESTAMP_LENGTH) - 1;

    #[must_use]
    pub fn new(millis: u64) -> Option<Self> {
        (millis <= Self::MAX).then_some(Self(millis, PhantomData))
    }

    #[must_use]
    pub fn millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn checked_next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }
}

impl<SnowflakeEpoch: Epoch> TryFrom<UtcDateTime> for SnowflakeTimestamp<SnowflakeEpoch> {
    type Error = SnowflakeTimestampFromDateTimeError;

    fn try_from(value: UtcDateTime) -> Result<Self, Self::Error> {
        let millis = (value - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
        let millis = u64::try_from(millis).map_err(|_| {
            if millis < 0 {
                Self::Error::TimeBeforeEpoch
            } else {
                Self::Error::TimestampTooLarge
            }
        })?;

        Self::new(millis).ok_or(Self::Error::TimestampTooLarge)
    }
}

impl<SnowflakeEpoch: Epoch> From<SnowflakeTimestamp<SnowflakeEpoch>> for UtcDateTime {
    fn from(value: SnowflakeTimestamp<SnowflakeEpoch>) -> Self {
        // Fits: the timestamp is at most 42 bits wide.
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(value.0.cast_signed())
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp: SnowflakeTimestamp<SnowflakeEpoch>,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: SnowflakeIncrement,
    ) -> Self {
        Self::new(
            timestamp.millis() << TIMESTAMP_OFFSET
                | u64::from(worker_id.get()) << WORKER_ID_OFFSET
                | u64::from(process_id.get()) << PROCESS_ID_OFFSET
                | u64::from(increment.get()) << INCREMENT_OFFSET,
        )
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp<SnowflakeEpoch> {
        SnowflakeTimestamp(
            field(self.0, TIMESTAMP_OFFSET, TIMESTAMP_LENGTH),
            PhantomData,
        )
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> WorkerId {
        WorkerId(field(self.0, WORKER_ID_OFFSET, WORKER_ID_LENGTH) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> ProcessId {
        ProcessId(field(self.0, PROCESS_ID_OFFSET, PROCESS_ID_LENGTH) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn increment(self) -> SnowflakeIncrement {
        SnowflakeIncrement(field(self.0, INCREMENT_OFFSET, INCREMENT_LENGTH) as u16)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

/// Hands out unique snowflakes for one worker/process pair.
///
/// Ids from one generator are strictly increasing. A clock step back is
/// absorbed by reusing the last timestamp, and once all 4096 increments of
/// a millisecond are used the generator moves on to the next millisecond
/// ahead of the clock.
#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_timestamp: SnowflakeTimestamp<SnowflakeEpoch>,
    next_increment: Option<SnowflakeIncrement>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_timestamp: SnowflakeTimestamp::default(),
            next_increment: Some(SnowflakeIncrement::default()),
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampFromDateTimeError> {
        let now = SnowflakeTimestamp::try_from(time)?;

        let (timestamp, increment) = match self.next_increment {
            _ if now > self.last_timestamp => (now, SnowflakeIncrement::default()),
            Some(increment) => (self.last_timestamp, increment),
            None => (
                self.last_timestamp
                    .checked_next()
                    .ok_or(SnowflakeTimestampFromDateTimeError::TimestampTooLarge)?,
                SnowflakeIncrement::default(),
            ),
        };

        self.last_timestamp = timestamp;
        self.next_increment = increment.checked_next();

        Ok(Snowflake::from_parts(
            timestamp,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(
        &mut self,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampFromDateTimeError> {
        self.generate_at(UtcDateTime::now())
    }
}

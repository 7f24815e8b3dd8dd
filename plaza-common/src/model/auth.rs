//! Bearer tokens.
//!
//! A token reads `<user id>:<base64 core>:<base64 salt>`. Only the argon2
//! hash of the core (salted with the salt) is stored, so a leaked table does
//! not leak usable tokens.

use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const AUTH_TOKEN_CORE_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 18;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing auth token failed: {0}")]
pub struct AuthTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    core: [u8; AUTH_TOKEN_CORE_LEN],
    salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash(Box<[u8; AUTH_TOKEN_HASH_LEN]>);

/// A stored token hash and the rules for how long it stays valid.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: OffsetDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            core: rand::random(),
            salt: rand::random(),
        }
    }

    pub fn hash(&self) -> Result<AuthTokenHash, AuthTokenHashError> {
        let mut hash = Box::new([0; AUTH_TOKEN_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(AuthTokenHashError)?;

        Ok(AuthTokenHash(hash))
    }
}

impl Display for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.user_id,
            Base64Display::new(&self.core, &BASE64_STANDARD),
            Base64Display::new(&self.salt, &BASE64_STANDARD),
        )
    }
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let mut next_part = || parts.next().ok_or(Self::Err::NotEnoughParts);

        let user_id = next_part()?
            .parse::<u64>()
            .map_err(Self::Err::InvalidUserId)?
            .into();
        let core = BASE64_STANDARD
            .decode(next_part()?)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(next_part()?)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            core,
            salt,
        })
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl AuthTokenHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth token hash had an invalid length")]
pub struct InvalidAuthTokenHashError;

impl TryFrom<Vec<u8>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let hash: Box<[u8]> = value.into_boxed_slice();
        Ok(Self(hash.try_into().map_err(|_| InvalidAuthTokenHashError)?))
    }
}

impl Authentication {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::auth::{AuthToken, AuthTokenDecodeError, Authentication},
        util::PositiveDuration,
    };
    use time::{Duration, macros::datetime};

    #[test]
    fn token_string_round_trip() {
        let token = AuthToken::generate_random(42.into());
        let parsed: AuthToken = token.to_string().parse().unwrap();

        assert_eq!(parsed, token);
        assert!(token.to_string().starts_with("42:"));
    }

    #[test]
    fn malformed_tokens() {
        assert_eq!(
            "42".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::NotEnoughParts)
        );
        assert!(matches!(
            "x:AAAA:AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::InvalidUserId(_))
        ));
        assert_eq!(
            "42:AAAA:AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::InvalidCoreLength)
        );
    }

    #[test]
    fn hash_depends_on_token() {
        let token = AuthToken::generate_random(1.into());
        let other = AuthToken::generate_random(1.into());

        assert_eq!(token.hash().unwrap(), token.hash().unwrap());
        assert_ne!(token.hash().unwrap(), other.hash().unwrap());
    }

    #[test]
    fn expiry() {
        let created_at = datetime!(2025-03-01 00:00 UTC);
        let mut authentication = Authentication {
            user: 1.into(),
            token_hash: AuthToken::generate_random(1.into()).hash().unwrap(),
            created_at,
            expires_after: None,
        };
        assert!(!authentication.is_expired_at(created_at + Duration::days(10_000)));

        authentication.expires_after = Some(PositiveDuration::from_seconds(60).unwrap());
        assert!(!authentication.is_expired_at(created_at + Duration::seconds(60)));
        assert!(authentication.is_expired_at(created_at + Duration::seconds(61)));
    }
}

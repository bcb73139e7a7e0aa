//! Request validation: one explicit routine per request shape.
//!
//! Lengths are counted in characters, not bytes.

use thiserror::Error;
use validator::ValidateEmail;

use super::password::BCRYPT_MAX_BYTES;

/// Longest accepted email address.
pub const EMAIL_MAX_LEN: usize = 254;
/// Password length bounds.
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 64;
/// Longest accepted device fingerprint.
pub const FINGERPRINT_MAX_LEN: usize = 256;

/// Why a request field was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be at most {max} bytes")]
    TooManyBytes { field: &'static str, max: usize },

    #[error("invalid email address")]
    MalformedEmail,
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(())
}

fn at_most(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

fn fingerprint(value: &str) -> Result<(), ValidationError> {
    required("fingerprint", value)?;
    at_most("fingerprint", value, FINGERPRINT_MAX_LEN)
}

/// Register: well-formed email, bounded password, fingerprint.
pub fn validate_register(
    email: &str,
    password: &str,
    fingerprint_value: &str,
) -> Result<(), ValidationError> {
    required("email", email)?;
    at_most("email", email, EMAIL_MAX_LEN)?;
    if !email.validate_email() {
        return Err(ValidationError::MalformedEmail);
    }

    required("password", password)?;
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "password",
            min: PASSWORD_MIN_LEN,
        });
    }
    if len > PASSWORD_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "password",
            max: PASSWORD_MAX_LEN,
        });
    }
    if password.len() > BCRYPT_MAX_BYTES {
        return Err(ValidationError::TooManyBytes {
            field: "password",
            max: BCRYPT_MAX_BYTES,
        });
    }

    fingerprint(fingerprint_value)
}

/// Login: presence only. Shape checks here would tell a caller which half
/// of the credentials is wrong.
pub fn validate_login(
    email: &str,
    password: &str,
    fingerprint_value: &str,
) -> Result<(), ValidationError> {
    required("email", email)?;
    required("password", password)?;
    fingerprint(fingerprint_value)
}

/// GetAccessToken: refresh token plus the fingerprint it was issued for.
pub fn validate_refresh(refresh_token: &str, fingerprint_value: &str) -> Result<(), ValidationError> {
    required("refresh_token", refresh_token)?;
    fingerprint(fingerprint_value)
}

/// Logout: access token plus the fingerprint whose session to drop.
pub fn validate_logout(access_token: &str, fingerprint_value: &str) -> Result<(), ValidationError> {
    required("access_token", access_token)?;
    fingerprint(fingerprint_value)
}

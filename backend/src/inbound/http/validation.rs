//! Request validation helpers shared by the HTTP handlers.
//!
//! Every failure is an `invalid_request` error whose `details` name the
//! offending field and a machine-readable code.

use serde_json::json;

use crate::domain::{Error, LoginValidationError, UserValidationError};

/// Detail codes attached to validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    MissingField,
    InvalidEmail,
    EmptyPassword,
    InvalidUsername,
    EmptyFullName,
    EmptyAvatar,
    InvalidCoordinate,
    InvalidValue,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingField => "missing_field",
            ErrorCode::InvalidEmail => "invalid_email",
            ErrorCode::EmptyPassword => "empty_password",
            ErrorCode::InvalidUsername => "invalid_username",
            ErrorCode::EmptyFullName => "empty_full_name",
            ErrorCode::EmptyAvatar => "empty_avatar",
            ErrorCode::InvalidCoordinate => "invalid_coordinate",
            ErrorCode::InvalidValue => "invalid_value",
        }
    }
}

/// HTTP field name as it appears in request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(&self) -> &'static str {
        self.0
    }
}

pub(crate) const FRIEND: FieldName = FieldName::new("friend");
pub(crate) const QUERY: FieldName = FieldName::new("query");

pub(crate) fn field_error(field: FieldName, code: ErrorCode, message: impl Into<String>) -> Error {
    Error::invalid_request(message).with_details(json!({
        "field": field.as_str(),
        "code": code.as_str(),
    }))
}

pub(crate) fn missing_field_error(field: FieldName) -> Error {
    field_error(
        field,
        ErrorCode::MissingField,
        format!("missing required field: {}", field.as_str()),
    )
}

/// Trim a required text field, rejecting blanks.
pub(crate) fn require_text(field: FieldName, raw: &str) -> Result<String, Error> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(missing_field_error(field));
    }
    Ok(value.to_owned())
}

fn user_field(error: &UserValidationError) -> (FieldName, ErrorCode) {
    match error {
        UserValidationError::UsernameTooShort { .. }
        | UserValidationError::UsernameTooLong { .. }
        | UserValidationError::UsernameInvalidCharacters => {
            (FieldName::new("username"), ErrorCode::InvalidUsername)
        }
        UserValidationError::InvalidEmail => (FieldName::new("email"), ErrorCode::InvalidEmail),
        UserValidationError::EmptyFullName => {
            (FieldName::new("full_name"), ErrorCode::EmptyFullName)
        }
        UserValidationError::EmptyAvatar => (FieldName::new("avatar"), ErrorCode::EmptyAvatar),
        UserValidationError::LatitudeOutOfRange => {
            (FieldName::new("latitude"), ErrorCode::InvalidCoordinate)
        }
        UserValidationError::LongitudeOutOfRange => {
            (FieldName::new("longitude"), ErrorCode::InvalidCoordinate)
        }
        UserValidationError::EmptyId | UserValidationError::InvalidId => {
            (FieldName::new("id"), ErrorCode::InvalidValue)
        }
    }
}

pub(crate) fn map_user_validation_error(error: UserValidationError) -> Error {
    let (field, code) = user_field(&error);
    field_error(field, code, error.to_string())
}

pub(crate) fn map_login_validation_error(error: LoginValidationError) -> Error {
    match error {
        LoginValidationError::InvalidEmail => field_error(
            FieldName::new("email"),
            ErrorCode::InvalidEmail,
            error.to_string(),
        ),
        LoginValidationError::EmptyPassword => field_error(
            FieldName::new("password"),
            ErrorCode::EmptyPassword,
            error.to_string(),
        ),
        LoginValidationError::Profile(inner) => map_user_validation_error(inner),
    }
}

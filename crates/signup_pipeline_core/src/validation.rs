use crate::contract::{ErrorKind, SignupRequest, StageFailure, ValidatedRequest};
use crate::idempotency::IdempotencyKey;

pub const MIN_PASSWORD_CHARS: usize = 6;

/// Applies the signup rules in order; the first failing rule wins.
///
/// Pure: the same request always yields the same verdict.
pub fn validate(request: &SignupRequest) -> Result<ValidatedRequest, StageFailure> {
    if is_blank(&request.email) {
        return Err(StageFailure::new(ErrorKind::MissingField, "email is required"));
    }
    if is_blank(&request.password) {
        return Err(StageFailure::new(
            ErrorKind::MissingField,
            "password is required",
        ));
    }

    if !is_well_formed_email(&request.email) {
        return Err(StageFailure::new(
            ErrorKind::InvalidFormat,
            "email must look like local-part@domain.tld",
        ));
    }

    if request.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(StageFailure::new(
            ErrorKind::WeakPassword,
            format!("password must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }

    Ok(ValidatedRequest::new(
        request.email.clone(),
        request.password.clone(),
        IdempotencyKey::for_request(request),
    ))
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Accepts `local@domain.tld`: a non-empty local part and a domain with a dot
/// that has at least one character on each side. No whitespace and exactly
/// one `@`.
pub fn is_well_formed_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain
        .char_indices()
        .any(|(idx, ch)| ch == '.' && idx > 0 && idx + 1 < domain.len())
}

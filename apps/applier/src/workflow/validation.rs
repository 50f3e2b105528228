//! Local input checks. Everything here runs before any backend call.

use crate::errors::AppError;

pub const PHONE_DIGITS: usize = 11;
pub const CODE_DIGITS: usize = 6;
pub const MAX_APPLY_COUNT: u32 = 50;

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_phone(phone: &str) -> Result<(), AppError> {
    if !is_digits(phone, PHONE_DIGITS) {
        return Err(AppError::Validation(format!(
            "Phone number must be exactly {PHONE_DIGITS} digits"
        )));
    }
    Ok(())
}

pub fn validate_code(code: &str) -> Result<(), AppError> {
    if !is_digits(code, CODE_DIGITS) {
        return Err(AppError::Validation(format!(
            "Verification code must be exactly {CODE_DIGITS} digits"
        )));
    }
    Ok(())
}

pub fn validate_apply_params(
    job_keyword: &str,
    city: &str,
    requested_count: u32,
) -> Result<(), AppError> {
    if job_keyword.trim().is_empty() {
        return Err(AppError::Validation("Job keyword must not be empty".into()));
    }
    if city.trim().is_empty() {
        return Err(AppError::Validation("City must not be empty".into()));
    }
    if !(1..=MAX_APPLY_COUNT).contains(&requested_count) {
        return Err(AppError::Validation(format!(
            "Application count must be between 1 and {MAX_APPLY_COUNT}, got {requested_count}"
        )));
    }
    Ok(())
}

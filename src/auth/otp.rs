use rand::Rng;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest},
        repo_types::{OtpState, User},
        services::hash_password,
    },
    error::ApiError,
    state::AppState,
};

/// Source of password-reset codes. Injectable so tests can pin the code.
pub trait ResetCodeSource: Send + Sync {
    /// Draw a 6-digit code, uniform over [100000, 999999].
    fn next_code(&self) -> String;
}

pub struct ThreadRngCodes;

impl ResetCodeSource for ThreadRngCodes {
    fn next_code(&self) -> String {
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }
}

/// Validate a supplied code against the stored OTP state.
///
/// Comparison is constant-time; the expiry check runs only for a matching
/// code, so a wrong guess never reveals whether a code is still pending.
pub(crate) fn check_reset_code(
    state: &OtpState,
    supplied: &str,
    now: OffsetDateTime,
    ttl: Duration,
) -> Result<(), ApiError> {
    let OtpState::Pending { code, issued_at } = state else {
        return Err(ApiError::InvalidOtp);
    };
    if code.as_bytes().ct_eq(supplied.as_bytes()).unwrap_u8() == 0 {
        return Err(ApiError::InvalidOtp);
    }
    if now - *issued_at > ttl {
        return Err(ApiError::ExpiredOtp);
    }
    Ok(())
}

/// Issue a reset code and email it. Any previously pending code is
/// overwritten; only the most recent code is ever valid.
pub async fn request_reset(
    state: &AppState,
    req: ForgotPasswordRequest,
) -> Result<MessageResponse, ApiError> {
    let email = req.email.trim();

    let user = User::find_by_email(&state.db, email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User with this email does not exist.".into()))?;

    let code = state.codes.next_code();
    let issued_at = OffsetDateTime::now_utc();
    User::store_reset_code(&state.db, user.id, &code, issued_at).await?;
    info!(user_id = %user.id, "reset code issued");

    // Delivery failure is surfaced, never swallowed: the caller must not be
    // told a code was sent when it was not.
    state
        .mailer
        .send_reset_code(&user.email, &code)
        .await
        .map_err(|e| {
            warn!(user_id = %user.id, error = %e, "reset code delivery failed");
            ApiError::Delivery(e.to_string())
        })?;

    Ok(MessageResponse {
        message: "OTP sent successfully!".into(),
    })
}

/// Consume a pending reset code and set the new password. A code can be
/// consumed at most once; an expired code is cleared and stays dead even if
/// it was otherwise correct.
pub async fn confirm_reset(
    state: &AppState,
    req: ResetPasswordRequest,
) -> Result<MessageResponse, ApiError> {
    if req.new_password != req.confirm_password {
        return Err(ApiError::Validation("Passwords do not match.".into()));
    }
    if req.new_password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }

    let email = req.email.trim();
    let user = User::find_by_email(&state.db, email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found.".into()))?;

    let ttl = Duration::minutes(state.config.otp_ttl_minutes);
    match check_reset_code(&user.otp_state(), &req.otp, OffsetDateTime::now_utc(), ttl) {
        Ok(()) => {}
        Err(err @ ApiError::ExpiredOtp) => {
            User::clear_reset_code(&state.db, user.id).await?;
            warn!(user_id = %user.id, "expired reset code cleared");
            return Err(err);
        }
        Err(err) => return Err(err),
    }

    let hash = hash_password(&req.new_password).map_err(ApiError::Internal)?;
    User::reset_password(&state.db, user.id, &hash).await?;
    info!(user_id = %user.id, "password reset completed");

    Ok(MessageResponse {
        message: "Password reset successful!".into(),
    })
}

#[cfg(test)]
mod code_source_tests {
    use super::*;

    #[test]
    fn codes_are_six_digits_with_no_leading_zero() {
        let source = ThreadRngCodes;
        for _ in 0..200 {
            let code = source.next_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric code");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn fixed_source_is_injectable() {
        struct FixedCodes(&'static str);
        impl ResetCodeSource for FixedCodes {
            fn next_code(&self) -> String {
                self.0.to_string()
            }
        }
        let source: Box<dyn ResetCodeSource> = Box::new(FixedCodes("482913"));
        assert_eq!(source.next_code(), "482913");
    }
}

#[cfg(test)]
mod check_tests {
    use super::*;

    const TTL_MINUTES: i64 = 10;

    fn pending(code: &str, issued_at: OffsetDateTime) -> OtpState {
        OtpState::Pending {
            code: code.into(),
            issued_at,
        }
    }

    fn check(state: &OtpState, supplied: &str, elapsed: Duration) -> Result<(), ApiError> {
        let issued_at = OffsetDateTime::UNIX_EPOCH;
        check_reset_code(
            state,
            supplied,
            issued_at + elapsed,
            Duration::minutes(TTL_MINUTES),
        )
    }

    #[test]
    fn correct_code_within_window_passes() {
        let state = pending("482913", OffsetDateTime::UNIX_EPOCH);
        let elapsed = Duration::minutes(9) + Duration::seconds(59);
        assert!(check(&state, "482913", elapsed).is_ok());
    }

    #[test]
    fn correct_code_past_window_is_expired() {
        let state = pending("482913", OffsetDateTime::UNIX_EPOCH);
        let elapsed = Duration::minutes(10) + Duration::seconds(1);
        assert!(matches!(
            check(&state, "482913", elapsed),
            Err(ApiError::ExpiredOtp)
        ));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        // Exactly ten minutes old is still consumable; only strictly older fails.
        let state = pending("482913", OffsetDateTime::UNIX_EPOCH);
        assert!(check(&state, "482913", Duration::minutes(10)).is_ok());
    }

    #[test]
    fn wrong_code_is_invalid_even_when_fresh() {
        let state = pending("482913", OffsetDateTime::UNIX_EPOCH);
        assert!(matches!(
            check(&state, "123456", Duration::seconds(1)),
            Err(ApiError::InvalidOtp)
        ));
    }

    #[test]
    fn wrong_length_code_is_invalid() {
        let state = pending("482913", OffsetDateTime::UNIX_EPOCH);
        assert!(matches!(
            check(&state, "48291", Duration::seconds(1)),
            Err(ApiError::InvalidOtp)
        ));
    }

    #[test]
    fn no_pending_code_is_invalid() {
        // Covers both "never requested" and "already consumed" states.
        assert!(matches!(
            check(&OtpState::None, "482913", Duration::seconds(1)),
            Err(ApiError::InvalidOtp)
        ));
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub reset_otp: Option<String>,
    #[serde(skip_serializing)]
    pub otp_created_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Password-reset state derived from the two OTP columns. Invariant: both
/// columns are set together or null together; anything else reads as None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpState {
    None,
    Pending {
        code: String,
        issued_at: OffsetDateTime,
    },
}

impl User {
    pub fn otp_state(&self) -> OtpState {
        match (&self.reset_otp, self.otp_created_at) {
            (Some(code), Some(issued_at)) => OtpState::Pending {
                code: code.clone(),
                issued_at,
            },
            _ => OtpState::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_otp(code: Option<&str>, at: Option<OffsetDateTime>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "jdoe".into(),
            email: "jdoe@example.com".into(),
            phone_number: None,
            full_name: None,
            password_hash: "$argon2id$fake".into(),
            reset_otp: code.map(String::from),
            otp_created_at: at,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn otp_state_pending_when_both_set() {
        let now = OffsetDateTime::now_utc();
        let user = user_with_otp(Some("482913"), Some(now));
        assert_eq!(
            user.otp_state(),
            OtpState::Pending {
                code: "482913".into(),
                issued_at: now
            }
        );
    }

    #[test]
    fn otp_state_none_when_cleared_or_partial() {
        assert_eq!(user_with_otp(None, None).otp_state(), OtpState::None);
        // Partially-set columns never read as a usable code.
        assert_eq!(
            user_with_otp(Some("482913"), None).otp_state(),
            OtpState::None
        );
        assert_eq!(
            user_with_otp(None, Some(OffsetDateTime::now_utc())).otp_state(),
            OtpState::None
        );
    }

    #[test]
    fn hash_and_otp_never_serialized() {
        let user = user_with_otp(Some("482913"), Some(OffsetDateTime::now_utc()));
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("482913"));
        assert!(!json.contains("otp_created_at"));
    }
}

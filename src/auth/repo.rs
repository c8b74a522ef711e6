use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;

const USER_COLUMNS: &str = "id, username, email, phone_number, full_name, \
     password_hash, reset_otp, otp_created_at, created_at";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub phone_number: Option<&'a str>,
    pub full_name: Option<&'a str>,
    pub password_hash: &'a str,
}

impl User {
    /// Find a user by email. Emails are matched exactly as stored.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Create a new user. Uniqueness of email, username and phone number is
    /// enforced by the table constraints; violations surface as
    /// `sqlx::Error::Database` with `is_unique_violation()`.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, phone_number, full_name, password_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.phone_number)
        .bind(new.full_name)
        .bind(new.password_hash)
        .fetch_one(db)
        .await
    }

    /// Store a freshly generated reset code, overwriting any pending one.
    pub async fn store_reset_code(
        db: &PgPool,
        id: Uuid,
        code: &str,
        issued_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET reset_otp = $2, otp_created_at = $3 WHERE id = $1")
            .bind(id)
            .bind(code)
            .bind(issued_at)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Clear both OTP columns without touching the password.
    pub async fn clear_reset_code(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET reset_otp = NULL, otp_created_at = NULL WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Set a new password hash and consume the pending code in one statement.
    pub async fn reset_password(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, reset_otp = NULL, otp_created_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
        Ok(())
    }
}

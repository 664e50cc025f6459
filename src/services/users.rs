//! Accounts, credentials and rights.

use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    app_error::AppError,
    auth,
    models::{CreateUserEntity, PublicUser, Right, UserEntity},
    schema::{rights, user_rights, users},
    services::Caller,
};

const MIN_PASSWORD_LEN: usize = 6;
const MIN_NAME_LEN: usize = 3;

#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub phone: Option<String>,
    /// Accepted as a number or a numeric string.
    #[schema(value_type = i32, example = 1)]
    pub right_code: Option<serde_json::Value>,
}

/// Registration input once every rule has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub right_code: i32,
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `07` followed by eight digits.
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.starts_with("07") && phone.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
        && !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ".-".contains(c))
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}

fn parse_right_code(value: Option<serde_json::Value>) -> Result<i32, AppError> {
    let code = match value {
        None | Some(serde_json::Value::Null) => {
            return Err(AppError::BadRequest("Right is required".into()));
        }
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i32>().ok(),
        Some(_) => None,
    };

    code.ok_or_else(|| AppError::BadRequest("Right must be a valid number".into()))
}

pub fn validate_registration(input: Registration) -> Result<ValidRegistration, AppError> {
    let (Some(name), Some(email), Some(password), Some(confirm_password), Some(phone)) = (
        required(input.name),
        required(input.email),
        input.password.filter(|p| !p.is_empty()),
        input.confirm_password.filter(|p| !p.is_empty()),
        required(input.phone),
    ) else {
        return Err(AppError::BadRequest(
            "Name, email, password, phone and password confirmation are required".into(),
        ));
    };

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != confirm_password {
        return Err(AppError::BadRequest("Passwords do not match".into()));
    }
    if !is_valid_phone(&phone) {
        return Err(AppError::BadRequest(
            "Phone number must start with 07 and have 10 digits".into(),
        ));
    }
    if name.chars().count() < MIN_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Name must have at least {MIN_NAME_LEN} characters"
        )));
    }
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Email is not valid".into()));
    }

    let right_code = parse_right_code(input.right_code)?;
    if Right::from_code(right_code) == Some(Right::Admin) {
        return Err(AppError::BadRequest(
            "The admin right cannot be requested at registration".into(),
        ));
    }

    Ok(ValidRegistration {
        name,
        email,
        password,
        phone,
        right_code,
    })
}

async fn hash_off_thread(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .context("Password hashing task failed")?
}

/// Creates the user and assigns the requested right atomically. Returns the new user id.
pub async fn register(
    conn: &mut AsyncPgConnection,
    input: ValidRegistration,
) -> Result<i32, AppError> {
    let password_hash = hash_off_thread(input.password).await?;

    let user_id = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let right_id: Option<i32> = rights::table
                    .filter(rights::right_code.eq(input.right_code))
                    .select(rights::id)
                    .first(conn)
                    .await
                    .optional()
                    .context("Failed to get right")?;
                let Some(right_id) = right_id else {
                    return Err(AppError::BadRequest("Right not found".into()));
                };

                let taken: i64 = users::table
                    .filter(users::email.eq(&input.email).or(users::phone.eq(&input.phone)))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check existing users")?;
                if taken > 0 {
                    return Err(AppError::Conflict("User already exists".into()));
                }

                // A concurrent registration can still win the race; the unique
                // constraint then surfaces as a conflict through the diesel error mapping.
                let user_id: i32 = diesel::insert_into(users::table)
                    .values(CreateUserEntity {
                        name: input.name,
                        email: input.email,
                        password_hash,
                        phone: input.phone,
                    })
                    .returning(users::id)
                    .get_result(conn)
                    .await?;

                diesel::insert_into(user_rights::table)
                    .values((
                        user_rights::user_id.eq(user_id),
                        user_rights::right_id.eq(right_id),
                    ))
                    .execute(conn)
                    .await
                    .context("Failed to assign right")?;

                Ok::<i32, AppError>(user_id)
            })
        })
        .await?;

    info!("User #{} registered", user_id);

    Ok(user_id)
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LoggedIn {
    pub user: PublicUser,
    pub token: String,
}

/// Checks credentials and stamps `last_login`. Unknown email and wrong password look the same.
pub async fn login(
    conn: &mut AsyncPgConnection,
    jwt: &auth::JwtKeys,
    email: &str,
    password: &str,
) -> Result<LoggedIn, AppError> {
    let user: Option<UserEntity> = users::table
        .filter(users::email.eq(email))
        .select(UserEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get user")?;

    let Some(user) = user else {
        warn!("Login attempt for unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    let hash = user.password_hash.clone();
    let candidate = password.to_string();
    let matches = tokio::task::spawn_blocking(move || auth::verify_password(&candidate, &hash))
        .await
        .context("Password verification task failed")?;
    if !matches {
        warn!("Failed login for user #{}", user.id);
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = jwt.issue(user.id, &user.email)?;

    let user: UserEntity = diesel::update(users::table.find(user.id))
        .set(users::last_login.eq(diesel::dsl::now))
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update last login")?;

    info!("User #{} logged in", user.id);

    Ok(LoggedIn {
        user: user.into(),
        token,
    })
}

pub async fn get_user(conn: &mut AsyncPgConnection, user_id: i32) -> Result<PublicUser, AppError> {
    users::table
        .find(user_id)
        .select(UserEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get user")?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

#[derive(Serialize, Debug, ToSchema)]
pub struct Profile {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

pub async fn profile(conn: &mut AsyncPgConnection, user_id: i32) -> Result<Profile, AppError> {
    let user = get_user(conn, user_id).await?;
    Ok(Profile {
        id: user.id,
        name: user.name,
        email: user.email,
        created_at: user.created_at,
    })
}

pub async fn has_right(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    right: Right,
) -> Result<bool, AppError> {
    let count: i64 = user_rights::table
        .inner_join(rights::table)
        .filter(user_rights::user_id.eq(user_id))
        .filter(rights::right_code.eq(right.code()))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check user rights")?;

    Ok(count > 0)
}

/// Resolves the caller's privileges for ownership checks.
pub async fn caller(conn: &mut AsyncPgConnection, user_id: i32) -> Result<Caller, AppError> {
    Ok(Caller {
        id: user_id,
        is_admin: has_right(conn, user_id, Right::Admin).await?,
    })
}

async fn require_admin(conn: &mut AsyncPgConnection, user_id: i32) -> Result<(), AppError> {
    if has_right(conn, user_id, Right::Admin).await? {
        Ok(())
    } else {
        warn!("User #{} attempted an admin operation", user_id);
        Err(AppError::ForbiddenResource("Not authorized".into()))
    }
}

pub async fn update_password(
    conn: &mut AsyncPgConnection,
    caller_id: i32,
    user_id: i32,
    password: Option<String>,
) -> Result<(), AppError> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return Err(AppError::BadRequest("Missing password".into()));
    };
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if !caller(conn, caller_id).await?.can_access(user_id) {
        return Err(AppError::ForbiddenResource(
            "Cannot change another user's password".into(),
        ));
    }

    let password_hash = hash_off_thread(password).await?;
    let updated = diesel::update(users::table.find(user_id))
        .set((
            users::password_hash.eq(password_hash),
            users::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to update password")?;

    if updated == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    info!("Password updated for user #{}", user_id);

    Ok(())
}

#[derive(Serialize, Debug, ToSchema)]
pub struct UserWithRight {
    #[serde(flatten)]
    pub user: PublicUser,
    pub right_name: String,
}

/// Every other user with their right names. Admin only.
pub async fn list_users(
    conn: &mut AsyncPgConnection,
    admin_id: i32,
) -> Result<Vec<UserWithRight>, AppError> {
    require_admin(conn, admin_id).await?;

    let rows: Vec<(UserEntity, String)> = users::table
        .inner_join(user_rights::table.inner_join(rights::table))
        .filter(users::id.ne(admin_id))
        .order_by(users::id.asc())
        .select((UserEntity::as_select(), rights::name))
        .load(conn)
        .await
        .context("Failed to get users")?;

    Ok(rows
        .into_iter()
        .map(|(user, right_name)| UserWithRight {
            user: user.into(),
            right_name,
        })
        .collect())
}

/// Admin only. A user whose products sit in someone's order cannot be removed.
pub async fn delete_user(
    conn: &mut AsyncPgConnection,
    admin_id: i32,
    user_id: i32,
) -> Result<(), AppError> {
    require_admin(conn, admin_id).await?;

    let deleted = diesel::delete(users::table.find(user_id))
        .execute(conn)
        .await?;

    if deleted == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    info!("User #{} deleted by admin #{}", user_id, admin_id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registration() -> Registration {
        Registration {
            name: Some("Maria".into()),
            email: Some("maria@example.com".into()),
            password: Some("secret1".into()),
            confirm_password: Some("secret1".into()),
            phone: Some("0712345678".into()),
            right_code: Some(json!(1)),
        }
    }

    fn rejection(input: Registration) -> String {
        match validate_registration(input) {
            Err(AppError::BadRequest(msg)) => msg,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_registration_is_normalized() {
        let mut input = registration();
        input.email = Some("  maria@example.com ".into());
        input.right_code = Some(json!("2"));

        let valid = validate_registration(input).unwrap();
        assert_eq!(valid.email, "maria@example.com");
        assert_eq!(valid.right_code, 2);
    }

    #[test]
    fn missing_fields_are_rejected_first() {
        let mut input = registration();
        input.phone = None;
        assert!(rejection(input).contains("required"));
    }

    #[test]
    fn password_rules() {
        let mut short = registration();
        short.password = Some("abc".into());
        short.confirm_password = Some("abc".into());
        assert!(rejection(short).contains("at least 6"));

        let mut mismatch = registration();
        mismatch.confirm_password = Some("secret2".into());
        assert_eq!(rejection(mismatch), "Passwords do not match");
    }

    #[test]
    fn phone_must_be_a_mobile_number() {
        assert!(is_valid_phone("0712345678"));
        assert!(!is_valid_phone("0812345678"));
        assert!(!is_valid_phone("071234567"));
        assert!(!is_valid_phone("07123456a8"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a.b+c@shop.example.ro"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("x@localhost"));
        assert!(!is_valid_email("x@host.c"));
    }

    #[test]
    fn right_code_must_be_numeric_and_not_admin() {
        let mut input = registration();
        input.right_code = Some(json!("seller"));
        assert_eq!(rejection(input), "Right must be a valid number");

        let mut input = registration();
        input.right_code = None;
        assert_eq!(rejection(input), "Right is required");

        let mut input = registration();
        input.right_code = Some(json!(3));
        assert!(rejection(input).contains("admin"));
    }
}

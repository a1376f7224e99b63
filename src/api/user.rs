use actix_multipart::Multipart;
use actix_web::{HttpResponse, delete, get, post, put, web};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use futures_util::TryStreamExt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use sea_query::Condition;

use crate::api::bug::multipart_err;
use crate::auth::jwt::{JwtUtils, REFRESH_ROLE, TokenVerifyResult};
use crate::authz::{Action, authorize};
use crate::entity::user::{self, Entity as UserEntity, Role, UserStatus};
use crate::model::auth::{AuthResponse, LoginRequest, LogoutRequest, RefreshTokenRequest};
use crate::model::global_error::{AppError, ErrorCode};
use crate::model::user::{
    ChangePasswordRequest, PasswordResetRequest, ProfileUpdateRequest, UserCreateRequest,
    UserListQuery, UserResponse, UserUpdateRequest,
};
use crate::storage::BlobStore;

/// Loads the caller's account row; handlers use it for every role check.
pub async fn current_user(db: &DatabaseConnection, user_id: i32) -> Result<user::Model, AppError> {
    UserEntity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))
}

/// Password policy carried over from the account provider: minimum eight
/// characters, not entirely numeric, confirmation must match.
fn validate_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password != confirm {
        return Err(AppError::new(ErrorCode::PasswordMismatch));
    }
    if password.chars().count() < 8 || password.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::new(ErrorCode::WeakPassword));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST).map_err(|err| {
        tracing::error!("password hashing failed: {err}");
        AppError::new(ErrorCode::InternalError)
    })
}

#[post("/users/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let user = UserEntity::find()
        .filter(user::Column::Username.eq(&body.username))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials))?;

    let is_valid = verify(&body.password, &user.password)
        .map_err(|_| AppError::new(ErrorCode::InternalError))?;

    if !is_valid {
        return Err(AppError::new(ErrorCode::InvalidCredentials));
    }

    // Checked only after the credential match succeeds.
    if user.status == UserStatus::Disabled {
        return Err(AppError::new(ErrorCode::AccountDisabled));
    }

    let access_token = JwtUtils::generate_access_token(user.id, user.role)?;
    let new_refresh_token = JwtUtils::generate_refresh_token(user.id)?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token: new_refresh_token,
        user: UserResponse::from(user),
    }))
}

/// Always reports success, even for garbage tokens, so the response leaks
/// nothing about token validity.
#[post("/users/logout")]
pub async fn logout(_body: web::Json<LogoutRequest>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "detail": "logged out" }))
}

#[post("/users/refresh")]
pub async fn refresh_token(
    body: web::Json<RefreshTokenRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    match JwtUtils::verify_token(&body.refresh_token) {
        TokenVerifyResult::Valid(claims) => {
            if claims.role != REFRESH_ROLE {
                return Err(AppError::new(ErrorCode::InvalidRefreshToken));
            }

            let user_id = claims
                .sub
                .parse::<i32>()
                .map_err(|_| AppError::new(ErrorCode::InvalidRefreshToken))?;

            let user = current_user(db.get_ref(), user_id).await?;
            let access_token = JwtUtils::generate_access_token(user.id, user.role)?;

            Ok(HttpResponse::Ok().json(serde_json::json!({ "access_token": access_token })))
        }
        TokenVerifyResult::Expired | TokenVerifyResult::Invalid => {
            Err(AppError::new(ErrorCode::InvalidRefreshToken))
        }
    }
}

#[get("/users/profile")]
pub async fn get_profile(
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(db.get_ref(), *user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Username and role are not editable through the profile.
#[put("/users/profile")]
pub async fn update_profile(
    body: web::Json<ProfileUpdateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(db.get_ref(), *user_id).await?;

    let mut model: user::ActiveModel = user.into();
    if let Some(email) = &body.email {
        model.email = Set(email.clone());
    }
    if let Some(phone) = &body.phone {
        model.phone = Set(phone.clone());
    }
    if let Some(avatar) = &body.avatar {
        model.avatar = Set(Some(avatar.clone()));
    }
    model.updated_at = Set(Utc::now().into());

    let updated = model.update(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(updated)))
}

async fn save_avatar(mut payload: Multipart, store: &BlobStore) -> Result<Option<String>, AppError> {
    while let Some(mut field) = payload.try_next().await.map_err(multipart_err)? {
        let Some(filename) = field.content_disposition().get_filename().map(str::to_string)
        else {
            continue;
        };

        let mut data = web::BytesMut::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
            data.extend_from_slice(&chunk);
        }

        return Ok(Some(store.save("avatars", &filename, &data).await?));
    }

    Ok(None)
}

/// Multipart image upload; replaces the caller's avatar with the stored
/// file's URL. The previous blob is not removed.
#[post("/users/profile/avatar")]
pub async fn upload_avatar(
    payload: Multipart,
    db: web::Data<DatabaseConnection>,
    store: web::Data<BlobStore>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(db.get_ref(), *user_id).await?;

    let url = save_avatar(payload, store.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::MissingFile))?;

    let mut model: user::ActiveModel = user.into();
    model.avatar = Set(Some(url));
    model.updated_at = Set(Utc::now().into());
    let updated = model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(updated)))
}

#[post("/users/change-password")]
pub async fn change_password(
    body: web::Json<ChangePasswordRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(db.get_ref(), *user_id).await?;

    let old_matches = verify(&body.old_password, &user.password)
        .map_err(|_| AppError::new(ErrorCode::InternalError))?;
    if !old_matches {
        return Err(AppError::new(ErrorCode::WrongPassword));
    }

    validate_new_password(&body.new_password, &body.confirm_password)?;

    let mut model: user::ActiveModel = user.into();
    model.password = Set(hash_password(&body.new_password)?);
    model.updated_at = Set(Utc::now().into());
    model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "password changed" })))
}

/// Active developers, for the assign picker.
#[get("/users/developers")]
pub async fn list_developers(
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let developers = UserEntity::find()
        .filter(
            Condition::all()
                .add(user::Column::Role.eq(Role::Developer))
                .add(user::Column::Status.eq(UserStatus::Active)),
        )
        .order_by_asc(user::Column::Username)
        .all(db.get_ref())
        .await?;

    let response: Vec<UserResponse> = developers.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

#[get("/users")]
pub async fn list_users(
    db: web::Data<DatabaseConnection>,
    query: web::Query<UserListQuery>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    let mut condition = Condition::all();
    if let Some(role) = query.role {
        condition = condition.add(user::Column::Role.eq(role));
    }
    if let Some(status) = query.status {
        condition = condition.add(user::Column::Status.eq(status));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        condition = condition.add(user::Column::Username.contains(search));
    }

    let users = UserEntity::find()
        .filter(condition)
        .order_by_desc(user::Column::CreatedAt)
        .all(db.get_ref())
        .await?;

    let response: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

#[post("/users")]
pub async fn create_user(
    body: web::Json<UserCreateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    if body.username.trim().is_empty() {
        return Err(AppError::field("username", "username is required"));
    }
    validate_new_password(&body.password, &body.confirm_password)?;

    let existing = UserEntity::find()
        .filter(user::Column::Username.eq(body.username.trim()))
        .one(db.get_ref())
        .await?;
    if existing.is_some() {
        return Err(AppError::new(ErrorCode::DuplicateUsername));
    }

    let now = Utc::now();
    let new_user = user::ActiveModel {
        username: Set(body.username.trim().to_string()),
        password: Set(hash_password(&body.password)?),
        email: Set(body.email.clone().unwrap_or_default()),
        phone: Set(body.phone.clone().unwrap_or_default()),
        role: Set(body.role.unwrap_or(Role::Tester)),
        status: Set(body.status.unwrap_or(UserStatus::Active)),
        avatar: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let inserted = new_user.insert(db.get_ref()).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(inserted)))
}

#[get("/users/{id}")]
pub async fn get_user(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    let user = UserEntity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[put("/users/{id}")]
pub async fn update_user(
    path: web::Path<i32>,
    body: web::Json<UserUpdateRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    let user = UserEntity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;

    let mut model: user::ActiveModel = user.into();
    if let Some(email) = &body.email {
        model.email = Set(email.clone());
    }
    if let Some(phone) = &body.phone {
        model.phone = Set(phone.clone());
    }
    if let Some(role) = body.role {
        model.role = Set(role);
    }
    if let Some(status) = body.status {
        model.status = Set(status);
    }
    model.updated_at = Set(Utc::now().into());

    let updated = model.update(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(updated)))
}

#[delete("/users/{id}")]
pub async fn delete_user(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    let result = UserEntity::delete_by_id(path.into_inner())
        .exec(db.get_ref())
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::new(ErrorCode::UserNotFound));
    }

    Ok(HttpResponse::NoContent().finish())
}

/// Admin reset; no old-password check.
#[post("/users/{id}/reset_password")]
pub async fn reset_password(
    path: web::Path<i32>,
    body: web::Json<PasswordResetRequest>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    validate_new_password(&body.new_password, &body.confirm_password)?;

    let user = UserEntity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;

    let mut model: user::ActiveModel = user.into();
    model.password = Set(hash_password(&body.new_password)?);
    model.updated_at = Set(Utc::now().into());
    model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "detail": "password reset" })))
}

#[post("/users/{id}/toggle_status")]
pub async fn toggle_status(
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    user_id: web::ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(db.get_ref(), *user_id).await?;
    authorize(&caller, &Action::ManageUsers)?;

    let user = UserEntity::find_by_id(path.into_inner())
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;

    let next_status = match user.status {
        UserStatus::Active => UserStatus::Disabled,
        UserStatus::Disabled => UserStatus::Active,
    };

    let mut model: user::ActiveModel = user.into();
    model.status = Set(next_status);
    model.updated_at = Set(Utc::now().into());
    let updated = model.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok()
        .json(serde_json::json!({ "detail": "status updated", "status": updated.status })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_confirmation_must_match() {
        let err = validate_new_password("longenough1", "different1").unwrap_err();
        match err {
            AppError::ApiError(code, _) => assert_eq!(code, ErrorCode::PasswordMismatch),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_or_numeric_passwords_are_rejected() {
        assert!(validate_new_password("short1", "short1").is_err());
        assert!(validate_new_password("123456789", "123456789").is_err());
        assert!(validate_new_password("longenough1", "longenough1").is_ok());
    }
}

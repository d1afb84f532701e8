//! Admin handlers: accounts, signup codes and moderation.
//!
//! Every moderation action is written to the append-only moderation log
//! under the acting admin's name.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ulid::Ulid;

use super::{canonical_token, check_len};
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::{blocking, ApiState};
use crate::auth::{self, AuthError, Claims};
use crate::store::{Comment, Edition, ModerationAction, ModerationPage};

/// Default moderation log page size.
const LOG_PAGE_SIZE: u32 = 50;

/// Maximum edition description length.
const MAX_DESCRIPTION_LEN: usize = 2_000;

/// Signup request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(alias = "signup_code")]
    pub signup_code: String,
}

/// Signin request.
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub username: String,
    pub password: String,
}

/// Issued admin token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub username: String,
    pub token: String,
}

/// Current admin.
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub username: String,
    /// Token expiry, Unix seconds.
    pub expires: i64,
}

/// A freshly minted code.
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: String,
}

/// Set nsfw request.
#[derive(Debug, Deserialize)]
pub struct NsfwRequest {
    pub nsfw: bool,
}

/// Create edition request.
#[derive(Debug, Deserialize)]
pub struct CreateEditionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Moderation log query.
#[derive(Debug, Deserialize)]
pub struct LogParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Result of a moderation action.
#[derive(Debug, Serialize)]
pub struct Moderated {
    pub target: String,
    pub action: ModerationAction,
}

/// Create an admin account with a signup code.
pub async fn signup(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = body?;
    auth::validate_signup(&request.username, &request.password, &request.signup_code)?;

    let password = request.password;
    let password_hash = blocking(move || Ok(auth::hash_password(&password)?)).await?;

    let username = request.username.clone();
    state
        .db(move |store| {
            if store.admin(&username)?.is_some() {
                return Err(ApiError::UserExists);
            }
            if !store.consume_signup_code(&request.signup_code)? {
                return Err(ApiError::InvalidCode);
            }
            Ok(store.create_admin(&username, &password_hash)?)
        })
        .await?;

    let token = state.jwt.sign(&request.username)?;

    Ok(ok(TokenResponse {
        username: request.username,
        token,
    }))
}

/// Sign in with username and password.
pub async fn signin(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SigninRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = body?;

    let username = request.username.clone();
    let admin = state.db(move |store| Ok(store.admin(&username)?)).await?;
    let password = request.password;
    let verified = match admin {
        Some(admin) => {
            blocking(move || Ok(auth::verify_password(&password, &admin.password_hash))).await?
        }
        None => false,
    };

    if !verified {
        warn!(username = %request.username, "Failed admin sign in");
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.jwt.sign(&request.username)?;
    info!(username = %request.username, "Admin signed in");

    Ok(ok(TokenResponse {
        username: request.username,
        token,
    }))
}

/// The admin a token belongs to.
pub async fn whoami(Extension(claims): Extension<Claims>) -> ApiResult<WhoAmI> {
    Ok(ok(WhoAmI {
        username: claims.username,
        expires: claims.exp,
    }))
}

/// Mint a signup code for another admin.
pub async fn create_signup_code(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<CodeResponse> {
    let code = state
        .db(move |store| {
            let code = store.create_signup_code(&mut StdRng::from_entropy())?;
            store.log_action(&claims.username, ModerationAction::CreateSignupCode, &code, None)?;
            Ok(code)
        })
        .await?;

    Ok(ok(CodeResponse { code }))
}

/// Soft-delete a post.
pub async fn delete_post(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Moderated> {
    let Path(id) = id?;
    let token = canonical_token(&id)?;

    let target = token.clone();
    state
        .db(move |store| {
            store.delete_post(&target)?;
            store.log_action(&claims.username, ModerationAction::DeletePost, &target, None)?;
            Ok(())
        })
        .await?;
    state.feed_cache.invalidate().await;

    Ok(ok(Moderated {
        target: token,
        action: ModerationAction::DeletePost,
    }))
}

/// Mark a post as nsfw or not.
pub async fn set_nsfw(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<NsfwRequest>, JsonRejection>,
) -> ApiResult<Moderated> {
    let Path(id) = id?;
    let Json(request) = body?;
    let token = canonical_token(&id)?;

    let target = token.clone();
    state
        .db(move |store| {
            store.set_nsfw(&target, request.nsfw)?;
            store.log_action(
                &claims.username,
                ModerationAction::SetNsfw,
                &target,
                Some(&format!("nsfw={}", request.nsfw)),
            )?;
            Ok(())
        })
        .await?;

    Ok(ok(Moderated {
        target: token,
        action: ModerationAction::SetNsfw,
    }))
}

/// Replace a post's edit code with a random one and return it.
pub async fn reset_edit_code(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<CodeResponse> {
    let Path(id) = id?;
    let token = canonical_token(&id)?;

    let code = hex::encode(StdRng::from_entropy().gen::<[u8; 4]>());
    let plain = code.clone();
    let hash = blocking(move || Ok(auth::hash_password(&plain)?)).await?;

    state
        .db(move |store| {
            store.set_edit_code(&token, Some(&hash))?;
            store.log_action(&claims.username, ModerationAction::ResetEditCode, &token, None)?;
            Ok(())
        })
        .await?;

    Ok(ok(CodeResponse { code }))
}

fn check_comment_id(id: &str) -> Result<(), ApiError> {
    Ulid::from_string(id).map(|_| ()).map_err(|_| {
        ApiError::Validation(
            "Invalid comment ID. Comment IDs must be 26 characters long (ULID format).".to_string(),
        )
    })
}

/// View a comment.
pub async fn get_comment(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Comment> {
    let Path(id) = id?;
    check_comment_id(&id)?;

    let comment = state
        .db(move |store| store.comment(&id)?.ok_or(ApiError::NotFound("Comment")))
        .await?;

    Ok(ok(comment))
}

/// Delete a comment.
pub async fn delete_comment(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Moderated> {
    let Path(id) = id?;
    check_comment_id(&id)?;

    let target = id.clone();
    state
        .db(move |store| {
            let comment = store.comment(&target)?.ok_or(ApiError::NotFound("Comment"))?;
            store.delete_comment(&target)?;
            store.log_action(
                &claims.username,
                ModerationAction::DeleteComment,
                &target,
                Some(&format!("post={}", comment.post)),
            )?;
            Ok(())
        })
        .await?;

    Ok(ok(Moderated {
        target: id,
        action: ModerationAction::DeleteComment,
    }))
}

/// Start a new edition. It becomes the current one.
pub async fn create_edition(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateEditionRequest>, JsonRejection>,
) -> ApiResult<Edition> {
    let Json(request) = body?;

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("edition name must not be empty".to_string()));
    }
    check_len("name", Some(&name), super::posts::MAX_FIELD_LEN)?;
    check_len("description", Some(&request.description), MAX_DESCRIPTION_LEN)?;

    let edition = state
        .db(move |store| {
            let edition = store.create_edition(&name, request.description.trim())?;
            store.log_action(
                &claims.username,
                ModerationAction::CreateEdition,
                &edition.id.to_string(),
                Some(&edition.name),
            )?;
            Ok(edition)
        })
        .await?;
    state.feed_cache.invalidate().await;

    Ok(ok(edition))
}

/// Delete an edition. Its posts keep their edition tag.
pub async fn delete_edition(
    State(state): State<Arc<ApiState>>,
    Extension(claims): Extension<Claims>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Moderated> {
    let Path(id) = id?;

    state
        .db(move |store| {
            store.delete_edition(id)?;
            store.log_action(
                &claims.username,
                ModerationAction::DeleteEdition,
                &id.to_string(),
                None,
            )?;
            Ok(())
        })
        .await?;
    state.feed_cache.invalidate().await;

    Ok(ok(Moderated {
        target: id.to_string(),
        action: ModerationAction::DeleteEdition,
    }))
}

/// Page through the moderation log, newest first.
pub async fn moderation_log(
    State(state): State<Arc<ApiState>>,
    params: Result<Query<LogParams>, QueryRejection>,
) -> ApiResult<ModerationPage> {
    let Query(params) = params?;

    let page = state
        .db(move |store| {
            Ok(store.moderation_log(
                params.page.unwrap_or(1),
                params.limit.unwrap_or(LOG_PAGE_SIZE),
            )?)
        })
        .await?;

    Ok(ok(page))
}

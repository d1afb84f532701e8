//! Post handlers: submission, listing, viewing and author editing.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use ulid::Ulid;

use super::{canonical_token, check_len, non_blank};
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::{blocking, ApiState};
use crate::auth;
use crate::store::{
    Edition, NewPost, Post, PostPage, PostQuery, PostUpdate, SortField, SortOrder, Store, NO_EDITION,
};

/// Maximum post length in characters.
pub const MAX_CONTENT_LEN: usize = 100_000;

/// Maximum length of titles, author names, trigger warnings and edit codes.
pub const MAX_FIELD_LEN: usize = 200;

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// 1-based page.
    pub page: Option<u32>,

    /// `updated` or `views`.
    pub sort: Option<SortField>,

    /// `asc` or `desc`.
    pub order: Option<SortOrder>,

    /// Include nsfw posts: `yes` (or `true`). Anything else hides them.
    #[serde(default, deserialize_with = "yes_or_no")]
    pub nsfw: Option<bool>,

    /// Free text, a post token or a post link.
    pub search: Option<String>,

    /// Only posts from this edition.
    pub edition: Option<i64>,
}

fn yes_or_no<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "yes" | "true" | "1" | "on"
        )
    }))
}

impl From<ListParams> for PostQuery {
    fn from(params: ListParams) -> Self {
        PostQuery {
            page: params.page.unwrap_or(1),
            sort: params.sort.unwrap_or_default(),
            order: params.order.unwrap_or_default(),
            include_nsfw: params.nsfw.unwrap_or(false),
            search: non_blank(params.search),
            edition: params.edition,
        }
    }
}

/// Create post request.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,

    pub title: Option<String>,

    #[serde(alias = "nickname")]
    pub author: Option<String>,

    #[serde(alias = "trigger_warnings")]
    pub triggers: Option<String>,

    #[serde(default)]
    pub nsfw: bool,

    /// Edit code. Without one the post can never be edited by its author.
    pub password: Option<String>,

    /// Edition id. Defaults to "No edition".
    pub edition: Option<i64>,
}

/// Created post response.
#[derive(Debug, Serialize)]
pub struct CreatedPost {
    /// Post token.
    pub id: String,
}

/// A post with its edition resolved.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,

    pub edition: Option<Edition>,
}

/// Open edit session request.
#[derive(Debug, Deserialize)]
pub struct ManageRequest {
    /// The post's edit code.
    pub password: String,
}

/// Open edit session response.
#[derive(Debug, Serialize)]
pub struct ManageResponse {
    /// Session id to send with the update.
    pub session: String,
}

/// What to do with a post once an edit session is open.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpdateAction {
    /// Replace the editable fields.
    Update {
        content: String,
        title: Option<String>,
        triggers: Option<String>,
        #[serde(default)]
        nsfw: bool,
        /// Keeps the current edition when absent.
        edition: Option<i64>,
    },

    /// Replace the edit code, or remove it when blank.
    SetEditCode { password: Option<String> },

    /// Delete the post.
    Delete,
}

/// Update post request.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub session: String,

    #[serde(flatten)]
    pub action: UpdateAction,
}

/// A validated author edit, ready to apply.
enum Edit {
    Update(PostUpdate),
    /// Already hashed.
    SetEditCode(Option<String>),
    Delete,
}

impl Edit {
    fn name(&self) -> &'static str {
        match self {
            Edit::Update(_) => "update",
            Edit::SetEditCode(_) => "set_edit_code",
            Edit::Delete => "delete",
        }
    }
}

/// Update post response.
#[derive(Debug, Serialize)]
pub struct UpdatedPost {
    pub id: String,
    pub action: &'static str,
}

fn validate_post(
    content: &str,
    title: Option<&str>,
    author: Option<&str>,
    triggers: Option<&str>,
) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::Validation("content must not be empty".to_string()));
    }
    check_len("content", Some(content), MAX_CONTENT_LEN)?;
    check_len("title", title, MAX_FIELD_LEN)?;
    check_len("author", author, MAX_FIELD_LEN)?;
    check_len("triggers", triggers, MAX_FIELD_LEN)?;
    Ok(())
}

/// Hash a chosen edit code. Blank means no edit code.
async fn hash_edit_code(code: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(code) = non_blank(code) else {
        return Ok(None);
    };
    check_len("password", Some(&code), MAX_FIELD_LEN)?;
    let hash = blocking(move || Ok(auth::hash_password(&code)?)).await?;
    Ok(Some(hash))
}

/// Check that an edition can receive posts.
pub(crate) fn resolve_edition(store: &Store, edition: Option<i64>) -> Result<i64, ApiError> {
    let id = edition.unwrap_or(NO_EDITION);
    match store.edition(id)? {
        Some(e) if !e.deleted => Ok(id),
        _ => Err(ApiError::Validation(format!("edition {id} does not exist"))),
    }
}

/// List or search posts.
pub async fn list_posts(
    State(state): State<Arc<ApiState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<PostPage> {
    let Query(params) = params?;
    let query = PostQuery::from(params);

    let page = state.db(move |store| Ok(store.list_posts(&query)?)).await?;
    Ok(ok(page))
}

/// Submit a post.
pub async fn create_post(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> ApiResult<CreatedPost> {
    let Json(request) = body?;

    let title = non_blank(request.title);
    let author = non_blank(request.author);
    let triggers = request.triggers.map(|t| t.trim().to_string()).unwrap_or_default();
    validate_post(&request.content, title.as_deref(), author.as_deref(), Some(&triggers))?;
    let password_hash = hash_edit_code(request.password).await?;

    let (id, edition) = state
        .db(move |store| {
            let edition = resolve_edition(store, request.edition)?;
            let id = store.create_post(&NewPost {
                content: request.content,
                title,
                author,
                triggers,
                nsfw: request.nsfw,
                password_hash,
                edition,
            })?;
            Ok((id, edition))
        })
        .await?;

    info!(post = %id, edition, "Post submitted");

    Ok(ok(CreatedPost { id }))
}

/// Redirect to a random post.
pub async fn random_post(State(state): State<Arc<ApiState>>) -> Result<Redirect, ApiError> {
    let token = state
        .db(|store| store.random_post()?.ok_or(ApiError::NoPosts))
        .await?;
    Ok(Redirect::to(&format!("/api/v1/post/{token}")))
}

/// View a post. Counts a view.
///
/// Links from before posts had tokens carry a ULID; those are permanently
/// redirected to the token URL.
pub async fn get_post(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;

    if id.len() == 26 && Ulid::from_string(&id).is_ok() {
        let ulid = id.clone();
        let token = state
            .db(move |store| store.migrated_post_token(&ulid)?.ok_or(ApiError::PostNotFound))
            .await?;
        debug!(ulid = %id, post = %token, "Redirecting legacy post link");
        return Ok(Redirect::permanent(&format!("/api/v1/post/{token}")).into_response());
    }

    let token = canonical_token(&id)?;
    let view = state
        .db(move |store| {
            store.add_view(&token)?;
            let post = store.post_by_token(&token)?.ok_or(ApiError::PostNotFound)?;
            let edition = store.edition(post.summary.edition())?;
            Ok(PostView { post, edition })
        })
        .await?;

    Ok(ok(view).into_response())
}

/// Open an edit session with the post's edit code.
pub async fn manage_post(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<ManageRequest>, JsonRejection>,
) -> ApiResult<ManageResponse> {
    let Path(id) = id?;
    let Json(request) = body?;
    let token = canonical_token(&id)?;

    let post = token.clone();
    let hash = state
        .db(move |store| store.edit_code_hash(&post)?.ok_or(ApiError::NoEditCode))
        .await?;

    let verified = blocking(move || Ok(auth::verify_password(&request.password, &hash))).await?;
    if !verified {
        return Err(ApiError::IncorrectPassword);
    }

    let session = state.sessions.open(&token).await;
    debug!(post = %token, "Opened edit session");

    Ok(ok(ManageResponse { session }))
}

/// Apply an edit within an open session.
pub async fn update_post(
    State(state): State<Arc<ApiState>>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<UpdatedPost> {
    let Path(id) = id?;
    let Json(request) = body?;
    let token = canonical_token(&id)?;

    // Everything that can reject the request runs before the session is
    // used up, so a bad update can be corrected and resent.
    let edit = match request.action {
        UpdateAction::Update {
            content,
            title,
            triggers,
            nsfw,
            edition,
        } => {
            let title = non_blank(title);
            let triggers = triggers.map(|t| t.trim().to_string()).unwrap_or_default();
            validate_post(&content, title.as_deref(), None, Some(&triggers))?;

            let post = token.clone();
            let edition = state
                .db(move |store| match edition {
                    Some(_) => resolve_edition(store, edition),
                    None => Ok(store
                        .post_by_token(&post)?
                        .ok_or(ApiError::PostNotFound)?
                        .summary
                        .edition()),
                })
                .await?;

            Edit::Update(PostUpdate {
                title,
                content,
                triggers,
                nsfw,
                edition,
            })
        }
        UpdateAction::SetEditCode { password } => Edit::SetEditCode(hash_edit_code(password).await?),
        UpdateAction::Delete => Edit::Delete,
    };

    if !state.sessions.take(&request.session, &token).await {
        return Err(ApiError::SessionExpired);
    }

    let action = edit.name();
    let deleted = matches!(edit, Edit::Delete);
    let post = token.clone();
    state
        .db(move |store| {
            match edit {
                Edit::Update(update) => store.update_post(&post, &update)?,
                Edit::SetEditCode(hash) => store.set_edit_code(&post, hash.as_deref())?,
                Edit::Delete => store.delete_post(&post)?,
            }
            Ok(())
        })
        .await?;

    if deleted {
        state.feed_cache.invalidate().await;
    }

    info!(post = %token, action, "Post edited by author");

    Ok(ok(UpdatedPost { id: token, action }))
}

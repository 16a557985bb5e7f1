use std::sync::Arc;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{AuthService, CurrentUser, TokenKind, REFRESH_COOKIE};
use crate::compile;
use crate::config::Config;
use crate::error::ApiError;
use crate::files::FileStore;
use crate::models::*;
use crate::store::Store;

const PDF_CACHE_CONTROL: &str = "public, max-age=86400";

// ==================== Health ====================

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

// ==================== Auth ====================

pub async fn register(
    store: web::Data<Arc<Store>>,
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let password_hash = auth.hash_password(&body.password).map_err(|e| {
        log::error!("password hash failed: {}", e);
        ApiError::Internal
    })?;

    let mut user = User {
        id: String::new(),
        name: body.name.clone(),
        email: body.email.clone(),
        password_hash,
        drive_refresh_token: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.create_user(&mut user)?;

    Ok(HttpResponse::Created().json(user))
}

pub async fn login(
    store: web::Data<Arc<Store>>,
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let invalid = || ApiError::Unauthenticated("Invalid credentials".to_string());

    let user = store.get_user_by_email(&body.email).map_err(|_| invalid())?;
    if !auth
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false)
    {
        return Err(invalid());
    }

    let access = issue(&auth, &user.id, TokenKind::Access)?;
    let refresh = issue(&auth, &user.id, TokenKind::Refresh)?;

    let cookie = Cookie::build(REFRESH_COOKIE, refresh)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::days(crate::auth::REFRESH_TOKEN_EXPIRE_DAYS))
        .path("/")
        .finish();

    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(TokenResponse::bearer(access)))
}

pub async fn refresh(
    req: HttpRequest,
    store: web::Data<Arc<Store>>,
    auth: web::Data<Arc<AuthService>>,
) -> Result<HttpResponse, ApiError> {
    let cookie = req
        .cookie(REFRESH_COOKIE)
        .ok_or_else(|| ApiError::Unauthenticated("No refresh token".to_string()))?;

    let claims = auth
        .decode_token(cookie.value(), TokenKind::Refresh)
        .ok_or_else(|| ApiError::Unauthenticated("Invalid refresh token".to_string()))?;

    let user = store
        .get_user(&claims.sub)
        .map_err(|_| ApiError::Unauthenticated("User not found".to_string()))?;

    let access = issue(&auth, &user.id, TokenKind::Access)?;
    Ok(HttpResponse::Ok().json(TokenResponse::bearer(access)))
}

/// No server-side revocation: logout only clears the client cookie, and the
/// refresh token stays valid until its natural expiry.
pub async fn logout() -> HttpResponse {
    let mut cookie = Cookie::new(REFRESH_COOKIE, "");
    cookie.set_path("/");
    cookie.make_removal();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(serde_json::json!({ "ok": true }))
}

pub async fn me(user: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(user.0)
}

fn issue(auth: &AuthService, user_id: &str, kind: TokenKind) -> Result<String, ApiError> {
    auth.issue_token(user_id, kind).map_err(|e| {
        log::error!("token issue failed: {}", e);
        ApiError::Internal
    })
}

// ==================== Documents ====================

pub async fn list_documents(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let docs = store.list_documents(&user.0.id)?;
    let items: Vec<DocumentListItem> = docs
        .into_iter()
        .map(|d| DocumentListItem {
            id: d.id,
            title: d.title,
            is_public: d.is_public,
            created_at: d.created_at,
            updated_at: d.updated_at,
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

pub async fn create_document(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    body: web::Json<DocumentCreate>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let mut doc = Document {
        id: String::new(),
        owner_id: user.0.id,
        title: body.title,
        content: body.content,
        is_public: false,
        share_token: None,
        copied_from_id: None,
        drive_file_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.create_document(&mut doc)?;
    Ok(HttpResponse::Created().json(doc))
}

/// Non-owners get NotFound, never Forbidden: document existence is not
/// revealed outside the owner.
fn owned_document(store: &Store, doc_id: &str, owner_id: &str) -> Result<Document, ApiError> {
    let doc = store
        .get_document(doc_id)
        .map_err(|_| ApiError::not_found("Document not found"))?;
    if doc.owner_id != owner_id {
        return Err(ApiError::not_found("Document not found"));
    }
    Ok(doc)
}

pub async fn get_document(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doc = owned_document(&store, &path.into_inner(), &user.0.id)?;
    Ok(HttpResponse::Ok().json(doc))
}

pub async fn update_document(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
    body: web::Json<DocumentUpdate>,
) -> Result<HttpResponse, ApiError> {
    let mut doc = owned_document(&store, &path.into_inner(), &user.0.id)?;
    let body = body.into_inner();
    if let Some(title) = body.title {
        doc.title = title;
    }
    if let Some(content) = body.content {
        doc.content = content;
    }
    store.update_document(&mut doc)?;
    Ok(HttpResponse::Ok().json(doc))
}

pub async fn delete_document(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doc = owned_document(&store, &path.into_inner(), &user.0.id)?;
    store.delete_document(&doc.id)?;
    Ok(HttpResponse::NoContent().finish())
}

// ==================== Sharing ====================

pub async fn share_document(
    store: web::Data<Arc<Store>>,
    config: web::Data<Config>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doc = owned_document(&store, &path.into_inner(), &user.0.id)?;
    let share_token = store.share_document(&doc.id)?;
    let share_url = format!("{}/shared/{}", config.frontend_url, share_token);
    Ok(HttpResponse::Ok().json(ShareResponse {
        share_token,
        share_url,
    }))
}

pub async fn revoke_share(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doc = owned_document(&store, &path.into_inner(), &user.0.id)?;
    store.revoke_share(&doc.id)?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn view_shared(
    store: web::Data<Arc<Store>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let doc = store
        .get_shared_document(&path.into_inner())
        .map_err(|_| ApiError::not_found("Shared document not found"))?;
    Ok(HttpResponse::Ok().json(doc))
}

pub async fn copy_shared(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let copy = store
        .copy_shared_document(&path.into_inner(), &user.0.id)
        .map_err(|e| match e {
            crate::store::StoreError::NotFound(_) => {
                ApiError::not_found("Shared document not found")
            }
            other => other.into(),
        })?;
    Ok(HttpResponse::Created().json(copy))
}

// ==================== Publications ====================

pub async fn create_publication(
    store: web::Data<Arc<Store>>,
    files: web::Data<Arc<FileStore>>,
    user: CurrentUser,
    body: web::Json<PublicationCreate>,
) -> Result<HttpResponse, ApiError> {
    use base64::Engine;

    let body = body.into_inner();
    let pdf_bytes = base64::engine::general_purpose::STANDARD
        .decode(&body.pdf_base64)
        .map_err(|_| ApiError::Validation("Invalid base64 PDF payload".to_string()))?;

    let id = Uuid::new_v4().to_string();
    let pdf_path = files.save_pdf(&id, &pdf_bytes).map_err(|e| {
        log::error!("failed to store pdf for {}: {}", id, e);
        ApiError::Internal
    })?;
    let thumbnail_path = files.generate_thumbnail(&id).await;

    let mut publication = Publication {
        id,
        author_id: user.0.id.clone(),
        document_id: body.document_id,
        title: body.title,
        abstract_text: body.abstract_text,
        pub_type: body.pub_type,
        pdf_path: pdf_path.to_string_lossy().into_owned(),
        thumbnail_path: thumbnail_path.to_string_lossy().into_owned(),
        share_token: String::new(),
        like_count: 0,
        comment_count: 0,
        created_at: Utc::now(),
    };
    store.create_publication(&mut publication)?;

    let view = store.get_publication_view(&publication.id, &user.0.id)?;
    Ok(HttpResponse::Created().json(view))
}

fn parse_cursor(query: &CursorQuery) -> Result<Option<DateTime<Utc>>, ApiError> {
    match &query.cursor {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| ApiError::Validation("Invalid cursor".to_string())),
    }
}

pub async fn feed(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    query: web::Query<CursorQuery>,
) -> Result<HttpResponse, ApiError> {
    let cursor = parse_cursor(&query)?;
    let limit = query.limit.unwrap_or(20);
    let page = store.feed(&user.0.id, cursor, limit)?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn explore(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    query: web::Query<CursorQuery>,
) -> Result<HttpResponse, ApiError> {
    let cursor = parse_cursor(&query)?;
    let limit = query.limit.unwrap_or(20);
    let page = store.explore(&user.0.id, cursor, limit)?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn get_publication(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let view = store.get_publication_view(&path.into_inner(), &user.0.id)?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn delete_publication(
    store: web::Data<Arc<Store>>,
    files: web::Data<Arc<FileStore>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let publication = store.get_publication(&path.into_inner())?;
    if publication.author_id != user.0.id {
        return Err(ApiError::Forbidden("Not authorized".to_string()));
    }

    // Files first, best-effort; the row goes away regardless.
    files.delete_publication_files(&publication.id);
    store.delete_publication(&publication.id)?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn get_publication_pdf(
    store: web::Data<Arc<Store>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let publication = store.get_publication(&path.into_inner())?;
    let bytes = tokio::fs::read(&publication.pdf_path)
        .await
        .map_err(|_| ApiError::not_found("Publication PDF not found"))?;
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(("Cache-Control", PDF_CACHE_CONTROL))
        .body(bytes))
}

pub async fn get_publication_thumbnail(
    store: web::Data<Arc<Store>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let publication = store.get_publication(&path.into_inner())?;
    let bytes = tokio::fs::read(&publication.thumbnail_path)
        .await
        .map_err(|_| ApiError::not_found("Thumbnail not found"))?;
    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header(("Cache-Control", PDF_CACHE_CONTROL))
        .body(bytes))
}

pub async fn toggle_like(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (liked, like_count) = store.toggle_like(&path.into_inner(), &user.0.id)?;
    Ok(HttpResponse::Ok().json(LikeToggleResponse { liked, like_count }))
}

/// Unauthenticated share-link view for publications.
pub async fn get_public_publication(
    store: web::Data<Arc<Store>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let view = store.get_public_publication(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(view))
}

// ==================== Comments ====================

pub async fn list_comments(
    store: web::Data<Arc<Store>>,
    _user: CurrentUser,
    path: web::Path<String>,
    query: web::Query<CursorQuery>,
) -> Result<HttpResponse, ApiError> {
    let cursor = parse_cursor(&query)?;
    let limit = query.limit.unwrap_or(20);
    let comments = store.list_comments(&path.into_inner(), cursor, limit)?;
    Ok(HttpResponse::Ok().json(comments))
}

pub async fn create_comment(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
    body: web::Json<CommentCreate>,
) -> Result<HttpResponse, ApiError> {
    let comment = store.create_comment(
        &path.into_inner(),
        &user.0.id,
        body.parent_id.as_deref(),
        &body.content,
    )?;

    Ok(HttpResponse::Created().json(CommentView {
        id: comment.id,
        publication_id: comment.publication_id,
        author_id: comment.author_id,
        author_name: user.0.name,
        parent_id: comment.parent_id,
        content: comment.content,
        created_at: comment.created_at,
    }))
}

pub async fn delete_comment(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let comment = store.get_comment(&path.into_inner())?;
    if comment.author_id != user.0.id {
        return Err(ApiError::Forbidden("Not authorized".to_string()));
    }
    store.delete_comment(&comment.id)?;
    Ok(HttpResponse::NoContent().finish())
}

// ==================== Follows ====================

pub async fn get_user_profile(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let profile = store.user_profile(&path.into_inner(), &user.0.id)?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn toggle_follow(
    store: web::Data<Arc<Store>>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let target_id = path.into_inner();
    if target_id == user.0.id {
        return Err(ApiError::Validation("Cannot follow yourself".to_string()));
    }
    store.get_user(&target_id)?;

    let following = store.toggle_follow(&user.0.id, &target_id)?;
    Ok(HttpResponse::Ok().json(FollowToggleResponse { following }))
}

pub async fn list_followers(
    store: web::Data<Arc<Store>>,
    _user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let users = store.list_followers(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(users))
}

pub async fn list_following(
    store: web::Data<Arc<Store>>,
    _user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let users = store.list_following(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(users))
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/api/health", web::get().to(health))
        // Auth
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/refresh", web::post().to(refresh))
        .route("/api/auth/logout", web::post().to(logout))
        .route("/api/auth/me", web::get().to(me))
        // Documents
        .route("/api/documents", web::get().to(list_documents))
        .route("/api/documents", web::post().to(create_document))
        .route("/api/documents/{id}", web::get().to(get_document))
        .route("/api/documents/{id}", web::put().to(update_document))
        .route("/api/documents/{id}", web::delete().to(delete_document))
        // Sharing
        .route("/api/documents/{id}/share", web::post().to(share_document))
        .route("/api/documents/{id}/share", web::delete().to(revoke_share))
        .route("/api/shared/{token}", web::get().to(view_shared))
        .route("/api/shared/{token}/copy", web::post().to(copy_shared))
        // Publications
        .route("/api/publications", web::post().to(create_publication))
        .route("/api/publications/feed", web::get().to(feed))
        .route("/api/publications/explore", web::get().to(explore))
        .route("/api/publications/{id}", web::get().to(get_publication))
        .route("/api/publications/{id}", web::delete().to(delete_publication))
        .route("/api/publications/{id}/pdf", web::get().to(get_publication_pdf))
        .route(
            "/api/publications/{id}/thumbnail",
            web::get().to(get_publication_thumbnail),
        )
        .route("/api/publications/{id}/like", web::post().to(toggle_like))
        .route("/api/p/{token}", web::get().to(get_public_publication))
        // Comments
        .route(
            "/api/publications/{id}/comments",
            web::get().to(list_comments),
        )
        .route(
            "/api/publications/{id}/comments",
            web::post().to(create_comment),
        )
        .route("/api/comments/{id}", web::delete().to(delete_comment))
        // Follows
        .route("/api/users/{id}/profile", web::get().to(get_user_profile))
        .route("/api/users/{id}/follow", web::post().to(toggle_follow))
        .route("/api/users/{id}/followers", web::get().to(list_followers))
        .route("/api/users/{id}/following", web::get().to(list_following))
        // Compile
        .route("/api/compile", web::post().to(compile::compile_latex));
}

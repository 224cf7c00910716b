use actix_web::{middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{artisan_validator, logout_guard, new_id, AuthUser},
    db::{fetch_project, log_activity},
    models::{
        ArtisanProfileRow, ConversationRow, MessageRow, ProjectRow, ProjectStatus,
    },
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/artisan")
            .wrap(HttpAuthentication::basic(artisan_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/profile")
                    .route(web::get().to(get_profile))
                    .route(web::post().to(update_profile)),
            )
            .service(web::resource("/projets").route(web::get().to(list_projects)))
            .service(web::resource("/projets/{id}").route(web::get().to(project_detail)))
            .service(
                web::resource("/projets/{id}/status").route(web::post().to(update_project_status)),
            )
            .service(web::resource("/messages").route(web::get().to(list_conversations)))
            .service(
                web::resource("/messages/{id}")
                    .route(web::get().to(conversation_detail))
                    .route(web::post().to(send_message)),
            ),
    );
}

async fn count_bound(state: &web::Data<AppState>, sql: &str, binds: &[&str]) -> i64 {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    for bind in binds {
        query = query.bind(*bind);
    }
    query.fetch_one(&state.db).await.unwrap_or(0)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDto {
    id: String,
    title: String,
    description: String,
    category_id: Option<String>,
    service_id: Option<String>,
    status: ProjectStatus,
    created_at: String,
}

impl From<ProjectRow> for ProjectDto {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category_id: row.category_id,
            service_id: row.service_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

async fn fetch_profile(
    state: &web::Data<AppState>,
    user_id: &str,
) -> Option<ArtisanProfileRow> {
    sqlx::query_as::<_, ArtisanProfileRow>(
        r#"SELECT user_id, company, trade, description, service_area, hourly_rate_cents,
                  onboarding_complete, updated_at
           FROM artisan_profiles
           WHERE user_id = ?
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None)
}

async fn dashboard(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let active = count_bound(
        &state,
        "SELECT COUNT(*) FROM projects WHERE artisan_id = ? AND status IN ('quoted', 'in_progress')",
        &[auth.id.as_str()],
    )
    .await;
    let pending_quotes = count_bound(
        &state,
        "SELECT COUNT(*) FROM projects WHERE status = 'pending' AND (artisan_id IS NULL OR artisan_id = ?)",
        &[auth.id.as_str()],
    )
    .await;
    let completed = count_bound(
        &state,
        "SELECT COUNT(*) FROM projects WHERE artisan_id = ? AND status = 'completed'",
        &[auth.id.as_str()],
    )
    .await;
    let unread_messages = count_bound(
        &state,
        "SELECT COALESCE(SUM(unread_count), 0) FROM conversations WHERE artisan_id = ?",
        &[auth.id.as_str()],
    )
    .await;

    let rows = sqlx::query_as::<_, ProjectRow>(
        r#"SELECT id, client_id, artisan_id, title, description, category_id, service_id,
                  status, created_at
           FROM projects
           WHERE artisan_id = ? OR (artisan_id IS NULL AND status = 'pending')
           ORDER BY created_at DESC
           LIMIT 5"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let recent_projects: Vec<ProjectDto> = rows.into_iter().map(ProjectDto::from).collect();
    let onboarding_complete = fetch_profile(&state, &auth.id)
        .await
        .map(|profile| profile.onboarding_complete == 1)
        .unwrap_or(false);

    Ok(HttpResponse::Ok().json(json!({
        "data": {
            "stats": {
                "activeProjects": active,
                "pendingQuotes": pending_quotes,
                "completedProjects": completed,
                "unreadMessages": unread_messages,
            },
            "recentProjects": recent_projects,
            "onboardingComplete": onboarding_complete,
        }
    })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDto {
    company: String,
    trade: String,
    description: String,
    service_area: String,
    hourly_rate_cents: Option<i64>,
    onboarding_complete: bool,
    updated_at: String,
}

impl From<ArtisanProfileRow> for ProfileDto {
    fn from(row: ArtisanProfileRow) -> Self {
        Self {
            company: row.company,
            trade: row.trade,
            description: row.description,
            service_area: row.service_area,
            hourly_rate_cents: row.hourly_rate_cents,
            onboarding_complete: row.onboarding_complete == 1,
            updated_at: row.updated_at,
        }
    }
}

async fn get_profile(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    match fetch_profile(&state, &auth.id).await {
        Some(profile) => Ok(HttpResponse::Ok().json(ProfileDto::from(profile))),
        None => Ok(HttpResponse::NotFound().json(json!({ "error": "Profil introuvable." }))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileForm {
    #[serde(default)]
    company: String,
    #[serde(default)]
    trade: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    service_area: String,
    #[serde(default)]
    hourly_rate: Option<String>,
}

async fn update_profile(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<ProfileForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let hourly_rate_cents = form
        .hourly_rate
        .as_deref()
        .and_then(|value| value.trim().parse::<i64>().ok());
    let now = Utc::now().to_rfc3339();

    let profile = ArtisanProfileRow {
        user_id: auth.id.clone(),
        company: form.company.trim().to_string(),
        trade: form.trade.trim().to_string(),
        description: form.description.trim().to_string(),
        service_area: form.service_area.trim().to_string(),
        hourly_rate_cents,
        onboarding_complete: 0,
        updated_at: now.clone(),
    };
    let onboarding_complete = profile.is_complete() as i64;

    sqlx::query(
        r#"INSERT INTO artisan_profiles
           (user_id, company, trade, description, service_area, hourly_rate_cents, onboarding_complete, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(user_id) DO UPDATE SET
             company = excluded.company,
             trade = excluded.trade,
             description = excluded.description,
             service_area = excluded.service_area,
             hourly_rate_cents = excluded.hourly_rate_cents,
             onboarding_complete = excluded.onboarding_complete,
             updated_at = excluded.updated_at"#,
    )
    .bind(&profile.user_id)
    .bind(&profile.company)
    .bind(&profile.trade)
    .bind(&profile.description)
    .bind(&profile.service_area)
    .bind(profile.hourly_rate_cents)
    .bind(onboarding_complete)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "profile_updated",
        &format!("{} a mis à jour son profil.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;

    let updated = fetch_profile(&state, &auth.id)
        .await
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("profile vanished"))?;
    Ok(HttpResponse::Ok().json(ProfileDto::from(updated)))
}

/// An artisan sees their own projects plus unassigned pending requests open
/// for a quote.
async fn list_projects(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        r#"SELECT id, client_id, artisan_id, title, description, category_id, service_id,
                  status, created_at
           FROM projects
           WHERE artisan_id = ? OR (artisan_id IS NULL AND status = 'pending')
           ORDER BY created_at DESC"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let projects: Vec<ProjectDto> = rows.into_iter().map(ProjectDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "projects": projects })))
}

fn can_view(project: &ProjectRow, artisan_id: &str) -> bool {
    match project.artisan_id.as_deref() {
        Some(owner) => owner == artisan_id,
        None => project.status == ProjectStatus::Pending,
    }
}

async fn project_detail(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let project = fetch_project(&state.db, &project_id).await;

    match project {
        Some(project) if can_view(&project, &auth.id) => Ok(HttpResponse::Ok()
            .json(json!({ "success": true, "project": ProjectDto::from(project) }))),
        _ => Ok(HttpResponse::NotFound()
            .json(json!({ "success": false, "error": "Projet introuvable." }))),
    }
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

async fn update_project_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let Some(status) = ProjectStatus::parse(&form.status) else {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Statut invalide." })));
    };
    if status == ProjectStatus::Pending {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Statut invalide." })));
    }

    let Some(project) = fetch_project(&state.db, &project_id).await else {
        return Ok(HttpResponse::NotFound()
            .json(json!({ "success": false, "error": "Projet introuvable." })));
    };

    let can_edit = project.artisan_id.as_deref().is_none()
        || project.artisan_id.as_deref() == Some(&auth.id);
    if !can_edit {
        return Ok(HttpResponse::Forbidden()
            .json(json!({ "success": false, "error": "Projet attribué à un autre artisan." })));
    }

    // Quoting an unassigned request claims it.
    let assigned = match project.artisan_id {
        Some(owner) => Some(owner),
        None => Some(auth.id.clone()),
    };

    sqlx::query("UPDATE projects SET status = ?, artisan_id = ? WHERE id = ?")
        .bind(status)
        .bind(&assigned)
        .bind(&project_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "project_status_updated",
        &format!(
            "{} a passé le projet {} en {}.",
            auth.display_name,
            project_id,
            status.as_str()
        ),
        Some(&auth.id),
        None,
    )
    .await;

    let Some(updated) = fetch_project(&state.db, &project_id).await else {
        return Err(actix_web::error::ErrorInternalServerError("project vanished"));
    };
    let _ = state
        .events
        .send(ServerEvent::from_project("project_updated", &updated));

    Ok(HttpResponse::Ok().json(json!({ "success": true, "project": ProjectDto::from(updated) })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDto {
    id: String,
    client_name: String,
    last_message: String,
    last_message_at: String,
    unread: i64,
}

impl From<ConversationRow> for ConversationDto {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            client_name: row.client_name,
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            unread: row.unread_count,
        }
    }
}

async fn list_conversations(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"SELECT id, artisan_id, client_name, last_message, last_message_at, unread_count
           FROM conversations
           WHERE artisan_id = ?
           ORDER BY last_message_at DESC"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let conversations: Vec<ConversationDto> = rows.into_iter().map(ConversationDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "conversations": conversations })))
}

async fn fetch_conversation(
    state: &web::Data<AppState>,
    conversation_id: &str,
    artisan_id: &str,
) -> Option<ConversationRow> {
    sqlx::query_as::<_, ConversationRow>(
        r#"SELECT id, artisan_id, client_name, last_message, last_message_at, unread_count
           FROM conversations
           WHERE id = ? AND artisan_id = ?
           LIMIT 1"#,
    )
    .bind(conversation_id)
    .bind(artisan_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageDto {
    id: String,
    sender: String,
    body: String,
    created_at: String,
}

impl From<MessageRow> for MessageDto {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender: row.sender,
            body: row.body,
            created_at: row.created_at,
        }
    }
}

/// Opening a conversation clears its unread counter.
async fn conversation_detail(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let Some(conversation) = fetch_conversation(&state, &conversation_id, &auth.id).await else {
        return Ok(HttpResponse::NotFound()
            .json(json!({ "success": false, "error": "Conversation introuvable." })));
    };

    let rows = sqlx::query_as::<_, MessageRow>(
        r#"SELECT id, conversation_id, sender, body, created_at
           FROM messages
           WHERE conversation_id = ?
           ORDER BY created_at"#,
    )
    .bind(&conversation_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let _ = sqlx::query("UPDATE conversations SET unread_count = 0 WHERE id = ?")
        .bind(&conversation_id)
        .execute(&state.db)
        .await;

    let messages: Vec<MessageDto> = rows.into_iter().map(MessageDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "conversation": ConversationDto::from(conversation),
        "messages": messages,
    })))
}

#[derive(Deserialize)]
struct MessageForm {
    #[serde(default)]
    body: String,
}

async fn send_message(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<MessageForm>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let body = form.body.trim().to_string();
    if body.is_empty() {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Le message est vide." })));
    }

    if fetch_conversation(&state, &conversation_id, &auth.id).await.is_none() {
        return Ok(HttpResponse::NotFound()
            .json(json!({ "success": false, "error": "Conversation introuvable." })));
    }

    let message_id = new_id();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO messages (id, conversation_id, sender, body, created_at)
           VALUES (?, ?, 'artisan', ?, ?)"#,
    )
    .bind(&message_id)
    .bind(&conversation_id)
    .bind(&body)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    sqlx::query("UPDATE conversations SET last_message = ?, last_message_at = ? WHERE id = ?")
        .bind(&body)
        .bind(&now)
        .bind(&conversation_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let _ = state
        .events
        .send(ServerEvent::from_conversation("message_created", &conversation_id));

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": MessageDto {
            id: message_id,
            sender: "artisan".to_string(),
            body,
            created_at: now,
        },
    })))
}

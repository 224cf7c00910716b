use actix_web::{middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{admin_validator, logout_guard, new_id, AuthUser},
    db::{import_catalog, log_activity},
    models::{
        ActivityRow, CategoryRow, ProjectStatus, Role, SettingRow, SubscriptionPlanRow, UserRow,
        UserStatus,
    },
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(
                web::resource("/subscription-plans")
                    .route(web::get().to(list_plans))
                    .route(web::post().to(create_plan)),
            )
            .service(
                web::resource("/categories")
                    .route(web::get().to(list_categories))
                    .route(web::post().to(create_category)),
            )
            .service(web::resource("/categories/import").route(web::post().to(import_categories)))
            .service(
                web::resource("/categories/{id}")
                    .route(web::put().to(update_category))
                    .route(web::delete().to(delete_category)),
            )
            .service(web::resource("/statistics").route(web::get().to(statistics)))
            .service(web::resource("/activities").route(web::get().to(recent_activities)))
            .service(web::resource("/clients").route(web::get().to(list_clients)))
            .service(web::resource("/settings").route(web::get().to(list_settings)))
            .service(web::resource("/settings/save").route(web::post().to(save_setting))),
    )
    .service(
        web::scope("/api/users")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(list_users)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_user))
                    .route(web::patch().to(patch_user))
                    .route(web::delete().to(delete_user)),
            ),
    );
}

async fn count(state: &web::Data<AppState>, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(&state.db)
        .await
        .unwrap_or(0)
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
struct PlanDto {
    id: String,
    name: String,
    description: String,
    price_cents: i64,
    interval: String,
    features: Vec<String>,
    active: bool,
    created_at: String,
}

impl From<SubscriptionPlanRow> for PlanDto {
    fn from(row: SubscriptionPlanRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            interval: row.interval,
            features: serde_json::from_str(&row.features).unwrap_or_default(),
            active: row.active == 1,
            created_at: row.created_at,
        }
    }
}

async fn list_plans(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, SubscriptionPlanRow>(
        r#"SELECT id, name, description, price_cents, interval, features, active, created_at
           FROM subscription_plans
           ORDER BY price_cents"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let plans: Vec<PlanDto> = rows.into_iter().map(PlanDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "plans": plans })))
}

/// The plan editor historically held features as one newline-joined
/// textarea, so the payload accepts either an array or the raw text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeaturesInput {
    List(Vec<String>),
    Text(String),
}

fn parse_features(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl FeaturesInput {
    fn normalize(self) -> Vec<String> {
        match self {
            FeaturesInput::List(items) => items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            FeaturesInput::Text(text) => parse_features(&text),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    price_cents: i64,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    features: Option<FeaturesInput>,
    #[serde(default)]
    active: Option<bool>,
}

async fn create_plan(
    state: web::Data<AppState>,
    payload: web::Json<PlanPayload>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": "Le nom du plan est requis." })));
    }
    if payload.price_cents < 0 {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": "Le prix doit être positif." })));
    }

    let features = payload
        .features
        .map(FeaturesInput::normalize)
        .unwrap_or_default();
    let features_json = serde_json::to_string(&features)
        .map_err(actix_web::error::ErrorInternalServerError)?;
    let plan_id = new_id();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO subscription_plans (id, name, description, price_cents, interval, features, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&plan_id)
    .bind(payload.name.trim())
    .bind(payload.description.trim())
    .bind(payload.price_cents)
    .bind(payload.interval.as_deref().unwrap_or("month"))
    .bind(&features_json)
    .bind(payload.active.unwrap_or(true) as i64)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "plan_created",
        &format!("{} a créé le plan {}.", auth.display_name, payload.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, SubscriptionPlanRow>(
        r#"SELECT id, name, description, price_cents, interval, features, active, created_at
           FROM subscription_plans WHERE id = ? LIMIT 1"#,
    )
    .bind(&plan_id)
    .fetch_one(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Created().json(PlanDto::from(row)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryDto {
    id: String,
    name: String,
    icon: String,
    description: String,
}

impl From<CategoryRow> for CategoryDto {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            icon: row.icon,
            description: row.description,
        }
    }
}

async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, icon, description FROM categories ORDER BY name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let data: Vec<CategoryDto> = rows.into_iter().map(CategoryDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "data": data })))
}

#[derive(Deserialize)]
struct CategoryPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    icon: String,
}

async fn create_category(
    state: web::Data<AppState>,
    payload: web::Json<CategoryPayload>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Ok(
            HttpResponse::BadRequest().json(json!({ "error": "Le nom de la catégorie est requis." }))
        );
    }

    let category_id = new_id();
    sqlx::query("INSERT INTO categories (id, name, icon, description) VALUES (?, ?, ?, '')")
        .bind(&category_id)
        .bind(payload.name.trim())
        .bind(payload.icon.trim())
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "category_created",
        &format!("{} a créé la catégorie {}.", auth.display_name, payload.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, icon, description FROM categories WHERE id = ? LIMIT 1",
    )
    .bind(&category_id)
    .fetch_one(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Created().json(CategoryDto::from(row)))
}

async fn update_category(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CategoryPayload>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let category_id = path.into_inner();
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Ok(
            HttpResponse::BadRequest().json(json!({ "error": "Le nom de la catégorie est requis." }))
        );
    }

    let updated = sqlx::query("UPDATE categories SET name = ?, icon = ? WHERE id = ?")
        .bind(payload.name.trim())
        .bind(payload.icon.trim())
        .bind(&category_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if updated.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Catégorie introuvable." })));
    }

    log_activity(
        &state.db,
        "category_updated",
        &format!("{} a modifié la catégorie {}.", auth.display_name, category_id),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, icon, description FROM categories WHERE id = ? LIMIT 1",
    )
    .bind(&category_id)
    .fetch_one(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(CategoryDto::from(row)))
}

async fn delete_category(
    state: web::Data<AppState>,
    path: web::Path<String>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let category_id = path.into_inner();
    let deleted = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(&category_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if deleted.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Catégorie introuvable." })));
    }

    log_activity(
        &state.db,
        "category_deleted",
        &format!("{} a supprimé la catégorie {}.", auth.display_name, category_id),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({})))
}

async fn import_categories(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let (categories, services) = import_catalog(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "catalog_imported",
        &format!("{} a importé le catalogue.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Catalogue importé : {categories} catégories, {services} prestations.")
    })))
}

#[derive(Deserialize)]
struct UserFilter {
    search: Option<String>,
    role: Option<String>,
    status: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    company: Option<String>,
    phone: String,
    role: Role,
    status: UserStatus,
    created_at: String,
}

impl From<UserRow> for UserDto {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            company: row.company,
            phone: row.phone,
            role: row.role,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
struct Pagination {
    total: i64,
    pages: i64,
    page: i64,
    limit: i64,
}

async fn list_users(
    state: web::Data<AppState>,
    query: web::Query<UserFilter>,
) -> Result<HttpResponse> {
    let filter = query.into_inner();

    let role = match filter.role.as_deref().filter(|value| !value.is_empty()) {
        Some(value) => match Role::parse(value) {
            Some(role) => Some(role),
            None => {
                return Ok(HttpResponse::BadRequest().json(json!({ "error": "Rôle inconnu." })));
            }
        },
        None => None,
    };
    let status = match filter.status.as_deref().filter(|value| !value.is_empty()) {
        Some(value) => match UserStatus::parse(value) {
            Some(status) => Some(status),
            None => {
                return Ok(HttpResponse::BadRequest().json(json!({ "error": "Statut inconnu." })));
            }
        },
        None => None,
    };

    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter.limit.unwrap_or(10).clamp(1, 100);

    let mut conditions: Vec<&str> = Vec::new();
    let mut binds: Vec<String> = Vec::new();
    if let Some(search) = filter.search.as_deref().filter(|value| !value.trim().is_empty()) {
        conditions.push("(first_name LIKE ? OR last_name LIKE ? OR email LIKE ?)");
        let pattern = format!("%{}%", search.trim());
        binds.push(pattern.clone());
        binds.push(pattern.clone());
        binds.push(pattern);
    }
    if let Some(role) = role {
        conditions.push("role = ?");
        binds.push(role.as_str().to_string());
    }
    if let Some(status) = status {
        conditions.push("status = ?");
        binds.push(status.as_str().to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM users {where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let total = count_query.fetch_one(&state.db).await.unwrap_or(0);

    let list_sql = format!(
        r#"SELECT id, email, password_hash, first_name, last_name, company, phone, role, status, created_at
           FROM users {where_clause}
           ORDER BY created_at DESC
           LIMIT ? OFFSET ?"#
    );
    let mut list_query = sqlx::query_as::<_, UserRow>(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind);
    }
    let rows = list_query
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();

    let users: Vec<UserDto> = rows.into_iter().map(UserDto::from).collect();
    let pages = (total + limit - 1) / limit;

    Ok(HttpResponse::Ok().json(json!({
        "users": users,
        "pagination": Pagination { total, pages, page, limit },
    })))
}

async fn fetch_user(state: &web::Data<AppState>, user_id: &str) -> Option<UserRow> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, password_hash, first_name, last_name, company, phone, role, status, created_at
           FROM users WHERE id = ? LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None)
}

async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    match fetch_user(&state, &path.into_inner()).await {
        Some(row) => Ok(HttpResponse::Ok().json(UserDto::from(row))),
        None => Ok(HttpResponse::NotFound().json(json!({ "error": "Utilisateur introuvable." }))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPatch {
    first_name: Option<String>,
    last_name: Option<String>,
    company: Option<String>,
    phone: Option<String>,
    role: Option<Role>,
    status: Option<UserStatus>,
}

async fn patch_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UserPatch>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let Some(mut user) = fetch_user(&state, &user_id).await else {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Utilisateur introuvable." })));
    };

    let payload = payload.into_inner();
    if let Some(first_name) = payload.first_name {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = payload.last_name {
        user.last_name = last_name.trim().to_string();
    }
    if let Some(company) = payload.company {
        let trimmed = company.trim().to_string();
        user.company = if trimmed.is_empty() { None } else { Some(trimmed) };
    }
    if let Some(phone) = payload.phone {
        user.phone = phone.trim().to_string();
    }
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(status) = payload.status {
        user.status = status;
    }

    sqlx::query(
        r#"UPDATE users
           SET first_name = ?, last_name = ?, company = ?, phone = ?, role = ?, status = ?
           WHERE id = ?"#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.company)
    .bind(&user.phone)
    .bind(user.role)
    .bind(user.status)
    .bind(&user.id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "user_updated",
        &format!("{} a modifié le compte {}.", auth.display_name, user.email),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(UserDto::from(user)))
}

async fn delete_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user_id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if deleted.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Utilisateur introuvable." })));
    }

    log_activity(
        &state.db,
        "user_deleted",
        &format!("{} a supprimé le compte {}.", auth.display_name, user_id),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({})))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Kpi {
    total_users: i64,
    total_clients: i64,
    total_artisans: i64,
    total_agents: i64,
    total_projects: i64,
    total_bookings: i64,
    completed_projects: i64,
    conversion_rate: f64,
}

#[derive(Serialize)]
struct DayCount {
    date: String,
    count: i64,
}

#[derive(Serialize)]
struct StatusCount {
    status: ProjectStatus,
    count: i64,
}

async fn statistics(state: web::Data<AppState>) -> Result<HttpResponse> {
    let total_users = count(&state, "SELECT COUNT(*) FROM users").await;
    let total_clients =
        count_bound(&state, "SELECT COUNT(*) FROM users WHERE role = ?", &["client"]).await;
    let total_artisans =
        count_bound(&state, "SELECT COUNT(*) FROM users WHERE role = ?", &["artisan"]).await;
    let total_agents =
        count_bound(&state, "SELECT COUNT(*) FROM users WHERE role = ?", &["agent"]).await;
    let total_projects = count(&state, "SELECT COUNT(*) FROM projects").await;
    let total_bookings = count(&state, "SELECT COUNT(*) FROM express_bookings").await;
    let completed_projects = count_bound(
        &state,
        "SELECT COUNT(*) FROM projects WHERE status = ?",
        &["completed"],
    )
    .await;

    let conversion_rate = if total_projects > 0 {
        (completed_projects as f64 * 1000.0 / total_projects as f64).round() / 10.0
    } else {
        0.0
    };

    let today = Utc::now().date_naive();
    let mut projects_last7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let day = today - Duration::days(offset);
        let next = day + Duration::days(1);
        let day_label = day.format("%Y-%m-%d").to_string();
        let next_label = next.format("%Y-%m-%d").to_string();
        let count = count_bound(
            &state,
            "SELECT COUNT(*) FROM projects WHERE created_at >= ? AND created_at < ?",
            &[day_label.as_str(), next_label.as_str()],
        )
        .await;
        projects_last7_days.push(DayCount { date: day_label, count });
    }

    let mut projects_by_status = Vec::with_capacity(ProjectStatus::ALL.len());
    for status in ProjectStatus::ALL {
        let count = count_bound(
            &state,
            "SELECT COUNT(*) FROM projects WHERE status = ?",
            &[status.as_str()],
        )
        .await;
        projects_by_status.push(StatusCount { status, count });
    }

    Ok(HttpResponse::Ok().json(json!({
        "kpi": Kpi {
            total_users,
            total_clients,
            total_artisans,
            total_agents,
            total_projects,
            total_bookings,
            completed_projects,
            conversion_rate,
        },
        "projectsLast7Days": projects_last7_days,
        "projectsByStatus": projects_by_status,
    })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDto {
    message: String,
    created_at: String,
}

async fn recent_activities(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY created_at DESC LIMIT 20",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let data: Vec<ActivityDto> = rows
        .into_iter()
        .map(|row| ActivityDto {
            message: row.message,
            created_at: row.created_at,
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "data": data })))
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    phone: String,
    status: UserStatus,
    created_at: String,
    project_count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientDto {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    phone: String,
    status: UserStatus,
    created_at: String,
    project_count: i64,
}

async fn list_clients(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, ClientRow>(
        r#"SELECT u.id, u.email, u.first_name, u.last_name, u.phone, u.status, u.created_at,
                  (SELECT COUNT(*) FROM projects p WHERE p.client_id = u.id) AS project_count
           FROM users u
           WHERE u.role = 'client'
           ORDER BY u.created_at DESC"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let clients: Vec<ClientDto> = rows
        .into_iter()
        .map(|row| ClientDto {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            status: row.status,
            created_at: row.created_at,
            project_count: row.project_count,
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "clients": clients })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingDto {
    key: String,
    value: String,
    updated_at: String,
}

async fn list_settings(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, SettingRow>(
        "SELECT key, value, updated_at FROM settings ORDER BY key",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let data: Vec<SettingDto> = rows
        .into_iter()
        .map(|row| SettingDto {
            key: row.key,
            value: row.value,
            updated_at: row.updated_at,
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "data": data })))
}

#[derive(Deserialize)]
struct SettingPayload {
    key: String,
    value: String,
}

async fn save_setting(
    state: web::Data<AppState>,
    payload: web::Json<SettingPayload>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    if payload.key.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": "La clé est requise." })));
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO settings (key, value, updated_at, updated_by)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by"#,
    )
    .bind(payload.key.trim())
    .bind(&payload.value)
    .bind(&now)
    .bind(&auth.id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "setting_updated",
        &format!("{} a modifié le paramètre {}.", auth.display_name, payload.key.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_text_splits_on_newlines_and_drops_blanks() {
        let parsed = parse_features("Devis illimités\n\n  Support prioritaire  \nBadge vérifié\n");
        assert_eq!(
            parsed,
            vec!["Devis illimités", "Support prioritaire", "Badge vérifié"]
        );
    }

    #[test]
    fn features_list_input_is_trimmed() {
        let normalized = FeaturesInput::List(vec![
            " Devis illimités ".into(),
            "".into(),
            "Badge vérifié".into(),
        ])
        .normalize();
        assert_eq!(normalized, vec!["Devis illimités", "Badge vérifié"]);
    }

    #[test]
    fn empty_features_text_yields_no_entries() {
        assert!(parse_features("").is_empty());
        assert!(parse_features("\n \n").is_empty());
    }
}

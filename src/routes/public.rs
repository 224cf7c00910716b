use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{authenticate_credentials, clear_logout_cookie, logout_cookie, new_id, AUTH_REALM},
    db::log_activity,
    email,
    models::{BookingStatus, CategoryRow, ExpressBookingRow, Role, ServiceRow, TimeSlot, UserRow},
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(
            web::resource("/register/details")
                .route(web::get().to(registration_details))
                .route(web::post().to(submit_registration)),
        )
        .service(web::resource("/api/register").route(web::post().to(register_api)))
        .service(web::resource("/api/express/services").route(web::get().to(express_services)))
        .service(
            web::resource("/api/express/bookings").route(web::post().to(create_express_booking)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

fn portal_target(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin/dashboard",
        Role::Artisan => "/artisan/dashboard",
        Role::Agent => "/agent/dashboard",
        Role::Client => "/",
    }
}

fn portal_prefix(role: Role) -> Option<&'static str> {
    match role {
        Role::Admin => Some("/admin"),
        Role::Artisan => Some("/artisan"),
        Role::Agent => Some("/agent"),
        Role::Client => None,
    }
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state, email, password).await {
        Some(user) => user,
        None => return auth_challenge(),
    };

    let requested = query.next.as_deref().unwrap_or("");
    let requested = if requested.starts_with('/') { requested } else { "" };
    let fallback = portal_target(user.role);

    let redirect = match portal_prefix(user.role) {
        Some(prefix) if requested.starts_with(prefix) => requested,
        _ => fallback,
    };

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Debug, Clone, Serialize)]
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

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpressServiceDto {
    id: String,
    name: String,
    description: String,
    category_id: String,
    category_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceLiteDto {
    id: String,
    name: String,
    description: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServicesByCategoryEntry {
    category: CategoryDto,
    services: Vec<ServiceLiteDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpressServicesResponse {
    services: Vec<ExpressServiceDto>,
    services_by_category: Vec<ServicesByCategoryEntry>,
}

async fn express_services(state: web::Data<AppState>) -> Result<HttpResponse> {
    let categories = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, icon, description FROM categories ORDER BY name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let services = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, category_id, name, description FROM services ORDER BY name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let flat: Vec<ExpressServiceDto> = services
        .iter()
        .map(|service| {
            let category_name = categories
                .iter()
                .find(|category| category.id == service.category_id)
                .map(|category| category.name.clone())
                .unwrap_or_default();
            ExpressServiceDto {
                id: service.id.clone(),
                name: service.name.clone(),
                description: service.description.clone(),
                category_id: service.category_id.clone(),
                category_name,
            }
        })
        .collect();

    let grouped = categories
        .into_iter()
        .map(|category| {
            let members = services
                .iter()
                .filter(|service| service.category_id == category.id)
                .map(|service| ServiceLiteDto {
                    id: service.id.clone(),
                    name: service.name.clone(),
                    description: service.description.clone(),
                })
                .collect();
            ServicesByCategoryEntry {
                category: category.into(),
                services: members,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(ExpressServicesResponse {
        services: flat,
        services_by_category: grouped,
    }))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time_slot: Option<TimeSlot>,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_phone: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
}

/// The submit gate: one pure completeness predicate over the whole payload,
/// recomputed on every request, no per-field memory.
fn missing_fields(payload: &BookingPayload) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if payload.date.trim().is_empty() {
        missing.push("date");
    }
    if payload.time_slot.is_none() {
        missing.push("timeSlot");
    }
    if payload.client_name.trim().is_empty() {
        missing.push("clientName");
    }
    if payload.client_phone.trim().is_empty() {
        missing.push("clientPhone");
    }
    if payload.client_email.trim().is_empty() {
        missing.push("clientEmail");
    }
    if payload.address.trim().is_empty() {
        missing.push("address");
    }
    if payload.city.trim().is_empty() {
        missing.push("city");
    }
    if payload.postal_code.trim().is_empty() {
        missing.push("postalCode");
    }
    missing
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingDto {
    id: String,
    service_id: String,
    scheduled_date: String,
    time_slot: TimeSlot,
    client_name: String,
    client_phone: String,
    client_email: String,
    address: String,
    city: String,
    postal_code: String,
    status: BookingStatus,
    created_at: String,
}

impl From<ExpressBookingRow> for BookingDto {
    fn from(row: ExpressBookingRow) -> Self {
        Self {
            id: row.id,
            service_id: row.service_id,
            scheduled_date: row.scheduled_date,
            time_slot: row.time_slot,
            client_name: row.client_name,
            client_phone: row.client_phone,
            client_email: row.client_email,
            address: row.address,
            city: row.city,
            postal_code: row.postal_code,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

async fn create_express_booking(
    state: web::Data<AppState>,
    payload: web::Json<BookingPayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();

    let missing = missing_fields(&payload);
    if !missing.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": format!("Champs obligatoires manquants : {}.", missing.join(", "))
        })));
    }

    let service = sqlx::query_as::<_, (String, String)>(
        "SELECT s.id, s.name FROM services s WHERE s.id = ? LIMIT 1",
    )
    .bind(payload.service_id.trim())
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);

    let Some((service_id, service_name)) = service else {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": "Prestation inconnue." })));
    };

    let Some(time_slot) = payload.time_slot else {
        return Ok(HttpResponse::BadRequest()
            .json(json!({ "error": "Champs obligatoires manquants : timeSlot." })));
    };
    let booking_id = new_id();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO express_bookings
           (id, service_id, scheduled_date, time_slot, client_name, client_phone, client_email,
            address, city, postal_code, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&booking_id)
    .bind(&service_id)
    .bind(payload.date.trim())
    .bind(time_slot)
    .bind(payload.client_name.trim())
    .bind(payload.client_phone.trim())
    .bind(payload.client_email.trim())
    .bind(payload.address.trim())
    .bind(payload.city.trim())
    .bind(payload.postal_code.trim())
    .bind(BookingStatus::Pending)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "booking_created",
        &format!("Nouvelle demande express de {}.", payload.client_name.trim()),
        None,
        Some(&booking_id),
    )
    .await;

    let row = crate::db::fetch_booking(&state.db, &booking_id)
        .await
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("booking vanished"))?;

    email::notify_booking_received(&state, &row, &service_name).await;

    let _ = state.events.send(ServerEvent::from_booking("booking_created", &row));

    Ok(HttpResponse::Created().json(BookingDto::from(row)))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: String,
}

fn validate_registration(payload: &RegisterPayload) -> Result<Role, Vec<String>> {
    let mut errors = Vec::new();
    let role = Role::registerable(payload.role.trim());
    if role.is_none() {
        errors.push("Rôle invalide.".to_string());
    }
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        errors.push("Adresse email invalide.".to_string());
    }
    if payload.first_name.trim().is_empty() {
        errors.push("Le prénom est requis.".to_string());
    }
    if payload.last_name.trim().is_empty() {
        errors.push("Le nom est requis.".to_string());
    }
    if payload.password.len() < 6 {
        errors.push("Le mot de passe doit contenir au moins 6 caractères.".to_string());
    }
    if let Some(role) = role {
        if role.requires_company()
            && payload.company.as_deref().unwrap_or("").trim().is_empty()
        {
            errors.push("Le nom de l'entreprise est requis.".to_string());
        }
    }

    match role {
        Some(role) if errors.is_empty() => Ok(role),
        _ => Err(errors),
    }
}

#[derive(Debug)]
enum RegistrationError {
    EmailTaken,
    HashFailure,
    Database(sqlx::Error),
}

async fn create_account(
    state: &AppState,
    payload: &RegisterPayload,
    role: Role,
) -> std::result::Result<UserRow, RegistrationError> {
    let email = payload.email.trim().to_lowercase();

    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE email = ? LIMIT 1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await
        .map_err(RegistrationError::Database)?;
    if existing.is_some() {
        return Err(RegistrationError::EmailTaken);
    }

    let password_hash = crate::auth::hash_password(&payload.password)
        .map_err(|_| RegistrationError::HashFailure)?;
    let user_id = new_id();
    let now = Utc::now().to_rfc3339();
    let company = payload
        .company
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, first_name, last_name, company, phone, role, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?)"#,
    )
    .bind(&user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&company)
    .bind(payload.phone.trim())
    .bind(role)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(RegistrationError::Database)?;

    if role == Role::Artisan {
        sqlx::query(
            r#"INSERT INTO artisan_profiles (user_id, company, updated_at)
               VALUES (?, ?, ?)"#,
        )
        .bind(&user_id)
        .bind(company.as_deref().unwrap_or(""))
        .bind(&now)
        .execute(&state.db)
        .await
        .map_err(RegistrationError::Database)?;
    }

    let row = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, password_hash, first_name, last_name, company, phone, role, status, created_at
           FROM users WHERE id = ? LIMIT 1"#,
    )
    .bind(&user_id)
    .fetch_one(&state.db)
    .await
    .map_err(RegistrationError::Database)?;

    Ok(row)
}

async fn register_api(
    state: web::Data<AppState>,
    payload: web::Json<RegisterPayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    let role = match validate_registration(&payload) {
        Ok(role) => role,
        Err(errors) => {
            return Ok(HttpResponse::BadRequest().json(json!({ "error": errors.join(" ") })));
        }
    };

    match create_account(&state, &payload, role).await {
        Ok(user) => {
            log_activity(
                &state.db,
                "account_created",
                &format!("Nouveau compte {} ({}).", user.email, role.as_str()),
                Some(&user.id),
                None,
            )
            .await;
            email::notify_welcome(&state, &user.email, &user.first_name).await;
            Ok(HttpResponse::Ok().json(json!({})))
        }
        Err(RegistrationError::EmailTaken) => Ok(HttpResponse::Conflict()
            .json(json!({ "error": "Un compte existe déjà avec cet email." }))),
        Err(RegistrationError::HashFailure) => {
            Err(actix_web::error::ErrorInternalServerError("hash failure"))
        }
        Err(RegistrationError::Database(err)) => {
            Err(actix_web::error::ErrorInternalServerError(err))
        }
    }
}

#[derive(Deserialize)]
struct RoleQuery {
    role: Option<String>,
}

/// The role parameter arrives through the URL and is untrusted; anything
/// outside the whitelist bounces back to role selection.
async fn registration_details(query: web::Query<RoleQuery>) -> HttpResponse {
    let role = query.role.as_deref().unwrap_or("");
    match Role::registerable(role) {
        Some(role) => HttpResponse::Ok().json(json!({
            "role": role,
            "companyRequired": role.requires_company(),
        })),
        None => HttpResponse::SeeOther()
            .append_header((header::LOCATION, "/register"))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub accept_terms: Option<String>,
}

impl RegistrationForm {
    fn terms_accepted(&self) -> bool {
        matches!(self.accept_terms.as_deref(), Some("on" | "true" | "1"))
    }

    fn payload(&self) -> RegisterPayload {
        RegisterPayload {
            email: self.email.clone(),
            password: self.password.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            company: self.company.clone(),
            phone: self.phone.clone(),
            role: self.role.clone(),
        }
    }
}

/// Runs the form-level gates before any account is touched: exact password
/// confirmation and terms acceptance, on top of the shared field rules.
fn validate_registration_form(form: &RegistrationForm) -> Result<Role, Vec<String>> {
    let mut errors = Vec::new();
    if form.password != form.confirm_password {
        errors.push("Les mots de passe ne correspondent pas.".to_string());
    }
    if !form.terms_accepted() {
        errors.push("Vous devez accepter les conditions générales.".to_string());
    }

    match validate_registration(&form.payload()) {
        Ok(role) if errors.is_empty() => Ok(role),
        Ok(_) => Err(errors),
        Err(mut field_errors) => {
            errors.append(&mut field_errors);
            Err(errors)
        }
    }
}

async fn submit_registration(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<RegistrationForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let role = match validate_registration_form(&form) {
        Ok(role) => role,
        Err(errors) => {
            return Ok(HttpResponse::BadRequest().json(json!({ "errors": errors })));
        }
    };

    let payload = form.payload();
    let user = match create_account(&state, &payload, role).await {
        Ok(user) => user,
        Err(RegistrationError::EmailTaken) => {
            return Ok(HttpResponse::Conflict()
                .json(json!({ "errors": ["Un compte existe déjà avec cet email."] })));
        }
        Err(RegistrationError::HashFailure) => {
            return Err(actix_web::error::ErrorInternalServerError("hash failure"));
        }
        Err(RegistrationError::Database(err)) => {
            return Err(actix_web::error::ErrorInternalServerError(err));
        }
    };

    log_activity(
        &state.db,
        "account_created",
        &format!("Nouveau compte {} ({}).", user.email, role.as_str()),
        Some(&user.id),
        None,
    )
    .await;
    email::notify_welcome(&state, &user.email, &user.first_name).await;

    // Artisans go straight into onboarding when the automatic sign-in
    // succeeds; any failure degrades to the generic success screen.
    let redirect = if role == Role::Artisan {
        match authenticate_credentials(&state, &user.email, &payload.password).await {
            Some(_) => "/artisan/onboarding",
            None => {
                log::warn!("Automatic sign-in failed for fresh artisan {}", user.email);
                "/register/success"
            }
        }
    } else {
        "/register/success"
    };

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_booking() -> BookingPayload {
        BookingPayload {
            service_id: "plumb-repair".into(),
            date: "2026-09-01".into(),
            time_slot: Some(TimeSlot::Morning),
            client_name: "Jean Dupont".into(),
            client_phone: "0612345678".into(),
            client_email: "jean@exemple.fr".into(),
            address: "12 rue des Lilas".into(),
            city: "Lyon".into(),
            postal_code: "69003".into(),
        }
    }

    #[test]
    fn booking_gate_passes_with_every_field_present() {
        assert!(missing_fields(&complete_booking()).is_empty());
    }

    #[test]
    fn booking_gate_fails_for_each_single_missing_field() {
        let blank_string_fields: [(&str, fn(&mut BookingPayload)); 7] = [
            ("date", |p| p.date.clear()),
            ("clientName", |p| p.client_name.clear()),
            ("clientPhone", |p| p.client_phone.clear()),
            ("clientEmail", |p| p.client_email.clear()),
            ("address", |p| p.address.clear()),
            ("city", |p| p.city.clear()),
            ("postalCode", |p| p.postal_code.clear()),
        ];
        for (field, blank) in blank_string_fields {
            let mut payload = complete_booking();
            blank(&mut payload);
            assert_eq!(missing_fields(&payload), vec![field]);
        }

        let mut payload = complete_booking();
        payload.time_slot = None;
        assert_eq!(missing_fields(&payload), vec!["timeSlot"]);
    }

    #[test]
    fn booking_gate_treats_whitespace_as_empty() {
        let mut payload = complete_booking();
        payload.city = "   ".into();
        assert_eq!(missing_fields(&payload), vec!["city"]);
    }

    fn complete_form(role: &str) -> RegistrationForm {
        RegistrationForm {
            email: "marie@exemple.fr".into(),
            password: "secret123".into(),
            confirm_password: "secret123".into(),
            first_name: "Marie".into(),
            last_name: "Martin".into(),
            company: Some("Martin BTP".into()),
            phone: "0712345678".into(),
            role: role.into(),
            accept_terms: Some("on".into()),
        }
    }

    #[test]
    fn mismatched_passwords_are_rejected_before_any_account_work() {
        for (password, confirm) in [
            ("secret123", "secret124"),
            ("a1b2c3", "c3b2a1"),
            ("longpassword", "longpassword "),
        ] {
            let mut form = complete_form("client");
            form.password = password.into();
            form.confirm_password = confirm.into();
            let errors = validate_registration_form(&form).unwrap_err();
            assert!(errors
                .iter()
                .any(|e| e.contains("ne correspondent pas")));
        }
    }

    #[test]
    fn unaccepted_terms_are_rejected() {
        let mut form = complete_form("client");
        form.accept_terms = None;
        assert!(validate_registration_form(&form).is_err());
        form.accept_terms = Some("off".into());
        assert!(validate_registration_form(&form).is_err());
    }

    #[test]
    fn whitelisted_roles_validate_and_others_do_not() {
        for role in ["client", "artisan", "agent"] {
            assert!(validate_registration_form(&complete_form(role)).is_ok());
        }
        for role in ["", "admin", "superuser", "<script>alert(1)</script>"] {
            let errors = validate_registration_form(&complete_form(role)).unwrap_err();
            assert!(errors.iter().any(|e| e.contains("Rôle invalide")));
        }
    }

    #[test]
    fn company_is_only_required_for_artisan_and_agent() {
        for role in ["artisan", "agent"] {
            let mut form = complete_form(role);
            form.company = None;
            let errors = validate_registration_form(&form).unwrap_err();
            assert!(errors.iter().any(|e| e.contains("entreprise")));
        }
        let mut form = complete_form("client");
        form.company = None;
        assert!(validate_registration_form(&form).is_ok());
    }

    #[test]
    fn short_passwords_are_rejected() {
        let mut form = complete_form("client");
        form.password = "abc".into();
        form.confirm_password = "abc".into();
        assert!(validate_registration_form(&form).is_err());
    }
}

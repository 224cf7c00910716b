use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::{header, StatusCode},
    test, web, App, Error,
};
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;

use reenove::models::Role;
use reenove::state::{AppState, MailerConfig};

async fn test_state() -> web::Data<AppState> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");
    reenove::db::run_migrations(&pool).await.expect("migrations");
    reenove::db::import_catalog(&pool).await.expect("catalog import");

    let (events, _) = broadcast::channel(8);
    web::Data::new(AppState {
        db: pool,
        events,
        mailer: MailerConfig {
            api_base: "http://localhost".to_string(),
            api_key: String::new(),
            sender: "Reenove <notifications@reenove.fr>".to_string(),
        },
    })
}

async fn spawn_app(
    state: web::Data<AppState>,
) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = Error> {
    test::init_service(
        App::new()
            .app_data(state)
            .configure(reenove::routes::public::configure)
            .configure(reenove::routes::wizard::configure)
            .configure(reenove::routes::admin::configure)
            .configure(reenove::routes::artisan::configure)
            .configure(reenove::routes::agent::configure)
            .configure(reenove::routes::events::configure),
    )
    .await
}

async fn create_user(state: &web::Data<AppState>, email: &str, password: &str, role: Role) -> String {
    let user_id = reenove::auth::new_id();
    let hash = reenove::auth::hash_password(password).expect("hash");
    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, first_name, last_name, company, phone, role, status, created_at)
           VALUES (?, ?, ?, 'Test', 'User', NULL, '', ?, 'active', ?)"#,
    )
    .bind(&user_id)
    .bind(email)
    .bind(&hash)
    .bind(role)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .expect("insert user");
    user_id
}

fn basic_auth(email: &str, password: &str) -> (header::HeaderName, String) {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{email}:{password}"));
    (header::AUTHORIZATION, format!("Basic {token}"))
}

fn location_of<B>(resp: &ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[actix_web::test]
async fn register_then_login_redirects_by_role() {
    let state = test_state().await;
    let app = spawn_app(state.clone()).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({
                "email": "claire@exemple.fr",
                "password": "secret123",
                "firstName": "Claire",
                "lastName": "Petit",
                "phone": "0611223344",
                "role": "client",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Same email twice is a conflict.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({
                "email": "claire@exemple.fr",
                "password": "secret123",
                "firstName": "Claire",
                "lastName": "Petit",
                "phone": "0611223344",
                "role": "client",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("existe déjà"));

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/login")
            .insert_header(basic_auth("claire@exemple.fr", "secret123"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&resp), "/");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/login")
            .insert_header(basic_auth("claire@exemple.fr", "wrong"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn role_parameter_is_whitelisted_on_the_details_screen() {
    let state = test_state().await;
    let app = spawn_app(state).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/register/details?role=artisan")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["role"], "artisan");
    assert_eq!(body["companyRequired"], true);

    for uri in [
        "/register/details?role=superuser",
        "/register/details?role=",
        "/register/details",
        "/register/details?role=%3Cscript%3E",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "uri: {uri}");
        assert_eq!(location_of(&resp), "/register");
    }
}

#[actix_web::test]
async fn mismatched_passwords_never_create_an_account() {
    let state = test_state().await;
    let app = spawn_app(state.clone()).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/register/details")
            .set_form([
                ("email", "paul@exemple.fr"),
                ("password", "secret123"),
                ("confirmPassword", "secret124"),
                ("firstName", "Paul"),
                ("lastName", "Roux"),
                ("phone", "0655443322"),
                ("role", "client"),
                ("acceptTerms", "on"),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(users, 0);
}

#[actix_web::test]
async fn artisan_registration_lands_in_onboarding() {
    let state = test_state().await;
    let app = spawn_app(state.clone()).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/register/details")
            .set_form([
                ("email", "luc@exemple.fr"),
                ("password", "secret123"),
                ("confirmPassword", "secret123"),
                ("firstName", "Luc"),
                ("lastName", "Bernard"),
                ("company", "Bernard Élec"),
                ("phone", "0655443322"),
                ("role", "artisan"),
                ("acceptTerms", "on"),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&resp), "/artisan/onboarding");

    // The artisan profile shell is created alongside the account.
    let profiles = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM artisan_profiles")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(profiles, 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/register/details")
            .set_form([
                ("email", "anne@exemple.fr"),
                ("password", "secret123"),
                ("confirmPassword", "secret123"),
                ("firstName", "Anne"),
                ("lastName", "Faure"),
                ("phone", "0655443311"),
                ("role", "client"),
                ("acceptTerms", "on"),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&resp), "/register/success");
}

#[actix_web::test]
async fn admin_manages_categories_and_reimports_the_catalog() {
    let state = test_state().await;
    create_user(&state, "admin@reenove.fr", "admin-pass", Role::Admin).await;
    let app = spawn_app(state.clone()).await;
    let auth = basic_auth("admin@reenove.fr", "admin-pass");

    // Guarded without credentials.
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/admin/categories").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/admin/categories")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 6);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/admin/categories")
            .insert_header(auth.clone())
            .set_json(json!({ "name": "Serrurerie", "icon": "key" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let category_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "Serrurerie");

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri(&format!("/api/admin/categories/{category_id}"))
            .insert_header(auth.clone())
            .set_json(json!({ "name": "Serrurerie & Sécurité", "icon": "lock" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["name"], "Serrurerie & Sécurité");
    assert_eq!(updated["icon"], "lock");

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/admin/categories/{category_id}"))
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/admin/categories/{category_id}"))
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/admin/categories/import")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("Catalogue importé"));

    // Every admin action above left a trace in the audit feed.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/admin/activities")
            .insert_header(auth)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(!body["data"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn user_listing_paginates_and_filters() {
    let state = test_state().await;
    create_user(&state, "admin@reenove.fr", "admin-pass", Role::Admin).await;
    for index in 0..12 {
        create_user(&state, &format!("client{index}@exemple.fr"), "secret123", Role::Client).await;
    }
    create_user(&state, "pro@exemple.fr", "secret123", Role::Artisan).await;
    let app = spawn_app(state).await;
    let auth = basic_auth("admin@reenove.fr", "admin-pass");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/users?role=client&page=2&limit=10")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 12);
    assert_eq!(body["pagination"]["pages"], 2);
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["limit"], 10);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/users?search=client3")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
    assert_eq!(body["users"][0]["email"], "client3@exemple.fr");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/users?role=wizardry")
            .insert_header(auth)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn admin_patches_and_deletes_a_user() {
    let state = test_state().await;
    create_user(&state, "admin@reenove.fr", "admin-pass", Role::Admin).await;
    let user_id = create_user(&state, "cible@exemple.fr", "secret123", Role::Client).await;
    let app = spawn_app(state).await;
    let auth = basic_auth("admin@reenove.fr", "admin-pass");

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/users/{user_id}"))
            .insert_header(auth.clone())
            .set_json(json!({ "status": "blocked", "firstName": "Renommée" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "blocked");
    assert_eq!(body["firstName"], "Renommée");
    assert_eq!(body["email"], "cible@exemple.fr");

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/users/{user_id}"))
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/users/{user_id}"))
            .insert_header(auth)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn express_catalog_and_booking_flow() {
    let state = test_state().await;
    let app = spawn_app(state).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/express/services").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(!body["services"].as_array().unwrap().is_empty());
    assert_eq!(body["servicesByCategory"].as_array().unwrap().len(), 6);

    let valid = json!({
        "serviceId": "plumb-repair",
        "date": "2026-09-01",
        "timeSlot": "morning",
        "clientName": "Jean Dupont",
        "clientPhone": "0612345678",
        "clientEmail": "jean@exemple.fr",
        "address": "12 rue des Lilas",
        "city": "Lyon",
        "postalCode": "69003",
    });

    let mut missing_city = valid.clone();
    missing_city["city"] = json!("");
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/express/bookings")
            .set_json(missing_city)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("city"));

    let mut unknown_service = valid.clone();
    unknown_service["serviceId"] = json!("jetpack-repair");
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/express/bookings")
            .set_json(unknown_service)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/express/bookings")
            .set_json(valid)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert_eq!(body["status"], "pending");
    assert_eq!(body["serviceId"], "plumb-repair");
    assert_eq!(body["timeSlot"], "morning");
}

fn first_set_cookie<B>(resp: &ServiceResponse<B>) -> String {
    let raw = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("visitor cookie issued");
    raw.split(';').next().unwrap().to_string()
}

#[actix_web::test]
async fn wizard_flow_from_fresh_state_to_confirmed_draft() {
    let state = test_state().await;
    let app = spawn_app(state).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/wizard").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = first_set_cookie(&resp);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["step"], "categoryChoice");
    assert_eq!(body["categories"].as_array().unwrap().len(), 6);
    assert!(body["services"].as_array().unwrap().is_empty());

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/wizard/category")
            .insert_header((header::COOKIE, cookie.clone()))
            .set_json(json!({ "categoryId": "plumbing" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["step"], "serviceChoice");
    let service_ids: Vec<&str> = body["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|service| service["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        service_ids,
        vec!["plumb-install", "plumb-repair", "plumb-heating", "plumb-bathroom"]
    );

    // A service from another category is refused at confirm time.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/wizard/confirm")
            .insert_header((header::COOKIE, cookie.clone()))
            .set_json(json!({ "serviceId": "elec-lighting" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/wizard/confirm")
            .insert_header((header::COOKIE, cookie.clone()))
            .set_json(json!({ "serviceId": "plumb-repair" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["nextStep"], "/projet/nouveau/details");
    assert_eq!(body["draft"]["category"], "Plomberie");
    assert_eq!(body["draft"]["categoryId"], "plumbing");
    assert_eq!(body["draft"]["service"], "Réparation de fuite");
    assert_eq!(body["draft"]["serviceId"], "plumb-repair");
    assert_eq!(body["draft"]["title"], "");
    assert_eq!(body["draft"]["description"], "");

    // Resume lands back in the service step with both selections primed.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/wizard")
            .insert_header((header::COOKIE, cookie))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["step"], "serviceChoice");
    assert_eq!(body["selectedCategory"], "plumbing");
    assert_eq!(body["selectedService"], "plumb-repair");
}

#[actix_web::test]
async fn statistics_report_kpis_and_series() {
    let state = test_state().await;
    create_user(&state, "admin@reenove.fr", "admin-pass", Role::Admin).await;
    let client_id = create_user(&state, "client@exemple.fr", "secret123", Role::Client).await;
    sqlx::query(
        r#"INSERT INTO projects (id, client_id, artisan_id, title, description, category_id, service_id, status, created_at)
           VALUES (?, ?, NULL, 'Fuite cuisine', '', 'plumbing', 'plumb-repair', 'pending', ?)"#,
    )
    .bind(reenove::auth::new_id())
    .bind(&client_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .unwrap();

    let app = spawn_app(state).await;
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/admin/statistics")
            .insert_header(basic_auth("admin@reenove.fr", "admin-pass"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kpi"]["totalProjects"], 1);
    assert_eq!(body["kpi"]["totalClients"], 1);
    assert_eq!(body["projectsLast7Days"].as_array().unwrap().len(), 7);
    assert_eq!(body["projectsByStatus"].as_array().unwrap().len(), 5);
    // Today's bucket carries the fresh project.
    assert_eq!(body["projectsLast7Days"][6]["count"], 1);
}

#[actix_web::test]
async fn artisan_dashboard_profile_and_projects() {
    let state = test_state().await;
    let artisan_id = create_user(&state, "pro@exemple.fr", "secret123", Role::Artisan).await;
    sqlx::query(
        "INSERT INTO artisan_profiles (user_id, company, updated_at) VALUES (?, 'Pro Rénov', ?)",
    )
    .bind(&artisan_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .unwrap();
    sqlx::query(
        r#"INSERT INTO projects (id, client_id, artisan_id, title, description, category_id, service_id, status, created_at)
           VALUES (?, NULL, NULL, 'Salle de bain', '', 'plumbing', 'plumb-bathroom', 'pending', ?)"#,
    )
    .bind(reenove::auth::new_id())
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .unwrap();

    let app = spawn_app(state).await;
    let auth = basic_auth("pro@exemple.fr", "secret123");

    // A client's credentials cannot reach the artisan scope.
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/artisan/dashboard").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/artisan/dashboard")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["stats"]["pendingQuotes"], 1);
    assert_eq!(body["data"]["onboardingComplete"], false);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/artisan/profile")
            .insert_header(auth.clone())
            .set_form([
                ("company", "Pro Rénov"),
                ("trade", "Plomberie"),
                ("description", "Plombier chauffagiste depuis 2012."),
                ("serviceArea", "Lyon et alentours"),
                ("hourlyRate", "5500"),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["onboardingComplete"], true);
    assert_eq!(body["hourlyRateCents"], 5500);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/artisan/projets")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    let projects = body["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    let project_id = projects[0]["id"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/artisan/projets/nope")
            .insert_header(auth.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    // Quoting an unassigned request claims it for this artisan.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/artisan/projets/{project_id}/status"))
            .insert_header(auth)
            .set_form([("status", "quoted")])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["project"]["status"], "quoted");
}

#[actix_web::test]
async fn agent_referrals_carry_server_side_aggregates() {
    let state = test_state().await;
    let agent_id = create_user(&state, "agent@exemple.fr", "secret123", Role::Agent).await;
    for (kind, status, commission) in [
        ("artisan", "converted", 5000_i64),
        ("artisan", "pending", 0),
        ("project", "converted", 2500),
        ("client", "expired", 0),
    ] {
        sqlx::query(
            r#"INSERT INTO referrals (id, agent_id, kind, referred_name, status, commission_cents, created_at)
               VALUES (?, ?, ?, 'Référé', ?, ?, ?)"#,
        )
        .bind(reenove::auth::new_id())
        .bind(&agent_id)
        .bind(kind)
        .bind(status)
        .bind(commission)
        .bind(Utc::now().to_rfc3339())
        .execute(&state.db)
        .await
        .unwrap();
    }

    let app = spawn_app(state).await;
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/agent/referrals")
            .insert_header(basic_auth("agent@exemple.fr", "secret123"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["referrals"].as_array().unwrap().len(), 4);
    assert_eq!(body["stats"]["totalCommissionCents"], 7500);
    assert_eq!(body["stats"]["convertedCount"], 2);
    assert_eq!(body["stats"]["pendingCount"], 1);
    assert_eq!(body["stats"]["conversionRate"], 50.0);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/agent/artisans")
            .insert_header(basic_auth("agent@exemple.fr", "secret123"))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["artisans"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn logout_cookie_blocks_authenticated_scopes_until_login() {
    let state = test_state().await;
    create_user(&state, "admin@reenove.fr", "admin-pass", Role::Admin).await;
    let app = spawn_app(state).await;
    let auth = basic_auth("admin@reenove.fr", "admin-pass");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/logout").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let logout_cookie = first_set_cookie(&resp);

    // The browser still holds valid Basic credentials, but the logout cookie
    // wins until a fresh login clears it.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/admin/categories")
            .insert_header(auth.clone())
            .insert_header((header::COOKIE, logout_cookie))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/login?next=/admin/dashboard")
            .insert_header(auth)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location_of(&resp), "/admin/dashboard");
}

use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{new_id, visitor_cookie, VISITOR_COOKIE},
    catalog,
    state::AppState,
    wizard::{self, ProjectDraft, SelectionWizard, WizardError, WizardStep},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/wizard").route(web::get().to(snapshot)))
        .service(web::resource("/api/wizard/category").route(web::post().to(select_category)))
        .service(web::resource("/api/wizard/back").route(web::post().to(go_back)))
        .service(web::resource("/api/wizard/confirm").route(web::post().to(confirm)));
}

/// The wizard is anonymous; progress is keyed by a long-lived visitor
/// cookie issued on first contact.
fn visitor_of(req: &HttpRequest) -> (String, bool) {
    match req.cookie(VISITOR_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => (cookie.value().to_string(), false),
        _ => (new_id(), true),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WizardCategoryDto {
    id: &'static str,
    name: &'static str,
    icon: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WizardServiceDto {
    id: &'static str,
    name: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WizardSnapshot {
    step: WizardStep,
    selected_category: Option<String>,
    selected_service: Option<String>,
    categories: Vec<WizardCategoryDto>,
    services: Vec<WizardServiceDto>,
}

fn snapshot_of(machine: &SelectionWizard) -> WizardSnapshot {
    WizardSnapshot {
        step: machine.step(),
        selected_category: machine.selected_category().map(str::to_string),
        selected_service: machine.selected_service().map(str::to_string),
        categories: catalog::categories()
            .iter()
            .map(|category| WizardCategoryDto {
                id: category.id,
                name: category.name,
                icon: category.icon,
                description: category.description,
            })
            .collect(),
        services: machine
            .available_services()
            .iter()
            .map(|service| WizardServiceDto {
                id: service.id,
                name: service.name,
                description: service.description,
            })
            .collect(),
    }
}

fn respond(
    req: &HttpRequest,
    visitor_id: &str,
    is_new: bool,
    body: impl Serialize,
) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    if is_new {
        builder.cookie(visitor_cookie(req, visitor_id));
    }
    builder.json(body)
}

fn wizard_error_message(err: &WizardError) -> &'static str {
    match err {
        WizardError::UnknownCategory => "Catégorie inconnue.",
        WizardError::ServiceOutsideCategory => {
            "Cette prestation n'appartient pas à la catégorie choisie."
        }
        WizardError::NoCategorySelected | WizardError::IncompleteSelection => {
            "Sélectionnez une catégorie et une prestation."
        }
    }
}

async fn snapshot(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (visitor_id, is_new) = visitor_of(&req);
    let stored = wizard::load(&state.db, &visitor_id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let machine = SelectionWizard::resume(stored.selected_category.as_deref(), stored.draft.as_ref());
    Ok(respond(&req, &visitor_id, is_new, snapshot_of(&machine)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryChoice {
    #[serde(default)]
    category_id: String,
}

async fn select_category(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<CategoryChoice>,
) -> Result<HttpResponse> {
    let (visitor_id, is_new) = visitor_of(&req);
    let stored = wizard::load(&state.db, &visitor_id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let mut machine =
        SelectionWizard::resume(stored.selected_category.as_deref(), stored.draft.as_ref());
    if let Err(err) = machine.select_category(payload.category_id.trim()) {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": wizard_error_message(&err) })));
    }

    wizard::save_category(&state.db, &visitor_id, payload.category_id.trim())
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(respond(&req, &visitor_id, is_new, snapshot_of(&machine)))
}

async fn go_back(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (visitor_id, is_new) = visitor_of(&req);
    let stored = wizard::load(&state.db, &visitor_id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let mut machine =
        SelectionWizard::resume(stored.selected_category.as_deref(), stored.draft.as_ref());
    machine.back();
    Ok(respond(&req, &visitor_id, is_new, snapshot_of(&machine)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceChoice {
    #[serde(default)]
    service_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    next_step: &'static str,
    draft: ProjectDraft,
}

async fn confirm(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<ServiceChoice>,
) -> Result<HttpResponse> {
    let (visitor_id, is_new) = visitor_of(&req);
    let stored = wizard::load(&state.db, &visitor_id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let mut machine =
        SelectionWizard::resume(stored.selected_category.as_deref(), stored.draft.as_ref());
    let confirmed = machine
        .select_service(payload.service_id.trim())
        .and_then(|_| machine.confirm());
    let confirmed = match confirmed {
        Ok(confirmed) => confirmed,
        Err(err) => {
            return Ok(
                HttpResponse::BadRequest().json(json!({ "error": wizard_error_message(&err) }))
            );
        }
    };

    let draft = wizard::merge_into_draft(&confirmed, stored.draft);
    wizard::save_draft(&state.db, &visitor_id, &draft)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(respond(
        &req,
        &visitor_id,
        is_new,
        ConfirmResponse {
            next_step: "/projet/nouveau/details",
            draft,
        },
    ))
}

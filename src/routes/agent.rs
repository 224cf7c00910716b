use actix_web::{middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Serialize;
use serde_json::json;

use crate::{
    auth::{agent_validator, logout_guard, AuthUser},
    models::{ReferralKind, ReferralRow, ReferralStatus},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/agent")
            .wrap(HttpAuthentication::basic(agent_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("/referrals").route(web::get().to(referrals)))
            .service(web::resource("/artisans").route(web::get().to(referred_artisans)))
            .service(web::resource("/projects").route(web::get().to(referred_projects))),
    );
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferralDto {
    id: String,
    kind: ReferralKind,
    referred_name: String,
    status: ReferralStatus,
    commission_cents: i64,
    created_at: String,
}

impl From<ReferralRow> for ReferralDto {
    fn from(row: ReferralRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            referred_name: row.referred_name,
            status: row.status,
            commission_cents: row.commission_cents,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferralStats {
    total_commission_cents: i64,
    pending_count: i64,
    converted_count: i64,
    conversion_rate: f64,
}

/// Commission only counts once a referral converts; the rate is a percent
/// rounded to one decimal.
fn referral_stats(rows: &[ReferralRow]) -> ReferralStats {
    let total_commission_cents = rows
        .iter()
        .filter(|row| row.status == ReferralStatus::Converted)
        .map(|row| row.commission_cents)
        .sum();
    let pending_count = rows
        .iter()
        .filter(|row| row.status == ReferralStatus::Pending)
        .count() as i64;
    let converted_count = rows
        .iter()
        .filter(|row| row.status == ReferralStatus::Converted)
        .count() as i64;
    let conversion_rate = if rows.is_empty() {
        0.0
    } else {
        (converted_count as f64 * 1000.0 / rows.len() as f64).round() / 10.0
    };

    ReferralStats {
        total_commission_cents,
        pending_count,
        converted_count,
        conversion_rate,
    }
}

async fn fetch_referrals(
    state: &web::Data<AppState>,
    agent_id: &str,
    kind: Option<ReferralKind>,
) -> Vec<ReferralRow> {
    let rows = match kind {
        Some(kind) => {
            sqlx::query_as::<_, ReferralRow>(
                r#"SELECT id, agent_id, kind, referred_name, status, commission_cents, created_at
                   FROM referrals
                   WHERE agent_id = ? AND kind = ?
                   ORDER BY created_at DESC"#,
            )
            .bind(agent_id)
            .bind(kind)
            .fetch_all(&state.db)
            .await
        }
        None => {
            sqlx::query_as::<_, ReferralRow>(
                r#"SELECT id, agent_id, kind, referred_name, status, commission_cents, created_at
                   FROM referrals
                   WHERE agent_id = ?
                   ORDER BY created_at DESC"#,
            )
            .bind(agent_id)
            .fetch_all(&state.db)
            .await
        }
    };
    rows.unwrap_or_default()
}

async fn referrals(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let rows = fetch_referrals(&state, &auth.id, None).await;
    let stats = referral_stats(&rows);
    let referrals: Vec<ReferralDto> = rows.into_iter().map(ReferralDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "referrals": referrals, "stats": stats })))
}

async fn referred_artisans(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let rows = fetch_referrals(&state, &auth.id, Some(ReferralKind::Artisan)).await;
    let stats = referral_stats(&rows);
    let artisans: Vec<ReferralDto> = rows.into_iter().map(ReferralDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "artisans": artisans, "stats": stats })))
}

async fn referred_projects(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let rows = fetch_referrals(&state, &auth.id, Some(ReferralKind::Project)).await;
    let stats = referral_stats(&rows);
    let projects: Vec<ReferralDto> = rows.into_iter().map(ReferralDto::from).collect();
    Ok(HttpResponse::Ok().json(json!({ "projects": projects, "stats": stats })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referral(status: ReferralStatus, commission_cents: i64) -> ReferralRow {
        ReferralRow {
            id: crate::auth::new_id(),
            agent_id: "agent-1".into(),
            kind: ReferralKind::Artisan,
            referred_name: "Martin BTP".into(),
            status,
            commission_cents,
            created_at: String::new(),
        }
    }

    #[test]
    fn stats_over_an_empty_list_are_all_zero() {
        let stats = referral_stats(&[]);
        assert_eq!(
            stats,
            ReferralStats {
                total_commission_cents: 0,
                pending_count: 0,
                converted_count: 0,
                conversion_rate: 0.0,
            }
        );
    }

    #[test]
    fn only_converted_referrals_earn_commission() {
        let rows = vec![
            referral(ReferralStatus::Converted, 5000),
            referral(ReferralStatus::Pending, 9999),
            referral(ReferralStatus::Converted, 2500),
            referral(ReferralStatus::Expired, 1000),
        ];
        let stats = referral_stats(&rows);
        assert_eq!(stats.total_commission_cents, 7500);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.converted_count, 2);
        assert_eq!(stats.conversion_rate, 50.0);
    }

    #[test]
    fn conversion_rate_is_rounded_to_one_decimal() {
        let rows = vec![
            referral(ReferralStatus::Converted, 100),
            referral(ReferralStatus::Pending, 0),
            referral(ReferralStatus::Pending, 0),
        ];
        let stats = referral_stats(&rows);
        assert_eq!(stats.conversion_rate, 33.3);
    }
}

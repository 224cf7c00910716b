use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    catalog,
    models::{ExpressBookingRow, ProjectRow, Role},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_catalog(pool).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    booking_id: Option<&str>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, booking_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(booking_id)
    .execute(pool)
    .await;
}

pub async fn fetch_booking(pool: &SqlitePool, booking_id: &str) -> Option<ExpressBookingRow> {
    sqlx::query_as::<_, ExpressBookingRow>(
        r#"SELECT id, service_id, scheduled_date, time_slot, client_name, client_phone,
                  client_email, address, city, postal_code, status, created_at
           FROM express_bookings
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await
    .unwrap_or(None)
}

pub async fn fetch_project(pool: &SqlitePool, project_id: &str) -> Option<ProjectRow> {
    sqlx::query_as::<_, ProjectRow>(
        r#"SELECT id, client_id, artisan_id, title, description, category_id, service_id,
                  status, created_at
           FROM projects
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await
    .unwrap_or(None)
}

/// Replays the static catalog into the categories/services tables. Existing
/// rows are refreshed in place so admin edits to copy are overwritten by a
/// re-import, matching the import endpoint's contract.
pub async fn import_catalog(pool: &SqlitePool) -> Result<(usize, usize), sqlx::Error> {
    let mut category_count = 0;
    let mut service_count = 0;

    for category in catalog::categories() {
        sqlx::query(
            r#"INSERT INTO categories (id, name, icon, description)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 icon = excluded.icon,
                 description = excluded.description"#,
        )
        .bind(category.id)
        .bind(category.name)
        .bind(category.icon)
        .bind(category.description)
        .execute(pool)
        .await?;
        category_count += 1;

        for service in category.services {
            sqlx::query(
                r#"INSERT INTO services (id, category_id, name, description)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT(id) DO UPDATE SET
                     category_id = excluded.category_id,
                     name = excluded.name,
                     description = excluded.description"#,
            )
            .bind(service.id)
            .bind(category.id)
            .bind(service.name)
            .bind(service.description)
            .execute(pool)
            .await?;
            service_count += 1;
        }
    }

    Ok((category_count, service_count))
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>(
        "SELECT id FROM users WHERE role = ? LIMIT 1",
    )
    .bind(Role::Admin)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@reenove.fr".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, first_name, last_name, company, phone, role, status, created_at)
           VALUES (?, ?, ?, ?, ?, NULL, '', ?, 'active', ?)"#,
    )
    .bind(new_id())
    .bind(email)
    .bind(password_hash)
    .bind("Admin")
    .bind("Reenove")
    .bind(Role::Admin)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_catalog(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    let (categories, services) = import_catalog(pool).await?;
    log::info!("Seeded catalog: {categories} categories, {services} services");
    Ok(())
}

use askama::Template;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    models::{ExpressBookingRow, TimeSlot},
    state::{AppState, MailerConfig},
};

pub const WELCOME_SUBJECT: &str = "Bienvenue sur Reenove !";
pub const QUOTE_SUBJECT: &str = "Votre demande de devis a bien été reçue";

#[derive(Template)]
#[template(path = "email_welcome.html")]
struct WelcomeEmail<'a> {
    first_name: &'a str,
}

#[derive(Template)]
#[template(path = "email_quote_confirmation.html")]
struct QuoteConfirmationEmail<'a> {
    client_name: &'a str,
    service_name: &'a str,
    scheduled_date: &'a str,
    time_slot: &'a str,
    city: &'a str,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("template render failed: {0}")]
    Render(#[from] askama::Error),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected the message: {0}")]
    Rejected(String),
    #[error("mailer is not configured")]
    Disabled,
}

#[derive(Debug, Deserialize)]
pub struct EmailReceipt {
    pub id: String,
}

pub async fn send_welcome_email(
    config: &MailerConfig,
    to: &str,
    first_name: &str,
) -> Result<EmailReceipt, EmailError> {
    let html = WelcomeEmail { first_name }.render()?;
    dispatch(config, to, WELCOME_SUBJECT, html).await
}

pub async fn send_quote_confirmation(
    config: &MailerConfig,
    to: &str,
    client_name: &str,
    service_name: &str,
    scheduled_date: &str,
    time_slot: TimeSlot,
    city: &str,
) -> Result<EmailReceipt, EmailError> {
    let html = QuoteConfirmationEmail {
        client_name,
        service_name,
        scheduled_date,
        time_slot: time_slot.label(),
        city,
    }
    .render()?;
    dispatch(config, to, QUOTE_SUBJECT, html).await
}

/// Fire-and-forget welcome notification used by the registration flow.
pub async fn notify_welcome(state: &AppState, to: &str, first_name: &str) {
    if !state.mailer.enabled() {
        log::info!("Mailer disabled, skipping welcome email to {to}");
        return;
    }
    match send_welcome_email(&state.mailer, to, first_name).await {
        Ok(receipt) => log::info!("Welcome email {} sent to {to}", receipt.id),
        Err(err) => log::warn!("Welcome email to {to} failed: {err}"),
    }
}

/// Fire-and-forget confirmation for a freshly created express booking.
pub async fn notify_booking_received(state: &AppState, booking: &ExpressBookingRow, service_name: &str) {
    if !state.mailer.enabled() {
        log::info!(
            "Mailer disabled, skipping quote confirmation for booking {}",
            booking.id
        );
        return;
    }
    let result = send_quote_confirmation(
        &state.mailer,
        &booking.client_email,
        &booking.client_name,
        service_name,
        &booking.scheduled_date,
        booking.time_slot,
        &booking.city,
    )
    .await;
    match result {
        Ok(receipt) => log::info!("Quote confirmation {} sent for booking {}", receipt.id, booking.id),
        Err(err) => log::warn!("Quote confirmation for booking {} failed: {err}", booking.id),
    }
}

async fn dispatch(
    config: &MailerConfig,
    to: &str,
    subject: &str,
    html: String,
) -> Result<EmailReceipt, EmailError> {
    if !config.enabled() {
        return Err(EmailError::Disabled);
    }

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/emails", config.api_base))
        .bearer_auth(&config.api_key)
        .json(&serde_json::json!({
            "from": config.sender,
            "to": [to],
            "subject": subject,
            "html": html,
        }))
        .send()
        .await?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmailError::Rejected(body));
    }

    Ok(response.json::<EmailReceipt>().await?)
}

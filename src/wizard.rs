use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::catalog;

pub const DRAFT_VERSION: u32 = 1;

/// The project draft accumulated across wizard steps. Earlier releases kept
/// this as an untyped browser blob; the stored form now carries a version so
/// an unreadable or future shape is treated as absent rather than trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    pub version: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub service_id: String,
}

impl Default for ProjectDraft {
    fn default() -> Self {
        Self {
            version: DRAFT_VERSION,
            title: String::new(),
            description: String::new(),
            category: String::new(),
            category_id: String::new(),
            service: String::new(),
            service_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    CategoryChoice,
    ServiceChoice,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("unknown category")]
    UnknownCategory,
    #[error("no category selected")]
    NoCategorySelected,
    #[error("service does not belong to the selected category")]
    ServiceOutsideCategory,
    #[error("category and service must both be selected")]
    IncompleteSelection,
}

/// Names resolved from the catalog at confirm time. Stored draft names are
/// never reused here; ids are re-resolved so stale persisted names cannot
/// leak into the next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedSelection {
    pub category_id: String,
    pub category_name: String,
    pub service_id: String,
    pub service_name: String,
}

/// Two ordered decisions: pick a category, then pick one of its services.
/// Backward navigation leaves stored values untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionWizard {
    step: WizardStep,
    selected_category: Option<String>,
    selected_service: Option<String>,
}

impl SelectionWizard {
    /// Rebuilds the wizard from persisted state. A stored category id means
    /// the visitor resumes directly in the service step; a prior service
    /// selection in the draft is primed independently.
    pub fn resume(stored_category: Option<&str>, draft: Option<&ProjectDraft>) -> Self {
        let selected_service = draft
            .map(|d| d.service_id.clone())
            .filter(|id| !id.is_empty());

        match stored_category.filter(|id| !id.is_empty()) {
            Some(category_id) => Self {
                step: WizardStep::ServiceChoice,
                selected_category: Some(category_id.to_string()),
                selected_service,
            },
            None => Self {
                step: WizardStep::CategoryChoice,
                selected_category: None,
                selected_service,
            },
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn selected_category(&self) -> Option<&str> {
        self.selected_category.as_deref()
    }

    pub fn selected_service(&self) -> Option<&str> {
        self.selected_service.as_deref()
    }

    /// Services offered in the service step: exactly the catalog subset of
    /// the selected category.
    pub fn available_services(&self) -> &'static [catalog::CatalogService] {
        match self.selected_category.as_deref() {
            Some(category_id) => catalog::services_of(category_id),
            None => &[],
        }
    }

    /// Picking a category clears any service that belonged to a different
    /// category and moves to the service step.
    pub fn select_category(&mut self, category_id: &str) -> Result<(), WizardError> {
        if catalog::category(category_id).is_none() {
            return Err(WizardError::UnknownCategory);
        }
        if self.selected_category.as_deref() != Some(category_id) {
            self.selected_service = None;
        }
        self.selected_category = Some(category_id.to_string());
        self.step = WizardStep::ServiceChoice;
        Ok(())
    }

    pub fn select_service(&mut self, service_id: &str) -> Result<(), WizardError> {
        let category_id = self
            .selected_category
            .as_deref()
            .ok_or(WizardError::NoCategorySelected)?;
        if catalog::service(category_id, service_id).is_none() {
            return Err(WizardError::ServiceOutsideCategory);
        }
        self.selected_service = Some(service_id.to_string());
        Ok(())
    }

    /// Back to the category list. Stored values are left as they are, so a
    /// visitor returning to the service step without changing category still
    /// sees the previous selection.
    pub fn back(&mut self) {
        self.step = WizardStep::CategoryChoice;
    }

    /// The exit transition. Only valid with both selections present and
    /// consistent; names come fresh from the catalog.
    pub fn confirm(&self) -> Result<ConfirmedSelection, WizardError> {
        let category_id = self
            .selected_category
            .as_deref()
            .ok_or(WizardError::IncompleteSelection)?;
        let service_id = self
            .selected_service
            .as_deref()
            .ok_or(WizardError::IncompleteSelection)?;

        let category = catalog::category(category_id).ok_or(WizardError::UnknownCategory)?;
        let service = catalog::service(category_id, service_id)
            .ok_or(WizardError::ServiceOutsideCategory)?;

        Ok(ConfirmedSelection {
            category_id: category.id.to_string(),
            category_name: category.name.to_string(),
            service_id: service.id.to_string(),
            service_name: service.name.to_string(),
        })
    }
}

/// Merges a confirmed selection into the existing draft, preserving any
/// fields other steps already wrote and defaulting the rest.
pub fn merge_into_draft(
    confirmed: &ConfirmedSelection,
    existing: Option<ProjectDraft>,
) -> ProjectDraft {
    let mut draft = existing.unwrap_or_default();
    draft.version = DRAFT_VERSION;
    draft.category = confirmed.category_name.clone();
    draft.category_id = confirmed.category_id.clone();
    draft.service = confirmed.service_name.clone();
    draft.service_id = confirmed.service_id.clone();
    draft
}

#[derive(Debug, Clone, Default)]
pub struct StoredWizard {
    pub selected_category: Option<String>,
    pub draft: Option<ProjectDraft>,
    pub revision: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct WizardStateRow {
    selected_category: Option<String>,
    draft: Option<String>,
    revision: i64,
}

fn parse_draft(raw: &str) -> Option<ProjectDraft> {
    match serde_json::from_str::<ProjectDraft>(raw) {
        Ok(draft) if draft.version == DRAFT_VERSION => Some(draft),
        Ok(draft) => {
            log::warn!("Discarding project draft with unsupported version {}", draft.version);
            None
        }
        Err(err) => {
            log::warn!("Unreadable project draft: {err}");
            None
        }
    }
}

pub async fn load(pool: &SqlitePool, visitor_id: &str) -> Result<StoredWizard, sqlx::Error> {
    let row = sqlx::query_as::<_, WizardStateRow>(
        "SELECT selected_category, draft, revision FROM wizard_states WHERE visitor_id = ?",
    )
    .bind(visitor_id)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some(row) => StoredWizard {
            selected_category: row.selected_category.filter(|id| !id.is_empty()),
            draft: row.draft.as_deref().and_then(parse_draft),
            revision: row.revision,
        },
        None => StoredWizard::default(),
    })
}

/// Eager write performed on every category pick. The draft is deliberately
/// left alone; it only changes on confirm, so the two stores may transiently
/// disagree while the visitor is mid-flow.
pub async fn save_category(
    pool: &SqlitePool,
    visitor_id: &str,
    category_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO wizard_states (visitor_id, selected_category, draft, revision, updated_at)
           VALUES (?, ?, NULL, 1, ?)
           ON CONFLICT(visitor_id) DO UPDATE SET
             selected_category = excluded.selected_category,
             revision = wizard_states.revision + 1,
             updated_at = excluded.updated_at"#,
    )
    .bind(visitor_id)
    .bind(category_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn save_draft(
    pool: &SqlitePool,
    visitor_id: &str,
    draft: &ProjectDraft,
) -> Result<(), sqlx::Error> {
    let raw = serde_json::to_string(draft)
        .map_err(|err| sqlx::Error::Protocol(format!("draft encode failed: {err}")))?;
    sqlx::query(
        r#"INSERT INTO wizard_states (visitor_id, selected_category, draft, revision, updated_at)
           VALUES (?, NULL, ?, 1, ?)
           ON CONFLICT(visitor_id) DO UPDATE SET
             draft = excluded.draft,
             revision = wizard_states.revision + 1,
             updated_at = excluded.updated_at"#,
    )
    .bind(visitor_id)
    .bind(raw)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

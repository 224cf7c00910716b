use serde::{Deserialize, Serialize};

/// Account roles. Public registration only ever produces the first three;
/// admins are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Client,
    Artisan,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Artisan => "artisan",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "client" => Some(Role::Client),
            "artisan" => Some(Role::Artisan),
            "agent" => Some(Role::Agent),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Roles accepted by the public registration flow.
    pub fn registerable(value: &str) -> Option<Role> {
        match Role::parse(value) {
            Some(Role::Admin) | None => None,
            other => other,
        }
    }

    /// Whether the registration form must carry a company name for this role.
    pub fn requires_company(&self) -> bool {
        matches!(self, Role::Artisan | Role::Agent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<UserStatus> {
        match value {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            "blocked" => Some(UserStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    Quoted,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Pending,
        ProjectStatus::Quoted,
        ProjectStatus::InProgress,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Quoted => "quoted",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<ProjectStatus> {
        match value {
            "pending" => Some(ProjectStatus::Pending),
            "quoted" => Some(ProjectStatus::Quoted),
            "in_progress" => Some(ProjectStatus::InProgress),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl TimeSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
        }
    }

    /// Label shown to clients in confirmation emails.
    pub fn label(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "Matin (8h - 12h)",
            TimeSlot::Afternoon => "Après-midi (12h - 17h)",
            TimeSlot::Evening => "Soirée (17h - 20h)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReferralKind {
    Artisan,
    Client,
    Project,
}

impl ReferralKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralKind::Artisan => "artisan",
            ReferralKind::Client => "client",
            ReferralKind::Project => "project",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Converted,
    Expired,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub phone: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: String,
}

impl UserRow {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionPlanRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub interval: String,
    pub features: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub client_id: Option<String>,
    pub artisan_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category_id: Option<String>,
    pub service_id: Option<String>,
    pub status: ProjectStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpressBookingRow {
    pub id: String,
    pub service_id: String,
    pub scheduled_date: String,
    pub time_slot: TimeSlot,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub status: BookingStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub artisan_id: String,
    pub client_name: String,
    pub last_message: String,
    pub last_message_at: String,
    pub unread_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReferralRow {
    pub id: String,
    pub agent_id: String,
    pub kind: ReferralKind,
    pub referred_name: String,
    pub status: ReferralStatus,
    pub commission_cents: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArtisanProfileRow {
    pub user_id: String,
    pub company: String,
    pub trade: String,
    pub description: String,
    pub service_area: String,
    pub hourly_rate_cents: Option<i64>,
    pub onboarding_complete: i64,
    pub updated_at: String,
}

impl ArtisanProfileRow {
    /// Onboarding is done once every descriptive field is filled in.
    pub fn is_complete(&self) -> bool {
        !(self.company.trim().is_empty()
            || self.trade.trim().is_empty()
            || self.description.trim().is_empty()
            || self.service_area.trim().is_empty())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a user wants their unread notifications rolled up into a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DigestInterval {
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for DigestInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestInterval::None => write!(f, "none"),
            DigestInterval::Hourly => write!(f, "hourly"),
            DigestInterval::Daily => write!(f, "daily"),
            DigestInterval::Weekly => write!(f, "weekly"),
            DigestInterval::Monthly => write!(f, "monthly"),
        }
    }
}

/// Paid subscription plans offered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Pro,
    Org,
}

impl Plan {
    /// Parse a gateway plan id. Unknown ids return `None`; callers fall back
    /// to generic handling and log a warning.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "pro" => Some(Plan::Pro),
            "org" => Some(Plan::Org),
            _ => None,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plan::Pro => write!(f, "pro"),
            Plan::Org => write!(f, "org"),
        }
    }
}

/// A user of the platform, with their notification and billing state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub digest_interval: DigestInterval,
    pub is_staff: bool,
    /// Payment gateway customer id, set once the user has billed anything.
    pub customer_id: Option<String>,
    pub plan: Option<Plan>,
    pub payment_failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An in-app notification. Unread notifications are what digests roll up;
/// they are marked read after the digest that contains them is sent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Short machine tag grouping notifications in a digest
    /// (e.g. "request_update", "crowdfund", "qanda").
    pub kind: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// What a queued digest job should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestJobKind {
    /// Roll-up of the user's own unread notifications.
    Activity,
    /// Platform-wide activity summary for a staff member.
    Staff,
}

/// One unit of digest work, serialized onto the Redis queue.
/// Each job is independent; a failure affects only its own user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestJob {
    pub user_id: Uuid,
    pub subject: String,
    /// Length of the interval the digest covers, in seconds.
    pub window_secs: i64,
    pub kind: DigestJobKind,
}

/// A rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// A charge object observed from the payment gateway.
///
/// Charges created through the checkout flow carry `email` and `action`
/// keys in their metadata; charges generated by an invoice carry the
/// invoice id instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Amount in cents.
    pub amount: i64,
    pub invoice: Option<String>,
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One line item on a gateway invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub plan: Option<String>,
    pub amount: i64,
    pub description: Option<String>,
}

/// An invoice object observed from the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer: String,
    /// Absent for free subscription renewals.
    pub charge: Option<String>,
    pub subscription: Option<String>,
    /// Which retry of the gateway's billing schedule this is (1-based).
    pub attempt_count: u32,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    /// Plan id from the first invoice line, if any.
    pub fn plan_id(&self) -> Option<&str> {
        self.lines.first().and_then(|line| line.plan.as_deref())
    }
}

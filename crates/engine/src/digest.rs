//! Digest building.
//!
//! A digest rolls a user's unread notifications into one email. The
//! scheduler only enqueues jobs for users who had unread notifications at
//! trigger time; the builder re-checks at execution and skips silently if
//! the set emptied in between (the user read everything, or a retried job
//! already sent them).
//!
//! Ordering of send vs. mark-read: the email is sent first, then the
//! included notifications are marked read. A crash between the two steps
//! means the next digest repeats those notifications — a duplicate is
//! preferred over a notification that is never delivered.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    DigestInterval, DigestJob, DigestJobKind, EmailMessage, Notification, UserProfile,
};
use courier_mailer::Mailer;

/// Users who should receive a digest for `interval`: preference matches and
/// at least one notification is unread.
pub async fn users_due_for_digest(
    pool: &PgPool,
    interval: DigestInterval,
) -> Result<Vec<UserProfile>, AppError> {
    let users: Vec<UserProfile> = sqlx::query_as(
        r#"
        SELECT u.*
        FROM user_profiles u
        WHERE u.digest_interval = $1
          AND EXISTS (
              SELECT 1 FROM notifications n
              WHERE n.user_id = u.id AND n.read = false
          )
        "#,
    )
    .bind(interval)
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// All staff users. The staff digest goes out regardless of unread count.
pub async fn staff_users(pool: &PgPool) -> Result<Vec<UserProfile>, AppError> {
    let users: Vec<UserProfile> =
        sqlx::query_as("SELECT * FROM user_profiles WHERE is_staff = true")
            .fetch_all(pool)
            .await?;

    Ok(users)
}

/// Platform-wide counters for the staff digest window.
#[derive(Debug, Clone, Copy)]
pub struct StaffStats {
    pub new_users: i64,
    pub notifications_created: i64,
}

/// Builds and sends digest emails. One instance is shared by all queue
/// workers.
pub struct DigestBuilder {
    mailer: Arc<dyn Mailer>,
}

impl DigestBuilder {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Run one digest job. Returns whether an email was sent.
    pub async fn run(&self, pool: &PgPool, job: &DigestJob) -> Result<bool, AppError> {
        let window = Duration::seconds(job.window_secs);
        match job.kind {
            DigestJobKind::Activity => {
                self.send_activity_digest(pool, job.user_id, &job.subject, window)
                    .await
            }
            DigestJobKind::Staff => {
                self.send_staff_digest(pool, job.user_id, &job.subject, window)
                    .await
            }
        }
    }

    /// Gather the user's unread notifications, send one summary email, then
    /// mark them read. Sends nothing when there is nothing unread.
    pub async fn send_activity_digest(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        subject: &str,
        window: Duration,
    ) -> Result<bool, AppError> {
        let user = fetch_profile(pool, user_id).await?;

        let notifications: Vec<Notification> = sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = $1 AND read = false ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        if notifications.is_empty() {
            tracing::debug!(user_id = %user_id, "No unread notifications, skipping digest");
            return Ok(false);
        }

        let message = render_digest(&user, subject, &notifications, window);
        self.mailer
            .send(&message)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        let ids: Vec<Uuid> = notifications.iter().map(|n| n.id).collect();
        sqlx::query("UPDATE notifications SET read = true WHERE id = ANY($1)")
            .bind(&ids)
            .execute(pool)
            .await?;

        tracing::info!(
            user_id = %user_id,
            notifications = notifications.len(),
            subject,
            "Digest sent"
        );
        Ok(true)
    }

    /// Send a staff member the platform activity summary for the window.
    pub async fn send_staff_digest(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        subject: &str,
        window: Duration,
    ) -> Result<bool, AppError> {
        let user = fetch_profile(pool, user_id).await?;
        let since = Utc::now() - window;

        let (new_users,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_profiles WHERE created_at >= $1")
                .bind(since)
                .fetch_one(pool)
                .await?;
        let (notifications_created,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE created_at >= $1")
                .bind(since)
                .fetch_one(pool)
                .await?;

        let stats = StaffStats {
            new_users,
            notifications_created,
        };

        let message = render_staff_digest(&user, subject, stats);
        self.mailer
            .send(&message)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        tracing::info!(user_id = %user_id, "Staff digest sent");
        Ok(true)
    }
}

async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> Result<UserProfile, AppError> {
    sqlx::query_as("SELECT * FROM user_profiles WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
}

/// Render an activity digest: notifications grouped by kind, oldest first
/// within each group.
pub fn render_digest(
    user: &UserProfile,
    subject: &str,
    notifications: &[Notification],
    window: Duration,
) -> EmailMessage {
    let mut groups: BTreeMap<&str, Vec<&Notification>> = BTreeMap::new();
    for notification in notifications {
        groups
            .entry(notification.kind.as_str())
            .or_default()
            .push(notification);
    }

    let mut text = format!(
        "Hi {username},\n\nHere is your activity from the last {window}:\n",
        username = user.username,
        window = describe_window(window),
    );
    let mut html = format!(
        "<p>Hi {username},</p><p>Here is your activity from the last {window}:</p>",
        username = user.username,
        window = describe_window(window),
    );

    for (kind, group) in &groups {
        text.push_str(&format!("\n{} ({})\n", kind_heading(kind), group.len()));
        html.push_str(&format!(
            "<h3>{} ({})</h3><ul>",
            kind_heading(kind),
            group.len()
        ));
        for notification in group {
            text.push_str(&format!("  - {}\n", notification.body));
            html.push_str(&format!("<li>{}</li>", notification.body));
        }
        html.push_str("</ul>");
    }

    text.push_str("\nYou are receiving this digest per your notification settings.\n");
    html.push_str("<p>You are receiving this digest per your notification settings.</p>");

    EmailMessage {
        to: vec![user.email.clone()],
        subject: subject.to_string(),
        text,
        html,
    }
}

fn render_staff_digest(user: &UserProfile, subject: &str, stats: StaffStats) -> EmailMessage {
    let text = format!(
        "Hi {username},\n\nPlatform activity over the last day:\n\n\
         New users: {new_users}\n\
         Notifications produced: {notifications}\n",
        username = user.username,
        new_users = stats.new_users,
        notifications = stats.notifications_created,
    );
    let html = format!(
        "<p>Hi {username},</p><p>Platform activity over the last day:</p>\
         <ul><li>New users: {new_users}</li>\
         <li>Notifications produced: {notifications}</li></ul>",
        username = user.username,
        new_users = stats.new_users,
        notifications = stats.notifications_created,
    );

    EmailMessage {
        to: vec![user.email.clone()],
        subject: subject.to_string(),
        text,
        html,
    }
}

fn kind_heading(kind: &str) -> String {
    // "request_update" → "Request update"
    let spaced = kind.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

fn describe_window(window: Duration) -> String {
    if window >= Duration::days(28) {
        "month".to_string()
    } else if window >= Duration::weeks(1) {
        "week".to_string()
    } else if window >= Duration::days(1) {
        "day".to_string()
    } else {
        "hour".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_user() -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            username: "jsmith".to_string(),
            email: "jsmith@example.com".to_string(),
            digest_interval: DigestInterval::Hourly,
            is_staff: false,
            customer_id: None,
            plan: None,
            payment_failed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_notification(user_id: Uuid, kind: &str, body: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.to_string(),
            body: body.to_string(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_digest_groups_by_kind() {
        let user = make_user();
        let notifications = vec![
            make_notification(user.id, "request_update", "Request #12 got a response"),
            make_notification(user.id, "crowdfund", "Your crowdfund reached its goal"),
            make_notification(user.id, "request_update", "Request #14 was rejected"),
        ];

        let message = render_digest(&user, "Hourly Digest", &notifications, Duration::hours(1));

        assert_eq!(message.to, vec!["jsmith@example.com".to_string()]);
        assert_eq!(message.subject, "Hourly Digest");
        assert!(message.text.contains("Request update (2)"));
        assert!(message.text.contains("Crowdfund (1)"));
        assert!(message.text.contains("Request #12 got a response"));
        assert!(message.text.contains("Request #14 was rejected"));
    }

    #[test]
    fn test_digest_names_the_window() {
        let user = make_user();
        let notifications = vec![make_notification(user.id, "qanda", "New answer")];

        let hourly = render_digest(&user, "Hourly Digest", &notifications, Duration::hours(1));
        assert!(hourly.text.contains("last hour"));

        let weekly = render_digest(&user, "Weekly Digest", &notifications, Duration::weeks(1));
        assert!(weekly.text.contains("last week"));

        let monthly = render_digest(&user, "Monthly Digest", &notifications, Duration::days(30));
        assert!(monthly.text.contains("last month"));
    }

    #[test]
    fn test_staff_digest_reports_counters() {
        let user = make_user();
        let stats = StaffStats {
            new_users: 7,
            notifications_created: 42,
        };
        let message = render_staff_digest(&user, "Daily Staff Digest", stats);
        assert!(message.text.contains("New users: 7"));
        assert!(message.text.contains("Notifications produced: 42"));
    }

    #[test]
    fn test_kind_heading() {
        assert_eq!(kind_heading("request_update"), "Request update");
        assert_eq!(kind_heading("crowdfund"), "Crowdfund");
    }
}

//! One-off account notices: welcome (full and abbreviated signup), email
//! verification, email change, gifts, project contributor additions, and
//! support replies. Builders are pure; `AccountNotifier` sends.

use std::sync::Arc;

use courier_common::error::AppError;
use courier_common::types::{EmailMessage, UserProfile};
use courier_mailer::Mailer;

pub fn welcome_notice(user: &UserProfile, verification_link: &str) -> EmailMessage {
    let text = format!(
        "Welcome, {username}!\n\n\
         Your account is ready. Please verify your email address:\n\
         {verification_link}\n",
        username = user.username,
    );
    let html = format!(
        "<p>Welcome, {username}!</p>\
         <p>Your account is ready. Please \
         <a href=\"{verification_link}\">verify your email address</a>.</p>",
        username = user.username,
    );
    EmailMessage {
        to: vec![user.email.clone()],
        subject: "Welcome!".to_string(),
        text,
        html,
    }
}

/// Welcome notice for accounts created through the abbreviated signup flow.
/// The completion link lets the user pick a username and password and
/// verifies their email in one step.
pub fn miniregister_welcome_notice(user: &UserProfile, completion_link: &str) -> EmailMessage {
    let text = format!(
        "Welcome, {username}!\n\n\
         Your account is ready. Finish setting it up by choosing a username\n\
         and password:\n{completion_link}\n",
        username = user.username,
    );
    let html = format!(
        "<p>Welcome, {username}!</p>\
         <p>Your account is ready. \
         <a href=\"{completion_link}\">Finish setting it up</a> by choosing a \
         username and password.</p>",
        username = user.username,
    );
    EmailMessage {
        to: vec![user.email.clone()],
        subject: "Welcome!".to_string(),
        text,
        html,
    }
}

pub fn email_verify_notice(user: &UserProfile, verification_link: &str) -> EmailMessage {
    let text = format!(
        "Hi {username},\n\nPlease verify your email address:\n{verification_link}\n",
        username = user.username,
    );
    let html = format!(
        "<p>Hi {username},</p>\
         <p>Please <a href=\"{verification_link}\">verify your email address</a>.</p>",
        username = user.username,
    );
    EmailMessage {
        to: vec![user.email.clone()],
        subject: "Verify your email".to_string(),
        text,
        html,
    }
}

/// Email-change notice. Goes to both the new and the old address, so the
/// owner of a hijacked account still hears about the change.
pub fn email_change_notice(user: &UserProfile, old_email: &str) -> EmailMessage {
    let text = format!(
        "Hi {username},\n\n\
         The email address on your account was changed from {old_email} to\n\
         {new_email}. If you did not make this change, contact support\n\
         immediately.\n",
        username = user.username,
        new_email = user.email,
    );
    let html = format!(
        "<p>Hi {username},</p>\
         <p>The email address on your account was changed from {old_email} to \
         {new_email}. If you did not make this change, contact support \
         immediately.</p>",
        username = user.username,
        new_email = user.email,
    );
    EmailMessage {
        to: vec![user.email.clone(), old_email.to_string()],
        subject: "Changed email address".to_string(),
        text,
        html,
    }
}

pub fn gift_notice(user: &UserProfile, from_username: &str, gift: &str) -> EmailMessage {
    let text = format!(
        "Hi {username},\n\n{from_username} sent you a gift: {gift}\n",
        username = user.username,
    );
    let html = format!(
        "<p>Hi {username},</p><p>{from_username} sent you a gift: {gift}</p>",
        username = user.username,
    );
    EmailMessage {
        to: vec![user.email.clone()],
        subject: "You got a gift!".to_string(),
        text,
        html,
    }
}

pub fn project_contributor_notice(
    user: &UserProfile,
    project: &str,
    added_by: &str,
) -> EmailMessage {
    let text = format!(
        "Hi {username},\n\n{added_by} added you as a contributor to the project \"{project}\".\n",
        username = user.username,
    );
    let html = format!(
        "<p>Hi {username},</p>\
         <p>{added_by} added you as a contributor to the project \"{project}\".</p>",
        username = user.username,
    );
    EmailMessage {
        to: vec![user.email.clone()],
        subject: "Added to a project".to_string(),
        text,
        html,
    }
}

pub fn support_notice(user: &UserProfile, ticket_id: i64, reply: &str) -> EmailMessage {
    let text = format!(
        "Hi {username},\n\nOur team replied to your support ticket:\n\n{reply}\n",
        username = user.username,
    );
    let html = format!(
        "<p>Hi {username},</p><p>Our team replied to your support ticket:</p><p>{reply}</p>",
        username = user.username,
    );
    EmailMessage {
        to: vec![user.email.clone()],
        subject: format!("Support #{ticket_id}"),
        text,
        html,
    }
}

/// Sends account notices through the configured mailer.
pub struct AccountNotifier {
    mailer: Arc<dyn Mailer>,
    site_url: String,
}

impl AccountNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, site_url: String) -> Self {
        Self { mailer, site_url }
    }

    fn verification_link(&self, key: &str) -> String {
        format!("{}/accounts/verify?key={key}", self.site_url)
    }

    pub async fn welcome(&self, user: &UserProfile, verification_key: &str) -> Result<(), AppError> {
        let link = self.verification_link(verification_key);
        self.deliver(welcome_notice(user, &link)).await
    }

    pub async fn welcome_miniregister(
        &self,
        user: &UserProfile,
        completion_key: &str,
    ) -> Result<(), AppError> {
        let link = format!(
            "{}/accounts/complete?key={completion_key}",
            self.site_url
        );
        self.deliver(miniregister_welcome_notice(user, &link)).await
    }

    pub async fn email_verify(
        &self,
        user: &UserProfile,
        verification_key: &str,
    ) -> Result<(), AppError> {
        let link = self.verification_link(verification_key);
        self.deliver(email_verify_notice(user, &link)).await
    }

    pub async fn email_change(&self, user: &UserProfile, old_email: &str) -> Result<(), AppError> {
        self.deliver(email_change_notice(user, old_email)).await
    }

    pub async fn gift(
        &self,
        user: &UserProfile,
        from_username: &str,
        gift: &str,
    ) -> Result<(), AppError> {
        self.deliver(gift_notice(user, from_username, gift)).await
    }

    pub async fn project_contributor(
        &self,
        user: &UserProfile,
        project: &str,
        added_by: &str,
    ) -> Result<(), AppError> {
        self.deliver(project_contributor_notice(user, project, added_by))
            .await
    }

    pub async fn support(
        &self,
        user: &UserProfile,
        ticket_id: i64,
        reply: &str,
    ) -> Result<(), AppError> {
        self.deliver(support_notice(user, ticket_id, reply)).await
    }

    async fn deliver(&self, message: EmailMessage) -> Result<(), AppError> {
        self.mailer
            .send(&message)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_common::types::DigestInterval;
    use uuid::Uuid;

    fn make_user(email: &str) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            username: "jsmith".to_string(),
            email: email.to_string(),
            digest_interval: DigestInterval::Daily,
            is_staff: false,
            customer_id: None,
            plan: None,
            payment_failed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_email_change_goes_to_both_addresses() {
        let user = make_user("new@example.com");
        let notice = email_change_notice(&user, "old@example.com");

        assert_eq!(
            notice.to,
            vec!["new@example.com".to_string(), "old@example.com".to_string()]
        );
        assert!(notice.text.contains("old@example.com"));
        assert!(notice.text.contains("new@example.com"));
    }

    #[test]
    fn test_welcome_carries_verification_link() {
        let user = make_user("a@example.com");
        let notice = welcome_notice(&user, "https://example.com/accounts/verify?key=abc");
        assert!(notice.text.contains("verify?key=abc"));
        assert_eq!(notice.to, vec!["a@example.com".to_string()]);
    }

    #[test]
    fn test_miniregister_welcome_carries_completion_link() {
        let user = make_user("a@example.com");
        let notice =
            miniregister_welcome_notice(&user, "https://example.com/accounts/complete?key=abc");
        assert_eq!(notice.subject, "Welcome!");
        assert!(notice.text.contains("complete?key=abc"));
        assert!(notice.text.contains("username"));
    }

    #[test]
    fn test_project_contributor_names_project_and_adder() {
        let user = make_user("a@example.com");
        let notice = project_contributor_notice(&user, "State Police Records", "editor_jane");
        assert_eq!(notice.subject, "Added to a project");
        assert!(notice.text.contains("State Police Records"));
        assert!(notice.text.contains("editor_jane"));
    }

    #[test]
    fn test_support_subject_carries_ticket_number() {
        let user = make_user("a@example.com");
        let notice = support_notice(&user, 451, "We fixed it.");
        assert_eq!(notice.subject, "Support #451");
        assert!(notice.text.contains("We fixed it."));
    }

    #[tokio::test]
    async fn test_notifier_sends_through_mailer() {
        let mailer = Arc::new(courier_mailer::MemoryMailer::new());
        let notifier = AccountNotifier::new(mailer.clone(), "https://example.com".to_string());
        let user = make_user("a@example.com");

        notifier.gift(&user, "fellow", "4 requests").await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "You got a gift!");
    }
}

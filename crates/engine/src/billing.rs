//! Failed subscription payment handling.
//!
//! The gateway retries a failing invoice on its own schedule, sending a
//! webhook per attempt. Attempts 1 through 3 raise the `payment_failed`
//! flag and warn the user; the 4th attempt cancels the subscription and
//! clears the flag. Cancellation is fire-and-forget against the gateway —
//! the result is logged, never read back.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{EmailMessage, Plan, UserProfile};
use courier_mailer::Mailer;

use crate::gateway::{GatewayError, PaymentGateway};

/// The gateway's retry budget: the 4th failed attempt is the last.
pub const MAX_PAYMENT_ATTEMPTS: u32 = 4;

/// What a failed-payment webhook should do, decided purely by the attempt
/// count the gateway reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The gateway will retry; warn the user which attempt this was.
    Retry { attempt: u32 },
    /// Retry budget exhausted; cancel the subscription.
    Cancel,
}

pub fn evaluate_attempt(attempt_count: u32) -> PaymentOutcome {
    if attempt_count >= MAX_PAYMENT_ATTEMPTS {
        PaymentOutcome::Cancel
    } else {
        PaymentOutcome::Retry {
            attempt: attempt_count,
        }
    }
}

fn plan_label(plan: Option<Plan>) -> String {
    plan.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Render the failed-payment notice for a retry attempt.
pub fn failed_payment_notice(to: &str, plan: Option<Plan>, attempt: u32) -> EmailMessage {
    let plan_label = plan_label(plan);
    let text = format!(
        "Your payment has failed (attempt {attempt} of {MAX_PAYMENT_ATTEMPTS}).\n\n\
         We could not bill your {plan_label} plan. Please update your payment\n\
         details before the next attempt, or your subscription will be cancelled.\n",
    );
    let html = format!(
        "<p>Your payment has failed (attempt {attempt} of {MAX_PAYMENT_ATTEMPTS}).</p>\
         <p>We could not bill your {plan_label} plan. Please update your payment \
         details before the next attempt, or your subscription will be cancelled.</p>",
    );
    EmailMessage {
        to: vec![to.to_string()],
        subject: "Your payment has failed".to_string(),
        text,
        html,
    }
}

/// Render the notice sent when the final attempt cancels the subscription.
pub fn subscription_cancelled_notice(to: &str, plan: Option<Plan>) -> EmailMessage {
    let plan_label = plan_label(plan);
    let text = format!(
        "Your {plan_label} subscription has been cancelled.\n\n\
         The final billing attempt failed, so your subscription was cancelled.\n\
         You can resubscribe at any time from your account settings.\n",
    );
    let html = format!(
        "<p>Your {plan_label} subscription has been cancelled.</p>\
         <p>The final billing attempt failed, so your subscription was cancelled. \
         You can resubscribe at any time from your account settings.</p>",
    );
    EmailMessage {
        to: vec![to.to_string()],
        subject: format!("Your {plan_label} subscription has been cancelled"),
        text,
        html,
    }
}

/// Applies failed-payment webhooks to the user's billing state.
pub struct FailedPaymentHandler {
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
}

impl FailedPaymentHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, mailer: Arc<dyn Mailer>) -> Self {
        Self { gateway, mailer }
    }

    /// Handle an `invoice.payment_failed` event.
    pub async fn handle_failed_invoice(
        &self,
        pool: &PgPool,
        invoice_id: &str,
    ) -> Result<(), AppError> {
        let invoice = match self.gateway.get_invoice(invoice_id).await {
            Ok(invoice) => invoice,
            Err(GatewayError::NotFound(_)) => {
                tracing::warn!(invoice_id, "Failed invoice not found at gateway");
                return Ok(());
            }
            Err(e) => return Err(AppError::Gateway(e.to_string())),
        };

        let profile: UserProfile =
            sqlx::query_as("SELECT * FROM user_profiles WHERE customer_id = $1")
                .bind(&invoice.customer)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("No profile for customer {}", invoice.customer))
                })?;

        let plan = invoice.plan_id().and_then(Plan::from_id);
        if plan.is_none() {
            tracing::warn!(
                invoice_id,
                plan_id = invoice.plan_id().unwrap_or("<missing>"),
                "Failed invoice for unrecognized plan"
            );
        }

        Self::set_payment_failed(pool, profile.id, true).await?;

        match evaluate_attempt(invoice.attempt_count) {
            PaymentOutcome::Retry { attempt } => {
                tracing::info!(
                    user_id = %profile.id,
                    username = %profile.username,
                    attempt,
                    "Failed payment, gateway will retry"
                );
                let notice = failed_payment_notice(&profile.email, plan, attempt);
                self.mailer
                    .send(&notice)
                    .await
                    .map_err(|e| AppError::Mail(e.to_string()))?;
            }
            PaymentOutcome::Cancel => {
                // Fire-and-forget: a cancellation error is logged, the
                // outcome is never verified with a follow-up read.
                if let Some(subscription_id) = invoice.subscription.as_deref() {
                    if let Err(e) = self.gateway.cancel_subscription(subscription_id).await {
                        tracing::warn!(
                            subscription_id,
                            error = %e,
                            "Subscription cancellation request failed"
                        );
                    }
                } else {
                    tracing::warn!(invoice_id, "Failed invoice has no subscription to cancel");
                }

                sqlx::query(
                    "UPDATE user_profiles SET payment_failed = false, plan = NULL, updated_at = now() WHERE id = $1",
                )
                .bind(profile.id)
                .execute(pool)
                .await?;

                tracing::info!(
                    user_id = %profile.id,
                    username = %profile.username,
                    "Subscription cancelled due to failed payment"
                );

                let notice = subscription_cancelled_notice(&profile.email, plan);
                self.mailer
                    .send(&notice)
                    .await
                    .map_err(|e| AppError::Mail(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn set_payment_failed(pool: &PgPool, user_id: Uuid, failed: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE user_profiles SET payment_failed = $1, updated_at = now() WHERE id = $2")
            .bind(failed)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_below_budget_retry() {
        for attempt in 1..=3 {
            assert_eq!(evaluate_attempt(attempt), PaymentOutcome::Retry { attempt });
        }
    }

    #[test]
    fn test_fourth_attempt_cancels() {
        assert_eq!(evaluate_attempt(4), PaymentOutcome::Cancel);
        // The gateway should never report more than 4, but if it does the
        // subscription is still cancelled.
        assert_eq!(evaluate_attempt(5), PaymentOutcome::Cancel);
    }

    #[test]
    fn test_retry_notice_names_the_attempt() {
        let notice = failed_payment_notice("a@example.com", Some(Plan::Pro), 2);
        assert_eq!(notice.to, vec!["a@example.com".to_string()]);
        assert_eq!(notice.subject, "Your payment has failed");
        assert!(notice.text.contains("attempt 2 of 4"));
        assert!(notice.text.contains("pro"));
    }

    #[test]
    fn test_cancelled_notice_names_the_plan() {
        let notice = subscription_cancelled_notice("a@example.com", Some(Plan::Org));
        assert_eq!(
            notice.subject,
            "Your org subscription has been cancelled"
        );

        let generic = subscription_cancelled_notice("a@example.com", None);
        assert_eq!(
            generic.subject,
            "Your unknown subscription has been cancelled"
        );
    }
}

//! Receipt dispatch for completed payments.
//!
//! Charge webhooks carry an `action` tag in their metadata that selects the
//! receipt wording; invoice webhooks are matched to a subscription plan.
//! Unknown tags fall back to a generic receipt with a logged warning rather
//! than failing the job.

use std::sync::Arc;

use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{Charge, EmailMessage, Plan, UserProfile};
use courier_mailer::Mailer;

use crate::gateway::{GatewayError, PaymentGateway};

/// The closed set of checkout actions that have a dedicated receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    RequestPurchase,
    RequestFee,
    CrowdfundPayment,
    Donation,
}

impl ReceiptKind {
    /// Parse the `action` metadata tag. Unknown tags return `None` and the
    /// dispatcher falls back to the generic receipt.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "request-purchase" => Some(ReceiptKind::RequestPurchase),
            "request-fee" => Some(ReceiptKind::RequestFee),
            "crowdfund-payment" => Some(ReceiptKind::CrowdfundPayment),
            "donation" => Some(ReceiptKind::Donation),
            _ => None,
        }
    }
}

/// Format an amount in cents as dollars. Charge amounts are normally
/// positive, but a negative amount (a refund routed here) keeps its sign.
fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}${}.{:02}", (cents / 100).abs(), (cents % 100).abs())
}

fn receipt_message(to: &str, subject: &str, opening: &str, charge: &Charge) -> EmailMessage {
    let text = format!(
        "{opening}\n\n\
         Amount: {amount}\n\
         Charge: {id}\n\n\
         Thank you for supporting public records access.\n",
        amount = format_amount(charge.amount),
        id = charge.id,
    );
    let html = format!(
        "<p>{opening}</p>\
         <p>Amount: <strong>{amount}</strong><br>Charge: {id}</p>\
         <p>Thank you for supporting public records access.</p>",
        amount = format_amount(charge.amount),
        id = charge.id,
    );
    EmailMessage {
        to: vec![to.to_string()],
        subject: subject.to_string(),
        text,
        html,
    }
}

pub fn request_purchase_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(
        to,
        "Receipt: request purchase",
        "You purchased additional record requests.",
        charge,
    )
}

pub fn request_fee_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(
        to,
        "Receipt: agency fee payment",
        "You paid an agency's processing fee for one of your requests.",
        charge,
    )
}

pub fn crowdfund_payment_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(
        to,
        "Receipt: crowdfund contribution",
        "You contributed to a crowdfunded request.",
        charge,
    )
}

pub fn donation_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(
        to,
        "Receipt: donation",
        "Thank you for your donation!",
        charge,
    )
}

pub fn generic_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(to, "Payment receipt", "We received your payment.", charge)
}

pub fn pro_subscription_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(
        to,
        "Receipt: professional subscription",
        "Your professional subscription has been renewed.",
        charge,
    )
}

pub fn org_subscription_receipt(to: &str, charge: &Charge) -> EmailMessage {
    receipt_message(
        to,
        "Receipt: organization subscription",
        "Your organization subscription has been renewed.",
        charge,
    )
}

/// Pick the receipt for a checkout charge. `None` means the action tag was
/// unrecognized (or absent) and the generic wording is used.
pub fn charge_receipt(kind: Option<ReceiptKind>, to: &str, charge: &Charge) -> EmailMessage {
    match kind {
        Some(ReceiptKind::RequestPurchase) => request_purchase_receipt(to, charge),
        Some(ReceiptKind::RequestFee) => request_fee_receipt(to, charge),
        Some(ReceiptKind::CrowdfundPayment) => crowdfund_payment_receipt(to, charge),
        Some(ReceiptKind::Donation) => donation_receipt(to, charge),
        None => generic_receipt(to, charge),
    }
}

/// Pick the receipt for an invoiced subscription charge.
pub fn subscription_receipt(plan: Option<Plan>, to: &str, charge: &Charge) -> EmailMessage {
    match plan {
        Some(Plan::Pro) => pro_subscription_receipt(to, charge),
        Some(Plan::Org) => org_subscription_receipt(to, charge),
        None => generic_receipt(to, charge),
    }
}

/// Routes completed payment events to the right receipt and sends it.
pub struct ReceiptDispatcher {
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
}

impl ReceiptDispatcher {
    pub fn new(gateway: Arc<dyn PaymentGateway>, mailer: Arc<dyn Mailer>) -> Self {
        Self { gateway, mailer }
    }

    /// Send a receipt for a standalone charge.
    ///
    /// Charges generated by an invoice are skipped here — the invoice
    /// handler sends that receipt, otherwise the customer would get two.
    /// A missing charge or malformed metadata is logged and dropped; a send
    /// failure propagates.
    pub async fn send_charge_receipt(&self, charge_id: &str) -> Result<(), AppError> {
        let charge = match self.gateway.get_charge(charge_id).await {
            Ok(charge) => charge,
            Err(GatewayError::NotFound(_)) => {
                tracing::warn!(charge_id, "Charge not found at gateway, no receipt sent");
                return Ok(());
            }
            Err(e) => return Err(AppError::Gateway(e.to_string())),
        };

        if charge.invoice.is_some() {
            tracing::debug!(charge_id, "Charge belongs to an invoice, deferring");
            return Ok(());
        }

        let (Some(email), Some(action)) =
            (charge.metadata.get("email"), charge.metadata.get("action"))
        else {
            tracing::warn!(charge_id, "Malformed charge metadata, no receipt sent");
            return Ok(());
        };

        let kind = ReceiptKind::from_action(action);
        if kind.is_none() {
            tracing::warn!(charge_id, action = %action, "Unrecognized charge action");
        }

        let message = charge_receipt(kind, email, &charge);
        self.mailer
            .send(&message)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        tracing::info!(charge_id, to = %email, "Charge receipt sent");
        Ok(())
    }

    /// Send a receipt for an invoiced subscription payment.
    ///
    /// Free renewals (no charge attached) send nothing. The plan comes from
    /// the first invoice line; unrecognized plans get the generic receipt.
    pub async fn send_invoice_receipt(
        &self,
        pool: &PgPool,
        invoice_id: &str,
    ) -> Result<(), AppError> {
        let invoice = match self.gateway.get_invoice(invoice_id).await {
            Ok(invoice) => invoice,
            Err(GatewayError::NotFound(_)) => {
                tracing::warn!(invoice_id, "Invoice not found at gateway, no receipt sent");
                return Ok(());
            }
            Err(e) => return Err(AppError::Gateway(e.to_string())),
        };

        let Some(charge_id) = invoice.charge.as_deref() else {
            // A free subscription renewal has no charge attached.
            tracing::debug!(invoice_id, "Invoice has no charge, no receipt sent");
            return Ok(());
        };

        let charge = match self.gateway.get_charge(charge_id).await {
            Ok(charge) => charge,
            Err(GatewayError::NotFound(_)) => {
                tracing::warn!(invoice_id, charge_id, "Invoice charge not found at gateway");
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
                "Invoice charged for unrecognized plan"
            );
        }

        let message = subscription_receipt(plan, &profile.email, &charge);
        self.mailer
            .send(&message)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        tracing::info!(invoice_id, user_id = %profile.id, "Invoice receipt sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use courier_common::types::Invoice;
    use courier_mailer::MemoryMailer;

    struct MockGateway {
        charges: HashMap<String, Charge>,
        invoices: HashMap<String, Invoice>,
    }

    impl MockGateway {
        fn with_charge(charge: Charge) -> Self {
            let mut charges = HashMap::new();
            charges.insert(charge.id.clone(), charge);
            Self {
                charges,
                invoices: HashMap::new(),
            }
        }

        fn empty() -> Self {
            Self {
                charges: HashMap::new(),
                invoices: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn get_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
            self.charges
                .get(charge_id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(charge_id.to_string()))
        }

        async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, GatewayError> {
            self.invoices
                .get(invoice_id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(invoice_id.to_string()))
        }

        async fn cancel_subscription(&self, _subscription_id: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn make_charge(metadata: &[(&str, &str)], invoice: Option<&str>) -> Charge {
        Charge {
            id: "ch_test".to_string(),
            amount: 2500,
            invoice: invoice.map(str::to_string),
            customer: Some("cus_test".to_string()),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn dispatcher(charge: Charge) -> (ReceiptDispatcher, Arc<MemoryMailer>) {
        let mailer = Arc::new(MemoryMailer::new());
        let dispatcher =
            ReceiptDispatcher::new(Arc::new(MockGateway::with_charge(charge)), mailer.clone());
        (dispatcher, mailer)
    }

    #[test]
    fn test_action_tag_parsing() {
        assert_eq!(
            ReceiptKind::from_action("request-purchase"),
            Some(ReceiptKind::RequestPurchase)
        );
        assert_eq!(
            ReceiptKind::from_action("request-fee"),
            Some(ReceiptKind::RequestFee)
        );
        assert_eq!(
            ReceiptKind::from_action("crowdfund-payment"),
            Some(ReceiptKind::CrowdfundPayment)
        );
        assert_eq!(
            ReceiptKind::from_action("donation"),
            Some(ReceiptKind::Donation)
        );
        assert_eq!(ReceiptKind::from_action("unknown-tag"), None);
    }

    #[test]
    fn test_amount_formatting() {
        assert_eq!(format_amount(2500), "$25.00");
        assert_eq!(format_amount(105), "$1.05");
        assert_eq!(format_amount(99), "$0.99");
        // Refund amounts keep their sign instead of masquerading as charges
        assert_eq!(format_amount(-50), "-$0.50");
        assert_eq!(format_amount(-2500), "-$25.00");
    }

    #[tokio::test]
    async fn test_donation_action_selects_donation_receipt() {
        let charge = make_charge(&[("email", "a@example.com"), ("action", "donation")], None);
        let (dispatcher, mailer) = dispatcher(charge);

        dispatcher.send_charge_receipt("ch_test").await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@example.com".to_string()]);
        assert_eq!(sent[0].subject, "Receipt: donation");
        assert!(sent[0].text.contains("$25.00"));
    }

    #[tokio::test]
    async fn test_unknown_action_falls_back_to_generic_receipt() {
        let charge = make_charge(
            &[("email", "a@example.com"), ("action", "unknown-tag")],
            None,
        );
        let (dispatcher, mailer) = dispatcher(charge);

        dispatcher.send_charge_receipt("ch_test").await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Payment receipt");
    }

    #[tokio::test]
    async fn test_invoice_backed_charge_is_a_noop() {
        let charge = make_charge(
            &[("email", "a@example.com"), ("action", "donation")],
            Some("in_123"),
        );
        let (dispatcher, mailer) = dispatcher(charge);

        dispatcher.send_charge_receipt("ch_test").await.unwrap();
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_metadata_drops_silently() {
        // No action tag
        let charge = make_charge(&[("email", "a@example.com")], None);
        let (dispatcher, mailer) = dispatcher(charge);
        dispatcher.send_charge_receipt("ch_test").await.unwrap();
        assert_eq!(mailer.sent_count(), 0);

        // No email
        let charge = make_charge(&[("action", "donation")], None);
        let (dispatcher, mailer) = self::dispatcher(charge);
        dispatcher.send_charge_receipt("ch_test").await.unwrap();
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_charge_sends_nothing_without_error() {
        let mailer = Arc::new(MemoryMailer::new());
        let dispatcher = ReceiptDispatcher::new(Arc::new(MockGateway::empty()), mailer.clone());

        dispatcher.send_charge_receipt("ch_missing").await.unwrap();
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_propagates() {
        let charge = make_charge(&[("email", "a@example.com"), ("action", "donation")], None);
        let mailer = Arc::new(MemoryMailer::failing());
        let dispatcher =
            ReceiptDispatcher::new(Arc::new(MockGateway::with_charge(charge)), mailer);

        let result = dispatcher.send_charge_receipt("ch_test").await;
        assert!(matches!(result, Err(AppError::Mail(_))));
    }

    #[test]
    fn test_subscription_receipt_selection() {
        let charge = make_charge(&[], None);
        assert_eq!(
            subscription_receipt(Some(Plan::Pro), "a@example.com", &charge).subject,
            "Receipt: professional subscription"
        );
        assert_eq!(
            subscription_receipt(Some(Plan::Org), "a@example.com", &charge).subject,
            "Receipt: organization subscription"
        );
        assert_eq!(
            subscription_receipt(None, "a@example.com", &charge).subject,
            "Payment receipt"
        );
    }
}

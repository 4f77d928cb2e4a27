//! Workflow engine tests: timesheet lifecycle, invoice generation and the
//! invoice payment sub-machine, run against the in-memory store.

mod common;

use billing_service::error::BillingError;
use billing_service::models::{ActingUser, Role};
use billing_service::services::notifications::{
    ChannelPreferences, MockEmailSender, MockWhatsAppSender,
};
use billing_service::services::CreateTimesheetRequest;
use chrono::{Datelike, Days, Utc};
use common::{harness, harness_with, harness_with_senders, test_contract, test_user, TestHarness};
use rust_decimal::Decimal;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

struct Scenario {
    harness: TestHarness,
    freelancer: ActingUser,
    admin: ActingUser,
    client_id: Uuid,
}

/// One company with an admin, a freelancer and an active contract:
/// 500/day, 15% commission, net 30 days, VAT not applicable.
fn scenario() -> Scenario {
    let harness = harness();
    scenario_on(harness)
}

fn scenario_on(harness: TestHarness) -> Scenario {
    let company_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();

    let freelancer_user = test_user(company_id, "freelancer");
    let admin_user = test_user(company_id, "admin");

    let freelancer = ActingUser {
        user_id: freelancer_user.id,
        company_id,
        role: Role::Freelancer,
    };
    let admin = ActingUser {
        user_id: admin_user.id,
        company_id,
        role: Role::Admin,
    };

    harness.store.add_contract(test_contract(
        company_id,
        client_id,
        freelancer_user.id,
        Decimal::from(500),
        Decimal::from(15),
        30,
        "net_days",
        false,
    ));
    harness.store.add_user(freelancer_user);
    harness.store.add_user(admin_user);

    Scenario {
        harness,
        freelancer,
        admin,
        client_id,
    }
}

fn request(client_id: Uuid, month: i32, year: i32, days: i64, submit: bool) -> CreateTimesheetRequest {
    CreateTimesheetRequest {
        client_id,
        month,
        year,
        worked_days: Decimal::from(days),
        submit,
    }
}

#[tokio::test]
async fn full_lifecycle_from_submission_to_payout() {
    let s = scenario();

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 3, 2025, 10, true))
        .await
        .unwrap();
    assert_eq!(timesheet.status, "submitted");
    assert!(timesheet.submitted_at.is_some());

    let (timesheet, invoice) = s
        .harness
        .workflow
        .approve_timesheet(&s.admin, timesheet.id)
        .await
        .unwrap();
    assert_eq!(timesheet.status, "approved");
    assert_eq!(timesheet.admin_id, Some(s.admin.user_id));

    // 10 days x 500/day, 15% commission, no VAT.
    assert_eq!(invoice.amount, Decimal::from(5000));
    assert_eq!(invoice.commission_amount, Decimal::from(750));
    assert_eq!(invoice.facturation_net, Decimal::from(4250));
    assert_eq!(invoice.vat_amount, Decimal::ZERO);
    assert_eq!(invoice.status, "draft");

    let today = Utc::now().date_naive();
    assert_eq!(invoice.due_date, today.checked_add_days(Days::new(30)).unwrap());
    assert_eq!(
        invoice.number,
        format!("INV-{:04}{:02}-001", today.year(), today.month())
    );

    let invoice = s
        .harness
        .workflow
        .send_invoice(&s.admin, invoice.id)
        .await
        .unwrap();
    assert_eq!(invoice.status, "sent");

    let invoice = s
        .harness
        .workflow
        .record_client_payment(&s.admin, invoice.id)
        .await
        .unwrap();
    assert_eq!(invoice.status, "paid");
    assert!(invoice.paid_at.is_some());

    let invoice = s
        .harness
        .workflow
        .record_freelancer_payout(&s.admin, invoice.id)
        .await
        .unwrap();
    assert_eq!(invoice.status, "paid_freelancer");

    // Every transition notified the freelancer (and the submission the admin).
    assert!(s.harness.email.send_count() >= 5);
}

#[tokio::test]
async fn duplicate_timesheet_for_same_period_is_rejected() {
    let s = scenario();

    s.harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 3, 2025, 10, false))
        .await
        .unwrap();

    let err = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 3, 2025, 12, false))
        .await
        .unwrap_err();

    match err {
        BillingError::DuplicateTimesheet { month, year } => {
            assert_eq!(month, 3);
            assert_eq!(year, 2025);
        }
        other => panic!("expected DuplicateTimesheet, got {:?}", other),
    }
    assert!(err.to_string().contains("03/2025"));

    // A different month is fine.
    s.harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 4, 2025, 10, false))
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_timesheet_can_be_refiled_for_same_period() {
    let s = scenario();

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 5, 2025, 18, true))
        .await
        .unwrap();

    let rejected = s
        .harness
        .workflow
        .reject_timesheet(&s.admin, timesheet.id, Some("Wrong day count".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, "rejected");
    assert!(rejected.rejected_at.is_some());

    let refiled = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 5, 2025, 17, true))
        .await
        .unwrap();
    assert_eq!(refiled.status, "submitted");
}

#[tokio::test]
async fn illegal_timesheet_transitions_are_refused() {
    let s = scenario();

    let draft = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 1, 2025, 10, false))
        .await
        .unwrap();

    // Approving or rejecting a draft is illegal.
    for result in [
        s.harness.workflow.approve_timesheet(&s.admin, draft.id).await.map(|_| ()),
        s.harness
            .workflow
            .reject_timesheet(&s.admin, draft.id, None)
            .await
            .map(|_| ()),
    ] {
        match result.unwrap_err() {
            BillingError::InvalidTransition { from, .. } => assert_eq!(from, "draft"),
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    let submitted = s
        .harness
        .workflow
        .submit_timesheet(&s.freelancer, draft.id)
        .await
        .unwrap();

    // Submitting twice is illegal.
    let err = s
        .harness
        .workflow
        .submit_timesheet(&s.freelancer, submitted.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidTransition { .. }));

    // Approving twice is illegal and creates no second invoice.
    s.harness
        .workflow
        .approve_timesheet(&s.admin, submitted.id)
        .await
        .unwrap();
    let err = s
        .harness
        .workflow
        .approve_timesheet(&s.admin, submitted.id)
        .await
        .unwrap_err();
    match err {
        BillingError::InvalidTransition { from, .. } => assert_eq!(from, "approved"),
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
    assert_eq!(s.harness.store.invoice_count(), 1);
}

#[tokio::test]
async fn payout_before_client_payment_is_a_silent_noop() {
    let s = scenario();

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 6, 2025, 12, true))
        .await
        .unwrap();
    let (_, invoice) = s
        .harness
        .workflow
        .approve_timesheet(&s.admin, timesheet.id)
        .await
        .unwrap();
    let invoice = s
        .harness
        .workflow
        .send_invoice(&s.admin, invoice.id)
        .await
        .unwrap();

    // Client has not paid yet: the payout does not change anything.
    let unchanged = s
        .harness
        .workflow
        .record_freelancer_payout(&s.admin, invoice.id)
        .await
        .unwrap();
    assert_eq!(unchanged.status, "sent");

    let paid = s
        .harness
        .workflow
        .record_client_payment(&s.admin, invoice.id)
        .await
        .unwrap();
    let paid_out = s
        .harness
        .workflow
        .record_freelancer_payout(&s.admin, paid.id)
        .await
        .unwrap();
    assert_eq!(paid_out.status, "paid_freelancer");

    // A second payout is also a no-op.
    let again = s
        .harness
        .workflow
        .record_freelancer_payout(&s.admin, paid.id)
        .await
        .unwrap();
    assert_eq!(again.status, "paid_freelancer");
}

#[tokio::test]
async fn role_and_ownership_are_enforced() {
    let s = scenario();

    // Admins do not file timesheets.
    let err = s
        .harness
        .workflow
        .create_timesheet(&s.admin, request(s.client_id, 2, 2025, 10, false))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Unauthorized(_)));

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 2, 2025, 10, true))
        .await
        .unwrap();

    // Freelancers do not review timesheets.
    let err = s
        .harness
        .workflow
        .approve_timesheet(&s.freelancer, timesheet.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Unauthorized(_)));

    // An actor from another company sees nothing.
    let stranger = ActingUser {
        user_id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        role: Role::Admin,
    };
    let err = s
        .harness
        .workflow
        .approve_timesheet(&stranger, timesheet.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn submit_requires_the_owning_freelancer() {
    let s = scenario();

    let draft = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 9, 2025, 10, false))
        .await
        .unwrap();

    // A colleague in the same company is not the contract's freelancer.
    let colleague_user = test_user(s.freelancer.company_id, "freelancer");
    let colleague = ActingUser {
        user_id: colleague_user.id,
        company_id: s.freelancer.company_id,
        role: Role::Freelancer,
    };
    s.harness.store.add_user(colleague_user);

    let err = s
        .harness
        .workflow
        .submit_timesheet(&colleague, draft.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Unauthorized(_)));

    // The owner can still submit it.
    let submitted = s
        .harness
        .workflow
        .submit_timesheet(&s.freelancer, draft.id)
        .await
        .unwrap();
    assert_eq!(submitted.status, "submitted");
}

#[tokio::test]
async fn disabled_channels_suppress_notifications_without_blocking() {
    let s = scenario_on(harness_with(
        Arc::new(MockEmailSender::new()),
        Arc::new(MockWhatsAppSender::new()),
        ChannelPreferences {
            email_enabled: false,
            whatsapp_enabled: false,
        },
    ));

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 12, 2025, 15, true))
        .await
        .unwrap();
    let (timesheet, invoice) = s
        .harness
        .workflow
        .approve_timesheet(&s.admin, timesheet.id)
        .await
        .unwrap();

    // Transitions went through; nothing was sent on either channel.
    assert_eq!(timesheet.status, "approved");
    assert_eq!(invoice.status, "draft");
    assert_eq!(s.harness.email.send_count(), 0);
    assert_eq!(s.harness.whatsapp.send_count(), 0);
}

#[tokio::test]
async fn timesheet_requires_an_active_contract() {
    let s = scenario();

    let err = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(Uuid::new_v4(), 3, 2025, 10, false))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::NoActiveContract));

    let err = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 13, 2025, 10, false))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidInput(_)));
}

#[tokio::test]
async fn notification_failure_does_not_block_transitions() {
    let s = scenario_on(harness_with_senders(
        Arc::new(MockEmailSender::failing()),
        Arc::new(MockWhatsAppSender::failing()),
    ));

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 7, 2025, 15, true))
        .await
        .unwrap();

    let (timesheet, invoice) = s
        .harness
        .workflow
        .approve_timesheet(&s.admin, timesheet.id)
        .await
        .unwrap();
    assert_eq!(timesheet.status, "approved");
    assert_eq!(invoice.status, "draft");
}

#[tokio::test]
async fn invoice_numbers_increment_within_the_month() {
    let s = scenario();

    for (month, expected_suffix) in [(8, "001"), (9, "002"), (10, "003")] {
        let timesheet = s
            .harness
            .workflow
            .create_timesheet(&s.freelancer, request(s.client_id, month, 2025, 10, true))
            .await
            .unwrap();
        let (_, invoice) = s
            .harness
            .workflow
            .approve_timesheet(&s.admin, timesheet.id)
            .await
            .unwrap();
        assert!(
            invoice.number.ends_with(expected_suffix),
            "expected {} to end with {}",
            invoice.number,
            expected_suffix
        );
    }
}

#[tokio::test]
async fn numbering_falls_back_when_the_count_is_unavailable() {
    let s = scenario();
    s.harness
        .store
        .fail_invoice_count
        .store(true, Ordering::SeqCst);

    let timesheet = s
        .harness
        .workflow
        .create_timesheet(&s.freelancer, request(s.client_id, 11, 2025, 10, true))
        .await
        .unwrap();
    let (_, invoice) = s
        .harness
        .workflow
        .approve_timesheet(&s.admin, timesheet.id)
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let prefix = format!("INV-{:04}{:02}-", today.year(), today.month());
    assert!(invoice.number.starts_with(&prefix));
    // Timestamp suffix, not a 3-digit sequence.
    let suffix = &invoice.number[prefix.len()..];
    assert!(suffix.len() > 3);
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
}

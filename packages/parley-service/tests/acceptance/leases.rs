use std::sync::Arc;

use time::macros::datetime;

use parley_storage::{mailboxes, sync_state};

use super::{FakeCalendar, FakeMail, ScriptedInference};

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn one_failing_mailbox_does_not_block_renewal() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping one_failing_mailbox_does_not_block_renewal; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(700));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			mail.clone(),
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			Arc::new(FakeCalendar::default()),
		),
	)
	.await
	.expect("Failed to build service.");
	let healthy = super::seed_mailbox(&service, "good-token", "t-1").await;
	let revoked = mailboxes::insert_mailbox(&service.db.pool, "user-2", "other@example.com", "bad-token")
		.await
		.expect("Failed to insert mailbox.");

	mail.revoke_token("bad-token");
	mail.set_lease_expiry(datetime!(2026-10-23 12:00 UTC));

	let now = datetime!(2026-10-16 12:00 UTC);
	let first = service.renew_due_leases(now).await.expect("Renewal sweep failed.");

	assert_eq!(first.total, 2);
	assert_eq!(first.renewed, 1);
	assert_eq!(first.failed, 1);

	let renewed = sync_state::get_sync_state(&service.db.pool, healthy)
		.await
		.expect("Failed to load sync state.")
		.expect("Missing sync state.");

	assert_eq!(renewed.lease_expires_at, Some(datetime!(2026-10-23 12:00 UTC)));
	assert_eq!(renewed.cursor_token.as_deref(), Some("700"));
	assert!(
		sync_state::get_sync_state(&service.db.pool, revoked)
			.await
			.expect("Failed to load sync state.")
			.is_none_or(|state| state.lease_expires_at.is_none())
	);

	// Inside the renewal window again, the provider hands out a later expiry.
	mail.set_lease_expiry(datetime!(2026-10-30 12:00 UTC));

	let later = datetime!(2026-10-22 18:00 UTC);
	let second = service.renew_due_leases(later).await.expect("Second sweep failed.");
	let extended = sync_state::get_sync_state(&service.db.pool, healthy)
		.await
		.expect("Failed to load sync state.")
		.expect("Missing sync state.");

	assert_eq!(second.renewed, 1);
	assert!(extended.lease_expires_at > renewed.lease_expires_at);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn renewal_never_moves_an_expiry_backwards() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping renewal_never_moves_an_expiry_backwards; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(5));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			mail.clone(),
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			Arc::new(FakeCalendar::default()),
		),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;

	mail.set_lease_expiry(datetime!(2026-10-23 12:00 UTC));
	service.renew_due_leases(datetime!(2026-10-16 12:00 UTC)).await.expect("Renewal failed.");
	mail.set_lease_expiry(datetime!(2026-10-20 12:00 UTC));

	let report =
		service.renew_due_leases(datetime!(2026-10-22 18:00 UTC)).await.expect("Renewal failed.");
	let state = sync_state::get_sync_state(&service.db.pool, mailbox_id)
		.await
		.expect("Failed to load sync state.")
		.expect("Missing sync state.");

	assert_eq!(report.renewed, 0);
	assert_eq!(report.failed, 1);
	assert_eq!(state.lease_expires_at, Some(datetime!(2026-10-23 12:00 UTC)));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

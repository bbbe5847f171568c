use std::sync::Arc;

use parley_service::sync::SyncReport;
use parley_storage::{messages, sync_state};

use super::{FakeCalendar, FakeMail, ScriptedInference, draft, received, sent};

fn inference() -> Arc<ScriptedInference> {
	Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false })))
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn full_resync_then_incremental_catch_up() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping full_resync_then_incremental_catch_up; set PARLEY_PG_DSN to run this test.");

		return;
	};
	let mail = Arc::new(FakeMail::new(100));

	mail.deliver(sent("m1", "t-1", 0, "Would Tuesday 2pm work for a quick call?"));
	mail.deliver(received("m2", "t-1", 30, "Tuesday 2pm?"));

	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail.clone(), inference(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let first = service.sync_mailbox(mailbox_id).await.expect("First sync failed.");

	assert_eq!(first.inserted, 2);
	assert_eq!(first.enqueued, 1);
	assert_eq!(first.cursor.as_deref(), Some("102"));

	mail.deliver(received("m3", "t-1", 60, "Sounds good!"));

	let second = service.sync_mailbox(mailbox_id).await.expect("Second sync failed.");
	let state = sync_state::get_sync_state(&service.db.pool, mailbox_id)
		.await
		.expect("Failed to load sync state.")
		.expect("Missing sync state.");
	let thread = messages::thread_messages(&service.db.pool, mailbox_id, "t-1")
		.await
		.expect("Failed to load thread.");

	assert_eq!(second.inserted, 1);
	assert_eq!(second.enqueued, 1);
	assert_eq!(state.cursor_token.as_deref(), Some("103"));
	assert!(state.sync_lease_owner.is_none());
	assert_eq!(
		thread.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>(),
		vec!["m1", "m2", "m3"]
	);
	assert_eq!(thread[0].direction, "SENT");
	assert!(thread[0].outbound_send_id.is_some());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn drafts_are_left_out_of_the_thread() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping drafts_are_left_out_of_the_thread; set PARLEY_PG_DSN to run this test.");

		return;
	};
	let mail = Arc::new(FakeMail::new(100));

	mail.deliver(sent("m1", "t-1", 0, "Would Tuesday 2pm work for a quick call?"));
	mail.deliver(received("m2", "t-1", 30, "Tuesday 2pm works."));
	mail.deliver(draft("d1", "t-1", 45, "Great, sending an invite for Tuesday 2pm."));

	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail.clone(), inference(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let report = service.sync_mailbox(mailbox_id).await.expect("Sync failed.");
	let stored = messages::message_exists(&service.db.pool, mailbox_id, "d1")
		.await
		.expect("Failed to look up draft.");
	let conversation = messages::get_conversation(&service.db.pool, mailbox_id, "t-1")
		.await
		.expect("Failed to load conversation.")
		.expect("Missing conversation.");

	assert_eq!(report.inserted, 2);
	assert_eq!(report.skipped, 1);
	assert_eq!(report.cursor.as_deref(), Some("103"));
	assert!(!stored);
	assert_eq!(conversation.message_count, 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn expired_cursor_falls_back_to_full_resync() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping expired_cursor_falls_back_to_full_resync; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(10));

	mail.deliver(received("m1", "t-1", 0, "Hello there"));

	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail.clone(), inference(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;

	service.sync_mailbox(mailbox_id).await.expect("Initial sync failed.");
	mail.deliver(received("m2", "t-1", 10, "Still there?"));
	mail.expire_cursor(true);

	let report = service.sync_mailbox(mailbox_id).await.expect("Fallback sync failed.");

	assert_eq!(report.inserted, 1);
	assert_eq!(report.skipped, 1);
	assert_eq!(report.cursor.as_deref(), Some("12"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn transient_fetch_failure_holds_the_cursor() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping transient_fetch_failure_holds_the_cursor; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(50));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail.clone(), inference(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;

	service.sync_mailbox(mailbox_id).await.expect("Initial sync failed.");
	mail.deliver(received("m1", "t-1", 0, "Tuesday 2pm?"));
	mail.deliver(received("m2", "t-1", 5, "Or Wednesday?"));
	mail.set_unavailable("m1", true);

	let held = service.sync_mailbox(mailbox_id).await.expect("Sync failed.");

	assert_eq!(held.failed, 1);
	assert_eq!(held.inserted, 1);
	assert_eq!(held.cursor, None);

	let state = sync_state::get_sync_state(&service.db.pool, mailbox_id)
		.await
		.expect("Failed to load sync state.")
		.expect("Missing sync state.");

	assert_eq!(state.cursor_token.as_deref(), Some("50"));

	mail.set_unavailable("m1", false);

	let replayed = service.sync_mailbox(mailbox_id).await.expect("Replay sync failed.");

	assert_eq!(replayed.inserted, 1);
	assert_eq!(replayed.skipped, 1);
	assert_eq!(replayed.cursor.as_deref(), Some("52"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn cursor_is_monotonic_under_bursts() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping cursor_is_monotonic_under_bursts; set PARLEY_PG_DSN to run this test.");

		return;
	};
	let mail = Arc::new(FakeMail::new(1_000));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail.clone(), inference(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;

	service.sync_mailbox(mailbox_id).await.expect("Initial sync failed.");

	let mut last_seen = 1_000_u64;

	for round in 0..4 {
		for idx in 0..3 {
			mail.deliver(received(&format!("m{round}-{idx}"), "t-1", round * 10 + idx, "ping"));
		}

		let reports: Vec<SyncReport> = overlapping_syncs(&service, mailbox_id).await;
		let state = sync_state::get_sync_state(&service.db.pool, mailbox_id)
			.await
			.expect("Failed to load sync state.")
			.expect("Missing sync state.");
		let cursor: u64 = state
			.cursor_token
			.as_deref()
			.and_then(|cursor| cursor.parse().ok())
			.expect("Cursor is not numeric.");

		assert!(cursor >= last_seen);
		assert!(reports.iter().any(|report| !report.deferred));

		last_seen = cursor;
	}

	let thread = messages::thread_messages(&service.db.pool, mailbox_id, "t-1")
		.await
		.expect("Failed to load thread.");
	let conversation = messages::get_conversation(&service.db.pool, mailbox_id, "t-1")
		.await
		.expect("Failed to load conversation.")
		.expect("Missing conversation.");

	assert_eq!(thread.len(), 12);
	assert_eq!(conversation.message_count, 12);
	assert_eq!(last_seen.to_string(), mail.position());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

/// Three overlapping syncs of one mailbox. Deferred ones leave a resync request that the winner
/// picks up before releasing its lease.
async fn overlapping_syncs(
	service: &Arc<parley_service::ParleyService>,
	mailbox_id: uuid::Uuid,
) -> Vec<SyncReport> {
	let (a, b, c) = tokio::join!(
		service.sync_mailbox(mailbox_id),
		service.sync_mailbox(mailbox_id),
		service.sync_mailbox(mailbox_id),
	);

	[a, b, c].into_iter().map(|report| report.expect("Sync failed.")).collect()
}

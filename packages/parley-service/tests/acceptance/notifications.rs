use std::{sync::Arc, time::Duration};

use base64::Engine as _;

use parley_service::notification::{NotificationOutcome, PushEnvelope, PushMessage};
use parley_storage::{messages, outbox};

use super::{FakeCalendar, FakeMail, ScriptedInference, received, sent};

fn envelope(address: &str, history_id: u64, message_id: Option<&str>) -> PushEnvelope {
	let payload = serde_json::json!({ "emailAddress": address, "historyId": history_id });

	PushEnvelope {
		message: PushMessage {
			data: base64::engine::general_purpose::STANDARD.encode(payload.to_string()),
			message_id: message_id.map(str::to_string),
		},
		subscription: Some("projects/test/subscriptions/mail".to_string()),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn redelivered_notification_is_processed_once() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping redelivered_notification_is_processed_once; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(200));

	mail.deliver(sent("m1", "t-1", 0, "Would Tuesday 2pm work?"));
	mail.deliver(received("m2", "t-1", 30, "Sounds good!"));

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
	let push = envelope("Owner@Example.com", 202, Some("push-1"));
	let first = service.receive_notification(&push).await.expect("First delivery failed.");

	assert_eq!(first, NotificationOutcome::Dispatched { mailbox_id });

	// Sync runs on a spawned task.
	let mut thread = Vec::new();

	for _ in 0..50 {
		thread = messages::thread_messages(&service.db.pool, mailbox_id, "t-1")
			.await
			.expect("Failed to load thread.");

		if thread.len() == 2 {
			break;
		}

		tokio::time::sleep(Duration::from_millis(100)).await;
	}

	assert_eq!(thread.len(), 2);

	let second = service.receive_notification(&push).await.expect("Redelivery failed.");

	assert_eq!(second, NotificationOutcome::Duplicate);

	// A manual rerun over the same history must not duplicate anything either.
	let rerun = service.sync_mailbox(mailbox_id).await.expect("Rerun failed.");

	assert_eq!(rerun.inserted, 0);

	let conversation = messages::get_conversation(&service.db.pool, mailbox_id, "t-1")
		.await
		.expect("Failed to load conversation.")
		.expect("Missing conversation.");
	let job = outbox::claim_next_extraction(&service.db, time::OffsetDateTime::now_utc(), 60)
		.await
		.expect("Failed to claim job.")
		.expect("Missing extraction job.");
	let no_second_job =
		outbox::claim_next_extraction(&service.db, time::OffsetDateTime::now_utc(), 60)
			.await
			.expect("Failed to claim job.");

	assert_eq!(conversation.message_count, 2);
	assert_eq!(job.message_id, "m2");
	assert!(no_second_job.is_none());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn notifications_without_message_id_dedupe_on_content() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping notifications_without_message_id_dedupe_on_content; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(300));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			mail,
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			Arc::new(FakeCalendar::default()),
		),
	)
	.await
	.expect("Failed to build service.");

	super::seed_mailbox(&service, "token", "t-1").await;

	let first = service
		.receive_notification(&envelope("owner@example.com", 301, None))
		.await
		.expect("First delivery failed.");
	let repeat = service
		.receive_notification(&envelope("OWNER@example.com", 301, None))
		.await
		.expect("Repeat delivery failed.");
	let newer = service
		.receive_notification(&envelope("owner@example.com", 302, None))
		.await
		.expect("Newer delivery failed.");

	assert!(matches!(first, NotificationOutcome::Dispatched { .. }));
	assert_eq!(repeat, NotificationOutcome::Duplicate);
	assert!(matches!(newer, NotificationOutcome::Dispatched { .. }));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn unknown_mailbox_is_acknowledged_without_sync() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping unknown_mailbox_is_acknowledged_without_sync; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(1));
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
	let outcome = service
		.receive_notification(&envelope("stranger@example.com", 5, Some("push-x")))
		.await
		.expect("Delivery failed.");

	assert_eq!(outcome, NotificationOutcome::Unresolved);
	assert_eq!(mail.fetches.load(std::sync::atomic::Ordering::SeqCst), 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

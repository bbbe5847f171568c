use std::sync::Arc;

use time::{OffsetDateTime, macros::datetime};

use parley_domain::suggestion::SuggestionStatus;
use parley_service::extraction::ExtractionOutcome;
use parley_storage::outbox;

use super::{FakeCalendar, FakeMail, ScriptedInference, received, sent};

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn thread_yields_one_suggestion_across_runs() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping thread_yields_one_suggestion_across_runs; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(10));
	let inference =
		Arc::new(ScriptedInference::new(super::confirmed_meeting("2026-10-13T14:00:00-07:00", 0.9)));

	mail.deliver(sent("m1", "t-1", 0, "Tuesday 2pm?"));
	mail.deliver(received("m2", "t-1", 30, "Sounds good!"));

	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail.clone(), inference.clone(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;

	service.sync_mailbox(mailbox_id).await.expect("Sync failed.");

	let first =
		service.process_extraction(mailbox_id, "t-1", "m2").await.expect("First run failed.");

	// A later reply in the same thread must not produce a second suggestion.
	mail.deliver(received("m3", "t-1", 45, "See you then!"));
	service.sync_mailbox(mailbox_id).await.expect("Second sync failed.");

	let second =
		service.process_extraction(mailbox_id, "t-1", "m3").await.expect("Second run failed.");
	let replay =
		service.process_extraction(mailbox_id, "t-1", "m2").await.expect("Replay run failed.");
	let listed = service
		.list_suggestions(mailbox_id, None, None)
		.await
		.expect("Failed to list suggestions.");

	assert!(matches!(first, ExtractionOutcome::Created { .. }));
	assert_eq!(second, ExtractionOutcome::AlreadySuggested);
	assert_eq!(replay, ExtractionOutcome::AlreadySuggested);
	assert_eq!(inference.count(), 1);
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].status, SuggestionStatus::Pending);
	assert_eq!(listed[0].source_message_id, "m2");
	assert_eq!(listed[0].extracted_data.start_time, Some(datetime!(2026-10-13 14:00 -7)));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn low_confidence_confirmation_stores_nothing() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping low_confidence_confirmation_stores_nothing; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(10));
	let inference =
		Arc::new(ScriptedInference::new(super::confirmed_meeting("2026-10-13T14:00:00-07:00", 0.2)));

	mail.deliver(sent("m1", "t-1", 0, "Tuesday 2pm?"));
	mail.deliver(received("m2", "t-1", 30, "Sounds good!"));

	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(mail, inference.clone(), Arc::new(FakeCalendar::default())),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;

	service.sync_mailbox(mailbox_id).await.expect("Sync failed.");

	let outcome =
		service.process_extraction(mailbox_id, "t-1", "m2").await.expect("Extraction failed.");
	let listed = service
		.list_suggestions(mailbox_id, Some(SuggestionStatus::Pending), None)
		.await
		.expect("Failed to list suggestions.");

	assert_eq!(outcome, ExtractionOutcome::LowConfidence);
	assert_eq!(inference.count(), 1);
	assert!(listed.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn replies_in_threads_we_did_not_start_are_not_queued() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping replies_in_threads_we_did_not_start_are_not_queued; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let mail = Arc::new(FakeMail::new(10));

	mail.deliver(received("m1", "t-other", 0, "Can we meet Tuesday at 2pm?"));
	mail.deliver(received("m2", "t-1", 5, "Sounds good!"));

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
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let report = service.sync_mailbox(mailbox_id).await.expect("Sync failed.");
	let job = outbox::claim_next_extraction(&service.db, OffsetDateTime::now_utc(), 60)
		.await
		.expect("Failed to claim job.")
		.expect("Missing extraction job.");

	assert_eq!(report.inserted, 2);
	assert_eq!(report.enqueued, 1);
	assert_eq!(job.thread_id, "t-1");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

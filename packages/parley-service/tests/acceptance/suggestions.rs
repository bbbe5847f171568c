use std::sync::Arc;

use time::{OffsetDateTime, macros::datetime};
use uuid::Uuid;

use parley_domain::{
	meeting::{ExtractedMeeting, ExtractedMeetingData},
	suggestion::SuggestionStatus,
};
use parley_service::{Error, ParleyService};
use parley_storage::suggestions::{self, NewSuggestion};

use super::{FakeCalendar, FakeMail, ScriptedInference};

async fn pending(
	service: &ParleyService,
	mailbox_id: Uuid,
	thread_id: &str,
	start_time: Option<&str>,
) -> Uuid {
	let data = ExtractedMeetingData::from_extracted(
		ExtractedMeeting {
			title: Some("Intro call".to_string()),
			start_time: start_time.map(str::to_string),
			duration_minutes: Some(45),
			meeting_link: Some("https://zoom.us/j/123".to_string()),
			attendees: Some(vec!["ada@example.com".to_string()]),
			confidence: Some(0.9),
			..Default::default()
		},
		30,
	);
	let new = NewSuggestion {
		mailbox_id,
		thread_id,
		source_message_id: "m2",
		extracted_data: serde_json::to_value(&data).expect("Failed to encode meeting data."),
		confidence: data.confidence,
	};

	suggestions::create_if_absent(&service.db.pool, &new, OffsetDateTime::now_utc())
		.await
		.expect("Failed to create suggestion.")
		.expect("Suggestion already existed.")
		.suggestion_id
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn accept_books_once_and_terminal_states_hold() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping accept_books_once_and_terminal_states_hold; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let calendar = Arc::new(FakeCalendar::default());
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			Arc::new(FakeMail::new(1)),
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			calendar.clone(),
		),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let suggestion_id =
		pending(&service, mailbox_id, "t-1", Some("2026-10-13T14:00:00-07:00")).await;
	let accepted = service.accept_suggestion(suggestion_id).await.expect("Accept failed.");

	assert_eq!(accepted.status, SuggestionStatus::Accepted);
	assert_eq!(accepted.calendar_event_id.as_deref(), Some("evt-1"));

	{
		let events = calendar.events.lock().expect("Calendar poisoned.");

		assert_eq!(events[0].summary, "Intro call");
		assert_eq!(events[0].start, datetime!(2026-10-13 14:00 -7));
		assert_eq!(events[0].end, datetime!(2026-10-13 14:45 -7));
		assert_eq!(events[0].location.as_deref(), Some("https://zoom.us/j/123"));
	}

	let again = service.accept_suggestion(suggestion_id).await;
	let dismissed = service.dismiss_suggestion(suggestion_id).await;

	assert!(matches!(again, Err(Error::Conflict { .. })));
	assert!(matches!(dismissed, Err(Error::Conflict { .. })));
	assert_eq!(calendar.count(), 1);

	let listed = service
		.list_suggestions(mailbox_id, Some(SuggestionStatus::Accepted), Some(10))
		.await
		.expect("Failed to list suggestions.");

	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].suggestion_id, suggestion_id);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn dismiss_and_unscheduled_accept() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping dismiss_and_unscheduled_accept; set PARLEY_PG_DSN to run this test.");

		return;
	};
	let calendar = Arc::new(FakeCalendar::default());
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			Arc::new(FakeMail::new(1)),
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			calendar.clone(),
		),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let vague = pending(&service, mailbox_id, "t-1", Some("next Tuesday afternoon")).await;
	let dated = pending(&service, mailbox_id, "t-2", Some("2026-10-14T10:00:00Z")).await;
	let unscheduled = service.accept_suggestion(vague).await;

	assert!(matches!(unscheduled, Err(Error::InvalidRequest { .. })));
	assert_eq!(calendar.count(), 0);

	let dismissed = service.dismiss_suggestion(dated).await.expect("Dismiss failed.");

	assert_eq!(dismissed.status, SuggestionStatus::Dismissed);
	assert!(dismissed.calendar_event_id.is_none());
	assert!(matches!(service.accept_suggestion(dated).await, Err(Error::Conflict { .. })));
	assert!(matches!(service.get_suggestion(Uuid::new_v4()).await, Err(Error::NotFound { .. })));

	let still_pending = service
		.list_suggestions(mailbox_id, Some(SuggestionStatus::Pending), None)
		.await
		.expect("Failed to list suggestions.");

	assert_eq!(still_pending.len(), 1);
	assert_eq!(still_pending[0].suggestion_id, vague);
	assert!(still_pending[0].extracted_data.needs_time_confirmation);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn concurrent_accepts_book_one_event() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping concurrent_accepts_book_one_event; set PARLEY_PG_DSN to run this test.");

		return;
	};
	let calendar = Arc::new(FakeCalendar::slow(500));
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			Arc::new(FakeMail::new(1)),
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			calendar.clone(),
		),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let suggestion_id =
		pending(&service, mailbox_id, "t-1", Some("2026-10-13T14:00:00-07:00")).await;
	let (first, second, dismissed) = tokio::join!(
		service.accept_suggestion(suggestion_id),
		service.accept_suggestion(suggestion_id),
		async {
			tokio::time::sleep(std::time::Duration::from_millis(100)).await;

			service.dismiss_suggestion(suggestion_id).await
		},
	);
	let (accepted, rejected) = match (first, second) {
		(Ok(accepted), Err(rejected)) | (Err(rejected), Ok(accepted)) => (accepted, rejected),
		(first, second) => panic!("Expected exactly one accept to win: {first:?} / {second:?}"),
	};

	assert!(matches!(rejected, Error::Conflict { .. }));
	assert!(matches!(dismissed, Err(Error::Conflict { .. })));
	assert_eq!(accepted.status, SuggestionStatus::Accepted);
	assert_eq!(accepted.calendar_event_id.as_deref(), Some("evt-1"));
	assert_eq!(calendar.count(), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set PARLEY_PG_DSN to run."]
async fn failed_booking_leaves_the_suggestion_pending() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping failed_booking_leaves_the_suggestion_pending; set PARLEY_PG_DSN to run this test."
		);

		return;
	};
	let calendar = Arc::new(FakeCalendar::default());
	let cfg = super::test_config(test_db.dsn().to_string());
	let service = super::build_service(
		cfg,
		super::providers(
			Arc::new(FakeMail::new(1)),
			Arc::new(ScriptedInference::new(serde_json::json!({ "is_confirmed": false }))),
			calendar.clone(),
		),
	)
	.await
	.expect("Failed to build service.");
	let mailbox_id = super::seed_mailbox(&service, "token", "t-1").await;
	let suggestion_id =
		pending(&service, mailbox_id, "t-1", Some("2026-10-13T14:00:00-07:00")).await;

	calendar.fail_next(1);

	let failed = service.accept_suggestion(suggestion_id).await;
	let current = service.get_suggestion(suggestion_id).await.expect("Failed to load suggestion.");

	assert!(matches!(failed, Err(Error::Provider { retryable: true, .. })));
	assert_eq!(current.status, SuggestionStatus::Pending);
	assert_eq!(calendar.count(), 0);

	let accepted = service.accept_suggestion(suggestion_id).await.expect("Retried accept failed.");

	assert_eq!(accepted.status, SuggestionStatus::Accepted);
	assert_eq!(calendar.count(), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

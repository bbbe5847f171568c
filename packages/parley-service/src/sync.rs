//! Mailbox synchronization: incremental catch-up from the stored cursor, or a bounded full resync
//! that establishes a fresh one.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, ParleyService, Result};
use parley_domain::{cursor, thread::Direction};
use parley_providers::gmail::{self, ProviderMessage};
use parley_storage::{
	mailboxes,
	messages::{self, NewMessage},
	models::Mailbox,
	outbox, sync_state,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
	Incremental,
	Full,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
	pub passes: u32,
	/// Another process held the sync lease; it was asked to run again instead.
	pub deferred: bool,
	pub fetched: u32,
	pub inserted: u32,
	pub skipped: u32,
	pub failed: u32,
	pub enqueued: u32,
	pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct BatchOutcome {
	complete: bool,
}

struct PassContext<'a> {
	mailbox: &'a Mailbox,
	owner: Uuid,
}

impl ParleyService {
	/// Entry point for triggers: folds overlapping triggers for one mailbox into the in-flight run.
	pub async fn run_sync(&self, mailbox_id: Uuid) {
		let max_passes = self.cfg.sync.max_passes;
		let passes = self
			.coordinator
			.run(mailbox_id, max_passes, || async move {
				if let Err(err) = self.sync_mailbox(mailbox_id).await {
					tracing::error!(mailbox_id = %mailbox_id, error = %err, "Mailbox sync failed.");
				}
			})
			.await;

		if passes.is_none() {
			tracing::debug!(mailbox_id = %mailbox_id, "Sync already running; trigger coalesced.");
		}
	}

	/// One serialized sync of a mailbox across processes. Runs extra passes while other triggers
	/// request them through the sync lease.
	pub async fn sync_mailbox(&self, mailbox_id: Uuid) -> Result<SyncReport> {
		let mailbox = mailboxes::get_mailbox(&self.db.pool, mailbox_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Mailbox {mailbox_id} not found.") })?;
		let owner = Uuid::new_v4();
		let now = OffsetDateTime::now_utc();
		let mut report = SyncReport::default();

		sync_state::ensure_sync_state(&self.db.pool, mailbox_id, &mailbox.email_address, now).await?;

		if sync_state::claim_sync_lease(&self.db.pool, mailbox_id, owner, now, self.lease_until(now))
			.await?
			.is_none()
		{
			sync_state::request_resync(&self.db.pool, mailbox_id, now).await?;

			tracing::info!(mailbox_id = %mailbox_id, "Sync lease held elsewhere; resync requested.");

			report.deferred = true;

			return Ok(report);
		}

		let ctx = PassContext { mailbox: &mailbox, owner };

		loop {
			report.passes += 1;

			if let Err(err) = self.sync_pass(&ctx, &mut report).await {
				let now = OffsetDateTime::now_utc();

				if let Err(release_err) =
					sync_state::release_sync_lease(&self.db.pool, mailbox_id, owner, now).await
				{
					tracing::warn!(
						mailbox_id = %mailbox_id,
						error = %release_err,
						"Failed to release sync lease."
					);
				}

				return Err(err);
			}

			let now = OffsetDateTime::now_utc();
			let rerun = sync_state::finish_sync_pass(
				&self.db.pool,
				mailbox_id,
				owner,
				now,
				self.lease_until(now),
			)
			.await?;

			if !rerun {
				break;
			}
			if report.passes >= self.cfg.sync.max_passes {
				sync_state::release_sync_lease(&self.db.pool, mailbox_id, owner, now).await?;
				sync_state::request_resync(&self.db.pool, mailbox_id, now).await?;

				tracing::warn!(mailbox_id = %mailbox_id, "Sync pass limit reached; resync left pending.");

				break;
			}
		}

		tracing::info!(
			mailbox_id = %mailbox_id,
			passes = report.passes,
			fetched = report.fetched,
			inserted = report.inserted,
			enqueued = report.enqueued,
			failed = report.failed,
			"Mailbox sync finished."
		);

		Ok(report)
	}

	async fn sync_pass(&self, ctx: &PassContext<'_>, report: &mut SyncReport) -> Result<SyncMode> {
		let state = sync_state::get_sync_state(&self.db.pool, ctx.mailbox.mailbox_id)
			.await?
			.ok_or_else(|| Error::NotFound {
				message: format!("Sync state for mailbox {} not found.", ctx.mailbox.mailbox_id),
			})?;
		let now = OffsetDateTime::now_utc();
		let fresh_cursor = state.cursor_token.filter(|_| {
			state.cursor_updated_at.is_some_and(|updated_at| {
				cursor::is_fresh(updated_at, now, self.cfg.sync.cursor_max_age_days)
			})
		});

		if let Some(start) = fresh_cursor {
			match self.incremental_pass(ctx, &start, report).await {
				Err(Error::CursorExpired) => {
					tracing::warn!(
						mailbox_id = %ctx.mailbox.mailbox_id,
						cursor = %start,
						"History cursor rejected by provider; falling back to full resync."
					);
				},
				other => return other.map(|()| SyncMode::Incremental),
			}
		}

		self.full_pass(ctx, report).await?;

		Ok(SyncMode::Full)
	}

	async fn incremental_pass(
		&self,
		ctx: &PassContext<'_>,
		start: &str,
		report: &mut SyncReport,
	) -> Result<()> {
		let mail = &self.providers.mail;
		let token = ctx.mailbox.access_token.as_str();
		let mut page_token: Option<String> = None;

		loop {
			let page = mail.changes_since(token, start, page_token.as_deref()).await?;
			let outcome = self.apply_batch(ctx, &page.message_ids, report).await;

			if !outcome.complete {
				tracing::warn!(
					mailbox_id = %ctx.mailbox.mailbox_id,
					"Change batch incomplete; cursor held at last applied position."
				);

				return Ok(());
			}
			if let Some(position) = page.cursor.as_deref() {
				self.advance_cursor(ctx, position, report).await?;
			}

			match page.next_page_token {
				Some(next) => page_token = Some(next),
				None => return Ok(()),
			}
		}
	}

	async fn full_pass(&self, ctx: &PassContext<'_>, report: &mut SyncReport) -> Result<()> {
		let mail = &self.providers.mail;
		let token = ctx.mailbox.access_token.as_str();
		// Taken before listing so changes racing the listing are replayed by the next incremental
		// pass rather than skipped.
		let position = mail.current_cursor(token).await?;
		let ids = mail.list_recent(token, self.cfg.sync.full_resync_max_messages).await?;
		let outcome = self.apply_batch(ctx, &ids, report).await;

		if outcome.complete {
			self.advance_cursor(ctx, &position, report).await?;
		} else {
			tracing::warn!(
				mailbox_id = %ctx.mailbox.mailbox_id,
				"Full resync incomplete; cursor not established."
			);
		}

		Ok(())
	}

	/// Applies every message of one batch. Failures are logged and skipped; a transient one marks
	/// the batch incomplete so the cursor stays put and the batch is replayed later.
	async fn apply_batch(
		&self,
		ctx: &PassContext<'_>,
		message_ids: &[String],
		report: &mut SyncReport,
	) -> BatchOutcome {
		let mut outcome = BatchOutcome { complete: true };

		for message_id in message_ids {
			match self.apply_message(ctx, message_id).await {
				Ok(Applied::Inserted { enqueued }) => {
					report.fetched += 1;
					report.inserted += 1;

					if enqueued {
						report.enqueued += 1;
					}
				},
				Ok(Applied::Known | Applied::Excluded) => report.skipped += 1,
				Err(err) => {
					report.failed += 1;

					if err.is_retryable() {
						outcome.complete = false;
					}

					tracing::warn!(
						mailbox_id = %ctx.mailbox.mailbox_id,
						message_id = %message_id,
						retryable = err.is_retryable(),
						error = %err,
						"Failed to apply message; skipping."
					);
				},
			}
		}

		outcome
	}

	async fn apply_message(&self, ctx: &PassContext<'_>, message_id: &str) -> Result<Applied> {
		let mailbox = ctx.mailbox;

		if messages::message_exists(&self.db.pool, mailbox.mailbox_id, message_id).await? {
			return Ok(Applied::Known);
		}

		let message = self.providers.mail.get_message(&mailbox.access_token, message_id).await?;

		if !is_conversation_mail(&message) {
			tracing::debug!(
				mailbox_id = %mailbox.mailbox_id,
				message_id = %message_id,
				labels = ?message.label_ids,
				"Draft or junk message left out of the conversation."
			);

			return Ok(Applied::Excluded);
		}

		self.store_message(mailbox, &message).await
	}

	async fn store_message(&self, mailbox: &Mailbox, message: &ProviderMessage) -> Result<Applied> {
		let direction = direction_of(mailbox, message);
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let outbound_send_id = match direction {
			Direction::Sent =>
				mailboxes::match_outbound_send(
					&mut *tx,
					mailbox.mailbox_id,
					&message.id,
					&message.thread_id,
				)
				.await?,
			Direction::Received => None,
		};
		let new = NewMessage {
			mailbox_id: mailbox.mailbox_id,
			message_id: &message.id,
			thread_id: &message.thread_id,
			direction,
			sender: &message.sender,
			subject: &message.subject,
			body_text: &message.body_text,
			received_at: message.received_at,
			outbound_send_id,
		};

		if !messages::insert_message(&mut tx, &new).await? {
			if let Some(send_id) = outbound_send_id {
				messages::backfill_outbound_send(&mut *tx, mailbox.mailbox_id, &message.id, send_id)
					.await?;
			}

			tx.commit().await?;

			return Ok(Applied::Known);
		}

		let enqueued = direction == Direction::Received
			&& mailboxes::thread_was_initiated(&mut *tx, mailbox.mailbox_id, &message.thread_id)
				.await?
			&& outbox::enqueue_extraction(
				&mut *tx,
				mailbox.mailbox_id,
				&message.id,
				&message.thread_id,
				now,
			)
			.await?;

		tx.commit().await?;

		Ok(Applied::Inserted { enqueued })
	}

	async fn advance_cursor(
		&self,
		ctx: &PassContext<'_>,
		position: &str,
		report: &mut SyncReport,
	) -> Result<()> {
		if !cursor::advances(report.cursor.as_deref(), position) {
			return Ok(());
		}

		let now = OffsetDateTime::now_utc();
		let moved = sync_state::advance_cursor(
			&self.db.pool,
			ctx.mailbox.mailbox_id,
			ctx.owner,
			position,
			now,
			self.lease_until(now),
		)
		.await?;

		if moved {
			report.cursor = Some(position.to_string());
		} else {
			tracing::warn!(
				mailbox_id = %ctx.mailbox.mailbox_id,
				cursor = %position,
				"Cursor write rejected; lease lost or cursor would regress."
			);
		}

		Ok(())
	}

	fn lease_until(&self, now: OffsetDateTime) -> OffsetDateTime {
		now + Duration::seconds(self.cfg.sync.sync_lease_seconds)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
	Inserted { enqueued: bool },
	Known,
	/// Drafts, spam and trash never become conversation messages.
	Excluded,
}

const EXCLUDED_LABELS: [&str; 3] = ["DRAFT", "SPAM", "TRASH"];

/// Only mail that was actually exchanged counts; an unsent draft must not steer the parser.
pub fn is_conversation_mail(message: &ProviderMessage) -> bool {
	!EXCLUDED_LABELS.iter().any(|label| message.has_label(label))
}

/// SENT when the provider labels it so or the mailbox owner wrote it.
pub fn direction_of(mailbox: &Mailbox, message: &ProviderMessage) -> Direction {
	if message.has_label("SENT")
		|| gmail::address_of(&message.sender).eq_ignore_ascii_case(mailbox.email_address.trim())
	{
		Direction::Sent
	} else {
		Direction::Received
	}
}

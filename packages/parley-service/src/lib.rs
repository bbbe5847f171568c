pub mod calendar_parser;
pub mod coordinator;
pub mod extraction;
pub mod leases;
pub mod ledger;
pub mod notification;
pub mod suggestions;
pub mod sync;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use parley_config::Config;
use parley_providers::{
	calendar::{CalendarClient, NewEvent},
	gmail::{ChangePage, GmailClient, ProviderMessage, WatchLease},
	inference::InferenceClient,
};
use parley_storage::db::Db;

use crate::coordinator::SyncCoordinator;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type ProviderResult<T> = parley_providers::Result<T>;

/// The mailbox provider as seen by the sync engine and the lease manager.
pub trait MailProvider
where
	Self: Send + Sync,
{
	fn changes_since<'a>(
		&'a self,
		access_token: &'a str,
		cursor: &'a str,
		page_token: Option<&'a str>,
	) -> BoxFuture<'a, ProviderResult<ChangePage>>;

	fn list_recent<'a>(
		&'a self,
		access_token: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, ProviderResult<Vec<String>>>;

	/// The mailbox's current history position.
	fn current_cursor<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, ProviderResult<String>>;

	fn get_message<'a>(
		&'a self,
		access_token: &'a str,
		message_id: &'a str,
	) -> BoxFuture<'a, ProviderResult<ProviderMessage>>;

	fn subscribe<'a>(
		&'a self,
		access_token: &'a str,
		topic_name: &'a str,
	) -> BoxFuture<'a, ProviderResult<WatchLease>>;
}

pub trait InferenceProvider
where
	Self: Send + Sync,
{
	/// Returns the model's raw JSON reply; callers parse it strictly.
	fn complete_structured<'a>(&'a self, messages: &'a [Value]) -> BoxFuture<'a, ProviderResult<String>>;
}

pub trait CalendarProvider
where
	Self: Send + Sync,
{
	fn create_event<'a>(
		&'a self,
		access_token: &'a str,
		event: &'a NewEvent,
	) -> BoxFuture<'a, ProviderResult<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub mail: Arc<dyn MailProvider>,
	pub inference: Arc<dyn InferenceProvider>,
	pub calendar: Arc<dyn CalendarProvider>,
}
impl Providers {
	pub fn new(
		mail: Arc<dyn MailProvider>,
		inference: Arc<dyn InferenceProvider>,
		calendar: Arc<dyn CalendarProvider>,
	) -> Self {
		Self { mail, inference, calendar }
	}

	/// HTTP-backed providers built from config, one client each for the whole process.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let providers = Arc::new(DefaultProviders {
			mail: GmailClient::new(cfg.providers.mail.clone())?,
			inference: InferenceClient::new(cfg.providers.inference.clone())?,
			calendar: CalendarClient::new(cfg.providers.calendar.clone())?,
		});

		Ok(Self { mail: providers.clone(), inference: providers.clone(), calendar: providers })
	}
}

pub struct ParleyService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub(crate) coordinator: SyncCoordinator,
}
impl ParleyService {
	pub fn new(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers, coordinator: SyncCoordinator::default() }
	}
}

struct DefaultProviders {
	mail: GmailClient,
	inference: InferenceClient,
	calendar: CalendarClient,
}
impl MailProvider for DefaultProviders {
	fn changes_since<'a>(
		&'a self,
		access_token: &'a str,
		cursor: &'a str,
		page_token: Option<&'a str>,
	) -> BoxFuture<'a, ProviderResult<ChangePage>> {
		Box::pin(self.mail.changes_since(access_token, cursor, page_token))
	}

	fn list_recent<'a>(
		&'a self,
		access_token: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, ProviderResult<Vec<String>>> {
		Box::pin(self.mail.list_recent(access_token, max_results))
	}

	fn current_cursor<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, ProviderResult<String>> {
		Box::pin(async move { Ok(self.mail.profile(access_token).await?.cursor) })
	}

	fn get_message<'a>(
		&'a self,
		access_token: &'a str,
		message_id: &'a str,
	) -> BoxFuture<'a, ProviderResult<ProviderMessage>> {
		Box::pin(self.mail.get_message(access_token, message_id))
	}

	fn subscribe<'a>(
		&'a self,
		access_token: &'a str,
		topic_name: &'a str,
	) -> BoxFuture<'a, ProviderResult<WatchLease>> {
		Box::pin(self.mail.subscribe(access_token, topic_name))
	}
}
impl InferenceProvider for DefaultProviders {
	fn complete_structured<'a>(&'a self, messages: &'a [Value]) -> BoxFuture<'a, ProviderResult<String>> {
		Box::pin(self.inference.complete_structured(messages))
	}
}
impl CalendarProvider for DefaultProviders {
	fn create_event<'a>(
		&'a self,
		access_token: &'a str,
		event: &'a NewEvent,
	) -> BoxFuture<'a, ProviderResult<String>> {
		Box::pin(self.calendar.create_event(access_token, event))
	}
}

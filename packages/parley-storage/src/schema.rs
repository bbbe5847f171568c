/// The full schema with every `\ir` include inlined, in include order.
pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		match line.trim().strip_prefix("\\ir ").map(str::trim) {
			Some(path) => match table_sql(path) {
				Some(body) => out.push_str(body),
				None => out.push_str(line),
			},
			None => out.push_str(line),
		}

		out.push('\n');
	}

	out
}

fn table_sql(path: &str) -> Option<&'static str> {
	let body = match path {
		"tables/001_mailboxes.sql" => include_str!("../../../sql/tables/001_mailboxes.sql"),
		"tables/002_outbound_sends.sql" =>
			include_str!("../../../sql/tables/002_outbound_sends.sql"),
		"tables/003_sync_states.sql" => include_str!("../../../sql/tables/003_sync_states.sql"),
		"tables/004_notification_ledger.sql" =>
			include_str!("../../../sql/tables/004_notification_ledger.sql"),
		"tables/005_mail_messages.sql" => include_str!("../../../sql/tables/005_mail_messages.sql"),
		"tables/006_conversations.sql" => include_str!("../../../sql/tables/006_conversations.sql"),
		"tables/007_extraction_outbox.sql" =>
			include_str!("../../../sql/tables/007_extraction_outbox.sql"),
		"tables/008_meeting_suggestions.sql" =>
			include_str!("../../../sql/tables/008_meeting_suggestions.sql"),
		_ => return None,
	};

	Some(body)
}

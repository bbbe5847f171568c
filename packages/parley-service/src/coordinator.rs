use std::{
	collections::HashMap,
	future::Future,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicBool, Ordering},
	},
};

use uuid::Uuid;

/// Serializes sync runs per mailbox inside one process. A trigger that arrives while a run is in
/// flight only marks it dirty; the running task then performs one more pass instead of a second
/// task starting.
#[derive(Default)]
pub struct SyncCoordinator {
	inflight: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
}
impl SyncCoordinator {
	/// Runs `pass` until no trigger arrived during the previous pass, at most `max_passes` times.
	/// Returns `None` when the trigger was folded into an in-flight run, otherwise the number of
	/// passes performed.
	pub async fn run<F, Fut>(&self, mailbox_id: Uuid, max_passes: u32, mut pass: F) -> Option<u32>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = ()>,
	{
		// Releases the mailbox even when a pass panics or this future is dropped mid-pass.
		let slot = self.admit(mailbox_id)?;
		let mut passes = 0;

		loop {
			pass().await;

			passes += 1;

			if !self.again(&slot) {
				break;
			}
			if passes >= max_passes {
				tracing::warn!(
					mailbox_id = %mailbox_id,
					passes,
					"Sync pass limit reached with triggers still pending."
				);

				break;
			}
		}

		Some(passes)
	}

	pub fn is_running(&self, mailbox_id: Uuid) -> bool {
		self.lock().contains_key(&mailbox_id)
	}

	fn admit(&self, mailbox_id: Uuid) -> Option<InflightSlot<'_>> {
		let mut inflight = self.lock();

		if let Some(dirty) = inflight.get(&mailbox_id) {
			dirty.store(true, Ordering::SeqCst);

			return None;
		}

		let dirty = Arc::new(AtomicBool::new(false));

		inflight.insert(mailbox_id, dirty.clone());

		Some(InflightSlot { coordinator: self, mailbox_id, dirty })
	}

	/// Consumes the dirty flag under the lock so a trigger is either seen here or admitted as a
	/// fresh run, never lost in between.
	fn again(&self, slot: &InflightSlot<'_>) -> bool {
		let mut inflight = self.lock();

		if slot.dirty.swap(false, Ordering::SeqCst) {
			return true;
		}

		release(&mut inflight, slot);

		false
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<AtomicBool>>> {
		self.inflight.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// One admitted run. Dropping it frees the mailbox for the next trigger.
struct InflightSlot<'a> {
	coordinator: &'a SyncCoordinator,
	mailbox_id: Uuid,
	dirty: Arc<AtomicBool>,
}
impl Drop for InflightSlot<'_> {
	fn drop(&mut self) {
		release(&mut self.coordinator.lock(), self);
	}
}

/// Removes the entry only if it still belongs to `slot`; a newer run may own the key already.
fn release(inflight: &mut HashMap<Uuid, Arc<AtomicBool>>, slot: &InflightSlot<'_>) {
	if inflight.get(&slot.mailbox_id).is_some_and(|dirty| Arc::ptr_eq(dirty, &slot.dirty)) {
		inflight.remove(&slot.mailbox_id);
	}
}

// peer_pool.rs
use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// FIFO pool of peer addresses shared by the piece tasks.
///
/// One permit exists per address, so at most `capacity` leases (and with
/// them peer connections) are alive at once. Tasks beyond that wait in
/// `acquire` until a lease is dropped.
#[derive(Debug)]
pub struct PeerPool {
	permits: Arc<Semaphore>,
	available: Mutex<VecDeque<SocketAddrV4>>,
	capacity: usize,
}

impl PeerPool {
	pub fn new(peers: impl IntoIterator<Item = SocketAddrV4>) -> Arc<Self> {
		let available: VecDeque<SocketAddrV4> = peers.into_iter().collect();
		let capacity = available.len();
		Arc::new(Self {
			permits: Arc::new(Semaphore::new(capacity)),
			available: Mutex::new(available),
			capacity,
		})
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Addresses currently sitting in the pool.
	pub fn available(&self) -> usize {
		self.available.lock().unwrap_or_else(PoisonError::into_inner).len()
	}

	/// Takes the next address, waiting for one to be returned if the pool is
	/// drained. Returns `None` once `cancel` fires.
	pub async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> Option<PeerLease> {
		let permit = tokio::select! {
			_ = cancel.cancelled() => return None,
			permit = Arc::clone(&self.permits).acquire_owned() => permit.ok()?,
		};

		let addr = self
			.available
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.pop_front()?;

		Some(PeerLease { pool: Arc::clone(self), addr, _permit: permit })
	}

	fn release(&self, addr: SocketAddrV4) {
		self.available
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push_back(addr);
	}
}

/// A borrowed peer address. Dropping the lease puts the address back at the
/// end of the pool and wakes one waiter.
#[derive(Debug)]
pub struct PeerLease {
	pool: Arc<PeerPool>,
	addr: SocketAddrV4,
	// Dropped after `Drop::drop` has pushed the address back.
	_permit: OwnedSemaphorePermit,
}

impl PeerLease {
	pub fn addr(&self) -> SocketAddrV4 {
		self.addr
	}
}

impl Drop for PeerLease {
	fn drop(&mut self) {
		self.pool.release(self.addr);
	}
}

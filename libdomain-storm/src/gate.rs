use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::Instant,
};

#[derive(Debug)]
struct GateState {
    semaphore: Arc<Semaphore>,
    capacity: AtomicUsize,
    /// Permits still owed after a shrink that outran the idle permits.
    debt: AtomicUsize,
    paused_until: Mutex<Option<Instant>>,
}

/// Admission semaphore whose capacity follows the rate controller.
///
/// Shrinking never cancels in-flight work: idle permits are forgotten at once
/// and the remainder is reclaimed as outstanding permits are released.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    state: Arc<GateState>,
}

/// Slot held for the duration of one attempt.
#[derive(Debug)]
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
    state: Arc<GateState>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let owed = self
            .state
            .debt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1));
        if owed.is_ok() {
            permit.forget();
        }
    }
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Arc::new(GateState {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity: AtomicUsize::new(capacity),
                debt: AtomicUsize::new(0),
                paused_until: Mutex::new(None),
            }),
        }
    }

    /// Waits out any pause, then for a free slot. Returns `None` only if the
    /// gate was closed.
    ///
    /// A pause set while a caller is queued on the semaphore still applies:
    /// the slot is held until the deadline passes.
    pub async fn acquire(&self) -> Option<GatePermit> {
        self.wait_out_pause().await;
        let permit = Arc::clone(&self.state.semaphore).acquire_owned().await.ok()?;
        self.wait_out_pause().await;
        Some(GatePermit {
            permit: Some(permit),
            state: Arc::clone(&self.state),
        })
    }

    async fn wait_out_pause(&self) {
        while let Some(deadline) = self.paused_until() {
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Deadline of the active pause, if any.
    fn paused_until(&self) -> Option<Instant> {
        let paused_until = *self
            .state
            .paused_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        paused_until.filter(|deadline| *deadline > Instant::now())
    }

    /// Target capacity for new admissions.
    pub fn resize(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let previous = self.state.capacity.swap(capacity, Ordering::AcqRel);
        if capacity > previous {
            let mut grow = capacity - previous;
            // Cancel outstanding debt before minting new permits.
            while grow > 0 {
                let settled = self
                    .state
                    .debt
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
                        (d > 0).then(|| d - d.min(grow))
                    });
                match settled {
                    Ok(before) => grow -= before.min(grow),
                    Err(_) => break,
                }
            }
            if grow > 0 {
                self.state.semaphore.add_permits(grow);
            }
        } else if capacity < previous {
            let shrink = previous - capacity;
            let forgotten = self.state.semaphore.forget_permits(shrink);
            if forgotten < shrink {
                self.state.debt.fetch_add(shrink - forgotten, Ordering::AcqRel);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity.load(Ordering::Acquire)
    }

    /// Idle slots right now.
    pub fn available(&self) -> usize {
        self.state.semaphore.available_permits()
    }

    /// Holds back new admissions until `deadline`. In-flight permits are untouched.
    pub fn pause_until(&self, deadline: Instant) {
        *self
            .state
            .paused_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(deadline);
    }

    pub fn close(&self) {
        self.state.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn grow_adds_permits() {
        let gate = AdmissionGate::new(2);
        gate.resize(5);
        assert_eq!(gate.capacity(), 5);
        assert_eq!(gate.available(), 5);
    }

    #[tokio::test]
    async fn shrink_spares_in_flight_permits() {
        let gate = AdmissionGate::new(4);
        let held: Vec<_> = futures::future::join_all((0..3).map(|_| gate.acquire())).await;
        assert_eq!(gate.available(), 1);

        gate.resize(2);
        assert_eq!(gate.available(), 0);
        assert_eq!(held.iter().filter(|p| p.is_some()).count(), 3);

        drop(held);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn grow_after_shrink_cancels_debt() {
        let gate = AdmissionGate::new(4);
        let held: Vec<_> = futures::future::join_all((0..4).map(|_| gate.acquire())).await;
        gate.resize(1);
        gate.resize(3);
        drop(held);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_new_admissions() {
        let gate = AdmissionGate::new(1);
        let start = Instant::now();
        gate.pause_until(start + Duration::from_secs(30));
        let permit = gate.acquire().await;
        assert!(permit.is_some());
        assert!(Instant::now() >= start + Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_applies_to_callers_already_queued() {
        let gate = AdmissionGate::new(1);
        let held = gate.acquire().await;

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let permit = gate.acquire().await;
                (permit.is_some(), Instant::now())
            })
        };
        tokio::task::yield_now().await;

        let start = Instant::now();
        gate.pause_until(start + Duration::from_secs(30));
        drop(held);

        let (admitted, at) = waiter.await.unwrap();
        assert!(admitted);
        assert!(at >= start + Duration::from_secs(30));
    }

    #[tokio::test]
    async fn closed_gate_yields_none() {
        let gate = AdmissionGate::new(1);
        gate.close();
        assert!(gate.acquire().await.is_none());
    }
}

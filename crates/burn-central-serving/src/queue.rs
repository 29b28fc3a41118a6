use crate::job::Job;
use crate::worker::StopToken;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Upper bound on a single blocking wait, so stop requests are noticed even without a wake-up.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct QueueInner {
    jobs: VecDeque<Job>,
    closed: bool,
    /// Set while one caller is accumulating a batch. Other callers wait for it to finish
    /// so the batch window actually fills one batch instead of racing for single jobs.
    collecting: bool,
}

/// Clears the `collecting` flag if the collect step unwinds, so other collectors are not
/// locked out of the queue for good.
struct CollectingRelease<'a> {
    queue: &'a BoundedJobQueue,
    armed: bool,
}

impl Drop for CollectingRelease<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.lock().collecting = false;
            self.queue.available.notify_all();
        }
    }
}

/// Fixed-capacity FIFO of pending jobs for one model.
///
/// Enqueueing never blocks: a full or closed queue rejects the job and hands it back.
/// Removal happens in batches through [`dequeue_batch`](Self::dequeue_batch).
pub struct BoundedJobQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    available: Condvar,
    len: AtomicUsize,
}

impl BoundedJobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
                collecting: false,
            }),
            available: Condvar::new(),
            len: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pending jobs. Reads an atomic mirror and never takes the queue lock.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Appends `job` if the queue is open and below capacity, otherwise returns it.
    pub fn try_enqueue(&self, mut job: Job) -> Result<(), Job> {
        let mut inner = self.lock();
        if inner.closed || inner.jobs.len() >= self.capacity {
            return Err(job);
        }
        job.mark_queued();
        inner.jobs.push_back(job);
        self.len.store(inner.jobs.len(), Ordering::Release);
        drop(inner);
        self.available.notify_all();
        Ok(())
    }

    /// Blocks until at least one job is available, then keeps collecting up to `max_size`
    /// jobs until `max_wait` has elapsed since the first job entered the queue.
    ///
    /// Returns an empty batch once the queue is closed and drained.
    pub fn dequeue_batch(&self, max_size: usize, max_wait: Duration) -> Vec<Job> {
        self.collect(max_size, max_wait, None, || {})
    }

    /// Same as [`dequeue_batch`](Self::dequeue_batch), but also returns an empty batch if
    /// `stop` is raised while still waiting for the first job.
    pub fn dequeue_batch_until(
        &self,
        max_size: usize,
        max_wait: Duration,
        stop: &StopToken,
    ) -> Vec<Job> {
        self.collect(max_size, max_wait, Some(stop), || {})
    }

    /// The collect step. `on_first` runs once the first job of the batch has been claimed.
    ///
    /// A `max_wait` too large to be represented as an `Instant` means the batch is only
    /// dispatched once full, the queue closes, or `stop` is raised.
    pub(crate) fn collect(
        &self,
        max_size: usize,
        max_wait: Duration,
        stop: Option<&StopToken>,
        on_first: impl FnOnce(),
    ) -> Vec<Job> {
        let max_size = max_size.max(1);
        let mut release = CollectingRelease {
            queue: self,
            armed: false,
        };
        let mut inner = self.lock();

        loop {
            if inner.jobs.is_empty() && inner.closed {
                return Vec::new();
            }
            if stop.is_some_and(StopToken::is_stopped) {
                return Vec::new();
            }
            if !inner.collecting && !inner.jobs.is_empty() {
                break;
            }
            inner = self.wait(inner, IDLE_POLL_INTERVAL);
        }

        inner.collecting = true;
        release.armed = true;
        on_first();

        let mut batch = Vec::with_capacity(max_size);
        let deadline = inner
            .jobs
            .front()
            .and_then(|job| job.enqueued_at().checked_add(max_wait));

        loop {
            while batch.len() < max_size {
                match inner.jobs.pop_front() {
                    Some(job) => batch.push(job),
                    None => break,
                }
            }
            self.len.store(inner.jobs.len(), Ordering::Release);

            if batch.len() >= max_size || inner.closed {
                break;
            }
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    deadline - now
                }
                None if stop.is_some_and(StopToken::is_stopped) => break,
                None => IDLE_POLL_INTERVAL,
            };
            inner = self.wait(inner, timeout);
        }

        inner.collecting = false;
        release.armed = false;
        drop(inner);
        self.available.notify_all();
        batch
    }

    /// Takes the pending job `id` out of the queue, if it is still there.
    pub fn remove(&self, id: Uuid) -> Option<Job> {
        let mut inner = self.lock();
        let position = inner.jobs.iter().position(|job| job.id() == id)?;
        let job = inner.jobs.remove(position);
        self.len.store(inner.jobs.len(), Ordering::Release);
        job
    }

    /// Closes the queue for good, wakes every waiter and returns the jobs still pending.
    pub fn close(&self) -> Vec<Job> {
        let mut inner = self.lock();
        inner.closed = true;
        let drained: Vec<Job> = inner.jobs.drain(..).collect();
        self.len.store(0, Ordering::Release);
        drop(inner);
        self.available.notify_all();
        drained
    }

    /// Wakes every waiter, e.g. so workers notice a freshly raised stop token.
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, QueueInner>,
        timeout: Duration,
    ) -> MutexGuard<'a, QueueInner> {
        self.available
            .wait_timeout(guard, timeout)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobError, JobHandle, JobState};
    use crate::payload::Input;
    use std::sync::Arc;
    use std::thread;

    fn job(request_id: &str) -> (Job, JobHandle) {
        Job::new("m", Input::new(request_id))
    }

    fn ids(batch: &[Job]) -> Vec<String> {
        batch
            .iter()
            .map(|job| job.input().request_id.clone())
            .collect()
    }

    #[test]
    fn batches_come_out_in_enqueue_order() {
        let queue = BoundedJobQueue::new(10);
        let mut handles = Vec::new();
        for i in 0..5 {
            let (job, handle) = job(&format!("r{i}"));
            queue.try_enqueue(job).unwrap();
            handles.push(handle);
        }

        let first = queue.dequeue_batch(3, Duration::ZERO);
        let second = queue.dequeue_batch(3, Duration::ZERO);

        assert_eq!(ids(&first), ["r0", "r1", "r2"]);
        assert_eq!(ids(&second), ["r3", "r4"]);
        assert!(handles.iter().all(|h| h.state() == JobState::Queued));
    }

    #[test]
    fn rejects_exactly_at_capacity() {
        let queue = BoundedJobQueue::new(2);
        let (a, _ha) = job("a");
        let (b, _hb) = job("b");
        let (c, hc) = job("c");

        assert!(queue.try_enqueue(a).is_ok());
        assert!(queue.try_enqueue(b).is_ok());
        let rejected = queue.try_enqueue(c).unwrap_err();

        assert_eq!(rejected.input().request_id, "c");
        assert_eq!(queue.len(), 2);
        assert_eq!(hc.state(), JobState::Created);
    }

    #[test]
    fn batch_window_is_measured_from_first_arrival() {
        let queue = Arc::new(BoundedJobQueue::new(10));
        let (first, _h1) = job("first");
        queue.try_enqueue(first).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                let (second, h2) = job("second");
                queue.try_enqueue(second).unwrap();
                h2
            })
        };

        let batch = queue.dequeue_batch(4, Duration::from_millis(300));
        let _h2 = producer.join().unwrap();

        assert_eq!(ids(&batch), ["first", "second"]);
    }

    #[test]
    fn stale_first_job_is_dispatched_without_waiting() {
        let queue = BoundedJobQueue::new(10);
        let (first, _h1) = job("first");
        queue.try_enqueue(first).unwrap();
        thread::sleep(Duration::from_millis(30));

        let start = Instant::now();
        let batch = queue.dequeue_batch(4, Duration::from_millis(20));

        assert_eq!(batch.len(), 1);
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn full_batch_returns_before_the_deadline() {
        let queue = BoundedJobQueue::new(10);
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let (job, handle) = job(&format!("r{i}"));
                queue.try_enqueue(job).unwrap();
                handle
            })
            .collect();

        let start = Instant::now();
        let batch = queue.dequeue_batch(2, Duration::from_secs(10));

        assert_eq!(batch.len(), handles.len());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn close_wakes_waiters_and_drains_pending_jobs() {
        let queue = Arc::new(BoundedJobQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue_batch(4, Duration::from_millis(10)))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(queue.close().is_empty());
        assert!(waiter.join().unwrap().is_empty());

        let (late, handle) = job("late");
        assert!(queue.try_enqueue(late).is_err());
        assert!(queue.is_closed());
        drop(handle);
    }

    #[test]
    fn stop_token_interrupts_an_idle_wait() {
        let queue = Arc::new(BoundedJobQueue::new(4));
        let stop = StopToken::new();
        let waiter = {
            let queue = queue.clone();
            let stop = stop.clone();
            thread::spawn(move || queue.dequeue_batch_until(4, Duration::from_millis(10), &stop))
        };
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        queue.wake_all();

        assert!(waiter.join().unwrap().is_empty());
    }

    #[test]
    fn unbounded_batch_delay_dispatches_full_batches() {
        let queue = BoundedJobQueue::new(4);
        let (a, _ha) = job("a");
        queue.try_enqueue(a).unwrap();

        let batch = queue.dequeue_batch(1, Duration::MAX);

        assert_eq!(ids(&batch), ["a"]);
    }

    #[test]
    fn unbounded_batch_delay_still_honours_stop() {
        let queue = Arc::new(BoundedJobQueue::new(4));
        let (a, _ha) = job("a");
        queue.try_enqueue(a).unwrap();
        let stop = StopToken::new();
        let collector = {
            let queue = queue.clone();
            let stop = stop.clone();
            thread::spawn(move || queue.dequeue_batch_until(4, Duration::MAX, &stop))
        };
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        queue.wake_all();

        assert_eq!(ids(&collector.join().unwrap()), ["a"]);
    }

    #[test]
    fn panicking_collector_does_not_lock_out_the_next_one() {
        let queue = BoundedJobQueue::new(4);
        let (a, _ha) = job("a");
        queue.try_enqueue(a).unwrap();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            queue.collect(1, Duration::ZERO, None, || panic!("collector died"))
        }));
        assert!(unwound.is_err());

        let start = Instant::now();
        let batch = queue.dequeue_batch(1, Duration::ZERO);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(ids(&batch), ["a"]);
    }

    #[test]
    fn remove_takes_a_pending_job_out() {
        let queue = BoundedJobQueue::new(4);
        let (a, ha) = job("a");
        let (b, _hb) = job("b");
        queue.try_enqueue(a).unwrap();
        queue.try_enqueue(b).unwrap();

        let removed = queue.remove(ha.id()).unwrap();
        removed.fail(JobError::Cancelled);

        assert_eq!(queue.len(), 1);
        assert!(queue.remove(ha.id()).is_none());
        assert!(matches!(ha.wait(), Err(JobError::Cancelled)));
        assert_eq!(ids(&queue.dequeue_batch(4, Duration::ZERO)), ["b"]);
    }
}

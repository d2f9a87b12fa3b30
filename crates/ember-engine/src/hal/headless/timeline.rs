use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::hal::{CommandListId, FenceId, GpuCommand, SwapChainId};

/// Something the simulated GPU did, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuEvent {
    Executed {
        list: CommandListId,
        commands: Vec<GpuCommand>,
    },
    Presented {
        chain: SwapChainId,
        index: u32,
        sync_interval: u32,
    },
    Signaled {
        fence: FenceId,
        value: u64,
    },
}

/// Completed value of a fence plus the condition variable waiters park on.
#[derive(Debug)]
pub(crate) struct FenceCell {
    id: FenceId,
    value: Mutex<u64>,
    reached: Condvar,
}

impl FenceCell {
    pub(crate) fn new(id: FenceId, initial: u64) -> Self {
        Self {
            id,
            value: Mutex::new(initial),
            reached: Condvar::new(),
        }
    }

    pub(crate) fn completed(&self) -> u64 {
        *lock(&self.value)
    }

    fn complete(&self, value: u64) {
        let mut current = lock(&self.value);
        if value > *current {
            *current = value;
        }
        self.reached.notify_all();
    }

    /// Parks the calling thread until the completed value reaches `value`.
    pub(crate) fn wait(&self, value: u64) {
        let mut current = lock(&self.value);
        while *current < value {
            current = self
                .reached
                .wait(current)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

pub(crate) enum Job {
    Execute {
        list: CommandListId,
        commands: Vec<GpuCommand>,
        in_flight: Arc<AtomicUsize>,
    },
    Present {
        chain: SwapChainId,
        index: u32,
        sync_interval: u32,
    },
    Signal {
        fence: Arc<FenceCell>,
        value: u64,
    },
}

/// Single in-order GPU queue running on its own thread.
pub(crate) struct Timeline {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    events: Arc<Mutex<Vec<GpuEvent>>>,
}

impl Timeline {
    pub(crate) fn spawn(latency: Duration) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);

        let worker = std::thread::Builder::new()
            .name("ember-headless-gpu".to_string())
            .spawn(move || run(receiver, log, latency))
            .map_err(|e| log::error!("failed to spawn headless GPU thread: {e}"))
            .ok();

        Self {
            sender: Some(sender),
            worker,
            events,
        }
    }

    pub(crate) fn push(&self, job: Job) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|s| s.send(job).is_ok());

        if !delivered {
            log::error!("headless GPU timeline is not running; job dropped");
        }
    }

    pub(crate) fn events(&self) -> Vec<GpuEvent> {
        lock(&self.events).clone()
    }

    pub(crate) fn clear_events(&self) {
        lock(&self.events).clear();
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("headless GPU thread panicked");
            }
        }
    }
}

fn run(receiver: Receiver<Job>, events: Arc<Mutex<Vec<GpuEvent>>>, latency: Duration) {
    for job in receiver.iter() {
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        match job {
            Job::Execute {
                list,
                commands,
                in_flight,
            } => {
                lock(&events).push(GpuEvent::Executed { list, commands });
                in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Job::Present {
                chain,
                index,
                sync_interval,
            } => {
                lock(&events).push(GpuEvent::Presented {
                    chain,
                    index,
                    sync_interval,
                });
            }
            Job::Signal { fence, value } => {
                lock(&events).push(GpuEvent::Signaled {
                    fence: fence.id,
                    value,
                });
                fence.complete(value);
            }
        }
    }

    log::trace!("headless GPU timeline stopped");
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_execute_in_submission_order() {
        let timeline = Timeline::spawn(Duration::ZERO);
        let fence = Arc::new(FenceCell::new(FenceId::from_raw(7), 0));
        let in_flight = Arc::new(AtomicUsize::new(1));

        timeline.push(Job::Execute {
            list: CommandListId::from_raw(1),
            commands: Vec::new(),
            in_flight: Arc::clone(&in_flight),
        });
        timeline.push(Job::Signal {
            fence: Arc::clone(&fence),
            value: 1,
        });
        fence.wait(1);

        assert_eq!(in_flight.load(Ordering::Acquire), 0);
        let events = timeline.events();
        assert!(matches!(events[0], GpuEvent::Executed { .. }));
        assert_eq!(
            events[1],
            GpuEvent::Signaled {
                fence: FenceId::from_raw(7),
                value: 1
            }
        );
    }

    #[test]
    fn fence_never_moves_backwards() {
        let cell = FenceCell::new(FenceId::from_raw(1), 5);
        cell.complete(3);
        assert_eq!(cell.completed(), 5);
        cell.complete(9);
        assert_eq!(cell.completed(), 9);
    }

    #[test]
    fn wait_returns_only_after_signal_lands() {
        let timeline = Timeline::spawn(Duration::from_millis(20));
        let fence = Arc::new(FenceCell::new(FenceId::from_raw(2), 0));

        timeline.push(Job::Signal {
            fence: Arc::clone(&fence),
            value: 4,
        });
        assert!(fence.completed() < 4);

        fence.wait(4);
        assert!(fence.completed() >= 4);
    }
}

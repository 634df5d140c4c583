// src/core/mainloop.rs
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

/// A unit of work queued for the loop thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum LoopMsg {
    Call(Task),
    After(Instant, Task),
}

struct Timer {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so the earliest deadline wins in the max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-threaded task queue with one-shot timers. The owner drains it from
/// one thread; everything posted through a [`LoopHandle`] runs there and
/// nowhere else, which is what lets request callbacks touch UI state without
/// locks.
pub struct MainLoop {
    tx: Sender<LoopMsg>,
    rx: Receiver<LoopMsg>,
    ready: VecDeque<Task>,
    timers: BinaryHeap<Timer>,
    seq: u64,
}

impl MainLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            ready: VecDeque::new(),
            timers: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run everything that is ready right now: queued tasks plus timers whose
    /// deadline has passed. Returns the number of tasks that ran.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut ran = 0usize;
        loop {
            self.pump();
            self.promote_due(Instant::now());
            match self.ready.pop_front() {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Pump the loop for `budget`, sleeping between tasks. Meant for shells
    /// and tests; a GUI would call `dispatch_pending` from its frame loop.
    pub fn run_for(&mut self, budget: Duration) -> usize {
        let deadline = Instant::now() + budget;
        let mut ran = 0usize;
        loop {
            ran += self.dispatch_pending();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wake = match self.timers.peek() {
                Some(timer) if timer.due < deadline => timer.due,
                _ => deadline,
            };
            match self.rx.recv_timeout(wake.saturating_duration_since(now)) {
                Ok(msg) => self.enqueue(msg),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                // Unreachable while the loop holds its own sender.
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        ran
    }

    fn pump(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.enqueue(msg);
        }
    }

    fn promote_due(&mut self, now: Instant) {
        while self.timers.peek().is_some_and(|t| t.due <= now) {
            if let Some(timer) = self.timers.pop() {
                self.ready.push_back(timer.task);
            }
        }
    }

    fn enqueue(&mut self, msg: LoopMsg) {
        match msg {
            LoopMsg::Call(task) => self.ready.push_back(task),
            LoopMsg::After(due, task) => {
                self.seq += 1;
                self.timers.push(Timer {
                    due,
                    seq: self.seq,
                    task,
                });
            }
        }
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable, thread-safe side of the loop. Worker threads use it to hand
/// completions back to the thread that drains the loop.
#[derive(Clone)]
pub struct LoopHandle {
    tx: Sender<LoopMsg>,
}

impl LoopHandle {
    /// Queue `task` to run on the next dispatch. Posting after the loop is
    /// gone drops the task silently.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.tx.send(LoopMsg::Call(Box::new(task)));
    }

    /// Queue `task` to run once `delay` has elapsed.
    pub fn post_after<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self
            .tx
            .send(LoopMsg::After(Instant::now() + delay, Box::new(task)));
    }
}

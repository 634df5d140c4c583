// src/core/requests.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::api::ServiceError;
use crate::core::mainloop::LoopHandle;

/// Default retry timeout for view-level requests: keep asking every five
/// seconds while the server is unreachable.
pub const TIMEOUT_REQUEST: Duration = Duration::from_secs(5);

type Method<A, T> = Box<dyn Fn(&A) -> Result<T, ServiceError> + Send + Sync>;
type Callback<A, T> = Box<dyn Fn(&ServerRequest<A, T>) + Send + Sync>;

struct Shared<A, T> {
    method: Method<A, T>,
    args: A,
    callback: Callback<A, T>,
    retry: Duration,
    loop_handle: LoopHandle,
    cancelled: AtomicBool,
    finished: AtomicBool,
    // Written by the worker thread, read from the loop thread.
    outcome: Mutex<Option<Result<T, ServiceError>>>,
}

/// One asynchronous call to the backend. The method runs on its own worker
/// thread; the callback runs on the loop thread, with this request as its
/// argument so it can pick up the args, the result or the error.
pub struct ServerRequest<A, T> {
    shared: Arc<Shared<A, T>>,
}

impl<A, T> Clone for ServerRequest<A, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, T> ServerRequest<A, T> {
    /// The arguments the request was submitted with. Callbacks use them to
    /// check that a result still matches what the view is showing.
    pub fn args(&self) -> &A {
        &self.shared.args
    }

    /// The service error from the last attempt, if it failed.
    pub fn error(&self) -> Option<ServiceError> {
        match &*self.shared.outcome.lock().unwrap() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Move the successful result out of the request. Errors stay put so
    /// `error()` keeps answering.
    pub fn take_result(&self) -> Option<T> {
        let mut outcome = self.shared.outcome.lock().unwrap();
        match outcome.take() {
            Some(Ok(value)) => Some(value),
            other => {
                *outcome = other;
                None
            }
        }
    }

    /// Stop the request from delivering its callback. The in-flight attempt
    /// is not interrupted; it just completes into silence.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// True once the loop callback has run for the last time: after delivery
    /// with no retry pending, or after a cancelled delivery.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    fn failed(&self) -> bool {
        matches!(&*self.shared.outcome.lock().unwrap(), Some(Err(_)))
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }
}

impl<A, T> ServerRequest<A, T>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    fn new<M, C>(loop_handle: LoopHandle, method: M, args: A, callback: C, retry: Duration) -> Self
    where
        M: Fn(&A) -> Result<T, ServiceError> + Send + Sync + 'static,
        C: Fn(&ServerRequest<A, T>) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                method: Box::new(method),
                args,
                callback: Box::new(callback),
                retry,
                loop_handle,
                cancelled: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                outcome: Mutex::new(None),
            }),
        }
    }

    /// Start one attempt on a fresh worker thread. Never blocks the caller.
    pub fn run(&self) {
        let request = self.clone();
        thread::spawn(move || {
            let result = (request.shared.method)(&request.shared.args);
            *request.shared.outcome.lock().unwrap() = Some(result);
            let delivered = request.clone();
            request
                .shared
                .loop_handle
                .post(move || delivered.loop_callback());
        });
    }

    // Runs on the loop thread once per attempt.
    fn loop_callback(&self) {
        if self.is_cancelled() {
            self.shared.finished.store(true, Ordering::SeqCst);
            return;
        }
        (self.shared.callback)(self);
        if self.failed() && !self.shared.retry.is_zero() {
            debug!("request failed, retrying in {:?}", self.shared.retry);
            let again = self.clone();
            self.shared
                .loop_handle
                .post_after(self.shared.retry, move || {
                    if again.is_cancelled() {
                        again.shared.finished.store(true, Ordering::SeqCst);
                    } else {
                        again.run();
                    }
                });
        } else {
            self.shared.finished.store(true, Ordering::SeqCst);
        }
    }
}

// Erased entry so one list can track requests of different types.
trait RequestHandle {
    fn key(&self) -> usize;
    fn cancel(&self);
    fn is_finished(&self) -> bool;
}

impl<A, T> RequestHandle for ServerRequest<A, T> {
    fn key(&self) -> usize {
        ServerRequest::key(self)
    }

    fn cancel(&self) {
        ServerRequest::cancel(self);
    }

    fn is_finished(&self) -> bool {
        ServerRequest::is_finished(self)
    }
}

/// The set of requests a view has in flight. Lives on the loop thread; every
/// mutation happens there, so there is nothing to lock.
pub struct ServerRequestList {
    loop_handle: LoopHandle,
    requests: Vec<Box<dyn RequestHandle>>,
}

impl ServerRequestList {
    pub fn new(loop_handle: LoopHandle) -> Self {
        Self {
            loop_handle,
            requests: Vec::new(),
        }
    }

    /// Create, start and track a request. Finished entries are dropped
    /// first, so the list stays bounded by what is actually in flight.
    pub fn add<A, T, M, C>(
        &mut self,
        method: M,
        args: A,
        callback: C,
        retry: Duration,
    ) -> ServerRequest<A, T>
    where
        A: Send + Sync + 'static,
        T: Send + 'static,
        M: Fn(&A) -> Result<T, ServiceError> + Send + Sync + 'static,
        C: Fn(&ServerRequest<A, T>) + Send + Sync + 'static,
    {
        self.cleanup();
        let request = ServerRequest::new(self.loop_handle.clone(), method, args, callback, retry);
        request.run();
        self.requests.push(Box::new(request.clone()));
        request
    }

    /// Cancel one request and stop tracking it. Used when a newer request
    /// supersedes an older one for the same slot.
    pub fn cancel<A, T>(&mut self, request: &ServerRequest<A, T>) {
        request.cancel();
        let key = request.key();
        self.requests.retain(|r| r.key() != key);
    }

    /// Cancel everything, typically because the view that owns this list is
    /// going away and must not be touched by stale callbacks.
    pub fn cancel_all(&mut self) {
        for request in &self.requests {
            request.cancel();
        }
        self.requests.clear();
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn cleanup(&mut self) {
        self.requests.retain(|r| !r.is_finished());
    }
}

//! Deduplicates concurrent identical loads (also known as single-flight).
//!
//! When many callers miss the cache for the same key at the same time, we must not let
//! each of them run the expensive load - one execution has to serve them all. A
//! [CallCoalescer] keeps one pending call per key: the first caller becomes the leader
//! and executes the load, everyone else arriving while it is in flight simply awaits the
//! leader's outcome and receives the identical value or error.
//!
//! Note that this primitive deduplicates *concurrency*, it does not cache: once the
//! leader has completed and its entry has been removed, the next call for the same key
//! triggers a fresh execution.
//!
//! The internal map lock is only held to check, install or remove a pending call - never
//! while the load itself executes - so loads for distinct keys proceed in parallel.
//!
//! # Examples
//! ```
//! # use callisto::coalesce::CallCoalescer;
//! # #[tokio::main]
//! # async fn main() {
//! let coalescer = CallCoalescer::new();
//!
//! let value = coalescer
//!     .run("answer", async { Ok("42".to_owned()) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, "42");
//! # }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// An error shared between all callers coalesced onto the same in-flight load.
///
/// As each waiter receives the identical outcome, errors are reference counted instead
/// of being cloned or re-rendered per caller.
pub type SharedError = Arc<anyhow::Error>;

type Outcome<T> = Result<T, SharedError>;
type PendingCalls<T> = Mutex<HashMap<String, watch::Receiver<Option<Outcome<T>>>>>;

/// Ensures that per key, at most one load is in flight at any time.
pub struct CallCoalescer<T> {
    pending: PendingCalls<T>,
}

/// Distinguishes the first caller for a key (which executes the load) from all
/// subsequent callers arriving while that load is still in flight.
enum Role<T> {
    Leader(watch::Sender<Option<Outcome<T>>>),
    Waiter(watch::Receiver<Option<Outcome<T>>>),
}

/// Removes the pending entry for a key once its load has completed.
///
/// Being a drop guard, this also runs if the leader's future is cancelled mid-flight,
/// so an abandoned load can never leave a stale entry behind (which would block every
/// future caller for that key forever).
struct RemovalGuard<'a, T> {
    pending: &'a PendingCalls<T>,
    key: String,
}

impl<T> Drop for RemovalGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            let _ = pending.remove(&self.key);
        }
    }
}

impl<T: Clone> CallCoalescer<T> {
    /// Creates a new coalescer without any pending calls.
    pub fn new() -> Self {
        CallCoalescer {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given load for the given key, unless one is already in flight.
    ///
    /// The first caller for a key runs **task** to completion and publishes its outcome.
    /// Every caller arriving for the same key while the load is in flight awaits that
    /// outcome instead of executing its own task - all of them observe the identical
    /// value or error. Once the load has completed (and its entry has been removed), a
    /// subsequent call executes freshly.
    ///
    /// If the leading caller is cancelled before its load completes, all waiters receive
    /// an error instead of blocking forever.
    pub async fn run<F>(&self, key: &str, task: F) -> Outcome<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let role = {
            let mut pending = self.pending.lock().unwrap();
            match pending.get(key) {
                Some(receiver) => Role::Waiter(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    let _ = pending.insert(key.to_owned(), receiver);
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Leader(sender) => {
                let _guard = RemovalGuard {
                    pending: &self.pending,
                    key: key.to_owned(),
                };

                let outcome = task.await.map_err(Arc::new);

                // Waiters might already be gone, therefore a send error is fine here...
                let _ = sender.send(Some(outcome.clone()));

                outcome
            }
            Role::Waiter(mut receiver) => loop {
                if let Some(outcome) = receiver.borrow_and_update().clone() {
                    return outcome;
                }

                if receiver.changed().await.is_err() {
                    // The leader was cancelled before recording an outcome...
                    return Err(Arc::new(anyhow::anyhow!(
                        "The in-flight load for this key was abandoned before completing."
                    )));
                }
            },
        }
    }
}

impl<T: Clone> Default for CallCoalescer<T> {
    fn default() -> Self {
        CallCoalescer::new()
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tick::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Delays propagation of a changing value until it has been stable for a quiet period.
///
/// Every [`set`](Self::set) restarts the timer; only the last value of a burst is published.
/// [`set_now`](Self::set_now) publishes immediately, for explicit user actions. A zero delay
/// publishes every value immediately.
///
/// The timer runs on a tokio task owned by the debouncer and is stopped when the debouncer is
/// dropped, discarding any pending value.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ludex::Debouncer;
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let debouncer = Debouncer::new(&Clock::new_tokio(), Duration::from_millis(10), String::new());
/// let mut published = debouncer.subscribe();
///
/// debouncer.set("z".to_owned());
/// debouncer.set("ze".to_owned());
/// debouncer.set("zelda".to_owned());
///
/// published.changed().await.unwrap();
/// assert_eq!(*published.borrow(), "zelda");
/// # }
/// ```
pub struct Debouncer<T> {
    input: watch::Sender<T>,
    output: Arc<watch::Sender<T>>,
    delay: Duration,
    task: Option<JoinHandle<()>>,
}

impl<T: Debug> Debug for Debouncer<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("current", &*self.output.borrow())
            .finish_non_exhaustive()
    }
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a debouncer publishing `initial` until the first value settles.
    ///
    /// # Panics
    ///
    /// Panics when `delay` is non-zero and no tokio runtime is running.
    #[must_use]
    pub fn new(clock: &Clock, delay: Duration, initial: T) -> Self {
        let (input, input_rx) = watch::channel(initial.clone());
        let output = Arc::new(watch::channel(initial).0);

        let task = (!delay.is_zero()).then(|| tokio::spawn(settle(clock.clone(), delay, input_rx, Arc::clone(&output))));

        Self {
            input,
            output,
            delay,
            task,
        }
    }

    /// Feeds a new value, restarting the quiet period.
    pub fn set(&self, value: T) {
        if self.task.is_some() {
            self.input.send_replace(value);
        } else {
            publish(&self.output, value);
        }
    }

    /// Publishes `value` immediately, discarding any pending value.
    pub fn set_now(&self, value: T) {
        // Keep the input in step so the pending timer settles on the same value.
        self.input.send_replace(value.clone());
        publish(&self.output, value);
    }

    /// Returns the currently published value.
    #[must_use]
    pub fn get(&self) -> T {
        self.output.borrow().clone()
    }

    /// Returns a receiver notified whenever a new value is published.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.output.subscribe()
    }

    /// Returns the quiet period.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

fn publish<T: PartialEq>(output: &watch::Sender<T>, value: T) {
    output.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

async fn settle<T>(clock: Clock, delay: Duration, mut input: watch::Receiver<T>, output: Arc<watch::Sender<T>>)
where
    T: Clone + PartialEq,
{
    while input.changed().await.is_ok() {
        loop {
            tokio::select! {
                changed = input.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = clock.delay(delay) => break,
            }
        }

        let value = input.borrow_and_update().clone();
        publish(&output, value);
    }
}

//! Debounced, cancellation-aware decision pipelines.
//!
//! A decision stream combines several live inputs (identity, resource
//! snapshots) and re-asks the engine whenever any of them changes. Raw
//! change events are too chatty for that — a keystroke burst would trigger
//! one evaluation per key — so the pipeline settles changes through a quiet
//! window first, and an in-flight evaluation that is overtaken by newer
//! input is dropped rather than awaited. A stale decision can therefore
//! never overwrite a newer one within a stream.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::sleep;

/// A set of live inputs observed as one combined value.
///
/// Implementations typically select over several `watch` receivers.
#[async_trait]
pub trait CombinedInput: Send + 'static {
    type Snapshot: Clone + Send + Sync + 'static;

    /// Suspend until any underlying source publishes a new value.
    ///
    /// Returns `false` once the sources have closed and no further change
    /// can arrive.
    async fn changed(&mut self) -> bool;

    /// The latest value of every source, read without waiting.
    fn snapshot(&self) -> Self::Snapshot;
}

/// Decides whether two settled snapshots would produce the same decision.
pub type EquivalenceFn<S> = Box<dyn Fn(&S, &S) -> bool + Send>;

pub struct PipelineOptions<S> {
    /// Quiet window: evaluation starts only after the inputs have stopped
    /// changing for this long.
    pub window: Duration,
    /// Optional filter: when the settled snapshot is equivalent to the last
    /// one evaluated, the evaluation is skipped and no value is emitted.
    pub equivalence: Option<EquivalenceFn<S>>,
}

impl<S> PipelineOptions<S> {
    pub fn debounce(window: Duration) -> Self {
        Self { window, equivalence: None }
    }

    pub fn with_equivalence(
        mut self,
        equivalent: impl Fn(&S, &S) -> bool + Send + 'static,
    ) -> Self {
        self.equivalence = Some(Box::new(equivalent));
        self
    }
}

/// Spawn a decision pipeline over `input` and return the stream of emitted
/// decisions.
///
/// The receiver starts at `None` (no decision yet). `eval` returning `None`
/// means "nothing to emit" — an error was logged, or a precondition such as
/// a signed-in identity is not met — and the previous emission stands.
///
/// The task ends when every receiver is dropped or when the input sources
/// close; a change that arrived before the close is still evaluated.
pub fn spawn_decision_pipeline<I, Out, Eval, Fut>(
    mut input: I,
    options: PipelineOptions<I::Snapshot>,
    eval: Eval,
) -> watch::Receiver<Option<Out>>
where
    I: CombinedInput,
    Out: Clone + Send + Sync + 'static,
    Eval: Fn(I::Snapshot) -> Fut + Send + 'static,
    Fut: Future<Output = Option<Out>> + Send + 'static,
{
    let (tx, rx) = watch::channel(None);

    tokio::spawn(async move {
        // The initial combined value counts as a pending change, so the
        // stream produces its first decision without waiting for an update.
        let mut pending = true;
        let mut closed = false;
        let mut last_evaluated: Option<I::Snapshot> = None;

        loop {
            if !pending {
                if closed {
                    break;
                }
                if !input.changed().await {
                    break;
                }
            }
            pending = false;

            // Settle: absorb further changes until the window stays quiet.
            while !closed {
                tokio::select! {
                    _ = sleep(options.window) => break,
                    more = input.changed() => {
                        if !more {
                            closed = true;
                        }
                    }
                }
            }

            let snapshot = input.snapshot();
            if let (Some(equivalent), Some(previous)) =
                (&options.equivalence, &last_evaluated)
            {
                if equivalent(previous, &snapshot) {
                    continue;
                }
            }

            // Race the evaluation against newer input. Losing the race
            // drops the in-flight future; the snapshot does not count as
            // evaluated, so the next pass is free to re-ask.
            tokio::select! {
                decision = eval(snapshot.clone()) => {
                    last_evaluated = Some(snapshot);
                    if let Some(decision) = decision {
                        if tx.send(Some(decision)).is_err() {
                            break;
                        }
                    }
                }
                more = input.changed(), if !closed => {
                    pending = true;
                    if !more {
                        closed = true;
                    }
                }
            }
        }
    });

    rx
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::watch;
    use tokio::time::{advance, sleep};

    use super::{spawn_decision_pipeline, CombinedInput, PipelineOptions};

    struct SingleSource(watch::Receiver<u32>);

    #[async_trait]
    impl CombinedInput for SingleSource {
        type Snapshot = u32;

        async fn changed(&mut self) -> bool {
            self.0.changed().await.is_ok()
        }

        fn snapshot(&self) -> u32 {
            *self.0.borrow()
        }
    }

    const WINDOW: Duration = Duration::from_millis(50);

    /// Let the spawned pipeline task run and virtual time pass.
    async fn settle() {
        sleep(WINDOW * 4).await;
    }

    #[tokio::test(start_paused = true)]
    async fn initial_value_produces_a_first_decision() {
        let (_tx, source) = watch::channel(7u32);
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);

        let rx = spawn_decision_pipeline(
            SingleSource(source),
            PipelineOptions::debounce(WINDOW),
            move |snapshot| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Some(snapshot * 2) }
            },
        );

        settle().await;
        assert_eq!(*rx.borrow(), Some(14));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    /// A burst of updates inside the quiet window settles to exactly one
    /// evaluation, run against the final value.
    #[tokio::test(start_paused = true)]
    async fn rapid_updates_coalesce_into_one_evaluation() {
        let (tx, source) = watch::channel(0u32);
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);

        let rx = spawn_decision_pipeline(
            SingleSource(source),
            PipelineOptions::debounce(WINDOW),
            move |snapshot| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Some(snapshot) }
            },
        );
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        for value in [1, 2, 3] {
            tx.send(value).unwrap();
            advance(Duration::from_millis(5)).await;
        }
        settle().await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(*rx.borrow(), Some(3));
    }

    /// An in-flight evaluation overtaken by newer input is dropped; only the
    /// decision for the newest snapshot is ever emitted.
    #[tokio::test(start_paused = true)]
    async fn superseded_evaluation_is_abandoned() {
        let (tx, source) = watch::channel(1u32);
        let started = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let started_counter = Arc::clone(&started);
        let completed_counter = Arc::clone(&completed);

        let rx = spawn_decision_pipeline(
            SingleSource(source),
            PipelineOptions::debounce(WINDOW),
            move |snapshot| {
                started_counter.fetch_add(1, Ordering::SeqCst);
                let completed = Arc::clone(&completed_counter);
                async move {
                    sleep(Duration::from_millis(200)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Some(snapshot)
                }
            },
        );

        // Past the quiet window and into the slow first evaluation.
        sleep(WINDOW + Duration::from_millis(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Newer input lands while the evaluation is still running.
        tx.send(2).unwrap();
        settle().await;
        sleep(Duration::from_millis(400)).await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(*rx.borrow(), Some(2));
    }

    /// Equivalent settled snapshots skip the evaluation entirely.
    #[tokio::test(start_paused = true)]
    async fn equivalent_snapshots_are_skipped() {
        let (tx, source) = watch::channel(10u32);
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);

        let options = PipelineOptions::debounce(WINDOW)
            .with_equivalence(|previous: &u32, current: &u32| previous / 10 == current / 10);
        let rx = spawn_decision_pipeline(SingleSource(source), options, move |snapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Some(snapshot) }
        });
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Same decade: equivalent, no evaluation.
        tx.send(13).unwrap();
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(*rx.borrow(), Some(10));

        // New decade: re-evaluates.
        tx.send(21).unwrap();
        settle().await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(*rx.borrow(), Some(21));
    }

    /// `eval` returning `None` leaves the previous emission standing.
    #[tokio::test(start_paused = true)]
    async fn none_decisions_do_not_emit() {
        let (tx, source) = watch::channel(2u32);
        let rx = spawn_decision_pipeline(
            SingleSource(source),
            PipelineOptions::debounce(WINDOW),
            |snapshot| async move { (snapshot % 2 == 0).then_some(snapshot) },
        );
        settle().await;
        assert_eq!(*rx.borrow(), Some(2));

        tx.send(3).unwrap();
        settle().await;
        assert_eq!(*rx.borrow(), Some(2));
    }

    /// A change that arrives just before the sources close is still
    /// evaluated; the stream then ends.
    #[tokio::test(start_paused = true)]
    async fn final_change_before_close_is_evaluated() {
        let (tx, source) = watch::channel(1u32);
        let rx = spawn_decision_pipeline(
            SingleSource(source),
            PipelineOptions::debounce(WINDOW),
            |snapshot| async move { Some(snapshot) },
        );
        settle().await;

        tx.send(9).unwrap();
        drop(tx);
        settle().await;

        assert_eq!(*rx.borrow(), Some(9));
    }
}

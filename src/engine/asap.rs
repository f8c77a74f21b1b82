//! Runs possibly-asynchronous steps "as soon as possible".
//!
//! Steps that complete synchronously run eagerly, in the caller's stack. Once
//! a step returns a deferred result, every later step is chained onto it and
//! only runs after it settles. A fully synchronous chain therefore finishes
//! before the call returns.

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::{Future, IntoFuture};

/// Result of one step: finished now, or finishing later.
pub enum Step {
    Ready,
    Deferred(BoxFuture<'static, Result<()>>),
}

impl Step {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Step::Deferred(future.boxed())
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Step::Deferred(_))
    }

    /// Runs `next` right away if this step is ready, otherwise after it
    /// settles successfully.
    pub fn then<F>(self, next: F) -> Result<Step>
    where
        F: FnOnce() -> Result<Step> + Send + 'static,
    {
        match self {
            Step::Ready => next(),
            Step::Deferred(pending) => Ok(Step::deferred(async move {
                pending.await?;
                let step = next()?;
                step.settle().await
            })),
        }
    }

    /// Waits for the step to finish.
    pub async fn settle(self) -> Result<()> {
        match self {
            Step::Ready => Ok(()),
            Step::Deferred(pending) => pending.await,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Ready => f.write_str("Step::Ready"),
            Step::Deferred(_) => f.write_str("Step::Deferred(..)"),
        }
    }
}

/// Invokes `handlers` in order, eagerly until one of them defers, then chains
/// the rest onto that deferred result.
///
/// `proceed` is checked after every handler; once it returns false no further
/// handler is invoked. A handler that stopped the chain while deferring is
/// still awaited by the returned step.
pub fn exec_asap<H, F, C>(handlers: Vec<H>, invoke: F, proceed: C) -> Result<Step>
where
    H: Send + 'static,
    F: Fn(&H) -> Result<Step> + Send + 'static,
    C: Fn() -> bool + Send + 'static,
{
    let mut rest = handlers.into_iter();
    while let Some(handler) = rest.next() {
        let step = invoke(&handler)?;
        if !proceed() {
            return Ok(step);
        }
        if let Step::Deferred(pending) = step {
            let remaining: Vec<H> = rest.collect();
            return Ok(Step::deferred(async move {
                pending.await?;
                for handler in remaining {
                    if !proceed() {
                        break;
                    }
                    let step = invoke(&handler)?;
                    step.settle().await?;
                }
                Ok(())
            }));
        }
    }
    Ok(Step::Ready)
}

/// How an `Asap` chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Completed,
    /// A step failed; its catch handler ran and later steps were skipped.
    Cancelled,
}

enum AsapState {
    Settled(Settled),
    Pending(BoxFuture<'static, Settled>),
}

/// A try/catch chain of steps. Each step has its own catch handler; a failed
/// step cancels every step after it.
#[must_use = "a pending Asap does nothing unless awaited"]
pub struct Asap {
    state: AsapState,
}

impl Asap {
    pub fn completed() -> Self {
        Self {
            state: AsapState::Settled(Settled::Completed),
        }
    }

    pub fn try_catch<T, C>(try_fn: T, catch_fn: C) -> Self
    where
        T: FnOnce() -> Result<Step>,
        C: FnOnce(anyhow::Error) + Send + 'static,
    {
        let state = match try_fn() {
            Ok(Step::Ready) => AsapState::Settled(Settled::Completed),
            Ok(Step::Deferred(pending)) => AsapState::Pending(
                async move {
                    match pending.await {
                        Ok(()) => Settled::Completed,
                        Err(e) => {
                            catch_fn(e);
                            Settled::Cancelled
                        }
                    }
                }
                .boxed(),
            ),
            Err(e) => {
                catch_fn(e);
                AsapState::Settled(Settled::Cancelled)
            }
        };
        Self { state }
    }

    pub fn then_try_catch<T, C>(self, try_fn: T, catch_fn: C) -> Self
    where
        T: FnOnce() -> Result<Step> + Send + 'static,
        C: FnOnce(anyhow::Error) + Send + 'static,
    {
        match self.state {
            AsapState::Settled(Settled::Cancelled) => self,
            AsapState::Settled(Settled::Completed) => Self::try_catch(try_fn, catch_fn),
            AsapState::Pending(previous) => Self {
                state: AsapState::Pending(
                    async move {
                        if previous.await == Settled::Cancelled {
                            return Settled::Cancelled;
                        }
                        Self::try_catch(try_fn, catch_fn).await
                    }
                    .boxed(),
                ),
            },
        }
    }

    /// True once the chain has finished without needing to be awaited.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, AsapState::Settled(_))
    }

    /// The outcome, if the chain already finished.
    pub fn outcome(&self) -> Option<Settled> {
        match self.state {
            AsapState::Settled(outcome) => Some(outcome),
            AsapState::Pending(_) => None,
        }
    }
}

impl IntoFuture for Asap {
    type Output = Settled;
    type IntoFuture = BoxFuture<'static, Settled>;

    fn into_future(self) -> Self::IntoFuture {
        match self.state {
            AsapState::Settled(outcome) => futures::future::ready(outcome).boxed(),
            AsapState::Pending(pending) => pending,
        }
    }
}

impl fmt::Debug for Asap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            AsapState::Settled(outcome) => write!(f, "Asap({:?})", outcome),
            AsapState::Pending(_) => f.write_str("Asap(Pending)"),
        }
    }
}

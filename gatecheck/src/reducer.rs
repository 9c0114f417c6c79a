//! Reducer and effect primitives.
//!
//! The scanner session is modelled as a pure reducer:
//! `(State, Action, Environment) → (State, Effects)`.
//!
//! Reducers never perform I/O. They return [`Effect`] descriptions which the
//! session runtime executes, feeding any resulting action back into the
//! reducer. This keeps every transition of the scan state machine testable
//! without a camera, a store, or a timer.

use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Effects returned from a single `reduce` call.
///
/// Most transitions emit zero, one or two effects, so they stay inline.
pub type Effects<Action> = SmallVec<[Effect<Action>; 4]>;

/// The Reducer trait - business logic for one state machine.
///
/// # Type Parameters
///
/// - `State`: The state this reducer operates on
/// - `Action`: Every input the state machine accepts (commands and feedback)
/// - `Environment`: Injected dependencies captured by effects
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The environment type with injected dependencies
    type Environment;

    /// Reduce an action into state changes and effects.
    ///
    /// Updates `state` in place and returns effect descriptions to be
    /// executed by the runtime.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action>;
}

/// Effect type - describes a side effect to be executed.
///
/// Effects are NOT executed when created. They are values returned from
/// reducers and run by the scanner session runtime.
pub enum Effect<Action> {
    /// Dispatch an action after a delay (poll interval, session timeout)
    Delay {
        /// How long to wait
        duration: Duration,
        /// Action to dispatch after delay
        action: Box<Action>,
    },

    /// Arbitrary async computation.
    ///
    /// If it resolves to `Some(action)`, the action is fed back into the reducer.
    Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
}

impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
        }
    }
}

impl<Action> Effect<Action> {
    /// Wrap an async block as a feedback effect
    #[must_use]
    pub fn future<F>(future: F) -> Effect<Action>
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Effect::Future(Box::pin(future))
    }
}

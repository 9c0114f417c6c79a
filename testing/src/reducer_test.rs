//! Given-When-Then runner for reducers.
//!
//! A reducer step is checked in isolation: seed a state, apply one action,
//! then assert on the resulting state and on the effect descriptions. Effects
//! are inspected, never executed, unless a test explicitly hands them to
//! [`assertions::run_futures`].

#![allow(clippy::module_name_repetitions)]

use gatecheck::reducer::{Effect, Reducer};

type StateCheck<S> = Box<dyn FnOnce(&S)>;
type EffectCheck<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// One reducer step under test.
///
/// ```ignore
/// use gatecheck_testing::ReducerTest;
///
/// ReducerTest::new(ScannerReducer::new())
///     .with_env(environment)
///     .given_state(ScannerState::default())
///     .when_action(ScanAction::Start)
///     .then_state(|state| assert_eq!(state.phase, ScanPhase::Capturing))
///     .then_effects(|effects| assert_eq!(effects.len(), 2))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    env: Option<E>,
    given: Option<S>,
    when: Option<A>,
    state_checks: Vec<StateCheck<S>>,
    effect_checks: Vec<EffectCheck<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Start a test for `reducer`
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            env: None,
            given: None,
            when: None,
            state_checks: Vec::new(),
            effect_checks: Vec::new(),
        }
    }

    /// Environment passed to `reduce`
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.env = Some(env);
        self
    }

    /// Starting state
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.given = Some(state);
        self
    }

    /// Action to apply
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.when = Some(action);
        self
    }

    /// Check the state after the step
    #[must_use]
    pub fn then_state<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Check the effects the step returned
    #[must_use]
    pub fn then_effects<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_checks.push(Box::new(check));
        self
    }

    /// Apply the action and run every check.
    ///
    /// # Panics
    ///
    /// Panics if state, action or environment was not supplied, or if a
    /// check fails.
    #[allow(clippy::expect_used)]
    pub fn run(self) {
        let mut state = self.given.expect("call given_state() before run()");
        let action = self.when.expect("call when_action() before run()");
        let env = self.env.expect("call with_env() before run()");

        let effects = self.reducer.reduce(&mut state, action, &env);

        for check in self.state_checks {
            check(&state);
        }
        for check in self.effect_checks {
            check(&effects);
        }
    }
}

/// Checks over effect lists.
pub mod assertions {
    use gatecheck::reducer::Effect;
    use std::time::Duration;

    /// Nothing to run
    ///
    /// # Panics
    ///
    /// Panics if any effect was returned.
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(effects.is_empty(), "expected no effects, got {effects:?}");
    }

    /// Exactly `expected` effects
    ///
    /// # Panics
    ///
    /// Panics on a different count.
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(effects.len(), expected, "unexpected number of effects");
    }

    /// At least one [`Effect::Future`]
    ///
    /// # Panics
    ///
    /// Panics if there is none.
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "expected a future effect"
        );
    }

    /// A [`Effect::Delay`] whose action satisfies `predicate`; returns its duration.
    ///
    /// # Panics
    ///
    /// Panics if no delay matches.
    #[allow(clippy::panic)]
    pub fn assert_has_delay<A, F>(effects: &[Effect<A>], predicate: F) -> Duration
    where
        A: std::fmt::Debug,
        F: Fn(&A) -> bool,
    {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Delay { duration, action } if predicate(&**action) => Some(*duration),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no matching delay in {effects:?}"))
    }

    /// Await every future effect in order and collect the actions they feed back.
    ///
    /// Delays are skipped, not slept on.
    pub async fn run_futures<A>(effects: Vec<Effect<A>>) -> Vec<A> {
        let mut fed_back = Vec::new();
        for effect in effects {
            if let Effect::Future(future) = effect {
                fed_back.extend(future.await);
            }
        }
        fed_back
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gatecheck::reducer::Effects;
    use smallvec::smallvec;
    use std::time::Duration;

    /// A turnstile: each push admits one person, and locking it re-opens after a second.
    #[derive(Clone, Debug, Default)]
    struct Turnstile {
        admitted: u32,
        locked: bool,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Turn {
        Push,
        Lock,
        Unlock,
    }

    struct TurnstileReducer;

    impl Reducer for TurnstileReducer {
        type State = Turnstile;
        type Action = Turn;
        type Environment = ();

        fn reduce(&self, state: &mut Turnstile, action: Turn, _env: &()) -> Effects<Turn> {
            match action {
                Turn::Push if !state.locked => {
                    state.admitted += 1;
                    smallvec![]
                }
                Turn::Push => smallvec![],
                Turn::Lock => {
                    state.locked = true;
                    smallvec![
                        Effect::Delay {
                            duration: Duration::from_secs(1),
                            action: Box::new(Turn::Unlock),
                        },
                        Effect::future(async { Some(Turn::Push) }),
                    ]
                }
                Turn::Unlock => {
                    state.locked = false;
                    smallvec![]
                }
            }
        }
    }

    #[test]
    fn push_admits_without_effects() {
        ReducerTest::new(TurnstileReducer)
            .with_env(())
            .given_state(Turnstile::default())
            .when_action(Turn::Push)
            .then_state(|state| assert_eq!(state.admitted, 1))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn lock_schedules_unlock() {
        ReducerTest::new(TurnstileReducer)
            .with_env(())
            .given_state(Turnstile::default())
            .when_action(Turn::Lock)
            .then_state(|state| assert!(state.locked))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
                let delay = assertions::assert_has_delay(effects, |a| *a == Turn::Unlock);
                assert_eq!(delay, Duration::from_secs(1));
            })
            .run();
    }

    #[tokio::test]
    async fn run_futures_skips_delays() {
        let mut state = Turnstile::default();
        let effects = TurnstileReducer.reduce(&mut state, Turn::Lock, &());
        let fed_back = assertions::run_futures(effects.into_vec()).await;
        assert_eq!(fed_back, vec![Turn::Push]);
    }
}

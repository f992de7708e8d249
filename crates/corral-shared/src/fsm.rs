//! Generic transition-table state machine.
//!
//! A table maps a named action to the set of states it may fire from and the
//! state it lands in. The machine is pure: no callbacks, no history. Both the
//! session status machine and per-tool phase machines build on it.

use std::fmt;

#[derive(Debug, Clone)]
struct Rule<S, A> {
    action: A,
    from: Vec<S>,
    to: S,
}

/// Error returned for a transition the table does not admit.
///
/// Carries the admissible from-set of the action so callers can report why
/// the transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError<S, A> {
    pub action: A,
    pub current: S,
    pub admissible: Vec<S>,
}

impl<S: fmt::Debug, A: fmt::Debug> fmt::Display for TransitionError<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action {:?} is not valid from {:?} (admissible from: {:?})",
            self.action, self.current, self.admissible
        )
    }
}

impl<S: fmt::Debug, A: fmt::Debug> std::error::Error for TransitionError<S, A> {}

/// A named-action transition table.
///
/// Rules are kept in insertion order; `valid_actions` reports them in that
/// order, which keeps error output deterministic.
#[derive(Debug, Clone, Default)]
pub struct Fsm<S, A> {
    rules: Vec<Rule<S, A>>,
}

impl<S, A> Fsm<S, A>
where
    S: Copy + PartialEq + fmt::Debug,
    A: Copy + PartialEq + fmt::Debug,
{
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule: `action` fires from any state in `from` and lands in `to`.
    pub fn rule(mut self, action: A, from: &[S], to: S) -> Self {
        self.rules.push(Rule {
            action,
            from: from.to_vec(),
            to,
        });
        self
    }

    /// Apply `action` to `current`, returning the target state or the
    /// admissible from-set in the error.
    pub fn transition(&self, current: S, action: A) -> Result<S, TransitionError<S, A>> {
        let rule = self.rules.iter().find(|r| r.action == action);
        match rule {
            Some(r) if r.from.contains(&current) => Ok(r.to),
            Some(r) => Err(TransitionError {
                action,
                current,
                admissible: r.from.clone(),
            }),
            None => Err(TransitionError {
                action,
                current,
                admissible: Vec::new(),
            }),
        }
    }

    /// Actions that may fire from `current`, in rule order.
    pub fn valid_actions(&self, current: S) -> Vec<A> {
        self.rules
            .iter()
            .filter(|r| r.from.contains(&current))
            .map(|r| r.action)
            .collect()
    }
}

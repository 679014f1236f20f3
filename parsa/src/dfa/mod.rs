//! # Static DFA
//! A deterministic finite automaton over the fixed 128-symbol alphabet,
//! stored as a dense transition table. This is the frozen form that automata
//! take after all construction work is done: the scanner runs on it, the
//! regex compiler produces it, and the loader serializes it. All mutation
//! happens on the [Nfa](crate::nfa::Nfa) side; a `Dfa` is immutable once its
//! owner hands it out.
//!
//! State 0 is always the initial state. A missing transition is stored as
//! [REJECT] (`-1`), matching the serialized form byte for byte.
//!
//! ```
//! use parsa::regex::Regex;
//!
//! let regex = Regex::compile("ab*").unwrap();
//! assert!(regex.dfa().accept(b"abbb"));
//! assert!(!regex.dfa().accept(b"ba"));
//! ```

use crate::ALPHABET_SIZE;
use std::collections::HashSet;

/// Transition-table entry denoting the absence of a transition.
pub const REJECT: i32 = -1;

/// A deterministic finite automaton with a dense `(state, symbol)` table and
/// a per-state acceptance flag. See the [module documentation](self).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dfa {
    states: Vec<DfaState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct DfaState {
    accepting: bool,
    transitions: [i32; ALPHABET_SIZE],
}

impl Dfa {
    /// Creates an automaton with `num_states` states, all rejecting, with no
    /// transitions. Only construction code (the NFA conversion and the
    /// loader) fills it in; the finished value is immutable.
    pub(crate) fn new(num_states: usize) -> Self {
        assert!(num_states > 0, "a DFA has at least its initial state");
        Self {
            states: vec![
                DfaState {
                    accepting: false,
                    transitions: [REJECT; ALPHABET_SIZE],
                };
                num_states
            ],
        }
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        self.states[state].accepting
    }

    pub(crate) fn set_accepting(&mut self, state: usize) {
        self.states[state].accepting = true;
    }

    pub(crate) fn set_transition(&mut self, state: usize, symbol: u8, target: i32) {
        debug_assert!((symbol as usize) < ALPHABET_SIZE);
        debug_assert!(target >= REJECT && target < self.states.len() as i32);
        self.states[state].transitions[symbol as usize] = target;
    }

    /// The target of the transition from `state` on `symbol`, or `None` if
    /// the automaton rejects there. Bytes outside the 7-bit alphabet never
    /// have transitions.
    pub fn transition(&self, state: usize, symbol: u8) -> Option<usize> {
        if symbol as usize >= ALPHABET_SIZE {
            return None;
        }
        match self.states[state].transitions[symbol as usize] {
            REJECT => None,
            target => Some(target as usize),
        }
    }

    /// The raw table entry, with [REJECT] for missing transitions. This is
    /// the value that gets serialized.
    pub fn transition_raw(&self, state: usize, symbol: u8) -> i32 {
        self.states[state].transitions[symbol as usize]
    }

    /// Runs the automaton over `input` from state 0 and reports whether it
    /// ends in an accepting state.
    pub fn accept(&self, input: &[u8]) -> bool {
        let mut state = 0;
        for &byte in input {
            match self.transition(state, byte) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accepting(state)
    }

    /// Checks whether this automaton accepts the same language as `other`
    /// by walking the pair of them in lockstep from the initial states. A
    /// missing transition behaves as a virtual dead state, so two automata
    /// compare equal even when one still carries states that accept
    /// nothing. Intended for tests and sanity checks.
    pub fn equivalent_to(&self, other: &Dfa) -> bool {
        let mut visited: HashSet<(Option<usize>, Option<usize>)> = HashSet::new();
        let start = (Some(0), Some(0));
        let mut queue = vec![start];
        visited.insert(start);

        while let Some((a, b)) = queue.pop() {
            let accepting_a = a.map_or(false, |state| self.is_accepting(state));
            let accepting_b = b.map_or(false, |state| other.is_accepting(state));
            if accepting_a != accepting_b {
                return false;
            }
            if a.is_none() && b.is_none() {
                continue;
            }
            for symbol in 0..ALPHABET_SIZE as u8 {
                let target_a = a.and_then(|state| self.transition(state, symbol));
                let target_b = b.and_then(|state| other.transition(state, symbol));
                if target_a.is_none() && target_b.is_none() {
                    continue;
                }
                if visited.insert((target_a, target_b)) {
                    queue.push((target_a, target_b));
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_a() -> Dfa {
        // two states, accepting iff the count of 'a' is even
        let mut dfa = Dfa::new(2);
        dfa.set_accepting(0);
        dfa.set_transition(0, b'a', 1);
        dfa.set_transition(1, b'a', 0);
        dfa.set_transition(0, b'b', 0);
        dfa.set_transition(1, b'b', 1);
        dfa
    }

    #[test]
    fn accept_walks_the_table() {
        let dfa = even_a();
        assert!(dfa.accept(b""));
        assert!(dfa.accept(b"aa"));
        assert!(dfa.accept(b"abab"));
        assert!(!dfa.accept(b"aba"));
        assert!(!dfa.accept(b"c"));
    }

    #[test]
    fn equivalence_ignores_state_numbering() {
        let dfa = even_a();
        let mut renumbered = Dfa::new(2);
        renumbered.set_accepting(0);
        renumbered.set_transition(0, b'a', 1);
        renumbered.set_transition(1, b'a', 0);
        renumbered.set_transition(0, b'b', 0);
        renumbered.set_transition(1, b'b', 1);
        assert!(dfa.equivalent_to(&renumbered));

        let mut different = even_a();
        different.set_accepting(1);
        assert!(!dfa.equivalent_to(&different));
    }

    #[test]
    fn equivalence_treats_dead_states_as_absent() {
        // accepts nothing, but keeps a live dead state around
        let mut with_dead = Dfa::new(2);
        with_dead.set_transition(0, b'a', 1);
        with_dead.set_transition(1, b'a', 1);
        let bare = Dfa::new(1);
        assert!(with_dead.equivalent_to(&bare));
        assert!(bare.equivalent_to(&with_dead));
    }
}

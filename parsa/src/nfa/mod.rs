//! # Dynamic NFA
//! The mutable automaton representation that all construction goes through:
//! a [Nfa] holds an arena of states with per-symbol successor sets and
//! ε-transitions, and supports the three regular operations (union,
//! concatenation, Kleene closure) plus ε-elimination, subset-construction
//! determinization and partition-refinement minimization. Once an automaton
//! has been determinized it can be frozen into a dense [Dfa] table with
//! [Nfa::to_dfa].
//!
//! States are identified by their index in the arena; state 0 is always the
//! initial state, and every operation that rebuilds or copies states returns
//! a relocation map so callers can follow their states through the
//! transformation. The scanner construction depends on this: it tags
//! accepting states with token ids and carries the tags through union,
//! determinization and minimization using the returned maps.
//!
//! ```
//! use parsa::nfa::Nfa;
//!
//! // (a|b)* by hand: two single-symbol automata, union, closure
//! let mut a = Nfa::new();
//! let fa = a.add_state();
//! a.set_accepting(fa, true);
//! a.add_transition(0, b'a', fa);
//!
//! let mut b = Nfa::new();
//! let fb = b.add_state();
//! b.set_accepting(fb, true);
//! b.add_transition(0, b'b', fb);
//!
//! let (either, _, _) = Nfa::union(&a, &b);
//! let (mut any, _) = Nfa::closure(&either);
//! any.remove_epsilon_moves();
//! any.determinize();
//! any.minimize(true);
//! let dfa = any.to_dfa();
//! assert!(dfa.accept(b""));
//! assert!(dfa.accept(b"abba"));
//! assert!(!dfa.accept(b"abc"));
//! ```

use crate::dfa::Dfa;
use crate::ALPHABET_SIZE;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// A nondeterministic finite automaton with ε-moves. State 0 is the initial
/// state. See the [module documentation](self).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nfa {
    states: Vec<NfaState>,
}

/// A state in a [Nfa]: an accept flag, one (possibly empty) successor set
/// per alphabet symbol, and a set of ε-successors. Successor sets are kept
/// sorted so all constructions are deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NfaState {
    accepting: bool,
    transitions: Vec<Vec<usize>>,
    epsilon_transitions: Vec<usize>,
}

impl NfaState {
    fn new() -> Self {
        Self {
            accepting: false,
            transitions: vec![Vec::new(); ALPHABET_SIZE],
            epsilon_transitions: Vec::new(),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// The successor set for one symbol, in ascending state order
    pub fn transitions(&self, symbol: u8) -> &[usize] {
        &self.transitions[symbol as usize]
    }

    pub fn epsilon_transitions(&self) -> &[usize] {
        &self.epsilon_transitions
    }
}

fn insert_sorted(set: &mut Vec<usize>, value: usize) {
    if let Err(pos) = set.binary_search(&value) {
        set.insert(pos, value);
    }
}

impl Default for Nfa {
    fn default() -> Self {
        Self::new()
    }
}

impl Nfa {
    /// Creates an automaton consisting of just the initial state, which is
    /// not accepting.
    pub fn new() -> Self {
        Self {
            states: vec![NfaState::new()],
        }
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, index: usize) -> &NfaState {
        &self.states[index]
    }

    /// Adds a fresh state and returns its index.
    pub fn add_state(&mut self) -> usize {
        self.states.push(NfaState::new());
        self.states.len() - 1
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        self.states[state].accepting
    }

    pub fn set_accepting(&mut self, state: usize, accepting: bool) {
        self.states[state].accepting = accepting;
    }

    pub fn add_transition(&mut self, state: usize, symbol: u8, target: usize) {
        debug_assert!((symbol as usize) < ALPHABET_SIZE);
        debug_assert!(target < self.states.len());
        insert_sorted(&mut self.states[state].transitions[symbol as usize], target);
    }

    pub fn add_epsilon_transition(&mut self, state: usize, target: usize) {
        debug_assert!(target < self.states.len());
        insert_sorted(&mut self.states[state].epsilon_transitions, target);
    }

    /// The indices of all accepting states, ascending.
    pub fn final_states(&self) -> Vec<usize> {
        (0..self.states.len())
            .filter(|&i| self.states[i].accepting)
            .collect()
    }

    pub fn has_epsilon_moves(&self) -> bool {
        self.states
            .iter()
            .any(|s| !s.epsilon_transitions.is_empty())
    }

    /// Copies all of `other`'s states into this automaton and returns the
    /// relocation map (`map[old] = new`).
    fn append(&mut self, other: &Nfa) -> Vec<usize> {
        let offset = self.states.len();
        for state in &other.states {
            self.states.push(NfaState {
                accepting: state.accepting,
                transitions: state
                    .transitions
                    .iter()
                    .map(|set| set.iter().map(|&t| t + offset).collect())
                    .collect(),
                epsilon_transitions: state
                    .epsilon_transitions
                    .iter()
                    .map(|&t| t + offset)
                    .collect(),
            });
        }
        (offset..self.states.len()).collect()
    }

    /// The union `A ∪ B`: a fresh initial state with ε-edges to copies of
    /// both operands' initial states. All accepting states of both copies
    /// stay accepting. Returns the result together with the relocation maps
    /// for `a`'s and `b`'s states.
    pub fn union(a: &Nfa, b: &Nfa) -> (Nfa, Vec<usize>, Vec<usize>) {
        let mut result = Nfa::new();
        let map_a = result.append(a);
        let map_b = result.append(b);
        result.add_epsilon_transition(0, map_a[0]);
        result.add_epsilon_transition(0, map_b[0]);
        (result, map_a, map_b)
    }

    /// The concatenation `A · B`: `a`'s accepting states lose their accept
    /// flag and gain ε-edges to a copy of `b`'s initial state; `b`'s
    /// accepting states become the result's. Returns the relocation maps
    /// for both operands (the map for `a` is the identity).
    pub fn concat(a: &Nfa, b: &Nfa) -> (Nfa, Vec<usize>, Vec<usize>) {
        let mut result = a.clone();
        let map_a = (0..a.states.len()).collect();
        let a_finals = result.final_states();
        for &f in &a_finals {
            result.states[f].accepting = false;
        }
        let map_b = result.append(b);
        for &f in &a_finals {
            result.add_epsilon_transition(f, map_b[0]);
        }
        (result, map_a, map_b)
    }

    /// The Kleene closure `A*`: ε-edges from every accepting state back to
    /// the initial state, and the initial state becomes accepting. Returns
    /// the (identity) relocation map.
    pub fn closure(a: &Nfa) -> (Nfa, Vec<usize>) {
        let mut result = a.clone();
        for f in result.final_states() {
            result.add_epsilon_transition(f, 0);
        }
        result.states[0].accepting = true;
        let map = (0..result.states.len()).collect();
        (result, map)
    }

    /// The ε-closure of every state: all states reachable through any number
    /// of ε-transitions, including the state itself. Sorted, cycle-safe,
    /// computed with an explicit work list.
    pub fn epsilon_closures(&self) -> Vec<Vec<usize>> {
        (0..self.states.len())
            .map(|start| {
                let mut closure = BTreeSet::from([start]);
                let mut work = vec![start];
                while let Some(state) = work.pop() {
                    for &target in &self.states[state].epsilon_transitions {
                        if closure.insert(target) {
                            work.push(target);
                        }
                    }
                }
                closure.into_iter().collect()
            })
            .collect()
    }

    /// Removes all ε-transitions: every state becomes accepting if any
    /// member of its ε-closure is, and inherits the per-symbol successors of
    /// all closure members.
    pub fn remove_epsilon_moves(&mut self) {
        if !self.has_epsilon_moves() {
            return;
        }
        let closures = self.epsilon_closures();
        let new_states: Vec<NfaState> = (0..self.states.len())
            .map(|s| {
                let mut accepting = false;
                let mut merged: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); ALPHABET_SIZE];
                for &member in &closures[s] {
                    accepting |= self.states[member].accepting;
                    for (symbol, set) in merged.iter_mut().enumerate() {
                        set.extend(self.states[member].transitions[symbol].iter().copied());
                    }
                }
                NfaState {
                    accepting,
                    transitions: merged
                        .into_iter()
                        .map(|set| set.into_iter().collect())
                        .collect(),
                    epsilon_transitions: Vec::new(),
                }
            })
            .collect();
        self.states = new_states;
    }

    /// Subset-construction determinization. The automaton must be ε-free.
    /// Afterwards every `(state, symbol)` has at most one successor, only
    /// subsets reachable from `{0}` exist, and state numbers follow BFS
    /// discovery order with the initial subset as state 0.
    ///
    /// Returns, for each new state, the sorted set of old states it
    /// represents, so callers can relocate per-state annotations.
    pub fn determinize(&mut self) -> Vec<Vec<usize>> {
        debug_assert!(!self.has_epsilon_moves(), "determinize requires an ε-free automaton");

        let mut index: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut subsets: Vec<Vec<usize>> = vec![vec![0]];
        let mut new_states: Vec<NfaState> = vec![NfaState::new()];
        index.insert(vec![0], 0);

        let mut queue = VecDeque::from([0usize]);
        while let Some(current) = queue.pop_front() {
            let subset = subsets[current].clone();
            new_states[current].accepting = subset.iter().any(|&s| self.states[s].accepting);

            for symbol in 0..ALPHABET_SIZE {
                let target: Vec<usize> = subset
                    .iter()
                    .flat_map(|&s| self.states[s].transitions[symbol].iter().copied())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if target.is_empty() {
                    continue;
                }
                let target_index = match index.get(&target) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = subsets.len();
                        index.insert(target.clone(), fresh);
                        subsets.push(target);
                        new_states.push(NfaState::new());
                        queue.push_back(fresh);
                        fresh
                    }
                };
                new_states[current].transitions[symbol] = vec![target_index];
            }
        }

        self.states = new_states;
        subsets
    }

    /// Partition-refinement minimization. Precondition: deterministic,
    /// ε-free, and all states reachable (as [Nfa::determinize] leaves it).
    ///
    /// The initial partition separates accepting from non-accepting states,
    /// with a virtual dead state (the absence of a transition) joining the
    /// non-accepting class. With `final_merge` set to `false`, every
    /// accepting state starts in its own singleton class — used when
    /// different accept states carry different token ids. Classes are then
    /// split until all members agree, for every symbol, on the class of
    /// their successor.
    ///
    /// Returns the old→new state map. States merged into the dead class map
    /// to `None`; if there are no accepting states at all the automaton
    /// collapses to the single-state rejecter and only the initial state
    /// remains mapped.
    pub fn minimize(&mut self, final_merge: bool) -> Vec<Option<usize>> {
        let n = self.states.len();
        let finals = self.final_states();

        if finals.is_empty() {
            // the automaton rejects every sentence
            let mut mapping = vec![None; n];
            mapping[0] = Some(0);
            self.states = vec![NfaState::new()];
            return mapping;
        }

        // members are Option<usize>, None being the virtual dead state
        let mut classes: Vec<Vec<Option<usize>>> = Vec::new();
        if final_merge {
            classes.push(finals.iter().map(|&s| Some(s)).collect());
        } else {
            for &s in &finals {
                classes.push(vec![Some(s)]);
            }
        }
        let mut rejecting: Vec<Option<usize>> = (0..n)
            .filter(|&s| !self.states[s].accepting)
            .map(Some)
            .collect();
        rejecting.push(None);
        classes.push(rejecting);

        // class_of[s] for live states, class_of[n] for the dead state
        let mut class_of = vec![0usize; n + 1];
        loop {
            for (class, members) in classes.iter().enumerate() {
                for member in members {
                    class_of[member.unwrap_or(n)] = class;
                }
            }

            let mut next: Vec<Vec<Option<usize>>> = Vec::new();
            let mut changed = false;
            for members in &classes {
                let mut groups: Vec<Vec<Option<usize>>> = Vec::new();
                let mut group_of: HashMap<Vec<usize>, usize> = HashMap::new();
                for &member in members {
                    let signature: Vec<usize> = (0..ALPHABET_SIZE)
                        .map(|symbol| {
                            let successor = member
                                .and_then(|s| self.states[s].transitions[symbol].first().copied());
                            class_of[successor.unwrap_or(n)]
                        })
                        .collect();
                    match group_of.get(&signature) {
                        Some(&group) => groups[group].push(member),
                        None => {
                            group_of.insert(signature, groups.len());
                            groups.push(vec![member]);
                        }
                    }
                }
                if groups.len() > 1 {
                    changed = true;
                }
                next.extend(groups);
            }
            classes = next;
            if !changed {
                break;
            }
        }

        // Live classes ordered by their smallest member; the class holding
        // the dead state is dropped entirely (its live members accept
        // nothing). The initial state's class sorts first, so it stays 0.
        let mut live: Vec<Vec<usize>> = classes
            .into_iter()
            .filter(|members| members.iter().all(|m| m.is_some()))
            .map(|members| members.into_iter().flatten().collect::<Vec<usize>>())
            .collect();
        live.sort_by_key(|members| members[0]);
        debug_assert_eq!(live[0][0], 0, "the initial state cannot be merged away");

        let mut mapping = vec![None; n];
        for (new_index, members) in live.iter().enumerate() {
            for &member in members {
                mapping[member] = Some(new_index);
            }
        }

        let new_states: Vec<NfaState> = live
            .iter()
            .map(|members| {
                let representative = members[0];
                NfaState {
                    accepting: self.states[representative].accepting,
                    transitions: (0..ALPHABET_SIZE)
                        .map(|symbol| {
                            self.states[representative].transitions[symbol]
                                .first()
                                .and_then(|&t| mapping[t])
                                .into_iter()
                                .collect()
                        })
                        .collect(),
                    epsilon_transitions: Vec::new(),
                }
            })
            .collect();
        self.states = new_states;
        mapping
    }

    /// ε-elimination, determinization and minimization in one go, for
    /// callers that don't need the relocation maps (such as the regex
    /// compiler, which has a single accept meaning).
    pub fn determinize_and_minimize(&mut self) {
        self.remove_epsilon_moves();
        self.determinize();
        self.minimize(true);
    }

    /// Lifts a static [Dfa] into the mutable representation.
    pub fn from_dfa(dfa: &Dfa) -> Nfa {
        let mut nfa = Nfa {
            states: (0..dfa.num_states()).map(|_| NfaState::new()).collect(),
        };
        for state in 0..dfa.num_states() {
            if dfa.is_accepting(state) {
                nfa.states[state].accepting = true;
            }
            for symbol in 0..ALPHABET_SIZE as u8 {
                if let Some(target) = dfa.transition(state, symbol) {
                    nfa.states[state].transitions[symbol as usize] = vec![target];
                }
            }
        }
        nfa
    }

    /// Freezes this automaton into a dense [Dfa] table. It must be
    /// deterministic and ε-free.
    pub fn to_dfa(&self) -> Dfa {
        let mut dfa = Dfa::new(self.states.len());
        for (index, state) in self.states.iter().enumerate() {
            debug_assert!(state.epsilon_transitions.is_empty());
            if state.accepting {
                dfa.set_accepting(index);
            }
            for symbol in 0..ALPHABET_SIZE {
                let successors = &state.transitions[symbol];
                debug_assert!(successors.len() <= 1, "to_dfa requires a deterministic automaton");
                if let Some(&target) = successors.first() {
                    dfa.set_transition(index, symbol as u8, target as i32);
                }
            }
        }
        dfa
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An automaton accepting exactly the one-byte string `symbol`.
    fn symbol_nfa(symbol: u8) -> Nfa {
        let mut nfa = Nfa::new();
        let accept = nfa.add_state();
        nfa.set_accepting(accept, true);
        nfa.add_transition(0, symbol, accept);
        nfa
    }

    fn compile(mut nfa: Nfa) -> Dfa {
        nfa.determinize_and_minimize();
        nfa.to_dfa()
    }

    #[test]
    fn union_accepts_either() {
        let (either, _, _) = Nfa::union(&symbol_nfa(b'a'), &symbol_nfa(b'b'));
        let dfa = compile(either);
        assert!(dfa.accept(b"a"));
        assert!(dfa.accept(b"b"));
        assert!(!dfa.accept(b""));
        assert!(!dfa.accept(b"ab"));
    }

    #[test]
    fn concat_requires_both_in_order() {
        let (ab, _, _) = Nfa::concat(&symbol_nfa(b'a'), &symbol_nfa(b'b'));
        let dfa = compile(ab);
        assert!(dfa.accept(b"ab"));
        assert!(!dfa.accept(b"a"));
        assert!(!dfa.accept(b"ba"));
    }

    #[test]
    fn closure_accepts_repetitions() {
        let (star, _) = Nfa::closure(&symbol_nfa(b'a'));
        let dfa = compile(star);
        assert!(dfa.accept(b""));
        assert!(dfa.accept(b"aaaa"));
        assert!(!dfa.accept(b"ab"));
    }

    #[test]
    fn epsilon_closure_handles_cycles() {
        let mut nfa = Nfa::new();
        let s1 = nfa.add_state();
        let s2 = nfa.add_state();
        nfa.add_epsilon_transition(0, s1);
        nfa.add_epsilon_transition(s1, s2);
        nfa.add_epsilon_transition(s2, 0);
        assert_eq!(nfa.epsilon_closures()[0], vec![0, s1, s2]);
    }

    #[test]
    fn minimize_collapses_empty_language() {
        let mut nfa = symbol_nfa(b'a');
        nfa.set_accepting(1, false);
        nfa.remove_epsilon_moves();
        nfa.determinize();
        let mapping = nfa.minimize(true);
        assert_eq!(nfa.num_states(), 1);
        assert!(!nfa.is_accepting(0));
        assert_eq!(mapping[0], Some(0));
    }

    #[test]
    fn minimize_without_final_merge_keeps_accepting_states_apart() {
        // accepts "a" and "b" through two distinct accepting states that
        // would merge under plain minimization
        let (mut either, _, _) = Nfa::union(&symbol_nfa(b'a'), &symbol_nfa(b'b'));
        either.remove_epsilon_moves();
        either.determinize();

        let mut merged = either.clone();
        merged.minimize(true);
        let mut unmerged = either;
        unmerged.minimize(false);
        assert_eq!(merged.final_states().len(), 1);
        assert_eq!(unmerged.final_states().len(), 2);
    }

    #[test]
    fn determinize_reports_subset_representatives() {
        // a|a through two parallel branches: the subsets reveal the merge
        let (mut either, ma, mb) = Nfa::union(&symbol_nfa(b'a'), &symbol_nfa(b'a'));
        either.remove_epsilon_moves();
        let subsets = either.determinize();
        let accept_subset = subsets
            .iter()
            .find(|subset| subset.contains(&ma[1]))
            .unwrap();
        assert!(accept_subset.contains(&mb[1]));
    }
}

//! Memoization of per-step quantities keyed by state and parameter versions.
//!
//! A [`Cache`] is a list of declared entries. Each entry names its
//! prerequisites as [`Ticket`]s: the context's time, discrete state,
//! parameters or inputs, or another entry declared before it. Entries
//! therefore form a DAG by construction.
//!
//! An entry is up to date when it holds a value, every prerequisite version
//! equals the snapshot taken when the value was computed, and every entry
//! prerequisite is itself up to date. Otherwise [`Cache::eval`] recomputes
//! it. While an entry is being computed it is marked in progress; evaluating
//! it again before the computation returns is an algebraic loop.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use sim_types::{Result, SimError};
use tracing::trace;

/// Index of a declared cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheIndex(usize);

impl CacheIndex {
    /// Raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CacheIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheIndex({})", self.0)
    }
}

/// A source of change that a cache entry depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ticket {
    /// Context time.
    Time,
    /// Discrete state `[q; v]`.
    DiscreteState,
    /// Numeric parameters.
    Parameters,
    /// Input values (actuation).
    Inputs,
    /// Another cache entry.
    Entry(CacheIndex),
}

/// Current versions of the non-entry tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceVersions {
    /// Version of the context time.
    pub time: u64,
    /// Version of the discrete state.
    pub discrete_state: u64,
    /// Version of the parameters.
    pub parameters: u64,
    /// Version of the inputs.
    pub inputs: u64,
}

struct CacheEntry {
    name: &'static str,
    prerequisites: Vec<Ticket>,
    value: RefCell<Option<Rc<dyn Any>>>,
    snapshot: RefCell<Vec<u64>>,
    version: Cell<u64>,
    in_progress: Cell<bool>,
}

impl CacheEntry {
    fn new(name: &'static str, prerequisites: Vec<Ticket>) -> Self {
        Self {
            name,
            prerequisites,
            value: RefCell::new(None),
            snapshot: RefCell::new(Vec::new()),
            version: Cell::new(0),
            in_progress: Cell::new(false),
        }
    }
}

/// Clears an entry's in-progress marker on every exit path.
struct InProgressGuard<'a>(&'a Cell<bool>);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Declared cache entries and their memoized values.
#[derive(Default)]
pub struct Cache {
    entries: Vec<CacheEntry>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| {
                (
                    e.name,
                    e.value.borrow().is_some(),
                    e.version.get(),
                    e.in_progress.get(),
                )
            }))
            .finish()
    }
}

impl Cache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entry. Entry prerequisites must already be declared.
    pub fn declare_entry(
        &mut self,
        name: &'static str,
        prerequisites: impl IntoIterator<Item = Ticket>,
    ) -> Result<CacheIndex> {
        let prerequisites: Vec<Ticket> = prerequisites.into_iter().collect();
        let next = self.entries.len();
        for t in &prerequisites {
            if let Ticket::Entry(dep) = t {
                if dep.0 >= next {
                    return Err(SimError::structural(format!(
                        "cache entry '{name}' depends on {dep}, which is not declared before it"
                    )));
                }
            }
        }
        self.entries.push(CacheEntry::new(name, prerequisites));
        Ok(CacheIndex(next))
    }

    /// Same declarations with every value invalidated.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| CacheEntry::new(e.name, e.prerequisites.clone()))
                .collect(),
        }
    }

    /// Number of declared entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name of an entry.
    pub fn name(&self, index: CacheIndex) -> Option<&'static str> {
        self.entries.get(index.0).map(|e| e.name)
    }

    /// Number of times an entry has been computed.
    pub fn version(&self, index: CacheIndex) -> Option<u64> {
        self.entries.get(index.0).map(|e| e.version.get())
    }

    /// Whether an entry is currently being computed.
    pub fn is_in_progress(&self, index: CacheIndex) -> bool {
        self.entries.get(index.0).is_some_and(|e| e.in_progress.get())
    }

    /// Whether an entry holds a value valid for `sources`.
    pub fn is_up_to_date(&self, index: CacheIndex, sources: &SourceVersions) -> bool {
        let Some(entry) = self.entries.get(index.0) else {
            return false;
        };
        if entry.value.borrow().is_none() {
            return false;
        }
        let snapshot = entry.snapshot.borrow();
        entry
            .prerequisites
            .iter()
            .zip(snapshot.iter())
            .all(|(ticket, seen)| match ticket {
                Ticket::Entry(dep) => {
                    self.is_up_to_date(*dep, sources)
                        && self.version(*dep) == Some(*seen)
                }
                source => source_version(*source, sources) == *seen,
            })
    }

    /// Drop the value of every entry.
    pub fn invalidate_all(&self) {
        for e in &self.entries {
            e.value.replace(None);
        }
    }

    /// Memoized value of `index`, computing it with `calc` when stale.
    ///
    /// `calc` may evaluate other entries. Evaluating `index` itself from
    /// within `calc` fails with [`SimError::AlgebraicLoop`].
    pub fn eval<T: Any>(
        &self,
        index: CacheIndex,
        sources: &SourceVersions,
        calc: impl FnOnce() -> Result<T>,
    ) -> Result<Rc<T>> {
        let entry = self
            .entries
            .get(index.0)
            .ok_or_else(|| SimError::invalid_index("cache entry", index.0))?;

        if entry.in_progress.get() {
            return Err(SimError::AlgebraicLoop {
                entry: entry.name.to_string(),
            });
        }
        if self.is_up_to_date(index, sources) {
            if let Some(value) = entry.value.borrow().as_ref() {
                return downcast(entry.name, Rc::clone(value));
            }
        }

        entry.in_progress.set(true);
        let _guard = InProgressGuard(&entry.in_progress);
        trace!(entry = entry.name, "recomputing cache entry");

        let value: Rc<dyn Any> = Rc::new(calc()?);

        // Entry prerequisites were brought up to date by `calc` or are
        // otherwise unchanged, so their versions are current.
        let snapshot = entry
            .prerequisites
            .iter()
            .map(|ticket| match ticket {
                Ticket::Entry(dep) => self.version(*dep).unwrap_or(0),
                source => source_version(*source, sources),
            })
            .collect();
        entry.snapshot.replace(snapshot);
        entry.value.replace(Some(Rc::clone(&value)));
        entry.version.set(entry.version.get() + 1);
        downcast(entry.name, value)
    }
}

fn source_version(ticket: Ticket, sources: &SourceVersions) -> u64 {
    match ticket {
        Ticket::Time => sources.time,
        Ticket::DiscreteState => sources.discrete_state,
        Ticket::Parameters => sources.parameters,
        Ticket::Inputs => sources.inputs,
        Ticket::Entry(_) => 0,
    }
}

fn downcast<T: Any>(name: &str, value: Rc<dyn Any>) -> Result<Rc<T>> {
    value.downcast::<T>().map_err(|_| {
        SimError::structural(format!("cache entry '{name}' holds a value of another type"))
    })
}

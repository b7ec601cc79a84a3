//! Per-session current-region state.
//!
//! State transitions:
//! - Uninitialized -> Resolving: `seed` with the resolver's server-side guess
//! - Resolving -> Reconciled: `reconcile` against the stored preference
//! - Reconciled -> Reconciled: `set_current_region` (user action)
//!
//! There is no terminal state and no transition that forgets a stored preference.
//! The context is owned by one session and mutated through `&mut self` only, so there is
//! exactly one writer.

use crate::cards::{ContentCatalog, SelectedCard};
use crate::preferences::{PreferenceStorage, RegionPreferenceStore};
use crate::regions::{Provenance, Region, ResolvedRegion};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

/// Where the active region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "provenance", rename_all = "kebab-case")]
pub enum RegionSource {
    StoredPreference,
    Resolved(Provenance),
    UserSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Resolving(ResolvedRegion),
    Reconciled { region: Region, source: RegionSource },
}

impl ContextState {
    fn name(&self) -> &'static str {
        match self {
            ContextState::Uninitialized => "uninitialized",
            ContextState::Resolving(_) => "resolving",
            ContextState::Reconciled { .. } => "reconciled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    UnknownRegion(String),
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::InvalidTransition { state, action } => {
                write!(f, "Cannot {} while region context is {}", action, state)
            }
            ContextError::UnknownRegion(value) => write!(f, "Unknown region: {}", value),
        }
    }
}

impl std::error::Error for ContextError {}

/// Result of a user region change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionUpdate {
    pub previous: Region,
    pub region: Region,
    /// False when the preference could not be stored; the in-memory region still changed.
    pub persisted: bool,
}

pub type RegionObserver = Box<dyn FnMut(Region, &[SelectedCard])>;

pub struct RegionContext<S> {
    state: ContextState,
    catalog: Arc<ContentCatalog>,
    store: RegionPreferenceStore<S>,
    observers: Vec<RegionObserver>,
}

impl<S> std::fmt::Debug for RegionContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionContext")
            .field("state", &self.state)
            .field("cards", &self.catalog.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<S: PreferenceStorage> RegionContext<S> {
    pub fn new(catalog: Arc<ContentCatalog>, store: RegionPreferenceStore<S>) -> Self {
        Self {
            state: ContextState::Uninitialized,
            catalog,
            store,
            observers: Vec::new(),
        }
    }

    /// Seed and reconcile in one go, the usual way a page load builds its context.
    pub fn initialize(
        catalog: Arc<ContentCatalog>,
        store: RegionPreferenceStore<S>,
        resolved: ResolvedRegion,
    ) -> Self {
        let mut ctx = Self::new(catalog, store);
        ctx.state = ContextState::Resolving(resolved);
        ctx.finish_reconcile(resolved);
        ctx
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn store(&self) -> &RegionPreferenceStore<S> {
        &self.store
    }

    pub fn seed(&mut self, resolved: ResolvedRegion) -> Result<(), ContextError> {
        match self.state {
            ContextState::Uninitialized => {
                self.state = ContextState::Resolving(resolved);
                Ok(())
            }
            other => Err(ContextError::InvalidTransition {
                state: other.name(),
                action: "seed",
            }),
        }
    }

    /// A stored preference wins over the resolver's guess; without one the guess is used.
    pub fn reconcile(&mut self) -> Result<Region, ContextError> {
        match self.state {
            ContextState::Resolving(resolved) => Ok(self.finish_reconcile(resolved)),
            other => Err(ContextError::InvalidTransition {
                state: other.name(),
                action: "reconcile",
            }),
        }
    }

    fn finish_reconcile(&mut self, resolved: ResolvedRegion) -> Region {
        let (region, source) = match self.store.get_stored_preference() {
            Some(stored) => (stored, RegionSource::StoredPreference),
            None => (resolved.region, RegionSource::Resolved(resolved.provenance)),
        };
        tracing::debug!(
            region = %region,
            resolved = %resolved.region,
            source = ?source,
            "Region context reconciled"
        );
        self.state = ContextState::Reconciled { region, source };
        region
    }

    pub fn current_region(&self) -> Option<Region> {
        match self.state {
            ContextState::Reconciled { region, .. } => Some(region),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<RegionSource> {
        match self.state {
            ContextState::Reconciled { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Cards for the active region, recomputed from the catalog on every call.
    pub fn cards(&self) -> Vec<SelectedCard> {
        self.current_region()
            .map(|region| self.catalog.cards_for_region(region))
            .unwrap_or_default()
    }

    /// Register a callback run synchronously after every region change.
    pub fn subscribe(&mut self, observer: RegionObserver) {
        self.observers.push(observer);
    }

    /// User-driven region change: update memory, persist, notify.
    ///
    /// A storage failure is logged and reported through `RegionUpdate::persisted`; the
    /// in-memory region is authoritative either way.
    pub fn set_current_region(&mut self, region: Region) -> Result<RegionUpdate, ContextError> {
        let previous = match self.state {
            ContextState::Reconciled {
                region: current, ..
            } => current,
            other => {
                return Err(ContextError::InvalidTransition {
                    state: other.name(),
                    action: "set region",
                })
            }
        };

        self.state = ContextState::Reconciled {
            region,
            source: RegionSource::UserSelection,
        };

        let persisted = match self.store.set_stored_preference(region) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(region = %region, error = %e, "Failed to store region preference");
                false
            }
        };

        if previous != region && !self.observers.is_empty() {
            let cards = self.catalog.cards_for_region(region);
            for observer in self.observers.iter_mut() {
                observer(region, &cards);
            }
        }

        Ok(RegionUpdate {
            previous,
            region,
            persisted,
        })
    }

    /// Like [`set_current_region`](Self::set_current_region) for untrusted input.
    /// Unknown regions are rejected and leave the state untouched.
    pub fn select_region(&mut self, candidate: &str) -> Result<RegionUpdate, ContextError> {
        let region = Region::from_str(candidate)
            .map_err(|_| ContextError::UnknownRegion(candidate.to_string()))?;
        self.set_current_region(region)
    }
}

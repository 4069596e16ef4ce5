//! Editor state: immutable documents, selections, and extension slots, all
//! updated atomically through transactions.
//!
//! An [`EditorState`] is a frozen tuple of document, selection, resolved
//! extension configuration, and slot values. [`EditorState::update`] resolves
//! transaction specs, runs change and transaction filters, applies the
//! changes, maps or adopts the selection, recomputes state fields and the
//! facets depending on them, and returns the new state together with the
//! frozen [`Transaction`]. States are persistent values: an update never
//! mutates its input, and unchanged slots keep their previous `Arc`s.

use std::sync::{Arc, LazyLock};

use core_text::{CharCategorizer, Text, TextError};
use thiserror::Error;

pub mod change;
mod facet;
mod selection;
mod transaction;

pub use change::{
    Change, ChangeDesc, ChangeError, ChangeSet, ChangedRegion, MapMode, Touched,
};
pub use facet::{Dep, Extension, Facet, FacetSpec, FieldSpec, Prec, StateField};
pub use selection::{Selection, SelectionError, SelectionRange};
pub use transaction::{
    Annotation, AnnotationType, ChangesArg, StateEffect, StateEffectType, Transaction,
    TransactionSpec, effect_values, user_event_annotation,
};

use facet::{Configuration, DynValue, FacetSlotValue, ResolvedDep, Slot, SlotAddr, uncomputed};

/// Bound on transaction-filter re-entry before the update is aborted.
pub const TRANSACTION_FILTER_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Change(#[from] ChangeError),
    #[error(transparent)]
    Text(#[from] TextError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("selection position {pos} outside document of length {len}")]
    SelectionOutOfRange { pos: usize, len: usize },
    #[error("cyclic dependency between facets")]
    FacetCycle,
    #[error("transaction filters exceeded {limit} re-entries")]
    TransactionFilterOverflow { limit: usize },
}

// ---------------------------------------------------------------------------
// Built-in facets
// ---------------------------------------------------------------------------

/// Handler receiving captured extension failures.
pub type ExceptionHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Sink for errors raised by field updates and facet computations. Without a
/// configured handler, failures are logged.
pub fn exception_sink() -> &'static Facet<ExceptionHandler, Vec<ExceptionHandler>> {
    static FACET: LazyLock<Facet<ExceptionHandler, Vec<ExceptionHandler>>> =
        LazyLock::new(|| Facet::define(|v| v.to_vec()));
    &FACET
}

/// Tab stop distance used by column arithmetic; the highest-precedence
/// contribution wins, defaulting to 4.
pub fn tab_size() -> &'static Facet<usize, usize> {
    static FACET: LazyLock<Facet<usize, usize>> =
        LazyLock::new(|| Facet::define(|v| v.first().copied().unwrap_or(4)));
    &FACET
}

/// Extra word characters recognized by the character categorizer.
pub fn word_chars() -> &'static Facet<String, String> {
    static FACET: LazyLock<Facet<String, String>> =
        LazyLock::new(|| Facet::define(|v| v.concat()));
    &FACET
}

/// Verdict of a change filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilterResult {
    Allow,
    Block,
    /// Only changes falling entirely inside one of these (sorted) ranges of
    /// the starting document survive.
    Only(Vec<(usize, usize)>),
}

/// Inspects proposed changes before they are applied.
pub type ChangeFilterFn =
    Arc<dyn Fn(&EditorState, &ChangeSet) -> ChangeFilterResult + Send + Sync>;

pub fn change_filter() -> &'static Facet<ChangeFilterFn, Vec<ChangeFilterFn>> {
    static FACET: LazyLock<Facet<ChangeFilterFn, Vec<ChangeFilterFn>>> =
        LazyLock::new(|| Facet::define(|v| v.to_vec()));
    &FACET
}

/// Inspects a resolved transaction; returning specs replaces it and re-enters
/// resolution (bounded by [`TRANSACTION_FILTER_LIMIT`]).
pub type TransactionFilterFn =
    Arc<dyn Fn(&Transaction) -> Option<Vec<TransactionSpec>> + Send + Sync>;

pub fn transaction_filter() -> &'static Facet<TransactionFilterFn, Vec<TransactionFilterFn>> {
    static FACET: LazyLock<Facet<TransactionFilterFn, Vec<TransactionFilterFn>>> =
        LazyLock::new(|| Facet::define(|v| v.to_vec()));
    &FACET
}

// ---------------------------------------------------------------------------
// EditorState
// ---------------------------------------------------------------------------

/// The frozen editor state.
#[derive(Clone)]
pub struct EditorState {
    config: Arc<Configuration>,
    doc: Text,
    selection: Selection,
    values: Vec<DynValue>,
}

/// Construction parameters for an [`EditorState`].
pub struct EditorStateBuilder {
    doc: Text,
    selection: Option<Selection>,
    extensions: Vec<Extension>,
}

impl EditorState {
    pub fn builder() -> EditorStateBuilder {
        EditorStateBuilder {
            doc: Text::empty(),
            selection: None,
            extensions: Vec::new(),
        }
    }

    /// Convenience constructor for a state with a document and extensions.
    pub fn new(doc: Text, extensions: Vec<Extension>) -> Result<EditorState, StateError> {
        let mut b = Self::builder();
        b.doc = doc;
        b.extensions = extensions;
        b.build()
    }

    pub fn doc(&self) -> &Text {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Read a facet's combined value. An unconfigured facet yields the value
    /// its combine function produces from no inputs.
    pub fn facet<I, O>(&self, facet: &Facet<I, O>) -> Arc<O>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let raw = match self.config.address.get(&facet.id()) {
            None => facet.inner.default.clone(),
            Some(SlotAddr::Static(i)) => self.config.static_values[*i].clone(),
            Some(SlotAddr::Dynamic(i)) => match self.values[*i].clone().downcast::<FacetSlotValue>()
            {
                Ok(slot) => slot.output.clone(),
                Err(_) => facet.inner.default.clone(),
            },
        };
        raw.downcast::<O>()
            .expect("facet slot holds the declared output type")
    }

    /// Read a state field's value; `None` when the field is not part of this
    /// state's configuration.
    pub fn field<V: Send + Sync + 'static>(&self, field: &StateField<V>) -> Option<Arc<V>> {
        match self.config.address.get(&field.id())? {
            SlotAddr::Dynamic(i) => self.values[*i].clone().downcast::<V>().ok(),
            SlotAddr::Static(_) => None,
        }
    }

    /// The word classifier configured for this state.
    pub fn char_categorizer(&self) -> CharCategorizer {
        CharCategorizer::new(&self.facet(word_chars()))
    }

    /// Resolve transaction specs into a transaction and the state it
    /// produces. The specs are processed per the update pipeline: resolve and
    /// merge, run change filters, adopt or map the selection, run transaction
    /// filters (bounded re-entry), then recompute fields and dependent facets.
    pub fn update(
        &self,
        specs: Vec<TransactionSpec>,
    ) -> Result<(EditorState, Transaction), StateError> {
        let tr = self.resolve_transaction(specs, 0)?;
        let new_state = self.apply_transaction(&tr)?;
        tracing::trace!(
            changes = !tr.changes().is_empty(),
            effects = tr.effects().len(),
            "applied transaction"
        );
        Ok((new_state, tr))
    }

    fn resolve_transaction(
        &self,
        specs: Vec<TransactionSpec>,
        depth: usize,
    ) -> Result<Transaction, StateError> {
        if depth > TRANSACTION_FILTER_LIMIT {
            return Err(StateError::TransactionFilterOverflow {
                limit: TRANSACTION_FILTER_LIMIT,
            });
        }
        let mut resolved = transaction::resolve_specs(self, &specs)?;

        if resolved.filter {
            let filters = self.facet(change_filter());
            let mut verdict = ChangeFilterResult::Allow;
            for f in filters.iter() {
                match f(self, &resolved.changes) {
                    ChangeFilterResult::Allow => {}
                    ChangeFilterResult::Block => {
                        verdict = ChangeFilterResult::Block;
                        break;
                    }
                    ChangeFilterResult::Only(ranges) => {
                        verdict = match verdict {
                            ChangeFilterResult::Allow => ChangeFilterResult::Only(ranges),
                            ChangeFilterResult::Only(prev) => ChangeFilterResult::Only(
                                transaction::intersect_ranges(&prev, &ranges),
                            ),
                            ChangeFilterResult::Block => unreachable!("loop exits on block"),
                        };
                    }
                }
            }
            match verdict {
                ChangeFilterResult::Allow => {}
                ChangeFilterResult::Block => {
                    let back = resolved.changes.desc().inverted();
                    resolved.changes = ChangeSet::empty(self.doc.len());
                    resolved.selection = resolved.selection.map(|s| s.map(&back));
                    resolved.effects = StateEffect::map_all(&resolved.effects, &back);
                }
                ChangeFilterResult::Only(ranges) => {
                    let (kept, dropped) = resolved.changes.split_by_ranges(&ranges)?;
                    let back = dropped.map(kept.desc(), false)?.desc().inverted();
                    resolved.changes = kept;
                    resolved.selection = resolved.selection.map(|s| s.map(&back));
                    resolved.effects = StateEffect::map_all(&resolved.effects, &back);
                }
            }
        }

        let new_doc = resolved.changes.apply(&self.doc)?;
        let new_selection = match &resolved.selection {
            Some(sel) => {
                check_selection(sel, new_doc.len())?;
                sel.clone()
            }
            None => self.selection.map(resolved.changes.desc()),
        };
        let tr = Transaction {
            start_state: self.clone(),
            changes: resolved.changes,
            new_doc,
            explicit_selection: resolved.selection,
            new_selection,
            effects: resolved.effects,
            annotations: resolved.annotations,
            scroll_into_view: resolved.scroll_into_view,
        };

        if resolved.filter {
            for f in self.facet(transaction_filter()).iter() {
                if let Some(replacement) = f(&tr) {
                    return self.resolve_transaction(replacement, depth + 1);
                }
            }
        }
        Ok(tr)
    }

    fn apply_transaction(&self, tr: &Transaction) -> Result<EditorState, StateError> {
        let doc_changed = tr.doc_changed();
        let selection_changed = !tr.new_selection().eq_sel(&self.selection);
        let mut new_state = EditorState {
            config: self.config.clone(),
            doc: tr.new_doc().clone(),
            selection: tr.new_selection().clone(),
            values: self.values.clone(),
        };
        let mut changed = vec![false; self.config.slots.len()];
        for idx in 0..self.config.slots.len() {
            match &self.config.slots[idx] {
                Slot::Field { field, .. } => {
                    let old = new_state.values[idx].clone();
                    match (field.update)(&old, tr) {
                        Ok(value) => {
                            if !(field.compare)(&old, &value) {
                                new_state.values[idx] = value;
                                changed[idx] = true;
                            }
                        }
                        Err(err) => {
                            // The field keeps its previous value.
                            self.report_exception(&err);
                        }
                    }
                }
                Slot::Facet {
                    facet,
                    providers,
                    deps,
                } => {
                    let dep_changed = deps.iter().any(|dep| match dep {
                        ResolvedDep::Doc => doc_changed,
                        ResolvedDep::Selection => selection_changed,
                        ResolvedDep::Slot(SlotAddr::Static(_)) => false,
                        ResolvedDep::Slot(SlotAddr::Dynamic(i)) => changed[*i],
                    });
                    if !dep_changed {
                        continue;
                    }
                    let old = new_state.values[idx]
                        .clone()
                        .downcast::<FacetSlotValue>()
                        .expect("facet slot value");
                    let inputs: Vec<DynValue> = providers
                        .iter()
                        .flat_map(|p| p.inputs(&new_state))
                        .collect();
                    let same_inputs = inputs.len() == old.inputs.len()
                        && inputs
                            .iter()
                            .zip(&old.inputs)
                            .all(|(a, b)| (facet.compare_input)(a, b));
                    if same_inputs {
                        continue;
                    }
                    let output = (facet.combine)(&inputs);
                    if (facet.compare)(&output, &old.output) {
                        // Keep the previous output value for referential
                        // stability; remember the new inputs.
                        new_state.values[idx] = Arc::new(FacetSlotValue {
                            inputs,
                            output: old.output.clone(),
                        });
                    } else {
                        new_state.values[idx] = Arc::new(FacetSlotValue { inputs, output });
                        changed[idx] = true;
                    }
                }
            }
        }
        Ok(new_state)
    }

    /// Report a captured extension failure through the exception sink facet,
    /// falling back to the log when no handler is configured.
    pub(crate) fn report_exception(&self, err: &anyhow::Error) {
        let sinks = self.facet(exception_sink());
        if sinks.is_empty() {
            tracing::error!(error = %err, "captured extension failure");
        } else {
            for sink in sinks.iter() {
                sink(err);
            }
        }
    }
}

impl EditorStateBuilder {
    pub fn doc(mut self, doc: impl Into<Text>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn extension(mut self, ext: Extension) -> Self {
        self.extensions.push(ext);
        self
    }

    pub fn build(self) -> Result<EditorState, StateError> {
        let root: Extension = self.extensions.into();
        let config = Arc::new(Configuration::resolve(&root)?);
        let selection = match self.selection {
            Some(sel) => {
                check_selection(&sel, self.doc.len())?;
                sel
            }
            None => Selection::cursor(0, 0),
        };
        let mut state = EditorState {
            values: vec![uncomputed(); config.slots.len()],
            config,
            doc: self.doc,
            selection,
        };
        // Slots are in dependency order: fields first, then facets after
        // their inputs, so each computation sees its dependencies filled.
        for idx in 0..state.config.slots.len() {
            let value = match &state.config.slots[idx] {
                Slot::Field { create, .. } => create(&state),
                Slot::Facet {
                    facet, providers, ..
                } => {
                    let inputs: Vec<DynValue> =
                        providers.iter().flat_map(|p| p.inputs(&state)).collect();
                    let output = (facet.combine)(&inputs);
                    Arc::new(FacetSlotValue { inputs, output })
                }
            };
            state.values[idx] = value;
        }
        Ok(state)
    }
}

fn check_selection(selection: &Selection, len: usize) -> Result<(), StateError> {
    let max = selection.max_pos();
    if max > len {
        return Err(StateError::SelectionOutOfRange { pos: max, len });
    }
    Ok(())
}

//! Transactions: the single unit of state change.
//!
//! A transaction bundles document changes, an optional explicit selection,
//! typed effects, and typed annotations. Specs are merged left to right;
//! non-sequential specs all address the starting document and are rebased
//! onto one another, so a batch of specs behaves like simultaneous edits.

use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use core_text::Text;

use crate::EditorState;
use crate::StateError;
use crate::change::{Change, ChangeDesc, ChangeSet};
use crate::facet::DynValue;
use crate::selection::Selection;

fn next_id() -> u64 {
    crate::facet::next_registry_id()
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// A typed annotation tag. Annotations attach metadata to a transaction that
/// extensions read to distinguish causes; they do not affect the document.
pub struct AnnotationType<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AnnotationType<T> {
    fn clone(&self) -> Self {
        AnnotationType {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> AnnotationType<T> {
    pub fn define() -> AnnotationType<T> {
        AnnotationType {
            id: next_id(),
            _marker: PhantomData,
        }
    }

    pub fn of(&self, value: T) -> Annotation {
        Annotation {
            type_id: self.id,
            value: Arc::new(value),
        }
    }
}

/// A typed tag value attached to a transaction.
#[derive(Clone)]
pub struct Annotation {
    type_id: u64,
    value: DynValue,
}

impl Annotation {
    pub fn is<T: Send + Sync + 'static>(&self, ty: &AnnotationType<T>) -> bool {
        self.type_id == ty.id
    }

    pub fn value<T: Send + Sync + 'static>(&self, ty: &AnnotationType<T>) -> Option<Arc<T>> {
        if self.type_id == ty.id {
            self.value.clone().downcast::<T>().ok()
        } else {
            None
        }
    }
}

/// The annotation carrying a transaction's dotted user-event string
/// (`input.type`, `delete.cut`, `select.pointer`, …).
pub fn user_event_annotation() -> &'static AnnotationType<String> {
    static TYPE: LazyLock<AnnotationType<String>> = LazyLock::new(AnnotationType::define);
    &TYPE
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

type EffectMapFn = Arc<dyn Fn(&DynValue, &ChangeDesc) -> Option<DynValue> + Send + Sync>;

/// A typed effect kind. Effects are opaque payloads consumed by state fields;
/// fields match on the type identity and ignore unknown effects.
pub struct StateEffectType<T> {
    id: u64,
    map: EffectMapFn,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateEffectType<T> {
    fn clone(&self) -> Self {
        StateEffectType {
            id: self.id,
            map: self.map.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> StateEffectType<T> {
    /// An effect type whose values pass through document changes untouched.
    pub fn define() -> StateEffectType<T> {
        StateEffectType {
            id: next_id(),
            map: Arc::new(|value, _| Some(value.clone())),
            _marker: PhantomData,
        }
    }

    /// An effect type whose values are position-mapped through changes; a
    /// value mapping to `None` is dropped from the transaction.
    pub fn define_mapped(
        map: impl Fn(&T, &ChangeDesc) -> Option<T> + Send + Sync + 'static,
    ) -> StateEffectType<T> {
        StateEffectType {
            id: next_id(),
            map: Arc::new(move |value, changes| {
                let typed = value.downcast_ref::<T>()?;
                map(typed, changes).map(|v| Arc::new(v) as DynValue)
            }),
            _marker: PhantomData,
        }
    }

    pub fn of(&self, value: T) -> StateEffect {
        StateEffect {
            type_id: self.id,
            value: Arc::new(value),
            map: self.map.clone(),
        }
    }
}

/// A typed opaque payload carried by a transaction.
#[derive(Clone)]
pub struct StateEffect {
    type_id: u64,
    value: DynValue,
    map: EffectMapFn,
}

impl StateEffect {
    pub fn is<T: Send + Sync + 'static>(&self, ty: &StateEffectType<T>) -> bool {
        self.type_id == ty.id
    }

    pub fn value<T: Send + Sync + 'static>(&self, ty: &StateEffectType<T>) -> Option<Arc<T>> {
        if self.type_id == ty.id {
            self.value.clone().downcast::<T>().ok()
        } else {
            None
        }
    }

    /// Map the effect through document changes per its type's rule.
    pub fn map(&self, changes: &ChangeDesc) -> Option<StateEffect> {
        if changes.is_empty() {
            return Some(self.clone());
        }
        (self.map)(&self.value, changes).map(|value| StateEffect {
            type_id: self.type_id,
            value,
            map: self.map.clone(),
        })
    }

    pub(crate) fn map_all(effects: &[StateEffect], changes: &ChangeDesc) -> Vec<StateEffect> {
        effects.iter().filter_map(|e| e.map(changes)).collect()
    }
}

// ---------------------------------------------------------------------------
// Transaction specs
// ---------------------------------------------------------------------------

/// Change input accepted by a spec: a list of edits or a prebuilt set.
#[derive(Debug, Clone)]
pub enum ChangesArg {
    List(Vec<Change>),
    Set(ChangeSet),
}

impl From<Change> for ChangesArg {
    fn from(c: Change) -> Self {
        ChangesArg::List(vec![c])
    }
}

impl From<Vec<Change>> for ChangesArg {
    fn from(list: Vec<Change>) -> Self {
        ChangesArg::List(list)
    }
}

impl From<ChangeSet> for ChangesArg {
    fn from(set: ChangeSet) -> Self {
        ChangesArg::Set(set)
    }
}

/// Everything a caller may ask of a single state update.
#[derive(Clone)]
pub struct TransactionSpec {
    pub changes: Option<ChangesArg>,
    pub selection: Option<Selection>,
    pub effects: Vec<StateEffect>,
    pub annotations: Vec<Annotation>,
    /// Dotted user-event tag; shorthand for a [`user_event_annotation`].
    pub user_event: Option<String>,
    pub scroll_into_view: bool,
    /// When false the change and transaction filters are bypassed.
    pub filter: bool,
    /// When true this spec's changes address the previous spec's output
    /// document instead of the starting document.
    pub sequential: bool,
}

impl Default for TransactionSpec {
    fn default() -> Self {
        TransactionSpec {
            changes: None,
            selection: None,
            effects: Vec::new(),
            annotations: Vec::new(),
            user_event: None,
            scroll_into_view: false,
            filter: true,
            sequential: false,
        }
    }
}

impl TransactionSpec {
    pub fn change(change: Change) -> TransactionSpec {
        TransactionSpec {
            changes: Some(change.into()),
            ..Default::default()
        }
    }

    pub fn changes(changes: impl Into<ChangesArg>) -> TransactionSpec {
        TransactionSpec {
            changes: Some(changes.into()),
            ..Default::default()
        }
    }

    pub fn selection(selection: Selection) -> TransactionSpec {
        TransactionSpec {
            selection: Some(selection),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A resolved, frozen state update.
pub struct Transaction {
    pub(crate) start_state: EditorState,
    pub(crate) changes: ChangeSet,
    pub(crate) new_doc: Text,
    pub(crate) explicit_selection: Option<Selection>,
    pub(crate) new_selection: Selection,
    pub(crate) effects: Vec<StateEffect>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) scroll_into_view: bool,
}

impl Transaction {
    pub fn start_state(&self) -> &EditorState {
        &self.start_state
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// The document this transaction produces.
    pub fn new_doc(&self) -> &Text {
        &self.new_doc
    }

    /// The selection of the new state: the spec's explicit selection, or the
    /// previous selection mapped through the changes.
    pub fn new_selection(&self) -> &Selection {
        &self.new_selection
    }

    /// The selection explicitly requested by the specs, if any.
    pub fn explicit_selection(&self) -> Option<&Selection> {
        self.explicit_selection.as_ref()
    }

    pub fn effects(&self) -> &[StateEffect] {
        &self.effects
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn scroll_into_view(&self) -> bool {
        self.scroll_into_view
    }

    pub fn doc_changed(&self) -> bool {
        !self.changes.is_empty()
    }

    /// The last value attached for an annotation type.
    pub fn annotation<T: Send + Sync + 'static>(&self, ty: &AnnotationType<T>) -> Option<Arc<T>> {
        self.annotations.iter().rev().find_map(|a| a.value(ty))
    }

    /// The transaction's dotted user-event tag, if any.
    pub fn user_event(&self) -> Option<Arc<String>> {
        self.annotation(user_event_annotation())
    }

    /// Whether the user event matches `prefix` dot-segment-wise:
    /// `"input"` matches `"input.type"` but not `"inputs"`.
    pub fn is_user_event(&self, prefix: &str) -> bool {
        match self.user_event() {
            None => false,
            Some(event) => {
                event.as_str() == prefix
                    || (event.starts_with(prefix) && event.as_bytes().get(prefix.len()) == Some(&b'.'))
            }
        }
    }

    /// Re-express this transaction as a spec (used by transaction filters to
    /// extend or wrap it).
    pub fn as_spec(&self) -> TransactionSpec {
        TransactionSpec {
            changes: Some(self.changes.clone().into()),
            selection: self.explicit_selection.clone(),
            effects: self.effects.clone(),
            annotations: self.annotations.clone(),
            user_event: None,
            scroll_into_view: self.scroll_into_view,
            filter: true,
            sequential: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Spec resolution
// ---------------------------------------------------------------------------

/// Merged form of one or more specs, before filtering.
pub(crate) struct ResolvedSpecs {
    pub changes: ChangeSet,
    pub selection: Option<Selection>,
    pub effects: Vec<StateEffect>,
    pub annotations: Vec<Annotation>,
    pub scroll_into_view: bool,
    pub filter: bool,
}

pub(crate) fn resolve_specs(
    state: &EditorState,
    specs: &[TransactionSpec],
) -> Result<ResolvedSpecs, StateError> {
    let doc_len = state.doc().len();
    let mut acc: Option<ResolvedSpecs> = None;
    for spec in specs {
        let base_len = match (&acc, spec.sequential) {
            (Some(prev), true) => prev.changes.new_len(),
            _ => doc_len,
        };
        let changes = match &spec.changes {
            None => ChangeSet::empty(base_len),
            Some(ChangesArg::List(list)) => ChangeSet::of(list.clone(), base_len)?,
            Some(ChangesArg::Set(set)) => {
                if set.len() != base_len {
                    return Err(StateError::Change(
                        crate::change::ChangeError::LengthMismatch {
                            expected: base_len,
                            actual: set.len(),
                        },
                    ));
                }
                set.clone()
            }
        };
        let mut annotations = spec.annotations.clone();
        if let Some(event) = &spec.user_event {
            annotations.push(user_event_annotation().of(event.clone()));
        }
        let this = ResolvedSpecs {
            changes,
            selection: spec.selection.clone(),
            effects: spec.effects.clone(),
            annotations,
            scroll_into_view: spec.scroll_into_view,
            filter: spec.filter,
        };
        acc = Some(match acc {
            None => this,
            Some(prev) => merge_specs(prev, this, spec.sequential)?,
        });
    }
    Ok(acc.unwrap_or_else(|| ResolvedSpecs {
        changes: ChangeSet::empty(doc_len),
        selection: None,
        effects: Vec::new(),
        annotations: Vec::new(),
        scroll_into_view: false,
        filter: true,
    }))
}

fn merge_specs(
    a: ResolvedSpecs,
    b: ResolvedSpecs,
    sequential: bool,
) -> Result<ResolvedSpecs, StateError> {
    let (map_for_a, map_for_b, changes) = if sequential {
        let map_for_a = b.changes.desc().clone();
        let map_for_b = ChangeSet::empty(b.changes.new_len()).desc().clone();
        let changes = a.changes.compose(&b.changes)?;
        (map_for_a, map_for_b, changes)
    } else {
        let mapped_b = b.changes.map(a.changes.desc(), false)?;
        let map_for_b = a.changes.desc().map_desc(b.changes.desc(), true)?;
        let changes = a.changes.compose(&mapped_b)?;
        (mapped_b.desc().clone(), map_for_b, changes)
    };
    let selection = match (&b.selection, &a.selection) {
        (Some(sel), _) => Some(sel.map(&map_for_b)),
        (None, Some(sel)) => Some(sel.map(&map_for_a)),
        (None, None) => None,
    };
    let mut effects = StateEffect::map_all(&a.effects, &map_for_a);
    effects.extend(StateEffect::map_all(&b.effects, &map_for_b));
    let mut annotations = a.annotations;
    annotations.extend(b.annotations);
    Ok(ResolvedSpecs {
        changes,
        selection,
        effects,
        annotations,
        scroll_into_view: a.scroll_into_view || b.scroll_into_view,
        filter: a.filter && b.filter,
    })
}

/// Keep only the regions of `permitted` also allowed by `extra` (both sorted).
pub(crate) fn intersect_ranges(
    permitted: &[(usize, usize)],
    extra: &[(usize, usize)],
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut j = 0;
    for &(from_a, to_a) in permitted {
        while j < extra.len() && extra[j].1 < from_a {
            j += 1;
        }
        let mut k = j;
        while k < extra.len() && extra[k].0 <= to_a {
            let from = from_a.max(extra[k].0);
            let to = to_a.min(extra[k].1);
            if from <= to {
                out.push((from, to));
            }
            k += 1;
        }
    }
    out
}

/// Downcast helper used by the typed effect accessors in field updaters.
pub fn effect_values<T: Send + Sync + 'static>(
    effects: &[StateEffect],
    ty: &StateEffectType<T>,
) -> Vec<Arc<T>> {
    effects.iter().filter_map(|e| e.value(ty)).collect()
}

#[allow(dead_code)]
fn assert_traits() {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<Annotation>();
    is_send_sync::<StateEffect>();
    is_send_sync::<TransactionSpec>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_are_typed() {
        let ty: AnnotationType<u32> = AnnotationType::define();
        let other: AnnotationType<u32> = AnnotationType::define();
        let a = ty.of(42);
        assert!(a.is(&ty));
        assert!(!a.is(&other));
        assert_eq!(a.value(&ty).as_deref(), Some(&42));
        assert_eq!(a.value(&other), None);
    }

    #[test]
    fn mapped_effects_follow_positions() {
        let ty: StateEffectType<usize> =
            StateEffectType::define_mapped(|pos, changes| Some(changes.map_pos(*pos, 1)));
        let effect = ty.of(5);
        let cs = ChangeSet::of(vec![Change::insert(2, "ab")], 8).unwrap();
        let mapped = effect.map(cs.desc()).unwrap();
        assert_eq!(mapped.value(&ty).as_deref(), Some(&7));
    }

    #[test]
    fn dropped_effects_disappear() {
        let ty: StateEffectType<usize> = StateEffectType::define_mapped(|_, _| None);
        let effect = ty.of(5);
        let cs = ChangeSet::of(vec![Change::insert(0, "x")], 4).unwrap();
        assert!(effect.map(cs.desc()).is_none());
    }

    #[test]
    fn intersect_ranges_overlaps() {
        assert_eq!(
            intersect_ranges(&[(0, 10)], &[(2, 4), (8, 12)]),
            vec![(2, 4), (8, 10)]
        );
        assert_eq!(intersect_ranges(&[(0, 2)], &[(3, 4)]), Vec::new());
    }
}

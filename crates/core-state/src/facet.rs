//! Facets, state fields, and the extension configuration resolver.
//!
//! A facet is a typed value slot whose content is combined from the
//! contributions of every active extension; a state field is a typed slot
//! updated once per transaction. Both are identified by process-wide interned
//! ids minted at definition time and never reused. Values are stored
//! type-erased (`Arc<dyn Any>`) in the state's slot table and downcast at the
//! typed access points.
//!
//! Resolution flattens the extension tree into precedence buckets (highest
//! first, declaration order within a bucket), groups providers per facet, and
//! orders the dynamic slots topologically over their declared dependencies.
//! Fields come first in declaration order; facet slots follow their inputs.
//! A dependency cycle between facets is a configuration error.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::transaction::Transaction;
use crate::{EditorState, StateError};

pub(crate) type DynValue = Arc<dyn Any + Send + Sync>;

/// Mint a process-wide unique id for a facet, field, effect type, or
/// annotation type. Ids are created at definition time and never reused.
pub(crate) fn next_registry_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Placeholder stored in slots that have not been computed yet.
pub(crate) struct Uncomputed;

pub(crate) fn uncomputed() -> DynValue {
    Arc::new(Uncomputed)
}

/// A declared input of a dynamic facet provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dep {
    Doc,
    Selection,
    Facet(u64),
    Field(u64),
}

/// Extension precedence tags; higher buckets contribute earlier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    Highest,
    High,
    #[default]
    Default,
    Low,
    Lowest,
}

impl Prec {
    pub fn of(self, ext: impl Into<Extension>) -> Extension {
        Extension {
            inner: ExtInner::Prec(self, Arc::new(ext.into())),
        }
    }
}

/// A node in the extension tree handed to the state constructor.
#[derive(Clone)]
pub struct Extension {
    pub(crate) inner: ExtInner,
}

#[derive(Clone)]
pub(crate) enum ExtInner {
    Provider(Arc<Provider>),
    Field(Arc<FieldInner>, Option<CreateFn>),
    Prec(Prec, Arc<Extension>),
    Group(Arc<[Extension]>),
}

impl From<Vec<Extension>> for Extension {
    fn from(list: Vec<Extension>) -> Extension {
        Extension {
            inner: ExtInner::Group(list.into()),
        }
    }
}

pub(crate) type CreateFn = Arc<dyn Fn(&EditorState) -> DynValue + Send + Sync>;
type GetOneFn = Box<dyn Fn(&EditorState) -> DynValue + Send + Sync>;
type GetManyFn = Box<dyn Fn(&EditorState) -> Vec<DynValue> + Send + Sync>;

pub(crate) struct Provider {
    pub facet: Arc<FacetInner>,
    pub kind: ProviderKind,
}

pub(crate) enum ProviderKind {
    Static(DynValue),
    Dynamic { deps: Vec<Dep>, get: ProviderGet },
}

pub(crate) enum ProviderGet {
    One(GetOneFn),
    Many(GetManyFn),
}

pub(crate) struct FacetInner {
    pub id: u64,
    pub combine: Box<dyn Fn(&[DynValue]) -> DynValue + Send + Sync>,
    pub compare: Box<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync>,
    pub compare_input: Box<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync>,
    pub default: DynValue,
}

/// A typed facet handle. `I` is the input contributed by providers, `O` the
/// combined output read from the state.
pub struct Facet<I, O> {
    pub(crate) inner: Arc<FacetInner>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for Facet<I, O> {
    fn clone(&self) -> Self {
        Facet {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

/// Definition parameters for [`Facet::define_full`].
pub struct FacetSpec<I, O> {
    pub combine: Box<dyn Fn(&[I]) -> O + Send + Sync>,
    /// Output equality; when absent every recombination counts as a change.
    pub compare: Option<Box<dyn Fn(&O, &O) -> bool + Send + Sync>>,
    /// Input equality used to skip recombination entirely.
    pub compare_input: Option<Box<dyn Fn(&I, &I) -> bool + Send + Sync>>,
}

impl<I, O> Facet<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn define(combine: impl Fn(&[I]) -> O + Send + Sync + 'static) -> Facet<I, O> {
        Self::define_full(FacetSpec {
            combine: Box::new(combine),
            compare: None,
            compare_input: None,
        })
    }

    pub fn define_full(spec: FacetSpec<I, O>) -> Facet<I, O> {
        let user_combine = spec.combine;
        let combine = Box::new(move |values: &[DynValue]| -> DynValue {
            let typed: Vec<I> = values
                .iter()
                .map(|v| {
                    v.downcast_ref::<I>()
                        .expect("facet input value has the declared type")
                        .clone()
                })
                .collect();
            Arc::new(user_combine(&typed)) as DynValue
        });
        let compare: Box<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync> = match spec.compare {
            Some(f) => Box::new(move |a, b| {
                match (a.downcast_ref::<O>(), b.downcast_ref::<O>()) {
                    (Some(a), Some(b)) => f(a, b),
                    _ => false,
                }
            }),
            None => Box::new(|_, _| false),
        };
        let compare_input: Box<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync> =
            match spec.compare_input {
                Some(f) => Box::new(move |a, b| {
                    match (a.downcast_ref::<I>(), b.downcast_ref::<I>()) {
                        (Some(a), Some(b)) => f(a, b),
                        _ => false,
                    }
                }),
                None => Box::new(|_, _| false),
            };
        let default = combine(&[]);
        Facet {
            inner: Arc::new(FacetInner {
                id: next_registry_id(),
                combine,
                compare,
                compare_input,
                default,
            }),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// This facet as a dependency of another facet's computation.
    pub fn dep(&self) -> Dep {
        Dep::Facet(self.inner.id)
    }

    /// Contribute a fixed input value.
    pub fn of(&self, value: I) -> Extension {
        Extension {
            inner: ExtInner::Provider(Arc::new(Provider {
                facet: self.inner.clone(),
                kind: ProviderKind::Static(Arc::new(value)),
            })),
        }
    }

    /// Contribute a value computed from the state; `deps` must name every
    /// slot the computation reads.
    pub fn compute(
        &self,
        deps: Vec<Dep>,
        get: impl Fn(&EditorState) -> I + Send + Sync + 'static,
    ) -> Extension {
        Extension {
            inner: ExtInner::Provider(Arc::new(Provider {
                facet: self.inner.clone(),
                kind: ProviderKind::Dynamic {
                    deps,
                    get: ProviderGet::One(Box::new(move |state| Arc::new(get(state)) as DynValue)),
                },
            })),
        }
    }

    /// Contribute zero or more computed values.
    pub fn compute_n(
        &self,
        deps: Vec<Dep>,
        get: impl Fn(&EditorState) -> Vec<I> + Send + Sync + 'static,
    ) -> Extension {
        Extension {
            inner: ExtInner::Provider(Arc::new(Provider {
                facet: self.inner.clone(),
                kind: ProviderKind::Dynamic {
                    deps,
                    get: ProviderGet::Many(Box::new(move |state| {
                        get(state)
                            .into_iter()
                            .map(|v| Arc::new(v) as DynValue)
                            .collect()
                    })),
                },
            })),
        }
    }

    /// Contribute a value derived from a state field.
    pub fn from_field<T: Send + Sync + 'static>(
        &self,
        field: &StateField<T>,
        get: impl Fn(&T) -> I + Send + Sync + 'static,
    ) -> Extension {
        let handle = field.clone();
        self.compute(vec![field.dep()], move |state| {
            let value = state
                .field(&handle)
                .expect("provider's backing field is part of the configuration");
            get(value.as_ref())
        })
    }
}

pub(crate) struct FieldInner {
    pub id: u64,
    pub create: CreateFn,
    pub update: Box<dyn Fn(&DynValue, &Transaction) -> anyhow::Result<DynValue> + Send + Sync>,
    pub compare: Box<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync>,
    pub provides: OnceLock<Extension>,
}

/// A typed state field handle.
pub struct StateField<V> {
    pub(crate) inner: Arc<FieldInner>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for StateField<V> {
    fn clone(&self) -> Self {
        StateField {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

/// Definition parameters for [`StateField::define`].
pub struct FieldSpec<V> {
    pub create: Box<dyn Fn(&EditorState) -> V + Send + Sync>,
    /// Per-transaction update. A returned error is captured: the field keeps
    /// its previous value and the error goes to the exception sink facet.
    pub update: Box<dyn Fn(&V, &Transaction) -> anyhow::Result<V> + Send + Sync>,
    pub compare: Option<Box<dyn Fn(&V, &V) -> bool + Send + Sync>>,
}

impl<V: Send + Sync + 'static> StateField<V> {
    pub fn define(spec: FieldSpec<V>) -> StateField<V> {
        let user_create = spec.create;
        let user_update = spec.update;
        let compare: Box<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync> = match spec.compare {
            Some(f) => Box::new(move |a, b| {
                match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
                    (Some(a), Some(b)) => f(a, b),
                    _ => false,
                }
            }),
            None => Box::new(|_, _| false),
        };
        StateField {
            inner: Arc::new(FieldInner {
                id: next_registry_id(),
                create: Arc::new(move |state| Arc::new(user_create(state)) as DynValue),
                update: Box::new(move |value, tr| {
                    let typed = value
                        .downcast_ref::<V>()
                        .expect("field value has the declared type");
                    Ok(Arc::new(user_update(typed, tr)?) as DynValue)
                }),
                compare,
                provides: OnceLock::new(),
            }),
            _marker: PhantomData,
        }
    }

    /// Define a field that also contributes facet inputs (typically through
    /// [`Facet::from_field`]).
    pub fn define_with_provider(
        spec: FieldSpec<V>,
        provide: impl FnOnce(&StateField<V>) -> Extension,
    ) -> StateField<V> {
        let field = Self::define(spec);
        let ext = provide(&field);
        let _ = field.inner.provides.set(ext);
        field
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn dep(&self) -> Dep {
        Dep::Field(self.inner.id)
    }

    /// The extension enabling this field.
    pub fn extension(&self) -> Extension {
        Extension {
            inner: ExtInner::Field(self.inner.clone(), None),
        }
    }

    /// Enable the field with a different initial value.
    pub fn init(&self, create: impl Fn(&EditorState) -> V + Send + Sync + 'static) -> Extension {
        Extension {
            inner: ExtInner::Field(
                self.inner.clone(),
                Some(Arc::new(move |state: &EditorState| {
                    Arc::new(create(state)) as DynValue
                })),
            ),
        }
    }
}

impl<V> From<&StateField<V>> for Extension {
    fn from(field: &StateField<V>) -> Extension {
        Extension {
            inner: ExtInner::Field(field.inner.clone(), None),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotAddr {
    Static(usize),
    Dynamic(usize),
}

pub(crate) enum ResolvedDep {
    Doc,
    Selection,
    Slot(SlotAddr),
}

pub(crate) enum Slot {
    Field {
        field: Arc<FieldInner>,
        create: CreateFn,
    },
    Facet {
        facet: Arc<FacetInner>,
        providers: Vec<Arc<Provider>>,
        deps: Vec<ResolvedDep>,
    },
}

pub(crate) struct Configuration {
    pub address: HashMap<u64, SlotAddr>,
    pub static_values: Vec<DynValue>,
    pub slots: Vec<Slot>,
}

/// Stored value of a facet slot: the provider inputs it combined plus the
/// combined output, kept together so updates can compare inputs first.
pub(crate) struct FacetSlotValue {
    pub inputs: Vec<DynValue>,
    pub output: DynValue,
}

enum Unit {
    Provider(Arc<Provider>),
    Field(Arc<FieldInner>, CreateFn),
}

impl Configuration {
    pub fn resolve(root: &Extension) -> Result<Configuration, StateError> {
        // Flatten into precedence buckets, dropping duplicate instances.
        let mut buckets: [Vec<Unit>; 5] = Default::default();
        let mut seen_providers: HashSet<*const Provider> = HashSet::new();
        let mut seen_fields: HashSet<u64> = HashSet::new();
        flatten(
            root,
            Prec::Default,
            &mut buckets,
            &mut seen_providers,
            &mut seen_fields,
        );
        let flat: Vec<Unit> = buckets.into_iter().flatten().collect();

        // Group: fields in declaration order, providers per facet.
        let mut fields: Vec<(Arc<FieldInner>, CreateFn)> = Vec::new();
        let mut facet_order: Vec<u64> = Vec::new();
        let mut facet_providers: HashMap<u64, (Arc<FacetInner>, Vec<Arc<Provider>>)> =
            HashMap::new();
        for unit in flat {
            match unit {
                Unit::Field(field, create) => fields.push((field, create)),
                Unit::Provider(p) => {
                    let id = p.facet.id;
                    facet_providers
                        .entry(id)
                        .or_insert_with(|| {
                            facet_order.push(id);
                            (p.facet.clone(), Vec::new())
                        })
                        .1
                        .push(p);
                }
            }
        }

        // Static facets resolve immediately; the rest become dynamic nodes.
        let mut static_values: Vec<DynValue> = Vec::new();
        let mut address: HashMap<u64, SlotAddr> = HashMap::new();
        struct FacetNode {
            facet: Arc<FacetInner>,
            providers: Vec<Arc<Provider>>,
            deps: Vec<Dep>,
        }
        let mut facet_nodes: Vec<FacetNode> = Vec::new();
        for id in facet_order {
            let (facet, providers) = facet_providers
                .remove(&id)
                .expect("grouped providers present");
            let all_static = providers
                .iter()
                .all(|p| matches!(p.kind, ProviderKind::Static(_)));
            if all_static {
                let inputs: Vec<DynValue> = providers
                    .iter()
                    .map(|p| match &p.kind {
                        ProviderKind::Static(v) => v.clone(),
                        ProviderKind::Dynamic { .. } => unreachable!(),
                    })
                    .collect();
                let combined = (facet.combine)(&inputs);
                address.insert(id, SlotAddr::Static(static_values.len()));
                static_values.push(combined);
            } else {
                let mut deps = Vec::new();
                for p in &providers {
                    if let ProviderKind::Dynamic { deps: d, .. } = &p.kind {
                        for dep in d {
                            if !deps.contains(dep) {
                                deps.push(*dep);
                            }
                        }
                    }
                }
                facet_nodes.push(FacetNode {
                    facet,
                    providers,
                    deps,
                });
            }
        }

        // Topological order over facet→facet dependencies; fields always come
        // first and never depend on other slots.
        let index_of: HashMap<u64, usize> = facet_nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.facet.id, i))
            .collect();
        let mut order: Vec<usize> = Vec::with_capacity(facet_nodes.len());
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut mark = vec![0u8; facet_nodes.len()];
        fn visit(
            i: usize,
            nodes: &[FacetNode],
            index_of: &HashMap<u64, usize>,
            mark: &mut [u8],
            order: &mut Vec<usize>,
        ) -> Result<(), StateError> {
            match mark[i] {
                2 => return Ok(()),
                1 => return Err(StateError::FacetCycle),
                _ => {}
            }
            mark[i] = 1;
            for dep in &nodes[i].deps {
                if let Dep::Facet(id) = dep
                    && let Some(&j) = index_of.get(id)
                {
                    visit(j, nodes, index_of, mark, order)?;
                }
            }
            mark[i] = 2;
            order.push(i);
            Ok(())
        }
        for i in 0..facet_nodes.len() {
            visit(i, &facet_nodes, &index_of, &mut mark, &mut order)?;
        }

        // Build the final slot table: fields, then facets in topo order.
        let mut slots: Vec<Slot> = Vec::new();
        for (field, create) in &fields {
            address.insert(field.id, SlotAddr::Dynamic(slots.len()));
            slots.push(Slot::Field {
                field: field.clone(),
                create: create.clone(),
            });
        }
        // Two passes: addresses first (so deps between facets resolve), then
        // the slots themselves.
        let field_count = slots.len();
        for (rank, &i) in order.iter().enumerate() {
            address.insert(facet_nodes[i].facet.id, SlotAddr::Dynamic(field_count + rank));
        }
        for &i in &order {
            let node = &facet_nodes[i];
            let deps = node
                .deps
                .iter()
                .filter_map(|dep| match dep {
                    Dep::Doc => Some(ResolvedDep::Doc),
                    Dep::Selection => Some(ResolvedDep::Selection),
                    Dep::Facet(id) | Dep::Field(id) => {
                        // Dependencies on unconfigured slots never change.
                        address.get(id).map(|addr| ResolvedDep::Slot(*addr))
                    }
                })
                .collect();
            slots.push(Slot::Facet {
                facet: node.facet.clone(),
                providers: node.providers.clone(),
                deps,
            });
        }

        tracing::debug!(
            slots = slots.len(),
            static_values = static_values.len(),
            "resolved state configuration"
        );
        Ok(Configuration {
            address,
            static_values,
            slots,
        })
    }
}

fn flatten(
    ext: &Extension,
    prec: Prec,
    buckets: &mut [Vec<Unit>; 5],
    seen_providers: &mut HashSet<*const Provider>,
    seen_fields: &mut HashSet<u64>,
) {
    match &ext.inner {
        ExtInner::Provider(p) => {
            if seen_providers.insert(Arc::as_ptr(p)) {
                buckets[prec as usize].push(Unit::Provider(p.clone()));
            }
        }
        ExtInner::Field(field, create_override) => {
            if seen_fields.insert(field.id) {
                let create = create_override.clone().unwrap_or_else(|| field.create.clone());
                buckets[prec as usize].push(Unit::Field(field.clone(), create));
                if let Some(provides) = field.provides.get() {
                    let provides = provides.clone();
                    flatten(&provides, prec, buckets, seen_providers, seen_fields);
                }
            }
        }
        // The innermost precedence wrapper wins.
        ExtInner::Prec(p, inner) => flatten(inner, *p, buckets, seen_providers, seen_fields),
        ExtInner::Group(items) => {
            for item in items.iter() {
                flatten(item, prec, buckets, seen_providers, seen_fields);
            }
        }
    }
}

impl Provider {
    /// Current input contributions of this provider.
    pub(crate) fn inputs(&self, state: &EditorState) -> Vec<DynValue> {
        match &self.kind {
            ProviderKind::Static(v) => vec![v.clone()],
            ProviderKind::Dynamic { get, .. } => match get {
                ProviderGet::One(f) => vec![f(state)],
                ProviderGet::Many(f) => f(state),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prec_orders_before_declaration_order() {
        let facet: Facet<u32, Vec<u32>> = Facet::define(|v| v.to_vec());
        let exts: Extension = vec![
            facet.of(1),
            Prec::High.of(facet.of(2)),
            facet.of(3),
            Prec::Lowest.of(facet.of(4)),
        ]
        .into();
        let state = crate::EditorState::builder()
            .extension(exts)
            .build()
            .unwrap();
        assert_eq!(*state.facet(&facet), vec![2, 1, 3, 4]);
    }

    #[test]
    fn duplicate_extension_instances_count_once() {
        let facet: Facet<u32, Vec<u32>> = Facet::define(|v| v.to_vec());
        let one = facet.of(1);
        let exts: Extension = vec![one.clone(), one.clone(), facet.of(2)].into();
        let state = crate::EditorState::builder()
            .extension(exts)
            .build()
            .unwrap();
        assert_eq!(*state.facet(&facet), vec![1, 2]);
    }

    #[test]
    fn unconfigured_facet_reads_its_default() {
        let facet: Facet<u32, u32> = Facet::define(|v| v.iter().sum());
        let state = crate::EditorState::builder().build().unwrap();
        assert_eq!(*state.facet(&facet), 0);
    }

    #[test]
    fn cyclic_facet_computation_is_rejected() {
        let a: Facet<u32, u32> = Facet::define(|v| v.iter().sum());
        let b: Facet<u32, u32> = Facet::define(|v| v.iter().sum());
        let a2 = a.clone();
        let b2 = b.clone();
        let ext_a = a.compute(vec![b.dep()], move |state| *state.facet(&b2) + 1);
        let ext_b = b.compute(vec![a.dep()], move |state| *state.facet(&a2) + 1);
        let result = crate::EditorState::builder()
            .extension(vec![ext_a, ext_b].into())
            .build();
        assert!(matches!(result, Err(StateError::FacetCycle)));
    }
}

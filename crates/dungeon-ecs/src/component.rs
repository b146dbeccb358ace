//! Component typing and filter sets.
//!
//! A component is any `'static` type implementing the [`Component`] marker.
//! Storage and matching never look at component *values*: both are keyed by a
//! [`ComponentType`], a lightweight token wrapping the Rust [`TypeId`] plus the
//! type name for diagnostics. A [`ComponentSet`] is an unordered set of those
//! tokens and is what a System declares as its filter.

use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker trait for data attached to an [`Entity`](crate::entity::Entity).
///
/// An entity carries at most one component per concrete type.
pub trait Component: Any + Send + Sync {}

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// Identity token of a component type.
///
/// Equality, hashing and ordering use the [`TypeId`] only; the name is carried
/// along for log and error messages.
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// Token for component type `T`.
    #[inline]
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying Rust type id.
    #[inline]
    pub fn type_id(self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, e.g. `my_game::Position`.
    #[inline]
    pub fn name(self) -> &'static str {
        self.name
    }

    /// Type name without its module path. Generic arguments are kept as
    /// written, e.g. `Wrapper<my_game::Hp>`.
    pub fn short_name(self) -> &'static str {
        let path_end = self.name.find('<').unwrap_or(self.name.len());
        let start = self.name[..path_end].rfind("::").map_or(0, |i| i + 2);
        &self.name[start..]
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.short_name())
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ---------------------------------------------------------------------------
// ComponentTuple -- compile-time lists of component types
// ---------------------------------------------------------------------------

/// A tuple of component types, used to build a [`ComponentSet`] in one call:
/// `ComponentSet::of::<(Position, Velocity)>()`.
pub trait ComponentTuple {
    /// Append every type of the tuple to `out`.
    fn collect_types(out: &mut Vec<ComponentType>);
}

impl ComponentTuple for () {
    fn collect_types(_out: &mut Vec<ComponentType>) {}
}

macro_rules! impl_component_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentTuple for ($($name,)+) {
            fn collect_types(out: &mut Vec<ComponentType>) {
                $(out.push(ComponentType::of::<$name>());)+
            }
        }
    };
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);
impl_component_tuple!(A, B, C, D, E);
impl_component_tuple!(A, B, C, D, E, F);
impl_component_tuple!(A, B, C, D, E, F, G);
impl_component_tuple!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// An unordered set of component types.
///
/// The empty set is a valid filter and matches every entity.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ComponentSet {
    types: BTreeSet<ComponentType>,
}

impl ComponentSet {
    /// The empty set (matches everything when used as a filter).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set containing every type of the tuple `T`.
    pub fn of<T: ComponentTuple>() -> Self {
        let mut types = Vec::new();
        T::collect_types(&mut types);
        types.into_iter().collect()
    }

    /// Builder-style insertion of type `T`.
    pub fn with<T: Component>(mut self) -> Self {
        self.types.insert(ComponentType::of::<T>());
        self
    }

    /// Insert a type token. Returns `false` if it was already present.
    pub fn insert(&mut self, ty: ComponentType) -> bool {
        self.types.insert(ty)
    }

    /// Remove a type token. Returns `true` if it was present.
    pub fn remove(&mut self, ty: ComponentType) -> bool {
        self.types.remove(&ty)
    }

    pub fn contains(&self, ty: ComponentType) -> bool {
        self.types.contains(&ty)
    }

    /// `true` if every type in `self` is also in `other`.
    pub fn is_subset(&self, other: &ComponentSet) -> bool {
        self.types.is_subset(&other.types)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.types.iter().copied()
    }
}

impl FromIterator<ComponentType> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentType>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}

impl Extend<ComponentType> for ComponentSet {
    fn extend<I: IntoIterator<Item = ComponentType>>(&mut self, iter: I) {
        self.types.extend(iter);
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.types.iter()).finish()
    }
}

impl fmt::Display for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, ty) in self.types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Pos;
    impl Component for Pos {}

    struct Vel;
    impl Component for Vel {}

    struct Hp;
    impl Component for Hp {}

    #[test]
    fn same_type_same_token() {
        assert_eq!(ComponentType::of::<Pos>(), ComponentType::of::<Pos>());
        assert_ne!(ComponentType::of::<Pos>(), ComponentType::of::<Vel>());
    }

    struct Tagged<T>(T);
    impl<T: Send + Sync + 'static> Component for Tagged<T> {}

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(ComponentType::of::<Pos>().short_name(), "Pos");

        let generic = ComponentType::of::<Tagged<Pos>>().short_name();
        assert!(generic.starts_with("Tagged<"), "{generic}");
        assert!(generic.ends_with("::Pos>"), "{generic}");
        assert!(ComponentType::of::<Pos>().name().ends_with("::Pos"));
    }

    #[test]
    fn set_of_tuple_collects_all_types() {
        let set = ComponentSet::of::<(Pos, Vel)>();
        assert_eq!(set.len(), 2);
        assert!(set.contains(ComponentType::of::<Pos>()));
        assert!(set.contains(ComponentType::of::<Vel>()));
        assert!(!set.contains(ComponentType::of::<Hp>()));
    }

    #[test]
    fn set_order_is_irrelevant() {
        assert_eq!(
            ComponentSet::of::<(Pos, Vel)>(),
            ComponentSet::of::<(Vel, Pos)>()
        );
        assert_eq!(
            ComponentSet::empty().with::<Vel>().with::<Pos>(),
            ComponentSet::of::<(Pos, Vel)>()
        );
    }

    #[test]
    fn duplicate_types_collapse() {
        let set = ComponentSet::of::<(Pos, Pos)>();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn subset_semantics() {
        let small = ComponentSet::of::<(Pos,)>();
        let big = ComponentSet::of::<(Pos, Vel, Hp)>();
        assert!(small.is_subset(&big));
        assert!(!big.is_subset(&small));
        assert!(ComponentSet::empty().is_subset(&small));
    }

    #[test]
    fn display_lists_short_names() {
        let set = ComponentSet::of::<(Pos,)>();
        assert_eq!(set.to_string(), "{Pos}");
        assert_eq!(ComponentSet::empty().to_string(), "{}");
    }
}

//! Placed circuit elements: components, their ends, and wires.
//!
//! A [`Component`] is a cheap shared handle to one placed element. Its
//! behaviour comes from a [`ComponentFactory`]; its geometry is the list of
//! [`EndData`] the factory derives from the component's location and
//! attributes. [`Wire`]s are kept apart from components because any number of
//! them merge into one electrical bundle.

use crate::attrs::{AttrValue, Attribute, AttributeSet};
use crate::circuit::Circuit;
use crate::expr::ExpressionComputer;
use crate::ids::ComponentId;
use crate::instance::InstanceState;
use circa_common::{BitWidth, Location};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Driving discipline of an end.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EndKind {
    /// The component only reads this end.
    Input,
    /// The component only drives this end.
    Output,
    /// The component both reads and drives this end.
    Bidirectional,
}

impl EndKind {
    /// Returns `true` if the component reads this end.
    pub fn is_input(self) -> bool {
        matches!(self, EndKind::Input | EndKind::Bidirectional)
    }

    /// Returns `true` if the component drives this end.
    pub fn is_output(self) -> bool {
        matches!(self, EndKind::Output | EndKind::Bidirectional)
    }
}

/// One declared pin of a component.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct EndData {
    /// Where the end touches the grid.
    pub location: Location,
    /// Bit width of the end; [`BitWidth::UNKNOWN`] ends never fix a bundle's width.
    pub width: BitWidth,
    /// Whether the end is read, driven, or both.
    pub kind: EndKind,
    /// Whether the component claims to be the only driver of this point.
    pub exclusive: bool,
}

impl EndData {
    /// A read-only end.
    pub fn input(location: Location, width: BitWidth) -> Self {
        Self {
            location,
            width,
            kind: EndKind::Input,
            exclusive: false,
        }
    }

    /// A driven end claiming exclusive drive.
    pub fn output(location: Location, width: BitWidth) -> Self {
        Self {
            location,
            width,
            kind: EndKind::Output,
            exclusive: true,
        }
    }

    /// A shared read/drive end.
    pub fn bidirectional(location: Location, width: BitWidth) -> Self {
        Self {
            location,
            width,
            kind: EndKind::Bidirectional,
            exclusive: false,
        }
    }
}

/// Coarse classification of factories that the core treats specially.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FactoryKind {
    /// An ordinary component computed by `propagate`.
    Logic,
    /// A circuit port.
    Pin,
    /// A clock advanced by ticks.
    Clock,
    /// An instance of another circuit.
    Subcircuit,
    /// Joins bundles sharing a label.
    Tunnel,
    /// Gives its bundle a pull value.
    PullResistor,
    /// Routes individual bits between bundles.
    Splitter,
}

/// The behaviour template shared by every component of one type.
pub trait ComponentFactory: Send + Sync + fmt::Debug {
    /// Display name; components with equal factory names may take over each
    /// other's state when one replaces the other.
    fn name(&self) -> &str;

    /// How the core should treat components of this factory.
    fn kind(&self) -> FactoryKind {
        FactoryKind::Logic
    }

    /// Attributes a new component starts with.
    fn default_attributes(&self) -> AttributeSet {
        AttributeSet::new()
    }

    /// Computes the ends of a component placed at `location`.
    fn ends(&self, location: Location, attrs: &AttributeSet) -> Vec<EndData>;

    /// Recomputes the component's outputs from its inputs.
    fn propagate(&self, instance: &mut InstanceState<'_>);

    /// Symbolic expression support for combinational analysis.
    fn expression_computer(&self) -> Option<&dyn ExpressionComputer> {
        None
    }

    /// Advances a clock-like component to tick `ticks`; returns whether its
    /// state changed.
    fn tick(&self, _instance: &mut InstanceState<'_>, _ticks: u64) -> bool {
        false
    }

    /// Whether changing `attr` can alter the owning circuit's port list.
    fn attribute_concerns_supercircuit(&self, _attr: Attribute) -> bool {
        false
    }

    /// The instantiated circuit, for subcircuit factories.
    fn subcircuit(&self) -> Option<&Circuit> {
        None
    }
}

struct ComponentInner {
    id: ComponentId,
    location: Location,
    factory: Arc<dyn ComponentFactory>,
    attrs: RwLock<AttributeSet>,
}

/// A placed component.
///
/// Cloning yields another handle to the same component; equality and hashing
/// use the component's identity, never its attributes.
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

impl Component {
    /// Places a component with the factory's default attributes.
    pub fn new(factory: Arc<dyn ComponentFactory>, location: Location) -> Self {
        let attrs = factory.default_attributes();
        Self::build(factory, location, attrs)
    }

    /// Places a component, overriding defaults with `attrs`.
    pub fn with_attributes(
        factory: Arc<dyn ComponentFactory>,
        location: Location,
        attrs: AttributeSet,
    ) -> Self {
        let mut merged = factory.default_attributes();
        for (attr, value) in attrs.iter() {
            merged.set(attr, value.clone());
        }
        Self::build(factory, location, merged)
    }

    fn build(factory: Arc<dyn ComponentFactory>, location: Location, attrs: AttributeSet) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                id: ComponentId::next(),
                location,
                factory,
                attrs: RwLock::new(attrs),
            }),
        }
    }

    /// Returns the component's identity.
    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    /// Returns the anchor location.
    pub fn location(&self) -> Location {
        self.inner.location
    }

    /// Returns the behaviour template.
    pub fn factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.inner.factory
    }

    /// Shorthand for the factory's kind.
    pub fn kind(&self) -> FactoryKind {
        self.inner.factory.kind()
    }

    /// Returns `true` if both components come from the same kind of factory.
    /// Subcircuit instances match only when they instantiate the same circuit.
    pub fn same_factory(&self, other: &Component) -> bool {
        let (a, b) = (&self.inner.factory, &other.inner.factory);
        a.name() == b.name()
            && a.kind() == b.kind()
            && a.subcircuit().map(|c| c.serial()) == b.subcircuit().map(|c| c.serial())
    }

    /// Returns a snapshot of the attributes.
    pub fn attributes(&self) -> AttributeSet {
        self.inner.attrs.read().clone()
    }

    /// Runs `f` against the current attributes.
    pub fn with_attrs<R>(&self, f: impl FnOnce(&AttributeSet) -> R) -> R {
        f(&self.inner.attrs.read())
    }

    /// Returns one attribute value.
    pub fn attribute(&self, attr: Attribute) -> Option<AttrValue> {
        self.inner.attrs.read().get(attr).cloned()
    }

    /// Returns the label attribute.
    pub fn label(&self) -> String {
        self.inner.attrs.read().label().to_string()
    }

    /// Computes the component's ends from its location and attributes.
    pub fn ends(&self) -> Vec<EndData> {
        let attrs = self.inner.attrs.read();
        self.inner.factory.ends(self.inner.location, &attrs)
    }

    /// Returns end `index`.
    pub fn end(&self, index: usize) -> Option<EndData> {
        self.ends().get(index).copied()
    }

    pub(crate) fn set_attribute(&self, attr: Attribute, value: AttrValue) -> Option<AttrValue> {
        self.inner.attrs.write().set(attr, value)
    }

    pub(crate) fn clear_attribute(&self, attr: Attribute) -> Option<AttrValue> {
        self.inner.attrs.write().remove(attr)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Component {}

impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}{}",
            self.inner.factory.name(),
            self.inner.location,
            self.inner.id
        )
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label();
        if label.is_empty() {
            write!(f, "{} at {}", self.inner.factory.name(), self.inner.location)
        } else {
            write!(f, "{} '{}'", self.inner.factory.name(), label)
        }
    }
}

/// A straight connection between two locations.
///
/// Endpoints are stored in sorted order so that `Wire::new(a, b)` and
/// `Wire::new(b, a)` are the same wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Wire {
    e0: Location,
    e1: Location,
}

impl Wire {
    /// Creates a wire between two locations.
    pub fn new(a: Location, b: Location) -> Self {
        if a <= b {
            Self { e0: a, e1: b }
        } else {
            Self { e0: b, e1: a }
        }
    }

    /// The lesser endpoint.
    pub fn end0(&self) -> Location {
        self.e0
    }

    /// The greater endpoint.
    pub fn end1(&self) -> Location {
        self.e1
    }

    /// Both endpoints.
    pub fn ends(&self) -> [Location; 2] {
        [self.e0, self.e1]
    }

    /// Returns `true` if `loc` is one of the endpoints.
    pub fn has_end(&self, loc: Location) -> bool {
        self.e0 == loc || self.e1 == loc
    }

    /// Returns the endpoint opposite `loc`.
    pub fn other_end(&self, loc: Location) -> Option<Location> {
        if loc == self.e0 {
            Some(self.e1)
        } else if loc == self.e1 {
            Some(self.e0)
        } else {
            None
        }
    }

    /// Returns `true` if both endpoints coincide.
    pub fn is_degenerate(&self) -> bool {
        self.e0 == self.e1
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire {}-{}", self.e0, self.e1)
    }
}

/// Anything a topology change can add or remove.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Element {
    /// A non-wire component.
    Component(Component),
    /// A wire segment.
    Wire(Wire),
}

impl From<Component> for Element {
    fn from(c: Component) -> Self {
        Element::Component(c)
    }
}

impl From<&Component> for Element {
    fn from(c: &Component) -> Self {
        Element::Component(c.clone())
    }
}

impl From<Wire> for Element {
    fn from(w: Wire) -> Self {
        Element::Wire(w)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Component(c) => write!(f, "{c}"),
            Element::Wire(w) => write!(f, "{w}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{and_gate, input_pin, subcircuit};

    #[test]
    fn wire_endpoints_are_normalized() {
        let a = Location::new(10, 0);
        let b = Location::new(0, 0);
        assert_eq!(Wire::new(a, b), Wire::new(b, a));
        assert_eq!(Wire::new(a, b).end0(), b);
    }

    #[test]
    fn wire_other_end() {
        let w = Wire::new(Location::new(0, 0), Location::new(0, 20));
        assert_eq!(w.other_end(Location::new(0, 0)), Some(Location::new(0, 20)));
        assert_eq!(w.other_end(Location::new(5, 5)), None);
        assert!(w.has_end(Location::new(0, 20)));
        assert!(!w.is_degenerate());
    }

    #[test]
    fn component_identity_equality() {
        let a = and_gate(Location::new(50, 50), 2);
        let b = and_gate(Location::new(50, 50), 2);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(a.same_factory(&b));
    }

    #[test]
    fn instances_of_namesake_circuits_differ() {
        let first = crate::Circuit::new("half");
        let second = crate::Circuit::new("half");
        let at = Location::new(100, 100);
        let a = subcircuit(&first, at);
        assert!(a.same_factory(&subcircuit(&first, at)));
        assert!(!a.same_factory(&subcircuit(&second, at)));
    }

    #[test]
    fn attributes_override_defaults() {
        let pin = input_pin(Location::new(0, 0), 4, "a");
        assert_eq!(pin.with_attrs(|a| a.width()), BitWidth::new(4));
        assert_eq!(pin.label(), "a");
        assert_eq!(pin.ends()[0].width, BitWidth::new(4));
    }

    #[test]
    fn end_kinds() {
        assert!(EndKind::Bidirectional.is_input());
        assert!(EndKind::Bidirectional.is_output());
        assert!(!EndKind::Input.is_output());
        assert!(EndData::output(Location::new(0, 0), BitWidth::ONE).exclusive);
    }

    #[test]
    fn element_from_conversions() {
        let w = Wire::new(Location::new(0, 0), Location::new(10, 0));
        assert_eq!(Element::from(w), Element::Wire(w));
        let g = and_gate(Location::new(0, 0), 2);
        assert_eq!(Element::from(&g), Element::Component(g.clone()));
    }
}

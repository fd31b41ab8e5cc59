//! Circuits: the component set, wiring, port layout and listeners.
//!
//! A [`Circuit`] is a shared handle. Its contents sit behind a per-circuit
//! reader/writer lock and only change inside a transaction (see
//! [`crate::mutation`]); reads go through the lock, or through the guard the
//! current thread already holds when called from inside a transaction.

use crate::attrs::{AttrValue, Attribute, AttributeSet};
use crate::component::{Component, EndKind, Element, FactoryKind, Wire};
use crate::ids::{next_circuit_serial, ComponentId};
use crate::library::is_output_pin;
use crate::mutation::lock::{restore_guard, take_guard, HeldGuard};
use crate::mutation::ReplacementMap;
use crate::network::BundleNetwork;
use crate::points::{CircuitPoints, WidthIncompatibilityData};
use circa_common::{BitWidth, Location};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// Grid spacing between consecutive ports of a subcircuit instance.
pub const PORT_SPACING: i32 = 10;
/// Horizontal distance from a subcircuit's input column to its output column.
pub const PORT_COLUMN_WIDTH: i32 = 40;

/// One port of a circuit's appearance when instantiated elsewhere.
#[derive(Clone, Debug, PartialEq)]
pub struct PortSpec {
    /// The pin inside the circuit that backs this port.
    pub pin: Component,
    /// Offset of the port from the instance's anchor.
    pub offset: Location,
    /// Port width.
    pub width: BitWidth,
    /// Direction seen from the instance: `Input` for the circuit's input pins.
    pub kind: EndKind,
}

/// A topology change announced to circuit listeners.
#[derive(Clone, Debug)]
pub enum CircuitEvent {
    /// An element was added.
    Add(Element),
    /// An element was removed.
    Remove(Element),
    /// A component attribute changed.
    AttributeChanged {
        /// The component.
        component: Component,
        /// The attribute.
        attr: Attribute,
        /// Previous value.
        old: Option<AttrValue>,
        /// New value.
        new: Option<AttrValue>,
    },
    /// A circuit-level attribute changed.
    CircuitAttributeChanged {
        /// The attribute.
        attr: Attribute,
        /// Previous value.
        old: Option<AttrValue>,
        /// New value.
        new: Option<AttrValue>,
    },
    /// Every element was removed.
    Clear,
    /// A subcircuit instance's ends changed because its circuit's ports did.
    Invalidate(Component),
    /// A transaction touching this circuit committed.
    TransactionDone(Arc<ReplacementMap>),
}

/// Receives topology events, synchronously, after post-commit repair.
pub trait CircuitListener: Send + Sync {
    /// Called once per event, in order.
    fn circuit_changed(&self, circuit: &Circuit, event: &CircuitEvent);
}

/// The lock-protected part of a circuit.
#[derive(Debug)]
pub(crate) struct CircuitContents {
    pub(crate) attrs: AttributeSet,
    pub(crate) components: Vec<Component>,
    pub(crate) wires: BTreeSet<Wire>,
    pub(crate) points: CircuitPoints,
    pub(crate) network: Arc<BundleNetwork>,
    pub(crate) network_stale: bool,
    pub(crate) clocks: Vec<Component>,
    pub(crate) ports: Vec<PortSpec>,
}

impl CircuitContents {
    fn new(name: &str) -> Self {
        Self {
            attrs: AttributeSet::new().with(Attribute::NAME, AttrValue::Text(name.to_string())),
            components: Vec::new(),
            wires: BTreeSet::new(),
            points: CircuitPoints::new(),
            network: Arc::new(BundleNetwork::new()),
            network_stale: false,
            clocks: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub(crate) fn contains(&self, element: &Element) -> bool {
        match element {
            Element::Component(c) => self.components.contains(c),
            Element::Wire(w) => self.wires.contains(w),
        }
    }

    pub(crate) fn rebuild_network(&mut self) {
        self.network = Arc::new(BundleNetwork::build(&self.points, &self.components));
        self.network_stale = false;
    }

    /// Lays out ports: input pins down the left column, output pins down the
    /// right, each ordered top to bottom then left to right.
    pub(crate) fn compute_ports(&self) -> Vec<PortSpec> {
        let mut inputs: Vec<&Component> = Vec::new();
        let mut outputs: Vec<&Component> = Vec::new();
        for c in self.components.iter().filter(|c| c.kind() == FactoryKind::Pin) {
            if is_output_pin(c) {
                outputs.push(c);
            } else {
                inputs.push(c);
            }
        }
        let by_position = |c: &&Component| (c.location().y, c.location().x);
        inputs.sort_by_key(by_position);
        outputs.sort_by_key(by_position);

        let mut ports = port_column(&inputs, 0, EndKind::Input);
        ports.extend(port_column(&outputs, PORT_COLUMN_WIDTH, EndKind::Output));
        ports
    }
}

fn port_column(pins: &[&Component], dx: i32, kind: EndKind) -> Vec<PortSpec> {
    pins.iter()
        .enumerate()
        .map(|(i, pin)| PortSpec {
            pin: (*pin).clone(),
            offset: Location::new(dx, PORT_SPACING * i as i32),
            width: pin.with_attrs(|a| a.width()),
            kind,
        })
        .collect()
}

pub(crate) struct CircuitShared {
    serial: u64,
    contents: Arc<RwLock<CircuitContents>>,
    users: Mutex<Vec<(ComponentId, Weak<CircuitShared>)>>,
    listeners: Mutex<Vec<Weak<dyn CircuitListener>>>,
}

/// A circuit definition; cloning yields another handle to the same circuit.
#[derive(Clone)]
pub struct Circuit {
    shared: Arc<CircuitShared>,
}

impl Circuit {
    /// Creates an empty circuit.
    pub fn new(name: &str) -> Self {
        Self {
            shared: Arc::new(CircuitShared {
                serial: next_circuit_serial(),
                contents: Arc::new(RwLock::new(CircuitContents::new(name))),
                users: Mutex::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Position of this circuit in the global lock order.
    pub fn serial(&self) -> u64 {
        self.shared.serial
    }

    pub(crate) fn contents_lock(&self) -> &Arc<RwLock<CircuitContents>> {
        &self.shared.contents
    }

    /// Reads the contents through this thread's held guard if there is one,
    /// otherwise under a fresh read lock.
    pub(crate) fn read_contents<R>(&self, f: impl FnOnce(&CircuitContents) -> R) -> R {
        let serial = self.serial();
        match take_guard(serial) {
            Some(guard) => {
                let ret = f(guard.contents());
                restore_guard(serial, guard);
                ret
            }
            None => f(&self.shared.contents.read()),
        }
    }

    /// Runs `f` against the contents if this thread holds the write lock.
    pub(crate) fn write_contents<R>(
        &self,
        f: impl FnOnce(&mut CircuitContents) -> R,
    ) -> Option<R> {
        let serial = self.serial();
        match take_guard(serial)? {
            HeldGuard::Write(mut guard) => {
                let ret = f(&mut guard);
                restore_guard(serial, HeldGuard::Write(guard));
                Some(ret)
            }
            other => {
                restore_guard(serial, other);
                None
            }
        }
    }

    /// The circuit's name.
    pub fn name(&self) -> String {
        self.read_contents(|c| c.attrs.text(Attribute::NAME).unwrap_or_default().to_string())
    }

    /// Snapshot of the circuit-level attributes.
    pub fn attributes(&self) -> AttributeSet {
        self.read_contents(|c| c.attrs.clone())
    }

    /// Non-wire components in insertion order.
    pub fn components(&self) -> Vec<Component> {
        self.read_contents(|c| c.components.clone())
    }

    /// Wires in location order.
    pub fn wires(&self) -> Vec<Wire> {
        self.read_contents(|c| c.wires.iter().copied().collect())
    }

    /// Returns `true` if the element is part of this circuit.
    pub fn contains(&self, element: impl Into<Element>) -> bool {
        let element = element.into();
        self.read_contents(|c| c.contains(&element))
    }

    /// Finds a component by identity.
    pub fn component(&self, id: ComponentId) -> Option<Component> {
        self.read_contents(|c| c.components.iter().find(|x| x.id() == id).cloned())
    }

    /// Runs `f` against the topology index.
    pub fn with_points<R>(&self, f: impl FnOnce(&CircuitPoints) -> R) -> R {
        self.read_contents(|c| f(&c.points))
    }

    /// The current bundle network.
    pub fn network(&self) -> Arc<BundleNetwork> {
        self.read_contents(|c| Arc::clone(&c.network))
    }

    /// Width of the node at `loc`.
    pub fn width_at(&self, loc: Location) -> BitWidth {
        self.read_contents(|c| {
            let width = c.network.width_at(loc);
            if width.is_known() || c.network.contains(loc) {
                width
            } else {
                c.points.width_at(loc)
            }
        })
    }

    /// The end location that fixed the width of the node at `loc`.
    pub fn width_determinant(&self, loc: Location) -> Option<Location> {
        self.read_contents(|c| c.network.width_determinant(loc))
    }

    /// Every width conflict, one record per conflicting node. Conflicts
    /// between ends at a single location are folded into the record of the
    /// bundle containing that location.
    pub fn width_incompatibilities(&self) -> Vec<WidthIncompatibilityData> {
        self.read_contents(|c| {
            let mut records: Vec<WidthIncompatibilityData> =
                c.network.incompatibilities().cloned().collect();
            for local in c.points.width_incompatibilities() {
                let owner = local.points().into_iter().find_map(|loc| {
                    let bundle = c.network.bundle_id_at(loc)?;
                    records.iter().position(|r| {
                        r.points()
                            .into_iter()
                            .any(|p| c.network.bundle_id_at(p) == Some(bundle))
                    })
                });
                match owner {
                    Some(i) => records[i].merge(local),
                    None => records.push(local.clone()),
                }
            }
            records
        })
    }

    /// The component claiming exclusive drive of `loc`.
    pub fn exclusive_at(&self, loc: Location) -> Option<Component> {
        self.read_contents(|c| c.points.exclusive_at(loc).cloned())
    }

    /// Locations claimed by more than one exclusive driver.
    pub fn exclusive_conflicts(&self) -> Vec<(Location, Vec<Component>)> {
        self.read_contents(|c| c.points.exclusive_conflicts())
    }

    /// Ports this circuit shows when instantiated.
    pub fn ports(&self) -> Vec<PortSpec> {
        self.read_contents(|c| c.ports.clone())
    }

    /// Clock components.
    pub fn clocks(&self) -> Vec<Component> {
        self.read_contents(|c| c.clocks.clone())
    }

    /// All pins, input and output.
    pub fn pins(&self) -> Vec<Component> {
        self.read_contents(|c| {
            c.components
                .iter()
                .filter(|x| x.kind() == FactoryKind::Pin)
                .cloned()
                .collect()
        })
    }

    /// The first pin with the given label.
    pub fn pin_by_label(&self, label: &str) -> Option<Component> {
        self.pins().into_iter().find(|p| p.label() == label)
    }

    /// Circuits containing an instance of this one.
    pub fn supercircuits(&self) -> Vec<Circuit> {
        let mut seen = HashSet::new();
        let mut ret = Vec::new();
        for (_, weak) in self.shared.users.lock().iter() {
            if let Some(shared) = weak.upgrade() {
                if seen.insert(shared.serial) {
                    ret.push(Circuit { shared });
                }
            }
        }
        ret.sort_by_key(|c| c.serial());
        ret
    }

    /// Instances of this circuit, as `(containing circuit, instance)` pairs.
    pub fn instances(&self) -> Vec<(Circuit, ComponentId)> {
        self.shared
            .users
            .lock()
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|shared| (Circuit { shared }, *id)))
            .collect()
    }

    pub(crate) fn register_user(&self, parent: &Circuit, instance: ComponentId) {
        self.shared
            .users
            .lock()
            .push((instance, Arc::downgrade(&parent.shared)));
    }

    pub(crate) fn unregister_user(&self, instance: ComponentId) {
        self.shared.users.lock().retain(|(id, _)| *id != instance);
    }

    /// Registers a listener; the circuit keeps only a weak reference.
    pub fn add_listener<L: CircuitListener + 'static>(&self, listener: &Arc<L>) {
        let strong: Arc<dyn CircuitListener> = listener.clone();
        self.shared.listeners.lock().push(Arc::downgrade(&strong));
    }

    /// Unregisters a listener.
    pub fn remove_listener<L: CircuitListener + 'static>(&self, listener: &Arc<L>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.shared
            .listeners
            .lock()
            .retain(|w| w.as_ptr() as *const () != target && w.strong_count() > 0);
    }

    pub(crate) fn fire(&self, event: &CircuitEvent) {
        let live: Vec<Arc<dyn CircuitListener>> = {
            let mut listeners = self.shared.listeners.lock();
            listeners.retain(|w| w.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.circuit_changed(self, event);
        }
    }
}

impl PartialEq for Circuit {
    fn eq(&self, other: &Self) -> bool {
        self.shared.serial == other.shared.serial
    }
}

impl Eq for Circuit {}

impl std::hash::Hash for Circuit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.shared.serial.hash(state);
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circuit({}#{})", self.name(), self.serial())
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

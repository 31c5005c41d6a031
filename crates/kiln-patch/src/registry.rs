//! Operator registry: type names to constructors.

use kiln_core::{AudioOperator, Domain, Operator, ParamDescriptor};

use crate::ops::{Add, Constant, Decay, Gain, History, Lfo, Mix, Multiply, Sine, Solid};

/// Describes an operator type in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorDescriptor {
    /// Type name used in patches (lowercase, no spaces).
    pub id: &'static str,
    /// Timing domain the operator runs in.
    pub domain: Domain,
    /// Brief description.
    pub description: &'static str,
}

/// A freshly constructed operator of either domain.
pub enum Instance {
    /// Control-domain operator.
    Control(Box<dyn Operator>),
    /// Audio-domain operator.
    Audio(Box<dyn AudioOperator>),
}

impl Instance {
    /// Parameter descriptors of the constructed operator.
    pub fn param_descriptors(&self) -> Vec<ParamDescriptor> {
        match self {
            Instance::Control(op) => op.describe_params(),
            Instance::Audio(op) => op.params().descriptors(),
        }
    }
}

/// Factory for one operator type.
#[derive(Clone, Copy)]
pub enum Factory {
    /// Builds a control operator.
    Control(fn() -> Box<dyn Operator>),
    /// Builds an audio operator.
    Audio(fn() -> Box<dyn AudioOperator>),
}

impl Factory {
    fn domain(self) -> Domain {
        match self {
            Factory::Control(_) => Domain::Control,
            Factory::Audio(_) => Domain::Audio,
        }
    }

    fn build(self) -> Instance {
        match self {
            Factory::Control(f) => Instance::Control(f()),
            Factory::Audio(f) => Instance::Audio(f()),
        }
    }
}

struct RegistryEntry {
    descriptor: OperatorDescriptor,
    factory: Factory,
}

/// Registry of operator types a patch can instantiate.
///
/// All built-in operators are registered on construction; applications add
/// their own with [`register`](Self::register).
pub struct OperatorRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    /// Create a registry with all built-in operators.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(10),
        };
        registry.register_builtin_operators();
        registry
    }

    /// Create a registry with no operators.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn register_builtin_operators(&mut self) {
        // Control
        self.register(
            "constant",
            "Emits its value parameter",
            Factory::Control(|| Box::new(Constant::new())),
        );
        self.register(
            "lfo",
            "Sine low-frequency oscillator on the control clock",
            Factory::Control(|| Box::new(Lfo::new())),
        );
        self.register(
            "add",
            "Sum of inputs plus an offset",
            Factory::Control(|| Box::new(Add::new())),
        );
        self.register(
            "multiply",
            "Product of inputs times a scale",
            Factory::Control(|| Box::new(Multiply::new())),
        );
        self.register(
            "history",
            "Buffer of the most recent input values",
            Factory::Control(|| Box::new(History::new())),
        );
        self.register(
            "solid",
            "Flat image layer with input-driven intensity",
            Factory::Control(|| Box::new(Solid::new())),
        );

        // Audio
        self.register(
            "sine",
            "Sine oscillator gated by note events",
            Factory::Audio(|| Box::new(Sine::new())),
        );
        self.register(
            "gain",
            "Scales its input",
            Factory::Audio(|| Box::new(Gain::new())),
        );
        self.register(
            "mix",
            "Sums its inputs",
            Factory::Audio(|| Box::new(Mix::new())),
        );
        self.register(
            "decay",
            "Trigger-driven exponential envelope",
            Factory::Audio(|| Box::new(Decay::new())),
        );
    }

    /// Register an operator type, replacing any entry with the same id.
    pub fn register(&mut self, id: &'static str, description: &'static str, factory: Factory) {
        let entry = RegistryEntry {
            descriptor: OperatorDescriptor {
                id,
                domain: factory.domain(),
                description,
            },
            factory,
        };
        match self.entries.iter_mut().find(|e| e.descriptor.id == id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// All registered operator types, in registration order.
    pub fn all(&self) -> Vec<&OperatorDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Operator types of one domain.
    pub fn in_domain(&self, domain: Domain) -> Vec<&OperatorDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.domain == domain)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Descriptor for `id`.
    pub fn get(&self, id: &str) -> Option<&OperatorDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| &e.descriptor)
    }

    /// Construct an operator of type `id`.
    pub fn create(&self, id: &str) -> Option<Instance> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| e.factory.build())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

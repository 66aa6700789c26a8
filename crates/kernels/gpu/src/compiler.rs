//! Kernel planning.
//!
//! [`KernelPlan::build`] fuses a list of output assignments into one kernel:
//! it assigns argument slots, finds shared sub-expressions, derives the
//! structural [`Signature`] and renders the kernel source. Planning never
//! touches a device; [`crate::KernelCache`] decides whether the plan needs
//! compiling.

use std::fmt::Write as _;

use indexmap::{IndexMap, IndexSet};

use tessera_foundation::{BufferId, BufferRef, ParamId, ScalarKind, ScalarValue};
use tessera_ir::{Expr, KernelConfig, NodeId, NodeKind, Parameter, TypeError, VectorExpr, types};

use crate::device::{Access, ArgBinding, ArgSlot};
use crate::emit;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// Version tag of the canonical signature format.
const SIGNATURE_VERSION: &str = "tessera/1";

/// One assignment `destination[index] = source`.
#[derive(Debug, Clone)]
pub struct Output {
    pub destination: BufferRef,
    pub source: Expr,
}

impl Output {
    pub fn new(destination: &BufferRef, source: Expr) -> Self {
        Self {
            destination: destination.clone(),
            source,
        }
    }
}

/// Pair each destination with the matching component of `source`.
pub fn assign(destinations: &[BufferRef], source: &VectorExpr) -> std::result::Result<Vec<Output>, TypeError> {
    if destinations.len() != source.len() {
        return Err(TypeError::arity("assign", destinations.len(), source.len()));
    }
    Ok(destinations
        .iter()
        .zip(source.iter())
        .map(|(destination, component)| Output::new(destination, component.clone()))
        .collect())
}

/// A planned output: destination slot and the value stored there.
#[derive(Debug, Clone)]
pub struct PlannedOutput {
    pub slot: usize,
    pub kind: ScalarKind,
    pub source: Expr,
}

/// Everything a device needs to compile a fused kernel.
#[derive(Debug)]
pub struct KernelPlan {
    pub name: String,
    pub signature: Signature,
    pub config: KernelConfig,
    pub slots: Vec<ArgSlot>,
    /// Arguments of the graph the plan was built from, in slot order.
    pub bindings: Vec<ArgBinding>,
    pub outputs: Vec<PlannedOutput>,
    /// Nodes declared as locals because they are used more than once.
    pub hoisted: IndexSet<NodeId>,
    /// Every node in post-order.
    pub nodes: Vec<Expr>,
    /// Rendered source in `config.dialect`.
    pub source: String,
    pub uses_double: bool,
    buffer_slots: IndexMap<BufferId, usize>,
    param_slots: IndexMap<ParamId, usize>,
}

impl KernelPlan {
    #[tracing::instrument(level = "debug", skip_all, fields(outputs = outputs.len()))]
    pub fn build(outputs: &[Output], config: &KernelConfig) -> Result<Self> {
        config.validate()?;
        if outputs.is_empty() {
            return Err(TypeError::new("kernel", &[], "at least one output is required").into());
        }
        for output in outputs {
            let (src, dest) = (output.source.ty(), output.destination.kind());
            if !types::assignable(src, dest) {
                return Err(TypeError::new(
                    "assign",
                    &[src, dest],
                    "source kind is not assignable to the destination without a conversion",
                )
                .into());
            }
        }

        let mut walk = Walk::default();
        let mut planned = Vec::with_capacity(outputs.len());
        for output in outputs {
            let slot = walk.bind_destination(&output.destination);
            walk.visit(&output.source);
            planned.push(PlannedOutput {
                slot,
                kind: output.destination.kind(),
                source: output.source.clone(),
            });
        }

        let hoisted: IndexSet<NodeId> = walk
            .order
            .iter()
            .filter(|e| !e.is_leaf() && walk.uses.get(&e.id()).copied().unwrap_or(0) > 1)
            .map(Expr::id)
            .collect();

        let signature = Signature::new(canonical(config, &walk, &planned, &hoisted));
        let name = signature.kernel_name();

        let precision = config.precision;
        let kinds = walk
            .order
            .iter()
            .map(Expr::ty)
            .chain(walk.slots.iter().map(ArgSlot::kind));
        let mut uses_double = false;
        for kind in kinds {
            if !config.supports_kind(kind) {
                return Err(Error::compilation(
                    &name,
                    format!(
                        "{:?} values are not supported by {} kernels on this device",
                        kind.resolve(precision),
                        config.dialect
                    ),
                ));
            }
            uses_double |= kind.resolve(precision) == ScalarKind::Double;
        }

        let mut plan = Self {
            name,
            signature,
            config: config.clone(),
            slots: walk.slots,
            bindings: walk.bindings,
            outputs: planned,
            hoisted,
            nodes: walk.order,
            source: String::new(),
            uses_double,
            buffer_slots: walk.buffer_slots,
            param_slots: walk.param_slots,
        };
        plan.source = emit::source(&plan);
        tracing::debug!(
            kernel = %plan.name,
            slots = plan.slots.len(),
            nodes = plan.nodes.len(),
            hoisted = plan.hoisted.len(),
            "kernel planned"
        );
        Ok(plan)
    }

    pub fn buffer_slot(&self, id: BufferId) -> Option<usize> {
        self.buffer_slots.get(&id).copied()
    }

    pub fn param_slot(&self, id: ParamId) -> Option<usize> {
        self.param_slots.get(&id).copied()
    }

    /// Destination slot of each output, in output order.
    pub fn output_slots(&self) -> Vec<usize> {
        self.outputs.iter().map(|o| o.slot).collect()
    }

    pub fn is_hoisted(&self, expr: &Expr) -> bool {
        expr.is_hoisted() || self.hoisted.contains(&expr.id())
    }
}

/// Post-order traversal state shared by slot assignment and use counting.
#[derive(Default)]
struct Walk {
    slots: Vec<ArgSlot>,
    bindings: Vec<ArgBinding>,
    buffer_slots: IndexMap<BufferId, usize>,
    param_slots: IndexMap<ParamId, usize>,
    /// Parent references per node (output roots count once each).
    uses: IndexMap<NodeId, usize>,
    order: Vec<Expr>,
}

impl Walk {
    fn bind_destination(&mut self, buffer: &BufferRef) -> usize {
        let slot = self.bind_buffer(buffer);
        if let ArgSlot::Buffer { access, .. } = &mut self.slots[slot] {
            *access = Access::ReadWrite;
        }
        slot
    }

    fn bind_buffer(&mut self, buffer: &BufferRef) -> usize {
        if let Some(&slot) = self.buffer_slots.get(&buffer.id()) {
            return slot;
        }
        let slot = self.slots.len();
        self.slots.push(ArgSlot::Buffer {
            kind: buffer.kind(),
            access: Access::ReadOnly,
        });
        self.bindings.push(ArgBinding::Buffer(buffer.clone()));
        self.buffer_slots.insert(buffer.id(), slot);
        slot
    }

    fn bind_param(&mut self, parameter: &Parameter) -> usize {
        if let Some(&slot) = self.param_slots.get(&parameter.id()) {
            return slot;
        }
        let slot = self.slots.len();
        self.slots.push(ArgSlot::Parameter {
            kind: parameter.kind(),
        });
        self.bindings.push(ArgBinding::Parameter(parameter.clone()));
        self.param_slots.insert(parameter.id(), slot);
        slot
    }

    fn visit(&mut self, expr: &Expr) {
        let count = self.uses.entry(expr.id()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }
        for child in expr.children() {
            self.visit(child);
        }
        match expr.kind() {
            NodeKind::Buffer { buffer, .. } => {
                self.bind_buffer(buffer);
            }
            NodeKind::Parameter(parameter) => {
                self.bind_param(parameter);
            }
            _ => {}
        }
        self.order.push(expr.clone());
    }
}

fn canonical(config: &KernelConfig, walk: &Walk, outputs: &[PlannedOutput], hoisted: &IndexSet<NodeId>) -> String {
    let mut text = String::new();
    let _ = write!(text, "{SIGNATURE_VERSION}|{}|slots:", config.signature_fragment());
    for slot in &walk.slots {
        match slot {
            ArgSlot::Buffer { kind, access } => {
                let mode = if *access == Access::ReadWrite { 'w' } else { 'r' };
                let _ = write!(text, "B{}{mode},", kind.tag());
            }
            ArgSlot::Parameter { kind } => {
                let _ = write!(text, "P{},", kind.tag());
            }
        }
    }

    text.push_str("|nodes:");
    let mut numbers: IndexMap<NodeId, usize> = IndexMap::with_capacity(walk.order.len());
    for (n, expr) in walk.order.iter().enumerate() {
        numbers.insert(expr.id(), n);
        let ty = expr.ty().tag();
        let _ = match expr.kind() {
            NodeKind::Literal(value) => write!(text, "lit:{ty}:{}", literal_key(*value)),
            NodeKind::Parameter(parameter) => {
                write!(text, "par:{ty}:s{}", walk.param_slots[&parameter.id()])
            }
            NodeKind::Buffer { buffer, offset } => {
                write!(text, "buf:{ty}:s{}:{offset}", walk.buffer_slots[&buffer.id()])
            }
            NodeKind::Index => write!(text, "idx:{ty}"),
            NodeKind::Raw { template, .. } => write!(text, "raw:{ty}:{}:{template}", template.len()),
            _ => write!(text, "{}:{ty}", expr.tag()),
        };
        if expr.is_hoisted() || hoisted.contains(&expr.id()) {
            text.push('!');
        }
        let children = expr.children();
        if !children.is_empty() {
            text.push('(');
            for (k, child) in children.iter().enumerate() {
                if k > 0 {
                    text.push(',');
                }
                let _ = write!(text, "@{}", numbers[&child.id()]);
            }
            text.push(')');
        }
        text.push(';');
    }

    text.push_str("|outs:");
    for output in outputs {
        let _ = write!(
            text,
            "s{}:{}=@{};",
            output.slot,
            output.kind.tag(),
            numbers[&output.source.id()]
        );
    }
    text
}

/// Exact literal identity: floats by bit pattern so `-0.0` and `0.0` differ.
fn literal_key(value: ScalarValue) -> String {
    match value {
        ScalarValue::Bool(b) => format!("b{}", u8::from(b)),
        ScalarValue::Int(v) => format!("i{v}"),
        ScalarValue::Float(v) => format!("f{:016x}", v.to_bits()),
    }
}

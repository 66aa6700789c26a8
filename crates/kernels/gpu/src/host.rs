//! Host execution device.
//!
//! [`HostDevice`] runs kernels on the CPU by lowering a [`KernelPlan`] to a
//! flat register program evaluated once per element. It follows the same
//! contract as a GPU device: argument values are captured at enqueue, work
//! runs at [`ComputeDevice::synchronize`], and every output of a dispatch
//! is computed from the pre-dispatch contents of its inputs before any
//! destination is written. Destinations are locked and checked before the
//! first store, so a dispatch that fails writes nothing.
//!
//! Large dispatches are split across the rayon thread pool.

use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{trace, warn};

use tessera_foundation::{BufferRef, HostData, Precision, ScalarKind, ScalarValue};
use tessera_ir::{BinaryOp, Builtin, Dialect, NodeId, NodeKind, UnaryOp, types};

use crate::cache::CompiledKernel;
use crate::compiler::KernelPlan;
use crate::device::{ArgBinding, ComputeDevice, DeviceCapabilities, Program, WorkSize};
use crate::error::{Error, Result};

/// Tuning for [`HostDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    /// Dispatches with fewer elements run on the calling thread.
    pub parallel_threshold: usize,
    /// Maximum bound buffers plus parameters per kernel.
    pub max_kernel_args: usize,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: 4096,
            max_kernel_args: 256,
        }
    }
}

type Reg = usize;

#[derive(Debug, Clone)]
enum Op {
    Const(ScalarValue),
    Param(usize),
    Load { slot: usize, offset: i64 },
    Index,
    Unary(UnaryOp, Reg),
    Binary { op: BinaryOp, operand: ScalarKind, lhs: Reg, rhs: Reg },
    Select { cond: Reg, on_true: Reg, on_false: Reg },
    Convert(Reg),
    Call(Builtin, Vec<Reg>),
}

#[derive(Debug, Clone)]
struct Instr {
    op: Op,
    /// Resolved result kind.
    kind: ScalarKind,
}

#[derive(Debug, Clone, Copy)]
struct HostOutput {
    slot: usize,
    reg: Reg,
    kind: ScalarKind,
}

/// A kernel lowered to host instructions, one register per graph node.
#[derive(Debug, Clone)]
pub struct HostProgram {
    instrs: Arc<[Instr]>,
    outputs: Arc<[HostOutput]>,
    precision: Precision,
}

impl HostProgram {
    /// Lower a plan. Raw source nodes have no host meaning and are rejected.
    pub fn lower(plan: &KernelPlan) -> Result<Self> {
        let precision = plan.config.precision;
        let mut regs: indexmap::IndexMap<NodeId, Reg> = indexmap::IndexMap::with_capacity(plan.nodes.len());
        let mut instrs = Vec::with_capacity(plan.nodes.len());
        for expr in &plan.nodes {
            let reg_of = |e: &tessera_ir::Expr| regs[&e.id()];
            let op = match expr.kind() {
                NodeKind::Literal(value) => Op::Const(*value),
                NodeKind::Parameter(parameter) => Op::Param(plan.param_slot(parameter.id()).ok_or_else(|| {
                    Error::compilation(&plan.name, "parameter has no argument slot")
                })?),
                NodeKind::Buffer { buffer, offset } => Op::Load {
                    slot: plan
                        .buffer_slot(buffer.id())
                        .ok_or_else(|| Error::compilation(&plan.name, "buffer has no argument slot"))?,
                    offset: *offset,
                },
                NodeKind::Index => Op::Index,
                NodeKind::Unary { op, arg } => Op::Unary(*op, reg_of(arg)),
                NodeKind::Binary { op, lhs, rhs } => Op::Binary {
                    op: *op,
                    operand: if op.is_logical() {
                        ScalarKind::Bool
                    } else {
                        types::promote(lhs.ty(), rhs.ty()).unwrap_or(lhs.ty()).resolve(precision)
                    },
                    lhs: reg_of(lhs),
                    rhs: reg_of(rhs),
                },
                NodeKind::Select {
                    cond,
                    on_true,
                    on_false,
                } => Op::Select {
                    cond: reg_of(cond),
                    on_true: reg_of(on_true),
                    on_false: reg_of(on_false),
                },
                NodeKind::Convert { arg } => Op::Convert(reg_of(arg)),
                NodeKind::Call { func, args } => Op::Call(*func, args.iter().map(reg_of).collect()),
                NodeKind::Raw { .. } => {
                    return Err(Error::compilation(
                        &plan.name,
                        "raw source nodes cannot be executed on the host device",
                    ));
                }
            };
            regs.insert(expr.id(), instrs.len());
            instrs.push(Instr {
                op,
                kind: expr.ty().resolve(precision),
            });
        }

        let outputs = plan
            .outputs
            .iter()
            .map(|output| HostOutput {
                slot: output.slot,
                reg: regs[&output.source.id()],
                kind: output.kind,
            })
            .collect();
        Ok(Self {
            instrs: instrs.into(),
            outputs,
            precision,
        })
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    fn eval(&self, kernel: &str, element: usize, inputs: &Inputs<'_>) -> Result<Vec<ScalarValue>> {
        let mut regs: Vec<ScalarValue> = Vec::with_capacity(self.instrs.len());
        for instr in self.instrs.iter() {
            let value = match &instr.op {
                Op::Const(value) => *value,
                Op::Param(slot) => inputs.params[*slot]
                    .ok_or_else(|| Error::dispatch(kernel, format!("slot {slot} is not a parameter")))?,
                Op::Load { slot, offset } => {
                    let data = inputs.buffers[*slot]
                        .ok_or_else(|| Error::dispatch(kernel, format!("slot {slot} is not a buffer")))?;
                    let index = element as i64 + offset;
                    usize::try_from(index)
                        .ok()
                        .and_then(|index| data.load(index))
                        .ok_or_else(|| {
                            Error::dispatch(
                                kernel,
                                format!("load of element {index} from slot {slot} is out of bounds ({})", data.len()),
                            )
                        })?
                }
                Op::Index => ScalarValue::Int(element as i64),
                Op::Unary(op, arg) => unary(*op, regs[*arg], instr.kind),
                Op::Binary { op, operand, lhs, rhs } => {
                    let (a, b) = (regs[*lhs].cast(*operand), regs[*rhs].cast(*operand));
                    binary(*op, *operand, a, b).ok_or_else(|| {
                        Error::dispatch(kernel, format!("integer {} by zero at element {element}", op.name()))
                    })?
                }
                Op::Select {
                    cond,
                    on_true,
                    on_false,
                } => {
                    if regs[*cond].as_bool() {
                        regs[*on_true]
                    } else {
                        regs[*on_false]
                    }
                }
                Op::Convert(arg) => regs[*arg],
                Op::Call(func, args) => {
                    let args: Vec<ScalarValue> = args.iter().map(|&r| regs[r].cast(instr.kind)).collect();
                    call(*func, &args, instr.kind)
                }
            };
            regs.push(value.cast(instr.kind));
        }
        Ok(self
            .outputs
            .iter()
            .map(|output| regs[output.reg].cast(output.kind.resolve(self.precision)))
            .collect())
    }
}

fn unary(op: UnaryOp, a: ScalarValue, kind: ScalarKind) -> ScalarValue {
    if kind.is_integer() {
        let v = a.as_i64();
        return ScalarValue::Int(match op {
            UnaryOp::Neg => v.wrapping_neg(),
            UnaryOp::Abs => v.wrapping_abs(),
            _ => v,
        });
    }
    let x = a.as_f64();
    match op {
        UnaryOp::Not => ScalarValue::Bool(!a.as_bool()),
        UnaryOp::Neg => ScalarValue::Float(-x),
        UnaryOp::Abs => ScalarValue::Float(x.abs()),
        UnaryOp::Sin => ScalarValue::Float(x.sin()),
        UnaryOp::Cos => ScalarValue::Float(x.cos()),
        UnaryOp::Tan => ScalarValue::Float(x.tan()),
        UnaryOp::Exp => ScalarValue::Float(x.exp()),
        UnaryOp::Log => ScalarValue::Float(x.ln()),
        UnaryOp::Sqrt => ScalarValue::Float(x.sqrt()),
        UnaryOp::Floor => ScalarValue::Float(x.floor()),
    }
}

/// `None` on integer division or remainder by zero.
fn binary(op: BinaryOp, operand: ScalarKind, a: ScalarValue, b: ScalarValue) -> Option<ScalarValue> {
    if op.is_logical() {
        let (a, b) = (a.as_bool(), b.as_bool());
        return Some(ScalarValue::Bool(match op {
            BinaryOp::And => a && b,
            _ => a || b,
        }));
    }
    if operand.is_floating() {
        let (x, y) = (a.as_f64(), b.as_f64());
        return Some(match op {
            BinaryOp::Add => ScalarValue::Float(x + y),
            BinaryOp::Sub => ScalarValue::Float(x - y),
            BinaryOp::Mul => ScalarValue::Float(x * y),
            BinaryOp::Div => ScalarValue::Float(x / y),
            BinaryOp::Rem => ScalarValue::Float(x % y),
            _ => ScalarValue::Bool(compare(op, x.partial_cmp(&y))),
        });
    }
    let (x, y) = (a.as_i64(), b.as_i64());
    Some(match op {
        BinaryOp::Add => ScalarValue::Int(x.wrapping_add(y)),
        BinaryOp::Sub => ScalarValue::Int(x.wrapping_sub(y)),
        BinaryOp::Mul => ScalarValue::Int(x.wrapping_mul(y)),
        BinaryOp::Div => ScalarValue::Int(x.checked_div(y).or_else(|| (y != 0).then(|| x.wrapping_div(y)))?),
        BinaryOp::Rem => ScalarValue::Int(x.checked_rem(y).or_else(|| (y != 0).then(|| x.wrapping_rem(y)))?),
        _ => ScalarValue::Bool(compare(op, Some(x.cmp(&y)))),
    })
}

/// Unordered (NaN) operands compare unequal to everything.
fn compare(op: BinaryOp, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match (op, ordering) {
        (BinaryOp::Ne, None) => true,
        (_, None) => false,
        (BinaryOp::Eq, Some(o)) => o == Equal,
        (BinaryOp::Ne, Some(o)) => o != Equal,
        (BinaryOp::Lt, Some(o)) => o == Less,
        (BinaryOp::Le, Some(o)) => o != Greater,
        (BinaryOp::Gt, Some(o)) => o == Greater,
        (BinaryOp::Ge, Some(o)) => o != Less,
        _ => false,
    }
}

fn call(func: Builtin, args: &[ScalarValue], kind: ScalarKind) -> ScalarValue {
    if kind.is_integer() {
        let v: Vec<i64> = args.iter().map(|a| a.as_i64()).collect();
        return ScalarValue::Int(match func {
            Builtin::Min => v[0].min(v[1]),
            Builtin::Max => v[0].max(v[1]),
            Builtin::Clamp => v[0].max(v[1]).min(v[2]),
            Builtin::Fma => v[0].wrapping_mul(v[1]).wrapping_add(v[2]),
            Builtin::Pow | Builtin::Atan2 => v[0],
        });
    }
    let v: Vec<f64> = args.iter().map(|a| a.as_f64()).collect();
    ScalarValue::Float(match func {
        Builtin::Min => v[0].min(v[1]),
        Builtin::Max => v[0].max(v[1]),
        Builtin::Pow => v[0].powf(v[1]),
        Builtin::Atan2 => v[0].atan2(v[1]),
        Builtin::Fma => v[0].mul_add(v[1], v[2]),
        Builtin::Clamp => v[0].max(v[1]).min(v[2]),
    })
}

/// Per-dispatch views of the bound arguments, indexed by slot.
struct Inputs<'a> {
    buffers: Vec<Option<&'a HostData>>,
    params: &'a [Option<ScalarValue>],
}

/// A dispatch waiting for [`ComputeDevice::synchronize`].
struct Pending {
    kernel: String,
    program: HostProgram,
    buffers: Vec<Option<BufferRef>>,
    /// Parameter values captured at enqueue.
    params: Vec<Option<ScalarValue>>,
    work: WorkSize,
}

/// CPU device with rayon-parallel dispatch.
pub struct HostDevice {
    capabilities: DeviceCapabilities,
    options: HostOptions,
    pending: Mutex<Vec<Pending>>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::with_options(HostOptions::default())
    }

    pub fn with_options(options: HostOptions) -> Self {
        Self {
            capabilities: DeviceCapabilities {
                name: "host".to_string(),
                preferred_dialect: Dialect::OpenCl,
                supports_double: true,
                supports_int64: true,
                max_vector_width: 16,
                max_kernel_args: options.max_kernel_args,
                max_workgroup_size: 1024,
            },
            options,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Dispatches queued and not yet synchronized.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn run(&self, pending: &Pending) -> Result<()> {
        let guards: Vec<_> = pending.buffers.iter().map(|b| b.as_ref().map(|b| b.read())).collect();
        let inputs = Inputs {
            buffers: guards.iter().map(|g| g.as_deref()).collect(),
            params: &pending.params,
        };

        let elements = pending.work.elements;
        let program = &pending.program;
        let kernel = pending.kernel.as_str();
        let values: Vec<Vec<ScalarValue>> = if elements < self.options.parallel_threshold {
            // Below threshold - evaluate sequentially
            (0..elements)
                .map(|e| program.eval(kernel, e, &inputs))
                .collect::<Result<_>>()?
        } else {
            (0..elements)
                .into_par_iter()
                .map(|e| program.eval(kernel, e, &inputs))
                .collect::<Result<_>>()?
        };
        drop(inputs);
        drop(guards);

        // Lock and check every destination before the first store so a
        // failed dispatch leaves no partial result.
        let mut slots: Vec<usize> = program.outputs.iter().map(|o| o.slot).collect();
        slots.sort_unstable();
        slots.dedup();
        let mut targets = Vec::with_capacity(slots.len());
        for &slot in &slots {
            let Some(buffer) = &pending.buffers[slot] else {
                return Err(Error::dispatch(kernel, format!("output slot {slot} is not a buffer")));
            };
            let data = buffer.write();
            if data.len() < elements {
                return Err(Error::dispatch(
                    kernel,
                    format!(
                        "destination in slot {slot} holds {} elements, dispatch covers {elements}",
                        data.len()
                    ),
                ));
            }
            targets.push(data);
        }

        for (k, output) in program.outputs.iter().enumerate() {
            let Ok(target) = slots.binary_search(&output.slot) else {
                return Err(Error::dispatch(kernel, format!("output slot {} was not locked", output.slot)));
            };
            let data = &mut targets[target];
            for (element, row) in values.iter().enumerate() {
                let stored = data.store(element, row[k]);
                debug_assert!(stored, "destination length checked above");
            }
        }
        trace!(kernel, elements, "host dispatch complete");
        Ok(())
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeDevice for HostDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn compile(&self, plan: &KernelPlan) -> Result<Program> {
        HostProgram::lower(plan).map(Program::Host)
    }

    fn enqueue(&self, kernel: &CompiledKernel, args: &[ArgBinding], work: WorkSize) -> Result<()> {
        let program = match &kernel.program {
            Program::Host(program) => program.clone(),
            #[cfg(feature = "gpu")]
            _ => {
                return Err(Error::dispatch(&kernel.name, "kernel was compiled for a different device"));
            }
        };
        let precision = kernel.config.precision;
        let mut buffers = Vec::with_capacity(args.len());
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                ArgBinding::Buffer(buffer) => {
                    buffers.push(Some(buffer.clone()));
                    params.push(None);
                }
                ArgBinding::Parameter(parameter) => {
                    buffers.push(None);
                    params.push(Some(parameter.value().cast(parameter.kind().resolve(precision))));
                }
            }
        }
        self.pending.lock().push(Pending {
            kernel: kernel.name.clone(),
            program,
            buffers,
            params,
            work,
        });
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        let queue = std::mem::take(&mut *self.pending.lock());
        let total = queue.len();
        for (n, pending) in queue.iter().enumerate() {
            if let Err(err) = self.run(pending) {
                let discarded = total - n - 1;
                if discarded > 0 {
                    warn!(kernel = %pending.kernel, discarded, "dispatch failed, discarding queued work");
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use tessera_foundation::MemoryBuffer;
    use tessera_ir::{KernelConfig, Parameter, ops};

    use super::*;
    use crate::compiler::Output;
    use crate::engine::ExecutionContext;

    fn run(outputs: &[Output]) -> Result<()> {
        let mut ctx = ExecutionContext::host();
        let kernel = ctx.compile(outputs)?;
        ctx.dispatch(&kernel)
    }

    #[test]
    fn outputs_see_pre_dispatch_inputs() {
        let u = MemoryBuffer::from_vec(vec![1.0f32, 2.0, 3.0]);
        let v = MemoryBuffer::from_vec(vec![10.0f32, 20.0, 30.0]);
        run(&[Output::new(&u, ops::buffer(&v)), Output::new(&v, ops::buffer(&u))]).unwrap();
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![10.0, 20.0, 30.0]);
        assert_eq!(v.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn stencil_offsets_read_neighbours() {
        let u = MemoryBuffer::from_vec(vec![0.0f32, 1.0, 4.0, 9.0, 16.0]);
        let out = MemoryBuffer::new(ScalarKind::Float, 3).unwrap();
        let lap = ops::sub(
            &ops::add(&ops::buffer_at(&u, 0), &ops::buffer_at(&u, 2)).unwrap(),
            &ops::mul(&ops::float(2.0), &ops::buffer_at(&u, 1)).unwrap(),
        )
        .unwrap();
        run(&[Output::new(&out, lap)]).unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn out_of_bounds_loads_fail_dispatch() {
        let u = MemoryBuffer::from_vec(vec![1.0f32; 4]);
        let err = run(&[Output::new(&u, ops::buffer_at(&u, 1))]).unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn integer_arithmetic_wraps_and_division_by_zero_fails() {
        let a = MemoryBuffer::from_vec(vec![i32::MAX, 7]);
        run(&[Output::new(&a, ops::add(&ops::buffer(&a), &ops::int(1)).unwrap())]).unwrap();
        assert_eq!(a.to_vec::<i32>().unwrap(), vec![i32::MIN, 8]);

        let b = MemoryBuffer::from_vec(vec![4i32, 0]);
        let err = run(&[Output::new(&a, ops::div(&ops::buffer(&a), &ops::buffer(&b)).unwrap())]).unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
    }

    #[test]
    fn mixed_kinds_promote() {
        let n = MemoryBuffer::from_vec(vec![1i32, 2, 3]);
        let x = MemoryBuffer::from_vec(vec![0.5f32; 3]);
        let sum = ops::add(&ops::buffer(&n), &ops::buffer(&x)).unwrap();
        run(&[Output::new(&x, sum)]).unwrap();
        assert_eq!(x.to_vec::<f32>().unwrap(), vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn select_and_builtins() {
        let x = MemoryBuffer::from_vec(vec![-2.0f64, 0.5, 3.0]);
        let clamped = ops::clamp(&ops::buffer(&x), &ops::double(0.0), &ops::double(1.0)).unwrap();
        let positive = ops::gt(&ops::buffer(&x), &ops::double(0.0)).unwrap();
        let value = ops::select(&positive, &clamped, &ops::double(-1.0)).unwrap();
        run(&[Output::new(&x, value)]).unwrap();
        assert_eq!(x.to_vec::<f64>().unwrap(), vec![-1.0, 0.5, 1.0]);
    }

    #[test]
    fn transcendental_results_round_to_the_destination() {
        let x = MemoryBuffer::from_vec(vec![0.25f32, 1.0]);
        run(&[Output::new(&x, ops::sqrt(&ops::buffer(&x)).unwrap())]).unwrap();
        let got = x.to_vec::<f32>().unwrap();
        assert_relative_eq!(got[0], 0.5);
        assert_relative_eq!(got[1], 1.0);
    }

    #[test]
    fn parameters_are_captured_at_enqueue() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 2]);
        let p = Parameter::real(1.0);
        let mut ctx = ExecutionContext::host();
        let kernel = ctx.compile(&[Output::new(&u, ops::param(&p))]).unwrap();
        ctx.enqueue(&kernel).unwrap();
        p.set(ScalarValue::Float(5.0));
        ctx.synchronize().unwrap();
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn large_dispatches_run_in_parallel_with_identical_results() {
        let n = 10_000;
        let input: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let a = MemoryBuffer::from_vec(input.clone());
        let out = MemoryBuffer::new(ScalarKind::Float, n).unwrap();
        let device = HostDevice::with_options(HostOptions {
            parallel_threshold: 16,
            ..HostOptions::default()
        });
        let mut ctx = ExecutionContext::with_config(Box::new(device), KernelConfig::default()).unwrap();
        let value = ops::mul(&ops::buffer(&a), &ops::float(2.0)).unwrap();
        let kernel = ctx.compile(&[Output::new(&out, value)]).unwrap();
        ctx.dispatch(&kernel).unwrap();
        let expected: Vec<f32> = input.iter().map(|x| x * 2.0).collect();
        assert_eq!(out.to_vec::<f32>().unwrap(), expected);
    }

    #[test]
    fn raw_nodes_do_not_lower() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 2]);
        let raw = ops::raw("native_sin({0})", ScalarKind::Float, &[ops::buffer(&u)]).unwrap();
        let err = run(&[Output::new(&u, raw)]).unwrap_err();
        assert!(matches!(err, Error::Compilation { .. }));
    }

    #[test]
    fn failed_dispatch_writes_no_destination() {
        let a = MemoryBuffer::from_vec(vec![1.0f32, 2.0, 3.0, 4.0]);
        let u = MemoryBuffer::from_vec(vec![0.0f32; 4]);
        let v = MemoryBuffer::from_vec(vec![0.0f32; 4]);
        let mut ctx = ExecutionContext::host();
        let inc = ops::add(&ops::buffer(&a), &ops::float(1.0)).unwrap();
        let kernel = ctx
            .compile(&[Output::new(&u, inc), Output::new(&v, ops::buffer(&a))])
            .unwrap();
        ctx.enqueue(&kernel).unwrap();
        v.resize(2).unwrap();

        let err = ctx.synchronize().unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![0.0; 4]);
        assert_eq!(v.to_vec::<f32>().unwrap(), vec![0.0; 2]);
    }

    #[test]
    fn missing_parameter_values_fail_dispatch() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 2]);
        let p = Parameter::real(1.0);
        let plan = KernelPlan::build(&[Output::new(&u, ops::param(&p))], &KernelConfig::default()).unwrap();
        let program = HostProgram::lower(&plan).unwrap();
        let data = u.read();
        let inputs = Inputs {
            buffers: vec![Some(&*data), None],
            params: &[None, None],
        };
        let err = program.eval("k", 0, &inputs).unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
    }

    #[test]
    fn rebinding_between_deferred_dispatches_keeps_queued_arguments() {
        let u = MemoryBuffer::from_vec(vec![1.0f32; 2]);
        let w = MemoryBuffer::from_vec(vec![10.0f32; 2]);
        let mut ctx = ExecutionContext::host();
        let inc = ops::add(&ops::buffer(&u), &ops::float(1.0)).unwrap();
        let mut kernel = ctx.compile(&[Output::new(&u, inc)]).unwrap();

        ctx.enqueue(&kernel).unwrap();
        kernel.bind_buffer(0, &w).unwrap();
        ctx.enqueue(&kernel).unwrap();
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![1.0; 2]);

        ctx.synchronize().unwrap();
        assert_eq!(u.to_vec::<f32>().unwrap(), vec![2.0; 2]);
        assert_eq!(w.to_vec::<f32>().unwrap(), vec![11.0; 2]);
    }
}

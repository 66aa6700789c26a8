//! Source rendering.
//!
//! A [`Renderer`] walks a graph under one [`KernelConfig`] and produces
//! source fragments. Fragments are memoized by node identity for the
//! lifetime of the renderer, so a node shared by several outputs is
//! rendered once. Nodes flagged for hoisting are emitted as local
//! declarations in first-use order and referenced by name afterwards.
//!
//! Operands are coerced to the kind the promotion table assigns. The
//! target dialect's own implicit conversions are never relied on.

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use tessera_foundation::{MemoryBuffer, ScalarKind, ScalarValue};

use crate::config::{Dialect, KernelConfig};
use crate::node::{BinaryOp, Builtin, Expr, NodeId, NodeKind, Parameter, UnaryOp};
use crate::types;

/// Index variable of a scalar kernel.
pub const INDEX_VAR: &str = "i";
/// First element handled by a vectorized work item.
pub const BASE_VAR: &str = "b";

/// Texts the trigonometric shortcut treats as zero. The match is purely
/// textual.
pub const ZERO_LITERALS: [&str; 6] = ["0", "-0", "0.0", "-0.0", "0.0f", "-0.0f"];

pub fn is_zero_literal(text: &str) -> bool {
    ZERO_LITERALS.contains(&text)
}

/// A rendered fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Index-independent: no buffer load or index below it. Uniform values
    /// stay scalar in vectorized kernels.
    pub uniform: bool,
}

/// Argument names of buffers and parameters inside a kernel.
pub trait Symbols {
    fn buffer_name(&self, buffer: &MemoryBuffer) -> Option<String>;
    fn parameter_name(&self, parameter: &Parameter) -> Option<String>;
}

pub struct Renderer<'a> {
    config: &'a KernelConfig,
    symbols: Option<&'a dyn Symbols>,
    memo: IndexMap<NodeId, Rendered>,
    hoist: IndexSet<NodeId>,
    declarations: Vec<String>,
    inline: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a KernelConfig) -> Self {
        Self {
            config,
            symbols: None,
            memo: IndexMap::new(),
            hoist: IndexSet::new(),
            declarations: Vec::new(),
            inline: false,
        }
    }

    /// A renderer that ignores hoisting and produces one self-contained
    /// fragment per call.
    pub fn inline(config: &'a KernelConfig) -> Self {
        Self {
            inline: true,
            ..Self::new(config)
        }
    }

    pub fn with_symbols(mut self, symbols: &'a dyn Symbols) -> Self {
        self.symbols = Some(symbols);
        self
    }

    /// Declare these nodes as locals on first use, in addition to nodes
    /// built with [`Expr::hoisted`].
    pub fn hoist(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.hoist.extend(ids);
    }

    pub fn config(&self) -> &KernelConfig {
        self.config
    }

    pub fn declarations(&self) -> &[String] {
        &self.declarations
    }

    pub fn take_declarations(&mut self) -> Vec<String> {
        std::mem::take(&mut self.declarations)
    }

    pub fn render(&mut self, expr: &Expr) -> Rendered {
        let id = expr.id();
        if let Some(done) = self.memo.get(&id) {
            return done.clone();
        }
        let mut rendered = self.render_node(expr);
        if !self.inline && !expr.is_leaf() && (expr.is_hoisted() || self.hoist.contains(&id)) {
            let name = format!("t{}", self.declarations.len());
            let declaration = match self.config.dialect {
                Dialect::OpenCl => format!(
                    "const {} {name} = {};",
                    self.value_type(expr.ty(), rendered.uniform),
                    rendered.text
                ),
                Dialect::Wgsl => format!("let {name} = {};", rendered.text),
            };
            trace!(node = ?id, local = %name, "hoisted shared node");
            self.declarations.push(declaration);
            rendered.text = name;
        }
        self.memo.insert(id, rendered.clone());
        rendered
    }

    /// Render `expr` as a value of kind `target`. Literals are re-emitted in
    /// the target kind instead of being wrapped in a conversion.
    pub fn coerce(&mut self, expr: &Expr, target: ScalarKind) -> Rendered {
        let precision = self.config.precision;
        if expr.ty().resolve(precision) == target.resolve(precision) {
            return self.render(expr);
        }
        if let Some(value) = expr.as_literal() {
            return Rendered {
                text: self.literal_text(cast_value(value, target), target),
                uniform: true,
            };
        }
        let rendered = self.render(expr);
        self.convert(&rendered, expr.ty(), target)
    }

    /// Widen a uniform scalar to the vector type of `kind`. Non-uniform
    /// values and scalar kernels pass through.
    pub fn splat(&self, value: &Rendered, kind: ScalarKind) -> String {
        if !self.config.is_vectorized() || !value.uniform {
            return value.text.clone();
        }
        let ty = self.config.type_name(kind);
        match self.config.dialect {
            Dialect::OpenCl if kind == ScalarKind::Bool => format!("(({ty})(-({})))", value.text),
            Dialect::OpenCl => format!("(({ty})({}))", value.text),
            Dialect::Wgsl => format!("{ty}({})", value.text),
        }
    }

    /// Literal text of `value` as kind `kind`.
    pub fn literal_text(&self, value: ScalarValue, kind: ScalarKind) -> String {
        let dialect = self.config.dialect;
        match kind.resolve(self.config.precision) {
            ScalarKind::Bool => value.as_bool().to_string(),
            ScalarKind::Int => match dialect {
                Dialect::OpenCl => value.as_i64().to_string(),
                Dialect::Wgsl => format!("{}i", value.as_i64()),
            },
            ScalarKind::UInt => format!("{}u", value.as_i64()),
            ScalarKind::Long => match dialect {
                Dialect::OpenCl => format!("{}L", value.as_i64()),
                Dialect::Wgsl => value.as_i64().to_string(),
            },
            ScalarKind::Float => {
                let v = value.as_f64() as f32;
                if v.is_finite() {
                    format!("{}f", float_digits(f64::from(v), format!("{v:?}")))
                } else {
                    non_finite(dialect, f64::from(v))
                }
            }
            _ => {
                let v = value.as_f64();
                if v.is_finite() {
                    float_digits(v, format!("{v:?}"))
                } else {
                    non_finite(dialect, v)
                }
            }
        }
    }

    fn value_type(&self, kind: ScalarKind, uniform: bool) -> String {
        if uniform {
            self.config.scalar_type_name(kind).to_string()
        } else {
            self.config.type_name(kind)
        }
    }

    fn is_vector(&self, value: &Rendered) -> bool {
        self.config.is_vectorized() && !value.uniform
    }

    fn render_node(&mut self, expr: &Expr) -> Rendered {
        match expr.kind() {
            NodeKind::Literal(value) => Rendered {
                text: self.literal_text(*value, expr.ty()),
                uniform: true,
            },
            NodeKind::Parameter(parameter) => self.render_parameter(parameter),
            NodeKind::Buffer { buffer, offset } => Rendered {
                text: self.render_load(buffer, *offset),
                uniform: false,
            },
            NodeKind::Index => Rendered {
                text: self.render_index(),
                uniform: false,
            },
            NodeKind::Unary { op, arg } => self.render_unary(*op, arg, expr.ty()),
            NodeKind::Binary { op, lhs, rhs } => self.render_binary(*op, lhs, rhs),
            NodeKind::Select {
                cond,
                on_true,
                on_false,
            } => self.render_select(cond, on_true, on_false, expr.ty()),
            NodeKind::Convert { arg } => {
                let rendered = self.render(arg);
                self.convert(&rendered, arg.ty(), expr.ty())
            }
            NodeKind::Call { func, args } => self.render_call(*func, args, expr.ty()),
            NodeKind::Raw { template, args } => {
                let rendered: Vec<Rendered> = args.iter().map(|a| self.render(a)).collect();
                let texts: Vec<&str> = rendered.iter().map(|r| r.text.as_str()).collect();
                Rendered {
                    text: substitute(template, &texts),
                    uniform: rendered.iter().all(|r| r.uniform),
                }
            }
        }
    }

    fn render_parameter(&self, parameter: &Parameter) -> Rendered {
        let name = self
            .symbols
            .and_then(|s| s.parameter_name(parameter))
            .unwrap_or_else(|| format!("param{}", parameter.id().raw()));
        // Booleans travel as 32-bit integers.
        let text = match (parameter.kind(), self.config.dialect) {
            (ScalarKind::Bool, Dialect::OpenCl) => format!("({name} != 0)"),
            (ScalarKind::Bool, Dialect::Wgsl) => format!("({name} != 0u)"),
            _ => name,
        };
        Rendered { text, uniform: true }
    }

    fn render_load(&self, buffer: &MemoryBuffer, offset: i64) -> String {
        let name = self
            .symbols
            .and_then(|s| s.buffer_name(buffer))
            .unwrap_or_else(|| format!("buf{}", buffer.id().raw()));
        let width = self.config.vector_width;
        if width == 1 {
            return format!("{name}[{}]", offset_expr(INDEX_VAR, offset));
        }
        match self.config.dialect {
            Dialect::OpenCl => format!("vload{width}(0, {name} + {})", offset_expr(BASE_VAR, offset)),
            Dialect::Wgsl => {
                let lanes: Vec<String> = (0..i64::from(width))
                    .map(|k| format!("{name}[{}]", offset_expr(BASE_VAR, offset + k)))
                    .collect();
                format!("{}({})", self.config.type_name(buffer.kind()), lanes.join(", "))
            }
        }
    }

    fn render_index(&self) -> String {
        let width = self.config.vector_width;
        if width == 1 {
            return INDEX_VAR.to_string();
        }
        let lanes: Vec<String> = (0..width).map(|k| k.to_string()).collect();
        let ty = self.config.type_name(ScalarKind::Int);
        match self.config.dialect {
            Dialect::OpenCl => format!("({BASE_VAR} + (({ty})({})))", lanes.join(", ")),
            Dialect::Wgsl => format!("({BASE_VAR} + {ty}({}))", lanes.join(", ")),
        }
    }

    fn render_unary(&mut self, op: UnaryOp, arg: &Expr, ty: ScalarKind) -> Rendered {
        let a = self.render(arg);
        let text = match op {
            UnaryOp::Neg => format!("(-({}))", a.text),
            UnaryOp::Not => format!("(!({}))", a.text),
            UnaryOp::Abs => self.render_abs(&a, ty),
            UnaryOp::Sin if is_zero_literal(&a.text) => self.literal_text(ScalarValue::Float(0.0), ty),
            UnaryOp::Cos if is_zero_literal(&a.text) => self.literal_text(ScalarValue::Float(1.0), ty),
            _ => format!("{}({})", op.name(), a.text),
        };
        Rendered {
            text,
            uniform: a.uniform,
        }
    }

    fn render_abs(&self, a: &Rendered, ty: ScalarKind) -> String {
        if self.config.dialect == Dialect::Wgsl {
            return format!("abs({})", a.text);
        }
        match ty.resolve(self.config.precision) {
            ScalarKind::UInt => a.text.clone(),
            // OpenCL integer abs returns the unsigned type.
            ScalarKind::Int | ScalarKind::Long if self.is_vector(a) => {
                format!("convert_{}(abs({}))", self.config.type_name(ty), a.text)
            }
            ScalarKind::Int | ScalarKind::Long => {
                format!("(({})abs({}))", self.config.scalar_type_name(ty), a.text)
            }
            _ => format!("fabs({})", a.text),
        }
    }

    fn render_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Rendered {
        let operand = if op.is_logical() {
            ScalarKind::Bool
        } else {
            types::promote(lhs.ty(), rhs.ty()).unwrap_or(lhs.ty())
        };
        let a = self.coerce(lhs, operand);
        let b = self.coerce(rhs, operand);
        let uniform = a.uniform && b.uniform;
        let vector = self.config.is_vectorized() && !uniform;
        let dialect = self.config.dialect;

        let text = if vector && dialect == Dialect::Wgsl && (op.is_comparison() || op.is_logical()) {
            let symbol = match op {
                BinaryOp::And => "&",
                BinaryOp::Or => "|",
                _ => op.symbol(),
            };
            format!("({} {symbol} {})", self.splat(&a, operand), self.splat(&b, operand))
        } else if vector && op.is_comparison() && operand.size_bytes(self.config.precision) == 8 {
            // 64-bit comparisons yield longN; boolean lanes are intN.
            format!(
                "convert_int{}({} {} {})",
                self.config.vector_width,
                a.text,
                op.symbol(),
                b.text
            )
        } else {
            format!("({} {} {})", a.text, op.symbol(), b.text)
        };
        Rendered { text, uniform }
    }

    fn render_select(&mut self, cond: &Expr, on_true: &Expr, on_false: &Expr, ty: ScalarKind) -> Rendered {
        let c = self.render(cond);
        let t = self.coerce(on_true, ty);
        let f = self.coerce(on_false, ty);
        let uniform = c.uniform && t.uniform && f.uniform;
        let text = if !self.config.is_vectorized() || uniform {
            match self.config.dialect {
                Dialect::OpenCl => format!("({} ? {} : {})", c.text, t.text, f.text),
                Dialect::Wgsl => format!("select({}, {}, {})", f.text, t.text, c.text),
            }
        } else {
            let (t, f) = (self.splat(&t, ty), self.splat(&f, ty));
            let mask = match self.config.dialect {
                Dialect::OpenCl => self.select_mask(&c, ty),
                // WGSL accepts a scalar condition with vector branches.
                Dialect::Wgsl => c.text,
            };
            format!("select({f}, {t}, {mask})")
        };
        Rendered { text, uniform }
    }

    /// OpenCL vector select wants a mask whose lanes match the branch
    /// element size.
    fn select_mask(&self, cond: &Rendered, branch: ScalarKind) -> String {
        let width = self.config.vector_width;
        let wide = branch != ScalarKind::Bool && branch.size_bytes(self.config.precision) == 8;
        let lane = if wide { "long" } else { "int" };
        if cond.uniform {
            format!("(({lane}{width})(-({})))", cond.text)
        } else if wide {
            format!("convert_long{width}({})", cond.text)
        } else {
            cond.text.clone()
        }
    }

    fn render_call(&mut self, func: Builtin, args: &[Expr], ty: ScalarKind) -> Rendered {
        let rendered: Vec<Rendered> = args.iter().map(|a| self.coerce(a, ty)).collect();
        let uniform = rendered.iter().all(|r| r.uniform);
        let texts: Vec<String> = if self.config.is_vectorized() && !uniform {
            rendered.iter().map(|r| self.splat(r, ty)).collect()
        } else {
            rendered.into_iter().map(|r| r.text).collect()
        };
        let floating = ty.is_floating();
        let name = match (self.config.dialect, func) {
            (Dialect::OpenCl, Builtin::Min) if floating => "fmin",
            (Dialect::OpenCl, Builtin::Max) if floating => "fmax",
            _ => func.name(),
        };
        Rendered {
            text: format!("{name}({})", texts.join(", ")),
            uniform,
        }
    }

    fn convert(&self, value: &Rendered, from: ScalarKind, to: ScalarKind) -> Rendered {
        let precision = self.config.precision;
        let (from, to) = (from.resolve(precision), to.resolve(precision));
        if from == to {
            return value.clone();
        }
        let vector = self.is_vector(value);
        let text = match self.config.dialect {
            Dialect::OpenCl if to == ScalarKind::Bool => {
                let zero = self.literal_text(ScalarValue::zero(from), from);
                if vector && from.size_bytes(precision) == 8 {
                    format!("convert_int{}({} != {zero})", self.config.vector_width, value.text)
                } else {
                    format!("({} != {zero})", value.text)
                }
            }
            Dialect::OpenCl if vector => {
                let source = if from == ScalarKind::Bool {
                    format!("-({})", value.text)
                } else {
                    value.text.clone()
                };
                format!("convert_{}({source})", self.config.type_name(to))
            }
            Dialect::OpenCl => format!("(({})({}))", self.config.scalar_type_name(to), value.text),
            Dialect::Wgsl => format!("{}({})", self.value_type(to, value.uniform), value.text),
        };
        Rendered {
            text,
            uniform: value.uniform,
        }
    }
}

impl Expr {
    /// Self-contained source fragment for this node. Hoisting is ignored;
    /// kernel bodies go through [`Renderer`].
    pub fn render(&self, config: &KernelConfig) -> String {
        Renderer::inline(config).render(self).text
    }
}

fn cast_value(value: ScalarValue, kind: ScalarKind) -> ScalarValue {
    match kind {
        ScalarKind::Real => ScalarValue::Float(value.as_f64()),
        other => value.cast(other),
    }
}

/// Integral values keep one decimal, everything else uses the shortest
/// round-trip form.
fn float_digits(value: f64, shortest: String) -> String {
    if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        shortest
    }
}

fn non_finite(dialect: Dialect, value: f64) -> String {
    match dialect {
        Dialect::OpenCl if value.is_nan() => "NAN".into(),
        Dialect::OpenCl if value > 0.0 => "INFINITY".into(),
        Dialect::OpenCl => "(-INFINITY)".into(),
        Dialect::Wgsl if value.is_nan() => "bitcast<f32>(0x7fc00000u)".into(),
        Dialect::Wgsl if value > 0.0 => "bitcast<f32>(0x7f800000u)".into(),
        Dialect::Wgsl => "bitcast<f32>(0xff800000u)".into(),
    }
}

fn offset_expr(var: &str, offset: i64) -> String {
    match offset {
        0 => var.to_string(),
        o if o > 0 => format!("{var} + {o}"),
        o => format!("{var} - {}", o.unsigned_abs()),
    }
}

/// Replace `{N}` with `args[N]` in a single left-to-right pass.
fn substitute(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after
            .split_once('}')
            .and_then(|(digits, tail)| Some((digits.parse::<usize>().ok()?, tail)))
        {
            Some((slot, tail)) if slot < args.len() => {
                out.push_str(args[slot]);
                rest = tail;
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

//! Kernel source emission.
//!
//! Buffers are named `a{slot}` and parameters `p{slot}`. Every output value
//! is computed into a local `s{k}` before any store, so a destination that
//! is also read sees its pre-dispatch contents in every output.
//!
//! WGSL source is compiled by the wgpu backend. No device in this crate
//! compiles the OpenCL C dialect: [`HostDevice`](crate::HostDevice) lowers
//! the plan directly, so OpenCL output is source text for inspection and
//! for external OpenCL runtimes.

use tessera_foundation::{MemoryBuffer, ScalarKind};
use tessera_ir::{BASE_VAR, Dialect, INDEX_VAR, KernelConfig, Parameter, Renderer, Symbols};

use crate::compiler::KernelPlan;
use crate::device::{Access, ArgSlot};

struct SlotNames<'a> {
    plan: &'a KernelPlan,
}

impl Symbols for SlotNames<'_> {
    fn buffer_name(&self, buffer: &MemoryBuffer) -> Option<String> {
        self.plan.buffer_slot(buffer.id()).map(|slot| format!("a{slot}"))
    }

    fn parameter_name(&self, parameter: &Parameter) -> Option<String> {
        let slot = self.plan.param_slot(parameter.id())?;
        Some(match self.plan.config.dialect {
            Dialect::OpenCl => format!("p{slot}"),
            Dialect::Wgsl => format!("params.p{slot}"),
        })
    }
}

/// Rendered body: local declarations followed by one value per output.
struct Body {
    declarations: Vec<String>,
    values: Vec<String>,
}

fn body(plan: &KernelPlan) -> Body {
    let names = SlotNames { plan };
    let mut renderer = Renderer::new(&plan.config).with_symbols(&names);
    renderer.hoist(plan.hoisted.iter().copied());
    let values = plan
        .outputs
        .iter()
        .map(|output| {
            let value = renderer.coerce(&output.source, output.kind);
            renderer.splat(&value, output.kind)
        })
        .collect();
    Body {
        declarations: renderer.take_declarations(),
        values,
    }
}

pub(crate) fn source(plan: &KernelPlan) -> String {
    match plan.config.dialect {
        Dialect::OpenCl => opencl(plan),
        Dialect::Wgsl => wgsl(plan),
    }
}

fn opencl(plan: &KernelPlan) -> String {
    let config = &plan.config;
    let width = config.vector_width;
    let Body { declarations, values } = body(plan);

    let mut args: Vec<String> = plan
        .slots
        .iter()
        .enumerate()
        .map(|(slot, arg)| match *arg {
            ArgSlot::Buffer { kind, access } => {
                let qualifier = if access == Access::ReadOnly { "const " } else { "" };
                format!("__global {qualifier}{}* a{slot}", config.scalar_type_name(kind))
            }
            ArgSlot::Parameter { kind } => format!("const {} p{slot}", opencl_param_type(config, kind)),
        })
        .collect();
    args.push("const int n".to_string());

    let mut out = String::new();
    if plan.uses_double {
        out.push_str("#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n\n");
    }
    out.push_str(&format!("__kernel void {}({})\n{{\n", plan.name, args.join(", ")));
    out.push_str(&format!("    const int {INDEX_VAR} = (int)get_global_id(0);\n"));
    out.push_str(&format!("    if ({INDEX_VAR} >= n) {{\n        return;\n    }}\n"));
    if config.is_vectorized() {
        out.push_str(&format!("    const int {BASE_VAR} = {INDEX_VAR} * {width};\n"));
    }
    for declaration in &declarations {
        out.push_str(&format!("    {declaration}\n"));
    }
    for (k, (output, value)) in plan.outputs.iter().zip(&values).enumerate() {
        out.push_str(&format!("    const {} s{k} = {value};\n", config.type_name(output.kind)));
    }
    for (k, output) in plan.outputs.iter().enumerate() {
        let slot = output.slot;
        if config.is_vectorized() {
            out.push_str(&format!("    vstore{width}(s{k}, 0, a{slot} + {BASE_VAR});\n"));
        } else {
            out.push_str(&format!("    a{slot}[{INDEX_VAR}] = s{k};\n"));
        }
    }
    out.push_str("}\n");
    out
}

fn opencl_param_type(config: &KernelConfig, kind: ScalarKind) -> &'static str {
    if kind == ScalarKind::Bool {
        "int"
    } else {
        config.scalar_type_name(kind)
    }
}

/// Binding index of the parameter block in WGSL kernels.
pub(crate) fn wgsl_params_binding(plan_slots: usize) -> u32 {
    plan_slots as u32
}

fn wgsl(plan: &KernelPlan) -> String {
    let config = &plan.config;
    let width = config.vector_width;
    let Body { declarations, values } = body(plan);

    let mut out = String::new();
    out.push_str("struct Params {\n");
    for (slot, arg) in plan.slots.iter().enumerate() {
        if let ArgSlot::Parameter { kind } = *arg {
            let ty = if kind == ScalarKind::Bool {
                "u32"
            } else {
                config.scalar_type_name(kind)
            };
            out.push_str(&format!("    p{slot}: {ty},\n"));
        }
    }
    out.push_str("    n: u32,\n}\n\n");

    for (slot, arg) in plan.slots.iter().enumerate() {
        if let ArgSlot::Buffer { kind, access } = *arg {
            let mode = if access == Access::ReadOnly { "read" } else { "read_write" };
            out.push_str(&format!(
                "@group(0) @binding({slot}) var<storage, {mode}> a{slot}: array<{}>;\n",
                config.scalar_type_name(kind)
            ));
        }
    }
    out.push_str(&format!(
        "@group(0) @binding({}) var<storage, read> params: Params;\n\n",
        wgsl_params_binding(plan.slots.len())
    ));

    out.push_str(&format!("@compute @workgroup_size({})\n", config.workgroup_size));
    out.push_str("fn main(@builtin(global_invocation_id) gid: vec3<u32>) {\n");
    out.push_str("    if (gid.x >= params.n) {\n        return;\n    }\n");
    out.push_str(&format!("    let {INDEX_VAR} = i32(gid.x);\n"));
    if config.is_vectorized() {
        out.push_str(&format!("    let {BASE_VAR} = {INDEX_VAR} * {width};\n"));
    }
    for declaration in &declarations {
        out.push_str(&format!("    {declaration}\n"));
    }
    for (k, value) in values.iter().enumerate() {
        out.push_str(&format!("    let s{k} = {value};\n"));
    }
    for (k, output) in plan.outputs.iter().enumerate() {
        let slot = output.slot;
        if config.is_vectorized() {
            for lane in 0..width {
                let index = if lane == 0 {
                    BASE_VAR.to_string()
                } else {
                    format!("{BASE_VAR} + {lane}")
                };
                out.push_str(&format!("    a{slot}[{index}] = s{k}[{lane}];\n"));
            }
        } else {
            out.push_str(&format!("    a{slot}[{INDEX_VAR}] = s{k};\n"));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use tessera_foundation::MemoryBuffer;
    use tessera_ir::{Dialect, KernelConfig, Parameter, ops};

    use crate::compiler::{KernelPlan, Output};

    #[test]
    fn opencl_scalar_kernel() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 16]);
        let v = MemoryBuffer::from_vec(vec![0.0f32; 16]);
        let dt = Parameter::real(0.1);
        let source = ops::add(&ops::buffer(&u), &ops::mul(&ops::param(&dt), &ops::buffer(&v)).unwrap()).unwrap();
        let plan = KernelPlan::build(&[Output::new(&u, source)], &KernelConfig::default()).unwrap();
        let expected = format!(
            "__kernel void {}(__global float* a0, const float p1, __global const float* a2, const int n)\n\
             {{\n    const int i = (int)get_global_id(0);\n    if (i >= n) {{\n        return;\n    }}\n    \
             const float s0 = (a0[i] + (p1 * a2[i]));\n    a0[i] = s0;\n}}\n",
            plan.name
        );
        assert_eq!(plan.source, expected);
    }

    #[test]
    fn opencl_vector_kernel_uses_vstore() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 16]);
        let source = ops::mul(&ops::buffer(&u), &ops::float(2.0)).unwrap();
        let config = KernelConfig::default().with_vector_width(4);
        let plan = KernelPlan::build(&[Output::new(&u, source)], &config).unwrap();
        assert!(plan.source.contains("const int b = i * 4;"));
        assert!(plan.source.contains("const float4 s0 = (vload4(0, a0 + b) * 2.0f);"));
        assert!(plan.source.contains("vstore4(s0, 0, a0 + b);"));
    }

    #[test]
    fn uniform_outputs_are_splatted() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 8]);
        let config = KernelConfig::default().with_vector_width(4);
        let plan = KernelPlan::build(&[Output::new(&u, ops::float(1.0))], &config).unwrap();
        assert!(plan.source.contains("const float4 s0 = ((float4)(1.0f));"));
    }

    #[test]
    fn wgsl_kernel_layout() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 16]);
        let w = MemoryBuffer::from_vec(vec![0.0f32; 16]);
        let flag = Parameter::new(tessera_foundation::ScalarKind::Bool, tessera_foundation::ScalarValue::Bool(true));
        let source = ops::select(&ops::param(&flag), &ops::buffer(&w), &ops::buffer(&u)).unwrap();
        let config = KernelConfig::default().with_dialect(Dialect::Wgsl);
        let plan = KernelPlan::build(&[Output::new(&u, source)], &config).unwrap();
        let src = &plan.source;
        assert!(src.contains("    p1: u32,\n    n: u32,\n"));
        assert!(src.contains("@group(0) @binding(0) var<storage, read_write> a0: array<f32>;"));
        assert!(src.contains("@group(0) @binding(2) var<storage, read> a2: array<f32>;"));
        assert!(src.contains("@group(0) @binding(3) var<storage, read> params: Params;"));
        assert!(src.contains("let s0 = select(a0[i], a2[i], (params.p1 != 0u));"));
        assert!(src.contains("a0[i] = s0;"));
    }

    #[test]
    fn wgsl_vector_stores_per_lane() {
        let u = MemoryBuffer::from_vec(vec![0.0f32; 8]);
        let config = KernelConfig::default()
            .with_dialect(Dialect::Wgsl)
            .with_vector_width(2);
        let source = ops::neg(&ops::buffer(&u)).unwrap();
        let plan = KernelPlan::build(&[Output::new(&u, source)], &config).unwrap();
        assert!(plan.source.contains("let s0 = (-(vec2<f32>(a0[b], a0[b + 1])));"));
        assert!(plan.source.contains("a0[b] = s0[0];"));
        assert!(plan.source.contains("a0[b + 1] = s0[1];"));
    }

    #[test]
    fn double_kernels_enable_fp64() {
        let u = MemoryBuffer::from_vec(vec![0.0f64; 4]);
        let plan = KernelPlan::build(&[Output::new(&u, ops::buffer(&u))], &KernelConfig::default()).unwrap();
        assert!(plan.source.starts_with("#pragma OPENCL EXTENSION cl_khr_fp64 : enable"));
    }
}

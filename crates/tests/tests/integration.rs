//! End-to-end tests on the host backend.
//!
//! These tests exercise the full pipeline:
//! build expressions -> init_all (plan + compile + cache) -> execute_all -> read back

use approx::assert_relative_eq;

use tessera_foundation::{BufferRef, HostData, MemoryBuffer, ScalarKind, ScalarValue, UsageError};
use tessera_gpu::{Error, ErrorKind, ExecutionContext, Output};
use tessera_ir::{KernelConfig, Parameter, VectorExpr, ops};
use tessera_runtime::{FusedAssignment, MaskedBoundary, Phase};
use tessera_tests::{TestHarness, field};

fn axpy(name: &str, y: &BufferRef, x: &BufferRef, a: &Parameter) -> FusedAssignment {
    let value = ops::add(&ops::buffer(y), &ops::mul(&ops::param(a), &ops::buffer(x)).unwrap()).unwrap();
    FusedAssignment::new(name, vec![Output::new(y, value)])
}

/// Independently built graphs of the same shape share one compilation.
#[test]
fn identical_graphs_hit_the_cache() {
    let mut harness = TestHarness::host();
    let (y1, x1) = (field(&[1.0f32; 8]), field(&[2.0f32; 8]));
    let (y2, x2) = (field(&[0.0f32; 8]), field(&[3.0f32; 8]));
    harness
        .push(axpy("first", &y1, &x1, &Parameter::real(0.5)))
        .push(axpy("second", &y2, &x2, &Parameter::real(2.0)));
    harness.init();

    let stats = harness.cache_stats();
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.hits, 1);

    harness.step();
    assert_eq!(harness.read::<f32>(&y1), vec![2.0; 8]);
    assert_eq!(harness.read::<f32>(&y2), vec![6.0; 8]);
}

#[test]
fn config_changes_recompile() {
    let mut harness = TestHarness::host();
    let (y, x) = (field(&[0.0f32; 8]), field(&[1.0f32; 8]));
    let a = Parameter::real(1.0);
    harness
        .push(axpy("scalar", &y, &x, &a))
        .push(axpy("vector", &y, &x, &a).with_config(KernelConfig::default().with_vector_width(4)));
    harness.init();
    assert_eq!(harness.cache_stats().compilations, 2);
    assert_eq!(harness.cache_stats().hits, 0);

    harness.step();
    assert_eq!(harness.read::<f32>(&y), vec![2.0; 8]);
}

/// The second of three methods fails; the third never runs and the engine
/// error reaches the caller unchanged.
#[test]
fn execute_all_stops_at_the_first_failure() {
    let mut harness = TestHarness::host();
    let first = field(&[0.0f32; 4]);
    let (a, b) = (field(&[0.0f32; 4]), field(&[0.0f32; 3]));
    let third = field(&[0.0f32; 4]);
    harness
        .push(FusedAssignment::new("first", vec![Output::new(&first, ops::float(1.0))]))
        .push(FusedAssignment::new(
            "second",
            vec![Output::new(&a, ops::float(2.0)), Output::new(&b, ops::float(2.0))],
        ))
        .push(FusedAssignment::new("third", vec![Output::new(&third, ops::float(3.0))]));
    harness.init();

    let err = harness.try_step().unwrap_err();
    assert_eq!(err.method, "second");
    assert_eq!(err.phase, Phase::Execute);
    assert_eq!(err.kind(), ErrorKind::Binding);
    assert!(err.source.kernel().is_some_and(|k| k.starts_with("tessera_")));
    assert!(err.to_string().contains("destination lengths differ"));

    assert_eq!(harness.read::<f32>(&first), vec![1.0; 4]);
    assert_eq!(harness.read::<f32>(&third), vec![0.0; 4]);
    assert_eq!(harness.steps(), 0);
}

#[test]
fn binding_errors_leave_the_cache_usable() {
    let mut ctx = ExecutionContext::host();
    let u = field(&[1.0f32; 4]);
    let outputs = [Output::new(&u, ops::mul(&ops::buffer(&u), &ops::float(3.0)).unwrap())];
    let mut kernel = ctx.compile(&outputs).unwrap();

    let wrong = field(&[1.0f64; 4]);
    let err = kernel.bind_buffer(0, &wrong).unwrap_err();
    assert!(matches!(err, Error::Binding { .. }));
    let err = kernel.rebind(Vec::new()).unwrap_err();
    assert!(matches!(err, Error::Binding { .. }));

    ctx.dispatch(&kernel).unwrap();
    assert_eq!(ctx.read_back::<f32>(&u).unwrap(), vec![3.0; 4]);

    let again = ctx.compile(&outputs).unwrap();
    assert_eq!(again.signature(), kernel.signature());
    assert_eq!(ctx.cache().stats().compilations, 1);
}

#[test]
fn borrowed_storage_is_written_in_place_and_never_resized() {
    let shared = HostData::shared(vec![1.0f32, 2.0, 3.0]);
    let u = MemoryBuffer::borrowed(shared.clone());

    let mut harness = TestHarness::host();
    let doubled = ops::mul(&ops::buffer(&u), &ops::float(2.0)).unwrap();
    harness.push(FusedAssignment::new("double", vec![Output::new(&u, doubled)]));
    harness.init();
    harness.step();
    assert_eq!(*shared.read(), HostData::Float(vec![2.0, 4.0, 6.0]));

    assert_eq!(u.resize(10), Err(UsageError::ResizeBorrowed { buffer: u.id() }));
    harness.step();
    assert_eq!(*shared.read(), HostData::Float(vec![4.0, 8.0, 12.0]));
}

#[test]
fn parameter_changes_do_not_recompile() {
    let mut harness = TestHarness::host();
    let (y, x) = (field(&[0.0f32; 4]), field(&[1.0f32; 4]));
    let a = Parameter::real(1.0);
    harness.push(axpy("axpy", &y, &x, &a));
    harness.init();
    harness.step();
    a.set(ScalarValue::Float(10.0));
    harness.step();
    assert_eq!(harness.read::<f32>(&y), vec![11.0; 4]);
    assert_eq!(harness.cache_stats().compilations, 1);
}

#[test]
fn deferred_dispatches_complete_at_synchronize() {
    let mut harness = TestHarness::host();
    let u = field(&[1.0f32; 4]);
    let inc = ops::add(&ops::buffer(&u), &ops::float(1.0)).unwrap();
    harness.push(FusedAssignment::new("inc", vec![Output::new(&u, inc)]).deferred());
    harness.init();
    harness.run_steps(3);
    harness.context().synchronize().unwrap();
    assert_eq!(u.to_vec::<f32>().unwrap(), vec![4.0; 4]);
}

/// Forward-Euler integration of a discrete Laplacian with pinned ends.
#[test]
fn stencil_integration_with_boundary() {
    const N: usize = 16;
    let samples: Vec<f32> = (0..N + 2).map(|i| (i * i) as f32).collect();
    let u = field(&samples);
    let lap = field(&[0.0f32; N]);
    let phi = field(&[0.0f32; N]);
    let mut mask = vec![0i32; N];
    mask[0] = 1;
    mask[N - 1] = 1;
    let mask = field(&mask);
    let dt = Parameter::real(0.25);

    let stencil = ops::add(
        &ops::sub(&ops::buffer_at(&u, 0), &ops::mul(&ops::real(2.0), &ops::buffer_at(&u, 1)).unwrap()).unwrap(),
        &ops::buffer_at(&u, 2),
    )
    .unwrap();
    let euler = ops::add(&ops::buffer(&phi), &ops::mul(&ops::param(&dt), &ops::buffer(&lap)).unwrap()).unwrap();

    let mut harness = TestHarness::host();
    harness
        .push(FusedAssignment::new("laplacian", vec![Output::new(&lap, stencil)]))
        .push(FusedAssignment::new("integrate", vec![Output::new(&phi, euler)]))
        .push(MaskedBoundary::new("pin", &[phi.clone()], &mask, &[0.0]).unwrap());
    harness.init();
    harness.run_steps(4);

    let result = harness.read::<f32>(&phi);
    assert_eq!(result[0], 0.0);
    assert_eq!(result[N - 1], 0.0);
    for value in &result[1..N - 1] {
        assert_relative_eq!(*value, 2.0);
    }
    assert_eq!(harness.cache_stats().compilations, 3);
}

#[test]
fn vector_fields_update_component_wise() {
    let (ux, uy) = (field(&[1.0f64, 2.0]), field(&[3.0f64, 4.0]));
    let (fx, fy) = (field(&[0.5f64, 0.5]), field(&[-1.0f64, -1.0]));
    let velocity = VectorExpr::from_buffers(&[ux.clone(), uy.clone()]);
    let force = VectorExpr::from_buffers(&[fx, fy]);
    let dt = ops::real(0.5);
    let update = (&velocity + &(&force * &dt).unwrap()).unwrap();

    let mut harness = TestHarness::host();
    harness.push(FusedAssignment::from_vector("accelerate", &[ux.clone(), uy.clone()], &update).unwrap());
    harness.init();
    harness.step();
    assert_eq!(harness.read::<f64>(&ux), vec![1.25, 2.25]);
    assert_eq!(harness.read::<f64>(&uy), vec![2.5, 3.5]);
}

#[test]
fn mismatched_vector_lengths_fail_at_construction() {
    let a = VectorExpr::from_buffers(&[field(&[0.0f32]), field(&[0.0f32])]);
    let b = VectorExpr::from_buffers(&[field(&[0.0f32])]);
    assert!((&a + &b).is_err());
    assert!(ops::add(&ops::boolean(true), &ops::float(1.0)).is_err());
}

#[test]
fn execute_before_init_is_a_usage_error() {
    let mut harness = TestHarness::host();
    let u = field(&[0.0f32; 2]);
    harness.push(FusedAssignment::new("late", vec![Output::new(&u, ops::float(1.0))]));
    let err = harness.try_step().unwrap_err();
    assert_eq!(err.phase, Phase::Execute);
    assert_eq!(
        err.source,
        Error::Usage(UsageError::NotInitialized {
            method: "late".to_string()
        })
    );
}

#[test]
fn evicted_kernels_fail_to_dispatch() {
    let mut harness = TestHarness::from_json(r#"{ "cache": { "capacity": 1 } }"#);
    let (a, b) = (field(&[0.0f32; 2]), field(&[0i32; 2]));
    harness
        .push(FusedAssignment::new("float", vec![Output::new(&a, ops::float(1.0))]))
        .push(FusedAssignment::new("int", vec![Output::new(&b, ops::int(1))]));
    harness.init();
    assert_eq!(harness.cache_stats().evictions, 1);

    let err = harness.try_step().unwrap_err();
    assert_eq!(err.method, "float");
    assert_eq!(err.kind(), ErrorKind::Dispatch);
    assert!(err.to_string().contains("evicted"));
}

#[test]
fn unsupported_kinds_fail_compilation_at_init() {
    let u = field(&[0i64; 2]);
    let config = KernelConfig {
        supports_int64: false,
        ..KernelConfig::default()
    };
    let mut harness = TestHarness::host();
    harness.push(FusedAssignment::new("long", vec![Output::new(&u, ops::long(1))]).with_config(config));
    let err = harness.try_init().unwrap_err();
    assert_eq!(err.phase, Phase::Init);
    assert_eq!(err.kind(), ErrorKind::Compilation);
    assert_eq!(ScalarKind::Long, u.kind());
}

#[test]
fn failed_deferred_dispatch_leaves_every_destination_untouched() {
    let source = field(&[1.0f32, 2.0, 3.0, 4.0]);
    let (u, v) = (field(&[0.0f32; 4]), field(&[0.0f32; 4]));
    let inc = ops::add(&ops::buffer(&source), &ops::float(1.0)).unwrap();

    let mut harness = TestHarness::host();
    harness.push(
        FusedAssignment::new("split", vec![Output::new(&u, inc), Output::new(&v, ops::buffer(&source))]).deferred(),
    );
    harness.init();
    harness.step();
    v.resize(2).unwrap();

    let err = harness.context().synchronize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dispatch);
    assert_eq!(u.to_vec::<f32>().unwrap(), vec![0.0; 4]);
    assert_eq!(v.to_vec::<f32>().unwrap(), vec![0.0; 2]);

    v.resize(4).unwrap();
    harness.step();
    harness.context().synchronize().unwrap();
    assert_eq!(u.to_vec::<f32>().unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
    assert_eq!(v.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

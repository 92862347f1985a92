//! 调用分派性能基准测试
//!
//! 测试值编组、native 调用分派与脚本入口点调用的开销

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use script_bridge::bindings::{
    HandleTable, NativeObject, NativeSymbol, NativeValue, PrimitiveType, RegistryBuilder, Scope,
    ScriptValue, ValueMarshaler, ValueType,
};
use script_bridge::config::ScriptingConfig;
use script_bridge::scripting::{
    register_engine_api, CallDispatcher, EngineServices, ScriptRuntime, SAMPLE_SCRIPT,
};
use std::hint::black_box;
use std::sync::Arc;

fn bench_marshaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshaling");

    let number = ScriptValue::Integer(42);
    let string = ScriptValue::from("MyNativeBinding");

    group.bench_function("integer_to_number", |b| {
        b.iter(|| black_box(ValueMarshaler::to_native(&number, &ValueType::Number)))
    });

    group.bench_function("string", |b| {
        b.iter(|| black_box(ValueMarshaler::to_native(&string, &ValueType::String)))
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    let mut builder = RegistryBuilder::new();
    builder
        .register(
            NativeSymbol::function("sum", vec![PrimitiveType::Number; 3], ValueType::Number),
            |call| Ok(NativeValue::Number(call.number(0)? + call.number(1)? + call.number(2)?)),
        )
        .unwrap()
        .register(NativeSymbol::factory("Cell", "New", vec![]), |_| {
            Ok(NativeValue::Object(NativeObject::new(0u64)))
        })
        .unwrap()
        .register(
            NativeSymbol::method("Cell", "get", vec![], ValueType::Number),
            |call| Ok(NativeValue::Integer(*call.receiver::<u64>()? as i64)),
        )
        .unwrap();
    let dispatcher = CallDispatcher::new(Arc::new(builder.build()), Arc::new(HandleTable::new()));
    let args = [ScriptValue::Integer(10), ScriptValue::Integer(20), ScriptValue::Integer(30)];

    group.bench_function("free_function", |b| {
        b.iter(|| black_box(dispatcher.invoke("sum", &Scope::Global, None, &args)))
    });

    let cell = Scope::class("Cell");
    let handle = dispatcher
        .invoke("New", &cell, None, &[])
        .unwrap()
        .as_handle()
        .unwrap();
    group.bench_function("instance_method", |b| {
        b.iter(|| black_box(dispatcher.invoke("get", &cell, Some(handle), &[])))
    });

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");

    for script_count in [1usize, 8, 32].iter() {
        let services = EngineServices::new();
        let mut builder = RegistryBuilder::new();
        register_engine_api(&mut builder, &services).unwrap();
        let runtime = ScriptRuntime::from_builder(builder, ScriptingConfig::default()).unwrap();
        let mut driver = runtime.frame_driver();
        for i in 0..*script_count {
            driver.load(runtime.load_js(&format!("sample_{}.js", i), SAMPLE_SCRIPT).unwrap());
        }
        services.input().press("A");

        group.bench_with_input(
            BenchmarkId::from_parameter(script_count),
            script_count,
            |b, _| {
                b.iter(|| {
                    let report = driver.tick_all(0.016);
                    services.drain_commands();
                    black_box(report)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_marshaling, bench_dispatch, bench_frame);
criterion_main!(benches);

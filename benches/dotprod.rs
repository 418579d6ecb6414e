use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput};
use polyshare::{
    preprocessing::Preprocessor,
    protocol::{Protocol, simulate_dot_product},
};
use tokio::runtime::Runtime;

pub fn dotprod_benchmarks(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    bench_backends(c, &rt);
    bench_vector_length(c, &rt);
}

/// Benchmark every backend on the same 3-party dot product.
fn bench_backends(c: &mut Criterion, rt: &Runtime) {
    let len = 1000;
    let inputs: Vec<Vec<u128>> = (0..3).map(|_| (0..len).collect()).collect();
    let expected: u128 = (0..len).map(|x| x * x).sum();

    let mut g = c.benchmark_group("dot product backends");
    g.throughput(Throughput::Elements(len as u64));
    for protocol in Protocol::ALL {
        g.bench_function(protocol.name(), |b| {
            b.to_async(rt).iter_custom(|iters| {
                let inputs = inputs.clone();
                async move {
                    let mut elapsed = Duration::default();
                    for _ in 0..iters {
                        let now = Instant::now();
                        let results =
                            simulate_dot_product(protocol, None, Preprocessor::SharedSeed, &inputs)
                                .await
                                .expect("dot product failed");
                        elapsed += now.elapsed();
                        assert_eq!(results[0], expected);
                    }
                    elapsed
                }
            })
        });
    }
    g.finish();
}

/// Benchmark MASCOT with a trusted dealer for growing vectors, the number of rounds stays constant.
fn bench_vector_length(c: &mut Criterion, rt: &Runtime) {
    let mut g = c.benchmark_group("MASCOT vector length");
    for len in [10u128, 100, 1000, 10_000] {
        let inputs: Vec<Vec<u128>> = (0..2).map(|_| (0..len).collect()).collect();
        g.throughput(Throughput::Elements(len as u64));
        g.bench_with_input(BenchmarkId::from_parameter(len), &inputs, |b, inputs| {
            b.to_async(rt).iter(|| async move {
                simulate_dot_product(Protocol::Mascot, None, Preprocessor::TrustedDealer(2), inputs)
                    .await
                    .expect("dot product failed")
            })
        });
    }
    g.finish();
}

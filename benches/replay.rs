use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};

use concpipe::{
    context::ConcordanceContext,
    core::{cache::FormArgsCache, pipeline::PipelineSnapshot},
    engine::{
        models::ModelRegistry,
        replay::{ReplayExecutor, ReplayRequest},
    },
    form::{FormArgs, SampleFormArgs},
    op::OperationRecord,
    transport::{HttpRequest, Transport, TransportError, UrlBuilder},
    types::FormType,
};

/// Answers every submit with a fresh persistence id.
#[derive(Default)]
struct EchoServer {
    next: AtomicU64,
}

#[async_trait]
impl Transport for EchoServer {
    async fn send(&self, _request: HttpRequest) -> Result<Value, TransportError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(json!({"conc_persistence_op_id": format!("r{n}"), "concsize": 100}))
    }
}

fn pipeline(len: usize) -> PipelineSnapshot {
    let mut ops = vec![OperationRecord::new(FormType::Query, "op0")];
    let mut cache = FormArgsCache::new();
    for i in 1..len {
        let id = format!("op{i}");
        if i % 2 == 0 {
            ops.push(OperationRecord::new(FormType::Shuffle, id.clone()));
            cache.put(id, FormArgs::Shuffle);
        } else {
            ops.push(OperationRecord::new(FormType::Sample, id.clone()));
            cache.put(id, FormArgs::Sample(SampleFormArgs { rlines: i as u64 }));
        }
    }
    cache.put("op0", FormArgs::Shuffle);
    PipelineSnapshot::new(ops, cache)
}

fn bench_cached_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let urls = UrlBuilder::new("http://bench.local");
    let context = ConcordanceContext::new("syn2020");
    let mut group = c.benchmark_group("cached_replay");

    for len in [8usize, 64, 256] {
        let base = pipeline(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                let server = EchoServer::default();
                let mut snapshot = base.clone();
                let mut models = ModelRegistry::new();
                models
                    .set_form("op1", FormArgs::Sample(SampleFormArgs { rlines: 5 }))
                    .expect("prime");
                rt.block_on(
                    ReplayExecutor::new(&server, &urls).run(
                        ReplayRequest::through_tail(1),
                        &mut snapshot,
                        &mut models,
                        &context,
                    ),
                )
                .expect("replay");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cached_replay);
criterion_main!(benches);

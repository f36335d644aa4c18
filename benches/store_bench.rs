use criterion::{self, criterion_group, criterion_main, BenchmarkId};

use ckv::command::Write;
use ckv::{KvStore, Replica, ReplicaAddr, ReplicaConfig, ReplicaIdentity, Scheme};
use ckv::{KvsEngine, OutputConfig};
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn write_direct(c: &mut criterion::Criterion) {
    let store = KvStore::new();
    let rt = Runtime::new().unwrap();

    c.bench_with_input(BenchmarkId::new("write", "store"), &store, |b, s| {
        b.to_async(&rt).iter(|| async {
            s.set("key".to_string(), "value".into()).await;
        })
    });
}

fn read_direct(c: &mut criterion::Criterion) {
    let store = KvStore::new();
    let rt = Runtime::new().unwrap();
    rt.block_on(store.set("key".to_string(), "value".into()));

    c.bench_with_input(BenchmarkId::new("read", "store"), &store, |b, s| {
        b.iter(|| {
            assert_eq!(s.get("key").as_deref(), Some("value"));
        })
    });
}

fn snapshot(c: &mut criterion::Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kvstore.txt");
    let store = KvStore::new();
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        for i in 0..1000 {
            store.set(format!("key{i}"), format!("value{i}")).await;
        }
    });

    c.bench_with_input(BenchmarkId::new("snapshot", "1000"), &store, |b, s| {
        b.to_async(&rt).iter(|| async { s.snapshot(&path).await.unwrap() })
    });
}

// A lone causal replica pays for stamping, the gate and persisting on every write.
fn causal_set(c: &mut criterion::Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let rt = Runtime::new().unwrap();
    let me = ReplicaAddr::new("127.0.0.1", 9500);
    let config = ReplicaConfig::new(
        ReplicaIdentity::new("replica_0", me.clone()),
        Scheme::Causal,
        vec![me],
    )
    .with_output(OutputConfig::new(temp_dir.path(), "kvstore.txt"));
    let replica = rt.block_on(Replica::new(config)).unwrap();

    c.bench_with_input(BenchmarkId::new("set", "causal"), &replica, |b, r| {
        b.to_async(&rt).iter(|| async {
            r.engine().set(Write::new("key", "value")).await.unwrap();
        })
    });
}

criterion_group!(benches, write_direct, read_direct, snapshot, causal_set);
criterion_main!(benches);

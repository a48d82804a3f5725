use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xmssmt::Context;

fn keypair_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("keygen");
    group.sample_size(10);
    for name in ["XMSSMT-SHA2_60/12_256", "XMSSMT-SHAKE_60/12_256"] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let dir = tempfile::tempdir().unwrap();
                let ctx = Context::from_name(name).unwrap();
                let (sk, pk) = ctx.generate_key_pair(dir.path().join("key")).unwrap();
                sk.close().unwrap();
                black_box(pk);
            });
        });
    }
    group.finish();
}

fn sign_verify_benchmarks(c: &mut Criterion) {
    let msg = vec![0x2au8; 128];
    for name in ["XMSSMT-SHA2_60/12_256", "XMSSMT-SHAKE_60/12_256"] {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::from_name(name).unwrap();
        let (sk, pk) = ctx.generate_key_pair(dir.path().join("key")).unwrap();
        // Amortise the durable seqno update so the WOTS+ and subtree
        // work dominates, as in a server deployment.
        sk.borrow_exactly(1 << 20).unwrap();
        sk.enable_subtree_precomputation();

        c.bench_function(&format!("sign {}", name), |b| {
            b.iter(|| black_box(sk.sign(&msg).unwrap()));
        });

        let sig = sk.sign(&msg).unwrap();
        c.bench_function(&format!("verify {}", name), |b| {
            b.iter(|| black_box(pk.verify(&sig, &msg).unwrap()));
        });
        sk.close().unwrap();
    }
}

criterion_group!(benches, keypair_benchmarks, sign_verify_benchmarks);
criterion_main!(benches);

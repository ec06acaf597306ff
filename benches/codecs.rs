#![allow(missing_docs)]
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pfor::fastpfor::FastPFOR;
use pfor::optpfd::OptPFD;
use pfor::IntegerCodec;
use rand::distributions::Distribution;
use rand_distr::Geometric;

/// Compressing/decompressing 1M clustered-small integers through both codecs
fn pfor_compress_decompress(c: &mut Criterion) {
    fn _dummy_compress(codec: &mut dyn IntegerCodec, data: &[u32], out: &mut [u32]) -> usize {
        let (mut inpos, mut outpos) = (0, 0);
        codec.compress(data, &mut inpos, data.len(), out, &mut outpos);
        outpos
    }

    fn _dummy_uncompress(codec: &mut dyn IntegerCodec, stream: &[u32], out: &mut [u32]) -> usize {
        let (mut inpos, mut outpos) = (0, 0);
        codec
            .uncompress(stream, &mut inpos, stream.len(), out, &mut outpos)
            .unwrap();
        outpos
    }

    let n = 1_000_000;
    let dist = Geometric::new(0.01).unwrap();
    let mut rng = rand::thread_rng();
    let data: Vec<u32> = (0..n).map(|_| dist.sample(&mut rng) as u32).collect();

    let mut fastpfor = FastPFOR::default();
    let mut optpfd = OptPFD::new();
    let mut buf = vec![0_u32; n + n / 128 * 8 + 1024];
    let mut decoded = vec![0_u32; n];

    c.bench_function(&format!("FastPFOR: compressing {} elements", n), |b| {
        b.iter(|| _dummy_compress(&mut fastpfor, black_box(&data), &mut buf))
    });

    let used = _dummy_compress(&mut fastpfor, &data, &mut buf);
    let stream = buf[..used].to_vec();
    c.bench_function(&format!("FastPFOR: decompressing {} elements", n), |b| {
        b.iter(|| _dummy_uncompress(&mut fastpfor, black_box(&stream), &mut decoded))
    });

    c.bench_function(&format!("OptPFD: compressing {} elements", n), |b| {
        b.iter(|| _dummy_compress(&mut optpfd, black_box(&data), &mut buf))
    });

    let used = _dummy_compress(&mut optpfd, &data, &mut buf);
    let stream = buf[..used].to_vec();
    c.bench_function(&format!("OptPFD: decompressing {} elements", n), |b| {
        b.iter(|| _dummy_uncompress(&mut optpfd, black_box(&stream), &mut decoded))
    });
}

criterion_group!(benches, pfor_compress_decompress);
criterion_main!(benches);

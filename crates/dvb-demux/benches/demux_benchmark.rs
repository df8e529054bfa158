use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use dvb_demux::{Demuxer, StreamKind};

fn benchmark_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("Demux Performance");

    let clean_data = create_clean_stream();
    let noisy_data = create_noisy_stream();

    group.bench_function("Raw Tap (Clean)", |b| {
        let mut demux = Demuxer::new();
        demux
            .registry()
            .set_raw_filter(0x100, Box::new(|_| {}))
            .unwrap();
        b.iter(|| {
            demux.push(black_box(&clean_data));
        })
    });

    group.bench_function("Audio Reconstruction (Clean)", |b| {
        let mut demux = Demuxer::new();
        demux
            .registry()
            .set_stream_filter(0x100, StreamKind::Audio, false, Box::new(|_| {}))
            .unwrap();
        b.iter(|| {
            demux.push(black_box(&clean_data));
        })
    });

    group.bench_function("Raw Tap (Noisy Resync)", |b| {
        let mut demux = Demuxer::new();
        demux
            .registry()
            .set_raw_filter(0x100, Box::new(|_| {}))
            .unwrap();
        b.iter(|| {
            demux.push(black_box(&noisy_data));
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_demux);
criterion_main!(benches);

fn create_clean_stream() -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..1000u32 {
        let mut packet = vec![0u8; 188];
        packet[0] = 0x47;
        packet[1] = 0x01; // PID 0x100
        packet[2] = 0x00;
        packet[3] = 0x10 | ((i & 0x0F) as u8);
        if i % 20 == 0 {
            packet[1] |= 0x40; // unit start
            packet[4..8].copy_from_slice(&[0x00, 0x00, 0x01, 0xC0]);
        }
        out.extend_from_slice(&packet);
    }
    out
}

fn create_noisy_stream() -> Vec<u8> {
    let base = create_clean_stream();
    let mut out = Vec::new();
    for (idx, packet) in base.chunks_exact(188).enumerate() {
        out.extend_from_slice(packet);
        if idx % 4 == 3 {
            // Decoy sync bytes and random bytes to stress resync.
            out.extend_from_slice(&[0x47, 0x13, 0x37, 0x99, 0x47, 0x00, 0x12]);
        }
    }
    out
}

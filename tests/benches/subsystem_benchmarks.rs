//! # Rollcast Subsystem Benchmarks
//!
//! Hot paths of a running session:
//!
//! | Subsystem | Path | Runs per round |
//! |-----------|------|----------------|
//! | rc-01 Wire Codec | encode / decode a chain message | every gossip packet |
//! | rc-04 Message Log | sign / verify a chain message | every commit / receive |
//! | rc-02 Message Store | store a message with its indexes | every new message |
//! | rc-05 Simulation | arena step | every replayed round |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use rc_01_wire_codec::{decode_message, encode_message};
use rc_02_message_store::MessageStore;
use rc_04_message_log::{sign_chain_message, verify_chain_message};
use rc_05_simulation::domain::arena::{DOWN, LEFT, RIGHT, UP};
use rc_05_simulation::{ArenaGame, GameModule};
use shared_crypto::{DefaultCrypto, KeyPair};
use shared_types::{
    ChainBody, ChainMessage, ChannelId, Message, PeerId, PlayerInput, Signature,
    UnsignedChainMessage,
};
use std::time::Duration;

fn channel() -> ChannelId {
    ChannelId::from_genesis(Signature::new([7; 64]))
}

fn signed_input(identity: &KeyPair, height: u64, parent: Option<Signature>) -> ChainMessage {
    let unsigned = UnsignedChainMessage {
        body: ChainBody::Input {
            round: 1_000 + height,
            channel: channel(),
            data: UP | RIGHT,
        },
        peer: PeerId::new(identity.public_key()),
        parent,
        height,
        acks: vec![Signature::new([1; 64]), Signature::new([2; 64])],
    };
    sign_chain_message(&DefaultCrypto, identity, unsigned).unwrap()
}

// ============================================================================
// RC-01: Wire Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("rc-01-wire-codec");
    let identity = KeyPair::from_seed([3; 32]);
    let message = Message::Chain(signed_input(&identity, 5, Some(Signature::new([4; 64]))));
    let bytes = encode_message(&message).unwrap();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode_chain_message", |b| {
        b.iter(|| black_box(encode_message(black_box(&message)).unwrap()))
    });
    group.bench_function("decode_chain_message", |b| {
        b.iter(|| black_box(decode_message(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

// ============================================================================
// RC-04: Signing
// ============================================================================

fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("rc-04-message-log");
    group.measurement_time(Duration::from_secs(5));
    let identity = KeyPair::from_seed([5; 32]);
    let message = signed_input(&identity, 1, Some(Signature::new([6; 64])));

    group.bench_function("sign_chain_message", |b| {
        b.iter(|| black_box(signed_input(&identity, 1, Some(Signature::new([6; 64])))))
    });
    group.bench_function("verify_chain_message", |b| {
        b.iter(|| black_box(verify_chain_message(&DefaultCrypto, black_box(&message))))
    });
    group.finish();
}

// ============================================================================
// RC-02: Message Store
// ============================================================================

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("rc-02-message-store");
    let identity = KeyPair::from_seed([8; 32]);

    for size in [100u64, 1_000] {
        let mut parent = None;
        let chain: Vec<ChainMessage> = (0..size)
            .map(|height| {
                let message = signed_input(&identity, height, parent);
                parent = Some(message.sig);
                message
            })
            .collect();

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("put_chain", size), &chain, |b, chain| {
            b.iter(|| {
                let store = MessageStore::in_memory();
                for message in chain {
                    store.put_message(message).unwrap();
                }
                black_box(store.current_arrived().unwrap())
            })
        });
    }
    group.finish();
}

// ============================================================================
// RC-05: Simulation
// ============================================================================

fn bench_arena_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("rc-05-simulation");
    let game = ArenaGame;
    let mut rng = rand::thread_rng();
    let headings = [UP, DOWN, LEFT, RIGHT, UP | LEFT, DOWN | RIGHT];

    for players in [2usize, 8, 32] {
        let inputs: Vec<PlayerInput> = (0..players)
            .map(|i| PlayerInput {
                peer: PeerId::new([i as u8; 32]),
                data: headings[rng.gen_range(0..headings.len())],
            })
            .collect();
        let warm = game.step(&game.initial_state(), &inputs, 0.05).unwrap();

        group.bench_with_input(BenchmarkId::new("step", players), &inputs, |b, inputs| {
            b.iter(|| black_box(game.step(black_box(&warm), inputs, 0.05).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_signing,
    bench_store,
    bench_arena_step
);
criterion_main!(benches);

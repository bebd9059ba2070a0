//! Fuzz test runner for the compute ledger
//!
//! Run with: cargo run --release -p compute-ledger-fuzz --bin fuzz_all
//! Or: cargo test (for property-based tests)
//!
//! Set FUZZ_SEED to a hex string of 64 characters to replay a run.

use compute_ledger::state::SecurityLevel;
use compute_ledger_fuzz::*;
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use std::time::Instant;

const SEQUENCE_LEN: usize = 60;

fn main() {
    println!("=== Compute Ledger Fuzz Testing ===\n");

    let seed = run_seed();
    println!("Seed: {}\n", hex(&seed));

    let start = Instant::now();
    let mut runner = TestRunner::new_with_rng(
        Config::default(),
        TestRng::from_seed(RngAlgorithm::ChaCha, &seed),
    );
    let mut total_tests = 0;
    let mut passed = 0;
    let mut failed = 0;

    println!("Running random action sequences...");
    let (p, f) = run_sequence_fuzz(&mut runner, 200);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running honest settlement rounds...");
    let (p, f) = run_settlement_fuzz(&mut runner, 200);
    passed += p;
    failed += f;
    total_tests += p + f;

    let duration = start.elapsed();

    println!("\n=== Fuzz Testing Complete ===");
    println!("Total tests: {}", total_tests);
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!("Duration: {:?}", duration);

    if failed > 0 {
        std::process::exit(1);
    }
}

fn run_seed() -> [u8; 32] {
    std::env::var("FUZZ_SEED")
        .ok()
        .and_then(|s| parse_hex(&s))
        .unwrap_or_else(rand::random)
}

fn parse_hex(s: &str) -> Option<[u8; 32]> {
    let s = s.trim();
    if s.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(s.get(2 * i..2 * i + 2)?, 16).ok()?;
    }
    Some(out)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn run_sequence_fuzz(runner: &mut TestRunner, iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut rejected = 0usize;
    let strategy = arb_action_sequence(SEQUENCE_LEN);

    for i in 0..iterations {
        let actions = match strategy.new_tree(runner) {
            Ok(tree) => tree.current(),
            Err(reason) => {
                println!("  [FAIL] Iteration {}: generator: {}", i, reason);
                failed += 1;
                continue;
            }
        };

        let mut ledger = seeded_ledger();
        let expected = ledger.total_lamports();
        let mut violation = None;
        for (step, action) in actions.iter().enumerate() {
            if apply_action(&mut ledger, action).is_err() {
                rejected += 1;
            }
            let found = ledger_violations(&ledger, expected);
            if !found.is_empty() {
                violation = Some((step, action.clone(), found));
                break;
            }
        }

        match violation {
            Some((step, action, found)) => {
                println!("  [FAIL] Iteration {} step {} {:?}: {:?}", i, step, action, found);
                failed += 1;
            }
            None => passed += 1,
        }
    }

    println!(
        "  sequences: {} passed, {} failed, {} rejected actions",
        passed, failed, rejected
    );
    (passed, failed)
}

/// One consensus market per iteration: every sampled attester confirms, then
/// the node claims. Checks the buyer refund plus credited fees equal the
/// prepayment.
fn run_settlement_fuzz(runner: &mut TestRunner, iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let strategy = (
        2u8..ACTORS,
        arb_price(),
        1u64..5_000,
        0u16..=1000,
        arb_attester_count(),
        arb_bytes32(),
    );

    for i in 0..iterations {
        let input = match strategy.new_tree(runner) {
            Ok(tree) => tree.current(),
            Err(reason) => {
                println!("  [FAIL] Iteration {}: generator: {}", i, reason);
                failed += 1;
                continue;
            }
        };

        match settlement_round(input) {
            Ok(()) => passed += 1,
            Err(message) => {
                println!("  [FAIL] Iteration {}: {}", i, message);
                failed += 1;
            }
        }
    }

    println!("  settlement: {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn settlement_round(
    (nodes, price, units, claimed_permille, count, seed): (u8, u64, u64, u16, u8, [u8; 32]),
) -> Result<(), String> {
    let buyer = actor(0);
    let mut ledger = seeded_ledger();
    let authority = ledger.authority();
    ledger
        .update_settlement_params(authority, 100, 2000, 1000, count)
        .map_err(|e| format!("params: {}", e))?;
    let task = ledger
        .create_task(buyer, SecurityLevel::SamplingConsensus, 0)
        .map_err(|e| format!("create_task: {}", e))?;
    for i in 1..nodes {
        let node = ledger
            .register_node(actor(i))
            .map_err(|e| format!("register: {}", e))?;
        ledger
            .subscribe(actor(i), task, node, price, units)
            .map_err(|e| format!("subscribe: {}", e))?;
    }

    let expected = ledger.total_lamports();
    let before = ledger.balance_of(&buyer);
    let stack = ledger
        .purchase_stack(buyer, task, units, price, seed)
        .map_err(|e| format!("purchase: {}", e))?;
    let server = ledger.stacks[&stack].node_id;
    let server_owner = ledger.nodes[&server].owner;
    let prepaid = ledger.stacks[&stack].prepaid;

    let claimed = units * u64::from(claimed_permille) / 1000;
    ledger
        .settle_honestly(server_owner, stack, claimed)
        .map_err(|e| format!("settle: {}", e))?;
    let attesters = ledger.tickets[&stack].attesters.clone();
    for attester in attesters {
        let owner = ledger.nodes[&attester].owner;
        ledger
            .attest_honestly(owner, attester, stack)
            .map_err(|e| format!("attest: {}", e))?;
    }

    ledger.advance_epochs(2);
    ledger
        .claim_funds(server_owner, server, &[stack])
        .map_err(|e| format!("claim: {}", e))?;

    let refund = ledger.balance_of(&buyer) - (before - prepaid);
    let mut fees = 0u64;
    for node in ledger.nodes.values() {
        fees += node.fees.outstanding().map_err(|e| e.to_string())?;
    }
    if refund + fees != prepaid {
        return Err(format!(
            "refund {} + fees {} != prepaid {}",
            refund, fees, prepaid
        ));
    }

    let violations = ledger_violations(&ledger, expected);
    if !violations.is_empty() {
        return Err(format!("{:?}", violations));
    }
    Ok(())
}

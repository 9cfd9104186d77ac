use super::*;
use crate::stats::Clipping;
use crate::stats::EloModel;
use crate::stats::Rounding;
use crate::stats::Spsa;
use crate::stats::Sprt;

pub fn args(stop_rule: StopRule, num_games: u64) -> RunArgs {
    RunArgs {
        base_tag: "master".to_string(),
        new_tag: "patch".to_string(),
        num_games,
        tc: "10+0.1".to_string(),
        book: "openings-8moves.epd".to_string(),
        book_depth: 8,
        threads: 1,
        base_options: "Hash=16".to_string(),
        new_options: "Hash=16".to_string(),
        base_signature: "1234567".to_string(),
        new_signature: "7654321".to_string(),
        username: "submitter".to_string(),
        info: String::new(),
        auto_purge: true,
        throughput: 100,
        priority: 0,
        itp: 100.0,
        stop_rule,
    }
}

pub fn run(stop_rule: StopRule, num_games: u64) -> Run {
    Run::new(args(stop_rule, num_games), 0.0)
}

pub fn sprt_run(batch: u64) -> Run {
    let sprt = Sprt::new(0.05, 0.05, 0.0, 5.0, EloModel::Logistic, batch);
    let mut run = run(StopRule::Sprt(sprt), crate::SPRT_CHUNKS * crate::CHUNK_SIZE);
    run.approved = true;
    run
}

pub fn spsa_run(raw_params: &str, num_games: u64) -> Run {
    let spsa = Spsa::parse(
        raw_params,
        num_games as f64 / 20.0,
        0.602,
        0.101,
        num_games / 2,
        Clipping::Old,
        Rounding::Deterministic,
    )
    .expect("valid fixture params");
    let mut run = run(StopRule::Spsa(spsa), num_games);
    run.approved = true;
    run
}

pub fn worker(name: &str, addr: &str) -> WorkerInfo {
    WorkerInfo {
        username: name.to_string(),
        unique_key: format!("{}-0123456789abcdef", name),
        version: crate::WORKER_VERSION,
        concurrency: 8,
        min_threads: 1,
        max_memory: 4096,
        remote_addr: addr.to_string(),
        rate: None,
        country_code: None,
    }
}

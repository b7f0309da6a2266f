use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

use linesim::{DistributionSpec, Horizon, LineConfig, Simulation, StationConfig};

/// Two exponential machines separated by a buffer of the given capacity.
fn line(seed: u64, capacity: u8, servers: u8) -> LineConfig {
    LineConfig {
        seed,
        arrival: DistributionSpec::Exponential { mean: 1.0 },
        horizon: Horizon::Time(100.0),
        replications: 1,
        stations: vec![
            StationConfig::Machine {
                name: String::from("first"),
                cycle_time: DistributionSpec::Exponential { mean: 0.8 },
                capacity: usize::from(servers % 3) + 1,
            },
            StationConfig::Buffer {
                name: String::from("between"),
                capacity: Some(usize::from(capacity % 5) + 1),
            },
            StationConfig::Machine {
                name: String::from("second"),
                cycle_time: DistributionSpec::Uniform {
                    low: 0.5,
                    high: 1.5,
                },
                capacity: 1,
            },
        ],
    }
}

#[quickcheck]
fn jobs_are_conserved(seed: u64, capacity: u8, servers: u8) -> bool {
    let config = line(seed, capacity, servers);
    let result = Simulation::from_config(&config, 0).unwrap().run().unwrap();
    result.created == result.completed + result.in_system
}

#[quickcheck]
fn buffer_never_exceeds_capacity(seed: u64, capacity: u8) -> TestResult {
    let config = line(seed, capacity, 0);
    let mut simulation = Simulation::from_config(&config, 0).unwrap();
    let between = simulation
        .topology()
        .nodes()
        .iter()
        .find(|node| node.name == "between")
        .map(|node| node.id)
        .unwrap();
    let bound = usize::from(capacity % 5) + 1;
    while simulation.time() < 100.0 {
        if !simulation.step().unwrap() {
            return TestResult::error("event queue exhausted");
        }
        if simulation.buffer(between).unwrap().len() > bound {
            return TestResult::failed();
        }
    }
    TestResult::passed()
}

#[quickcheck]
fn metrics_are_in_range(seed: u64, capacity: u8, servers: u8) -> bool {
    let config = line(seed, capacity, servers);
    let result = Simulation::from_config(&config, 0).unwrap().run().unwrap();
    result
        .machines
        .iter()
        .all(|m| (0.0..=1.0 + 1e-9).contains(&m.utilization) && m.blocked_fraction >= 0.0)
        && result
            .buffers
            .iter()
            .all(|b| (0.0..=1.0 + 1e-9).contains(&b.full_fraction))
        && result.throughput >= 0.0
        && result.cycle_time.min >= 0.0
}

#[quickcheck]
fn same_seed_same_result(seed: u64, replication: u8) -> bool {
    let config = line(seed, 2, 1);
    let replication = usize::from(replication % 4);
    let first = Simulation::from_config(&config, replication)
        .unwrap()
        .run()
        .unwrap();
    let second = Simulation::from_config(&config, replication)
        .unwrap()
        .run()
        .unwrap();
    serde_json::to_string(&first).unwrap() == serde_json::to_string(&second).unwrap()
}

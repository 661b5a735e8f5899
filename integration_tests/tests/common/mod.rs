#![allow(dead_code)]

use std::sync::Once;

use ops_core::{
    BlockId, BlockPos, CommandExecutor, InMemoryRegistry, OpsConfig, Region, StructureFootprint,
    StructureKind, Volume, WorkflowOrchestrator,
};
use rcon_mock::{MockConfig, MockServer};
use tracing_subscriber::EnvFilter;

pub const PASSWORD: &str = "hunter2";

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn start_server(ticks_per_second: f64) -> MockServer {
    init_tracing();
    MockServer::start(MockConfig {
        password: PASSWORD.to_string(),
        ticks_per_second,
        ..MockConfig::default()
    })
    .expect("mock server should bind")
}

pub fn config_for(server: &MockServer, password: &str) -> OpsConfig {
    let mut config = OpsConfig::builtin();
    config.connection.host = server.addr().ip().to_string();
    config.connection.port = server.addr().port();
    config.connection.password = password.to_string();
    config.retry.max_retries = 2;
    config.retry.base_delay_ms = 10;
    config.retry.timeout_ms = 2_000;
    config
}

pub fn orchestrator(
    server: &MockServer,
    registry: InMemoryRegistry,
) -> WorkflowOrchestrator<InMemoryRegistry> {
    let config = config_for(server, PASSWORD);
    let executor = CommandExecutor::from_config(&config).expect("builtin classifier compiles");
    WorkflowOrchestrator::new(executor, registry, config)
}

pub fn region(a: (i32, i32, i32), b: (i32, i32, i32)) -> Region {
    Region::new(BlockPos::new(a.0, a.1, a.2), BlockPos::new(b.0, b.1, b.2))
}

pub fn structure(id: &str, kind: StructureKind, region: Region, surface_y: i32) -> StructureFootprint {
    StructureFootprint {
        id: id.to_string(),
        kind,
        surface_y,
        volumes: vec![Volume {
            region,
            block: BlockId::new("iron_block"),
        }],
        cleared: false,
    }
}

/// Places every footprint's blocks in the mock world, as a build would have.
pub fn build(server: &MockServer, footprints: &[StructureFootprint]) {
    let mut world = server.world();
    for footprint in footprints {
        for volume in &footprint.volumes {
            world.place(volume.region, volume.block.clone());
        }
    }
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `rtconsole_core` wiring end to end: config, logging, an
//!   in-process agent behind a loopback RPC supervisor, one extension call.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `rtconsole_cli [config.json]`

use log::info;
use rtconsole_core::marshal::{ConversionResult, FieldReader, FieldWriter};
use rtconsole_core::{
    execute_extension, AgentEndpoint, ConditionBus, ConsoleConfig, Extension, ExtensionRegistry,
    FieldSpec, InMemoryRuntime, LoopbackTransport, Record, RpcSupervisor, ScalarKind, Supervisor,
    SupervisorCategory, SupervisorFactory, SupervisorGate,
};
use std::process::ExitCode;
use std::sync::Arc;

struct Number {
    value: i64,
}

impl Record for Number {
    const SCHEMA: &'static [FieldSpec] = &[FieldSpec::required("value", ScalarKind::Int)];

    fn write_fields(&self, writer: &mut FieldWriter) {
        writer.put("value", self.value);
    }

    fn read_fields(reader: &FieldReader<'_>) -> ConversionResult<Self> {
        Ok(Self {
            value: reader.get("value")?,
        })
    }
}

struct Double;

impl Extension for Double {
    type Context = Number;
    type Result = Number;

    fn name(&self) -> &str {
        "double"
    }

    fn execute(&self, context: Number) -> Number {
        Number {
            value: context.value * 2,
        }
    }
}

fn run() -> Result<i64, Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::default(),
    };
    config.init_logging()?;

    let registry = Arc::new(ExtensionRegistry::new());
    registry.register(Double)?;
    let endpoint = Arc::new(AgentEndpoint::new(
        registry,
        Arc::new(InMemoryRuntime::new()),
    ));

    let factory = SupervisorFactory::new(ConditionBus::new());
    let supervisor = Arc::new(RpcSupervisor::new());
    SupervisorGate::bind(factory.bus(), supervisor.clone());
    factory.activate(SupervisorCategory::LiveRpc);

    supervisor.connect(Arc::new(LoopbackTransport::new(endpoint)))?;
    let agent = supervisor
        .agent()
        .ok_or("live rpc supervisor has no agent")?;
    let doubled: Number = execute_extension(agent.as_ref(), "double", &Number { value: 21 })?;

    factory.deactivate(SupervisorCategory::LiveRpc);
    info!("event=cli_probe module=cli status=ok result={}", doubled.value);
    Ok(doubled.value)
}

fn main() -> ExitCode {
    println!("rtconsole_core ping={}", rtconsole_core::ping());
    println!("rtconsole_core version={}", rtconsole_core::core_version());
    match run() {
        Ok(value) => {
            println!("double(21)={value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}

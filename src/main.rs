use clap::Parser;
use script_bridge::bindings::RegistryBuilder;
use script_bridge::config::BridgeConfig;
use script_bridge::core::{init_logging, BridgeResult};
use script_bridge::scripting::{
    register_engine_api, EngineServices, ScriptRuntime, TickResult, SAMPLE_SCRIPT,
};
use std::path::PathBuf;

/// 脚本桥接演示：加载一个脚本并运行若干帧
#[derive(Debug, Parser)]
#[command(name = "script_bridge")]
#[command(about = "Run a script against the native bridge for a few frames")]
#[command(version)]
struct Cli {
    /// Script name or path (runs the built-in sample when omitted)
    script: Option<String>,

    /// Number of frames to run
    #[arg(long, default_value_t = 3)]
    ticks: u32,

    /// Frame time step in seconds
    #[arg(long, default_value_t = 0.016)]
    dt: f64,

    /// Key held down before the first frame (repeatable)
    #[arg(long = "press", value_name = "KEY")]
    pressed: Vec<String>,

    /// Bridge config file (TOML or JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write TypeScript declarations for the registered bindings
    #[arg(long, value_name = "FILE")]
    emit_dts: Option<PathBuf>,
}

fn run(cli: Cli) -> BridgeResult<()> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::load_or_default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    init_logging(&config.logging);

    let services = EngineServices::new();
    let mut builder = RegistryBuilder::new();
    register_engine_api(&mut builder, &services)?;
    let runtime = ScriptRuntime::from_builder(builder, config.scripting)?;

    if let Some(path) = &cli.emit_dts {
        std::fs::write(path, runtime.typescript_declarations())
            .map_err(script_bridge::core::ScriptError::Io)?;
        tracing::info!(target: "bridge", path = %path.display(), "TypeScript declarations written");
    }

    let env = match &cli.script {
        Some(script) => runtime.load_js_file(script)?,
        None => runtime.load_js("sample.js", SAMPLE_SCRIPT)?,
    };

    let mut driver = runtime.frame_driver();
    driver.load(env);
    for key in &cli.pressed {
        services.input().press(key.as_str());
    }

    for _ in 0..cli.ticks {
        let report = driver.tick_all(cli.dt);
        for tick in &report.scripts {
            match &tick.result {
                TickResult::Completed(result) => {
                    println!("[frame {}] {}: {}", report.frame, tick.script, result)
                }
                TickResult::Failed(err) => {
                    println!("[frame {}] {}: error: {}", report.frame, tick.script, err)
                }
                TickResult::Skipped => println!("[frame {}] {}: skipped", report.frame, tick.script),
            }
        }
        for command in services.drain_commands() {
            println!("[frame {}] engine command: {:?}", report.frame, command);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Script bridge failed: {}", e);
        std::process::exit(1);
    }
}

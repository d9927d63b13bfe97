//! A minimal demonstration of the work-offload engine: register one task,
//! start a small pool, submit a handful of requests, print their results.
//!
//! Not part of the crate's tested public contract — just a runnable
//! example of how an embedding application wires things together.

use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use serde_json::json;

use offload_engine::Engine;
use offload_engine::EngineConfig;
use offload_engine::Handler;
use offload_engine::TaskControl;
use offload_engine::TaskOutcome;

#[derive(Parser)]
struct Args {
    /// How many requests to submit.
    #[arg(long, default_value_t = 4)]
    count: u32,

    /// How many workers to start (0 = let the engine pick).
    #[arg(long, default_value_t = 0)]
    workers: usize,
}

fn square_task() -> Arc<dyn offload_engine::Task> {
    Arc::new(|args: Value, _kwargs: Value, _ctl: &TaskControl| {
        let n = args.get(0).and_then(Value::as_i64).unwrap_or_default();
        Ok(TaskOutcome::Single(Value::from(n * n)))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let engine = Engine::new(
        EngineConfig {
            requested_worker_count: args.workers,
            ..EngineConfig::default()
        },
        std::env::temp_dir().join("offload-demo.lock"),
    );
    engine.register_task("square", square_task()).await?;

    // Every process this binary becomes runs the lines above identically;
    // only the worker re-exec path ever sees this call return without
    // returning control to the rest of `main()`.
    offload_engine::maybe_enter_worker_mode(
        engine.task_registry_snapshot().await,
        engine.init_lock(),
        engine.init_funcs_snapshot().await,
        engine.custom_handlers_snapshot().await,
        engine.timeouts(),
    )
    .await;

    engine.start_workers(std::env::current_exe()?).await?;
    engine.wait_for_process_start(std::time::Duration::from_secs(10)).await?;

    let mut futures = Vec::with_capacity(args.count as usize);
    for n in 0..args.count as i64 {
        let future = engine
            .submit("square", json!([n]), json!({}), false, Box::new(Handler::new(false)))
            .await?;
        futures.push(future);
    }

    for future in futures {
        let id = future.id();
        match future.await {
            Ok(value) => println!("request {id} -> {value}"),
            Err(error) => eprintln!("request {id} failed: {error}"),
        }
    }

    engine.stop().await?;
    Ok(())
}

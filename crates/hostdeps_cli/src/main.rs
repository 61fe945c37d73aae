//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `hostdeps_core` linkage.
//! - Drive one config change through a private dependents graph and report
//!   what the dependent saw.

use hostdeps_core::{DepCallback, HostContext, ObjectId};
use serde_json::{json, Value};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

const ROUND_TRIP_KEY: &str = "editor.fontSize";

fn main() -> ExitCode {
    println!("hostdeps_core ping={}", hostdeps_core::ping());
    println!("hostdeps_core version={}", hostdeps_core::core_version());

    match config_round_trip() {
        Ok(seen) => {
            println!("hostdeps_core config_round_trip=ok key={ROUND_TRIP_KEY} args={seen}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("event=config_round_trip module=cli status=error error={err}");
            eprintln!("hostdeps_core config_round_trip=error {err}");
            ExitCode::FAILURE
        }
    }
}

fn config_round_trip() -> Result<Value, Box<dyn std::error::Error>> {
    let context = HostContext::new();
    let target = Arc::new(ObjectId::new());
    let seen = Arc::new(Mutex::new(Value::Null));
    let sink = Arc::clone(&seen);
    let callback = DepCallback::new(move |event| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = json!(event.args);
        Ok(())
    });

    context
        .config
        .add_dep(&context.graph, ROUND_TRIP_KEY, &target, Some(callback))?;
    context.config.set(ROUND_TRIP_KEY, json!(14))?;
    context.config.remove_dep(&context.graph, ROUND_TRIP_KEY, target.as_ref());

    let seen = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
    Ok(seen)
}

use super::args::*;
use prgate_core::config::{GateConfig, Secrets};
use prgate_core::engine::{GatePipeline, GateReport, Orchestrator};
use prgate_core::providers::agent::HttpExecutionAgent;
use prgate_core::storage::Store;
use std::path::Path;
use std::sync::Arc;

pub mod verify;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => cmd_run(args).await,
        Command::Plan(args) => cmd_plan(args).await,
        Command::Verify(args) => verify::cmd_verify(args),
        Command::Show(args) => verify::cmd_show(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// Loads the config and starts logging at its level. `None` means the
/// error was already reported and the caller should exit with CONFIG_ERROR.
pub(crate) fn load_config(path: Option<&Path>, strict: bool) -> Option<GateConfig> {
    match GateConfig::load(path, strict) {
        Ok(cfg) => {
            crate::init_logging(&cfg.log_level);
            Some(cfg)
        }
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    let Some(mut cfg) = load_config(args.config.as_deref(), args.strict) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    if let Some(db) = &args.db {
        cfg.db_path = db.clone();
    }
    if let Some(d) = &args.deployment {
        cfg.deployment_url = d.clone();
    }
    let secrets = Secrets::from_env();

    let agent = match HttpExecutionAgent::from_config(&cfg, &secrets) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let pipeline = match GatePipeline::from_config(&cfg, &secrets, args.scenarios.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    ensure_parent_dir(&cfg.db_path)?;
    let store = Store::open(&cfg.db_path, cfg.store_timeout())?;
    store.init_schema()?;

    let orchestrator = Orchestrator::new(
        Arc::new(store),
        Arc::new(agent),
        cfg.agent.dispatch_timeout(),
    );

    let report = match pipeline.run(&orchestrator, &args.pr).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(event = "gate_error", error = %e);
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    Ok(finish(&report, args.junit.as_deref()))
}

async fn cmd_plan(args: PlanArgs) -> anyhow::Result<i32> {
    let Some(mut cfg) = load_config(args.config.as_deref(), false) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    if let Some(d) = &args.deployment {
        cfg.deployment_url = d.clone();
    }

    let reference = match (&args.pr, &args.scenarios) {
        (Some(pr), _) => pr.clone(),
        // Offline planning straight from a scenarios file.
        (None, Some(_)) => "local".to_string(),
        (None, None) => {
            eprintln!("config error: plan needs --pr or --scenarios");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let secrets = Secrets::from_env();
    let pipeline = match GatePipeline::from_config(&cfg, &secrets, args.scenarios.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let (meta, set) = match pipeline.plan(&reference).await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let out = serde_json::json!({
        "source_ref": meta.source_ref,
        "title": meta.title,
        "deployment": cfg.deployment_url,
        "scenario_set": set,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(exit_codes::OK)
}

/// Prints the summary, writes the optional JUnit report and maps the verdict
/// to an exit code. A failed report write is logged and never changes the code.
pub(crate) fn finish(report: &GateReport, junit: Option<&Path>) -> i32 {
    prgate_core::report::console::print_summary(report);
    if let (Some(path), Some(h)) = (junit, &report.hierarchy) {
        if let Err(e) = prgate_core::report::junit::write_junit(h, path) {
            tracing::warn!(event = "junit_write_failed", path = %path.display(), error = %e);
            eprintln!("warning: could not write JUnit report {}: {:#}", path.display(), e);
        }
    }

    if report.passed() {
        exit_codes::OK
    } else {
        exit_codes::TEST_FAILED
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

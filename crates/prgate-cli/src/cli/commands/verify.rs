use super::{ensure_parent_dir, exit_codes, finish, load_config};
use crate::cli::args::{ShowArgs, VerifyArgs};
use prgate_core::config::GateConfig;
use prgate_core::engine::reverify;
use prgate_core::model::RunId;
use prgate_core::storage::{HierarchyRepository, Store};
use std::path::PathBuf;

fn open_store(cfg: &GateConfig, db: Option<&PathBuf>) -> anyhow::Result<Store> {
    let path = db.cloned().unwrap_or_else(|| cfg.db_path.clone());
    ensure_parent_dir(&path)?;
    let store = Store::open(&path, cfg.store_timeout())?;
    store.init_schema()?;
    Ok(store)
}

pub fn cmd_verify(args: VerifyArgs) -> anyhow::Result<i32> {
    let Some(cfg) = load_config(args.config.as_deref(), false) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let store = open_store(&cfg, args.db.as_ref())?;

    let report = match reverify(&store, RunId(args.run_id)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    Ok(finish(&report, args.junit.as_deref()))
}

pub fn cmd_show(args: ShowArgs) -> anyhow::Result<i32> {
    let Some(cfg) = load_config(args.config.as_deref(), false) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let store = open_store(&cfg, args.db.as_ref())?;

    match store.read_hierarchy(RunId(args.run_id)) {
        Ok(h) => {
            println!("{}", serde_json::to_string_pretty(&h)?);
            Ok(exit_codes::OK)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

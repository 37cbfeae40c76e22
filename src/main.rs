//! # 物理情報ニューラルネットワーク (PINN) サンプルプログラム
//!
//! 組み込みの問題（移流・熱・ポアソン方程式、DeepONet による原始関数作用素）を
//! コマンドラインから学習・推論します。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train advection
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer advection --grid 64
//! ```
//!
//! ログの詳細度は環境変数 `BURN_PHYSICS_LOG` で指定します（既定値は `info`）。

use burn::config::Config;
use burn_physics::cli::{Cli, Commands};
use burn_physics::problems::{Problem, load_config};
use burn_physics::Result;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("BURN_PHYSICS_LOG", "info")).init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Train {
            problem,
            config,
            output_dir,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => problem.default_config(),
            };
            problem.train(&config, &output_dir)?;
        }
        Commands::Infer {
            problem,
            output_dir,
            grid,
        } => {
            let config = saved_config(problem, &output_dir)?;
            problem.infer(&config, &output_dir, grid)?;
        }
        Commands::InitConfig { problem, output } => {
            let path = output.unwrap_or_else(|| format!("{}_config.json", problem).into());
            problem.default_config().save(&path)?;
            log::info!("=> 既定の設定を '{}' に書き出しました。", path.display());
        }
    }
    Ok(())
}

/// 学習時に保存した設定を読み込みます。無ければ既定値を使います。
fn saved_config(problem: Problem, output_dir: &Path) -> Result<burn_physics::problems::ExperimentConfig> {
    let path = output_dir.join(format!("{}_config.json", problem));
    if path.exists() {
        load_config(&path)
    } else {
        log::warn!("'{}' が見つからないため既定の設定を使います。", path.display());
        Ok(problem.default_config())
    }
}

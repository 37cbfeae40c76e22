use crate::problems::Problem;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Physics-informed neural networks and DeepONets with Burn", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 問題のモデルを学習し、結果をファイルに保存します
    Train {
        #[arg(value_enum)]
        problem: Problem,
        /// 実験設定のJSONファイル。省略すると問題の既定値を使います
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "artifacts")]
        output_dir: PathBuf,
    },
    /// 保存されたモデルを格子点で評価し、予測と誤差を出力します
    Infer {
        #[arg(value_enum)]
        problem: Problem,
        #[arg(short, long, default_value = "artifacts")]
        output_dir: PathBuf,
        /// 各方向の格子点数
        #[arg(short, long, default_value_t = 50)]
        grid: usize,
    },
    /// 問題の既定の実験設定をJSONファイルに書き出します
    InitConfig {
        #[arg(value_enum)]
        problem: Problem,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

//! # 物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークを使用して、変数空間・領域・サンプラー・学習条件を組み合わせ、
//! 微分方程式を PINN で、作用素を DeepONet で学習するためのコンポーネントを提供します。

pub mod cli;
pub mod conditions;
pub mod deeponet;
pub mod differential;
pub mod domains;
pub mod error;
pub mod functionsets;
pub mod inference;
pub mod model;
pub mod points;
pub mod problems;
pub mod samplers;
pub mod spaces;
pub mod training;

pub use error::{PhysicsError, Result};
pub use points::Points;
pub use spaces::{Space, r1, r2, r3};

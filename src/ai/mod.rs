//! AI 对手（启发式出牌策略）。

pub mod heuristic;

pub use heuristic::{best_wild_color, AiAgent, AiConfig, AiTurn};

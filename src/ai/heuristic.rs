use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::game::{
    Card, CardColor, GameEvent, Hook, HookBinding, MatchState, PlayCardOptions, PlayerId, Resolution,
    RuleEngine, RuleError,
};

const DEFAULT_MAX_DRAWS_PER_TURN: u8 = 30;

/// 对手行为配置。`max_draws_per_turn` 是“摸到能出为止”循环的上限，到达后强制过牌。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiConfig {
    #[serde(default = "default_max_draws")]
    pub max_draws_per_turn: u8,
}

fn default_max_draws() -> u8 {
    DEFAULT_MAX_DRAWS_PER_TURN
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            max_draws_per_turn: DEFAULT_MAX_DRAWS_PER_TURN,
        }
    }
}

/// 一个 AI 回合的结果。
#[derive(Debug, Clone, Serialize)]
pub struct AiTurn {
    pub player_id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub played: Option<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_color: Option<CardColor>,
    pub cards_drawn: usize,
    pub passed: bool,
    pub resolution: Resolution,
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// 替当前非人类玩家走完一整个回合：有牌就出，没牌就摸，摸到上限或牌尽则过。
    pub fn play_turn(
        &mut self,
        engine: &RuleEngine,
        state: &mut MatchState,
    ) -> Result<AiTurn, RuleError> {
        if state.is_finished() {
            return Err(RuleError::MatchFinished);
        }
        let player_index = state.current_player_index;
        let player = state
            .current_player()
            .ok_or(RuleError::PlayerIndexOutOfRange {
                index: player_index,
            })?;
        if player.is_human {
            return Err(RuleError::NotPlayerTurn {
                player_id: player.id,
            });
        }
        let player_id = player.id;

        let mut resolution = Resolution::default();
        let mut cards_drawn = 0usize;

        loop {
            let legal = engine.playable_cards(state, player_index);
            if let Some((card, focus)) = self.choose_card(engine, state, player_index, &legal) {
                let (chosen_color, instinct) = if card.is_wild() {
                    let (color, binding) = self.choose_color(engine, state, player_index, &card);
                    (Some(color), binding)
                } else {
                    (None, None)
                };
                let options = PlayCardOptions {
                    chosen_color,
                    target_player: None,
                };

                debug!(player_id, card_id = card.id, ?chosen_color, "ai plays");
                let played = engine.apply_play(state, player_id, card.id, &options, &mut self.rng)?;
                for binding in focus.into_iter().chain(instinct) {
                    record_trigger(state, &mut resolution, binding);
                }
                resolution.extend(played);
                return Ok(AiTurn {
                    player_id,
                    played: Some(card),
                    chosen_color,
                    cards_drawn,
                    passed: false,
                    resolution,
                });
            }

            if cards_drawn >= usize::from(self.config.max_draws_per_turn) {
                warn!(player_id, cards_drawn, "ai draw limit reached, passing");
                break;
            }
            match engine.draw_cards(state, player_index, 1, &mut self.rng) {
                Ok(drawn) => {
                    cards_drawn += 1;
                    resolution.extend(drawn);
                }
                Err(RuleError::EmptyDeck { .. }) => {
                    warn!(player_id, cards_drawn, "supply exhausted, ai passes");
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        let passed = engine.end_turn(state, player_id)?;
        resolution.extend(passed);
        Ok(AiTurn {
            player_id,
            played: None,
            chosen_color: None,
            cards_drawn,
            passed: true,
            resolution,
        })
    }

    /// 从可打出的牌里挑一张；没有可出的牌时返回 `None`。
    fn choose_card(
        &mut self,
        engine: &RuleEngine,
        state: &MatchState,
        player_index: usize,
        legal: &[Card],
    ) -> Option<(Card, Option<&'static HookBinding>)> {
        let player = &state.players[player_index];
        if let Some(binding) = engine.pipeline().fires_for(Hook::AiPreferActiveColor, player) {
            let focused: Vec<Card> = legal
                .iter()
                .filter(|card| card.color == state.active_color)
                .copied()
                .collect();
            if let Some(card) = focused.choose(&mut self.rng) {
                return Some((*card, Some(binding)));
            }
        }
        let card = legal.choose(&mut self.rng).copied()?;
        Some((card, None))
    }

    fn choose_color(
        &mut self,
        engine: &RuleEngine,
        state: &MatchState,
        player_index: usize,
        played: &Card,
    ) -> (CardColor, Option<&'static HookBinding>) {
        let player = &state.players[player_index];
        if let Some(binding) = engine.pipeline().fires_for(Hook::AiBestWildColor, player) {
            let remaining: Vec<Card> = player
                .hand
                .iter()
                .filter(|card| card.id != played.id)
                .copied()
                .collect();
            return (best_wild_color(&remaining), Some(binding));
        }
        let color = CardColor::CHROMATIC
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(CardColor::Red);
        (color, None)
    }
}

fn record_trigger(state: &mut MatchState, resolution: &mut Resolution, binding: &HookBinding) {
    debug!(modifier = binding.modifier, hook = ?binding.hook, "modifier triggered");
    let event = GameEvent::ModifierTriggered {
        modifier: binding.modifier.to_string(),
        message: binding.alert.to_string(),
    };
    state.record_event(event.clone());
    resolution.events.push(event);
}

/// 手中数量最多的颜色；平局按 红→蓝→绿→黄 的目录顺序。
pub fn best_wild_color(hand: &[Card]) -> CardColor {
    let mut best = CardColor::Red;
    let mut best_count = 0usize;
    for color in CardColor::CHROMATIC {
        let count = hand.iter().filter(|card| card.color == color).count();
        if count > best_count {
            best = color;
            best_count = count;
        }
    }
    best
}

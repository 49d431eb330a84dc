use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    deck::{available_supply, draw_one},
    modifiers::{Hook, HookBinding, ModifierPipeline},
    state::{
        Card, CardColor, CardId, CardKind, EffectNotice, GameEvent, IntegrityError, MatchState,
        MatchStatus, PlayerEffect, PlayerId,
    },
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayCardOptions {
    #[serde(default)]
    pub chosen_color: Option<CardColor>,
    #[serde(default)]
    pub target_player: Option<PlayerId>,
}

impl PlayCardOptions {
    pub fn with_color(color: CardColor) -> Self {
        Self {
            chosen_color: Some(color),
            target_player: None,
        }
    }

    pub fn with_target(player_id: PlayerId) -> Self {
        Self {
            chosen_color: None,
            target_player: Some(player_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the match is already over")]
    MatchFinished,
    #[error("no match is in progress")]
    NoActiveMatch,
    #[error("a match is already in progress")]
    MatchInProgress,
    #[error("the next match starts after drafting")]
    DraftPending,
    #[error("the run is over")]
    GameOver,
    #[error("it is not player {player_id}'s turn")]
    NotPlayerTurn { player_id: PlayerId },
    #[error("player {player_id} does not exist")]
    PlayerNotFound { player_id: PlayerId },
    #[error("player index {index} is out of range")]
    PlayerIndexOutOfRange { index: usize },
    #[error("card {card_id} is not in the current player's hand")]
    CardNotFound { card_id: CardId },
    #[error("card {card_id} does not match the discard pile")]
    IllegalPlay { card_id: CardId },
    #[error("{modifier}: wilds are locked while holding more than {threshold} cards")]
    WildLocked { modifier: String, threshold: u8 },
    #[error("a color must be chosen for a wild card")]
    ColorRequired,
    #[error("{color} cannot be chosen as the active color")]
    InvalidColor { color: CardColor },
    #[error("player {player_id} cannot receive this draw penalty")]
    InvalidTarget { player_id: PlayerId },
    #[error("the current player still holds a playable card")]
    PlayableCardInHand,
    #[error("UNO can only be called with two or fewer cards")]
    UnoNotAllowed,
    #[error("not enough cards to draw: needed {needed}, available {available}")]
    EmptyDeck { needed: usize, available: usize },
    #[error("match state failed an integrity check: {error}")]
    IntegrityViolation { error: IntegrityError },
}

/// 一次指令产生的事件和表现层通知。
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Resolution {
    pub events: Vec<GameEvent>,
    pub notices: Vec<EffectNotice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MatchStatus>,
}

impl Resolution {
    fn push(&mut self, state: &mut MatchState, event: GameEvent) {
        state.record_event(event.clone());
        self.events.push(event);
    }

    fn trigger(&mut self, state: &mut MatchState, binding: &HookBinding) {
        debug!(modifier = binding.modifier, hook = ?binding.hook, "modifier triggered");
        self.push(
            state,
            GameEvent::ModifierTriggered {
                modifier: binding.modifier.to_string(),
                message: binding.alert.to_string(),
            },
        );
    }

    pub fn extend(&mut self, other: Resolution) {
        self.events.extend(other.events);
        self.notices.extend(other.notices);
        if other.outcome.is_some() {
            self.outcome = other.outcome;
        }
    }
}

/// 合法性判断：万能牌，或颜色相同，或同为数字且数值相同，或同为功能牌且种类相同。
pub fn can_play(card: &Card, top: &Card, active_color: CardColor) -> bool {
    if card.is_wild() {
        return true;
    }
    if card.color == active_color {
        return true;
    }
    match (card.kind, top.kind) {
        (CardKind::Number(value), CardKind::Number(top_value)) => value == top_value,
        (kind, top_kind) => kind.same_type(top_kind),
    }
}

/// 罚摸牌的计划，在修改状态之前算好。
struct Penalty {
    recipient: usize,
    count: u8,
    effect: PlayerEffect,
    bindings: Vec<&'static HookBinding>,
}

/// 一手牌打出后要摸的全部牌。
#[derive(Default)]
struct DrawPlan {
    penalty: Option<Penalty>,
    sluggish: Option<&'static HookBinding>,
}

impl DrawPlan {
    fn needed(&self) -> usize {
        self.penalty.as_ref().map_or(0, |p| p.count as usize) + usize::from(self.sluggish.is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    pipeline: ModifierPipeline,
}

impl RuleEngine {
    pub fn new(pipeline: ModifierPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &ModifierPipeline {
        &self.pipeline
    }

    fn ensure_in_progress(state: &MatchState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::MatchFinished);
        }
        Ok(())
    }

    fn ensure_turn_owner(state: &MatchState, player_id: PlayerId) -> Result<usize, RuleError> {
        let index = state
            .player_index(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })?;
        if index != state.current_player_index {
            return Err(RuleError::NotPlayerTurn { player_id });
        }
        Ok(index)
    }

    fn ensure_supply(state: &MatchState, needed: usize) -> Result<(), RuleError> {
        let available = available_supply(state);
        if needed > available {
            return Err(RuleError::EmptyDeck { needed, available });
        }
        Ok(())
    }

    /// 色盲等限制下，某名玩家此刻能否打出这张牌。
    fn wild_lock(&self, state: &MatchState, player_index: usize, card: &Card) -> Option<RuleError> {
        let player = state.players.get(player_index)?;
        if !card.is_wild() {
            return None;
        }
        let lock = self.pipeline.fires_for(Hook::WildLock, player)?;
        (player.hand.len() > lock.amount as usize).then(|| RuleError::WildLocked {
            modifier: lock.modifier.to_string(),
            threshold: lock.amount,
        })
    }

    /// 当前可打出的手牌。打出后罚摸与强制摸牌所需的牌数超过供给的，不算可打出。
    pub fn playable_cards(&self, state: &MatchState, player_index: usize) -> Vec<Card> {
        let (Some(player), Some(top)) = (state.players.get(player_index), state.top_card()) else {
            return Vec::new();
        };
        let options = PlayCardOptions::default();
        player
            .hand
            .iter()
            .filter(|card| can_play(card, top, state.active_color))
            .filter(|card| self.wild_lock(state, player_index, card).is_none())
            .filter(|card| {
                self.plan_draws(state, player_index, card, &options)
                    .is_ok_and(|plan| Self::ensure_draws_covered(state, &plan).is_ok())
            })
            .copied()
            .collect()
    }

    fn plan_penalty(
        &self,
        state: &MatchState,
        player_index: usize,
        card: &Card,
        options: &PlayCardOptions,
    ) -> Result<Option<Penalty>, RuleError> {
        let actor = &state.players[player_index];
        let next = state
            .turn_direction
            .step_from(player_index, state.players.len());

        let (bonus_hook, mut count, effect) = match card.kind {
            CardKind::Draw2 => (Hook::DrawTwoBonus, 2u8, PlayerEffect::Draw2),
            CardKind::WildDraw4 => (Hook::DrawFourBonus, 4u8, PlayerEffect::WildDraw4),
            _ => return Ok(None),
        };

        let mut bindings = self.pipeline.bindings_for(bonus_hook, actor);
        for binding in &bindings {
            count = count.saturating_add(binding.amount);
        }

        let mut recipient = next;
        if card.kind == CardKind::Draw2 {
            if let (Some(aim), Some(target)) = (
                self.pipeline.fires_for(Hook::DrawTwoTargeting, actor),
                options.target_player,
            ) {
                let target_index = state
                    .player_index(target)
                    .ok_or(RuleError::InvalidTarget { player_id: target })?;
                if target_index == player_index {
                    return Err(RuleError::InvalidTarget { player_id: target });
                }
                recipient = target_index;
                bindings.push(aim);
            }
        }

        for binding in self
            .pipeline
            .bindings_for(Hook::PenaltyFatigue, &state.players[recipient])
        {
            count = count.saturating_add(binding.amount);
            bindings.push(binding);
        }

        Ok(Some(Penalty {
            recipient,
            count,
            effect,
            bindings,
        }))
    }

    fn sluggish_draw(&self, state: &MatchState, player_index: usize) -> Option<&'static HookBinding> {
        let player = &state.players[player_index];
        let binding = self.pipeline.fires_for(Hook::PeriodicForcedDraw, player)?;
        let cadence = u32::from(binding.amount.max(1));
        ((player.turns_taken + 1) % cadence == 0).then_some(binding)
    }

    /// 打出这张牌之后要摸的牌：罚摸与周期强制摸牌。清空手牌的一手没有。
    fn plan_draws(
        &self,
        state: &MatchState,
        player_index: usize,
        card: &Card,
        options: &PlayCardOptions,
    ) -> Result<DrawPlan, RuleError> {
        if state.players[player_index].hand.len() == 1 {
            return Ok(DrawPlan::default());
        }
        Ok(DrawPlan {
            penalty: self.plan_penalty(state, player_index, card, options)?,
            sluggish: self.sluggish_draw(state, player_index),
        })
    }

    fn ensure_draws_covered(state: &MatchState, plan: &DrawPlan) -> Result<(), RuleError> {
        let needed = plan.needed();
        // 打出的牌会成为新的牌顶，原牌顶进入可补充的部分
        let available = state.draw_pile.len() + state.discard_pile.len();
        if needed > available {
            return Err(RuleError::EmptyDeck { needed, available });
        }
        Ok(())
    }

    /// 打出一张牌并结算其效果。校验全部通过之前不修改任何状态。
    ///
    /// 结算顺序：移出手牌 → 压入弃牌堆并设置颜色 → 手牌清空即结束 →
    /// 反转方向 → 推进回合（逆转动量时不推进）→ 跳过 → 万能牌额外跳过 →
    /// 罚摸牌（受罚座位随后失去回合）→ 周期强制摸牌。
    ///
    /// 每一手至多一条表现层通知，落在受影响的玩家身上；UNO 只在没有其他通知时发出。
    pub fn apply_play<R: Rng + ?Sized>(
        &self,
        state: &mut MatchState,
        player_id: PlayerId,
        card_id: CardId,
        options: &PlayCardOptions,
        rng: &mut R,
    ) -> Result<Resolution, RuleError> {
        Self::ensure_in_progress(state)?;
        let player_index = Self::ensure_turn_owner(state, player_id)?;

        let player = &state.players[player_index];
        let is_human = player.is_human;
        let hand_index = player
            .find_card_in_hand_index(card_id)
            .ok_or(RuleError::CardNotFound { card_id })?;
        let card = player.hand[hand_index];

        let top = state.top_card().ok_or(RuleError::IntegrityViolation {
            error: IntegrityError::EmptyDiscardPile,
        })?;
        if !can_play(&card, top, state.active_color) {
            return Err(RuleError::IllegalPlay { card_id });
        }
        if let Some(error) = self.wild_lock(state, player_index, &card) {
            return Err(error);
        }

        let next_color = if card.is_wild() {
            match options.chosen_color {
                Some(color) if color.is_chromatic() => color,
                Some(color) => return Err(RuleError::InvalidColor { color }),
                None => return Err(RuleError::ColorRequired),
            }
        } else {
            card.color
        };

        let DrawPlan { penalty, sluggish } = {
            let plan = self.plan_draws(state, player_index, &card, options)?;
            Self::ensure_draws_covered(state, &plan)?;
            plan
        };

        let keep_turn = match card.kind {
            CardKind::Reverse => self.pipeline.fires_for(Hook::ReverseKeepsTurn, player),
            _ => None,
        };
        let extra_skips = match card.kind {
            CardKind::Skip => self.pipeline.bindings_for(Hook::SkipExtraAdvance, player),
            CardKind::Wild => self.pipeline.bindings_for(Hook::WildExtraAdvance, player),
            _ => Vec::new(),
        };

        // 以下开始修改状态
        let mut resolution = Resolution::default();
        let player = &mut state.players[player_index];
        player.hand.remove(hand_index);
        player.turns_taken += 1;
        let remaining = player.hand.len();

        state.discard_pile.push(card);
        state.active_color = next_color;
        debug!(player_id, card_id, color = %next_color, "card played");
        resolution.push(
            state,
            GameEvent::CardPlayed {
                player_id,
                card,
                active_color: next_color,
            },
        );

        let uno_called = self.update_uno(state, player_index, remaining, &mut resolution);

        if remaining == 0 {
            let status = if is_human {
                MatchStatus::Won
            } else {
                MatchStatus::Lost
            };
            state.status = status;
            info!(winner = player_id, ?status, "match ended");
            resolution.push(
                state,
                GameEvent::MatchEnded {
                    winner: player_id,
                    status,
                },
            );
            resolution.outcome = Some(status);
            return Ok(resolution);
        }

        if card.kind == CardKind::Reverse {
            state.turn_direction = state.turn_direction.reversed();
            resolution.push(
                state,
                GameEvent::DirectionReversed {
                    direction: state.turn_direction,
                },
            );
            resolution
                .notices
                .push(EffectNotice::new(player_id, PlayerEffect::Reverse));
        }

        match keep_turn {
            Some(binding) => resolution.trigger(state, binding),
            None => state.advance_turn(),
        }

        match card.kind {
            CardKind::Skip => {
                let skipped = Self::skip_current(state, &mut resolution);
                resolution
                    .notices
                    .push(EffectNotice::new(skipped, PlayerEffect::Skip));
            }
            CardKind::Wild => resolution
                .notices
                .push(EffectNotice::new(player_id, PlayerEffect::Wild)),
            _ => {}
        }
        for binding in extra_skips {
            for _ in 0..binding.amount {
                Self::skip_current(state, &mut resolution);
            }
            resolution.trigger(state, binding);
        }

        if let Some(penalty) = penalty {
            let recipient_id = state.players[penalty.recipient].id;
            for _ in 0..penalty.count {
                let drawn = draw_one(state, rng)?;
                state.players[penalty.recipient].hand.push(drawn);
            }
            state.players[penalty.recipient].called_uno = false;
            resolution.push(
                state,
                GameEvent::PenaltyDrawn {
                    player_id: recipient_id,
                    count: penalty.count,
                },
            );
            resolution
                .notices
                .push(EffectNotice::new(recipient_id, penalty.effect));
            for binding in penalty.bindings {
                resolution.trigger(state, binding);
            }
            Self::skip_current(state, &mut resolution);
        }

        if let Some(binding) = sluggish {
            let drawn = draw_one(state, rng)?;
            state.players[player_index].hand.push(drawn);
            state.players[player_index].called_uno = false;
            resolution.push(
                state,
                GameEvent::CardDrawn {
                    player_id,
                    card_id: drawn.id,
                    forced: true,
                },
            );
            resolution.trigger(state, binding);
        }

        if uno_called && resolution.notices.is_empty() {
            resolution
                .notices
                .push(EffectNotice::new(player_id, PlayerEffect::Uno));
        }

        Ok(resolution)
    }

    /// 当前座位失去回合：记录事件后再推进一次。
    fn skip_current(state: &mut MatchState, resolution: &mut Resolution) -> PlayerId {
        let skipped = state.players[state.current_player_index].id;
        resolution.push(state, GameEvent::TurnSkipped { player_id: skipped });
        state.advance_turn();
        skipped
    }

    /// 剩一张牌时喊 UNO：AI 总是自动喊，人类只在反射 UNO 生效时自动喊。返回这一手是否喊了。
    fn update_uno(
        &self,
        state: &mut MatchState,
        player_index: usize,
        remaining: usize,
        resolution: &mut Resolution,
    ) -> bool {
        let player = &mut state.players[player_index];
        if remaining != 1 {
            player.called_uno = false;
            return false;
        }
        if player.called_uno {
            return false;
        }

        let auto = self.pipeline.fires_for(Hook::AutoUno, player);
        if player.is_human && auto.is_none() {
            return false;
        }

        player.called_uno = true;
        let player_id = player.id;
        resolution.push(state, GameEvent::UnoCalled { player_id });
        if let Some(binding) = auto {
            resolution.trigger(state, binding);
        }
        true
    }

    /// 给指定座位摸 `count` 张牌。供给不足时整体拒绝。
    pub fn draw_cards<R: Rng + ?Sized>(
        &self,
        state: &mut MatchState,
        player_index: usize,
        count: usize,
        rng: &mut R,
    ) -> Result<Resolution, RuleError> {
        Self::ensure_in_progress(state)?;
        if player_index >= state.players.len() {
            return Err(RuleError::PlayerIndexOutOfRange {
                index: player_index,
            });
        }
        Self::ensure_supply(state, count)?;

        let mut resolution = Resolution::default();
        let player_id = state.players[player_index].id;
        for _ in 0..count {
            let card = draw_one(state, rng)?;
            state.players[player_index].hand.push(card);
            resolution.push(
                state,
                GameEvent::CardDrawn {
                    player_id,
                    card_id: card.id,
                    forced: false,
                },
            );
        }
        if state.players[player_index].hand.len() > 1 {
            state.players[player_index].called_uno = false;
        }
        Ok(resolution)
    }

    /// 手中没有可打出的牌时结束回合。
    pub fn pass_turn(&self, state: &mut MatchState, player_id: PlayerId) -> Result<Resolution, RuleError> {
        Self::ensure_in_progress(state)?;
        let player_index = Self::ensure_turn_owner(state, player_id)?;
        if !self.playable_cards(state, player_index).is_empty() {
            return Err(RuleError::PlayableCardInHand);
        }
        self.end_turn(state, player_id)
    }

    /// 不检查手牌直接结束回合，用于 AI 的强制过牌。
    pub fn end_turn(&self, state: &mut MatchState, player_id: PlayerId) -> Result<Resolution, RuleError> {
        Self::ensure_in_progress(state)?;
        Self::ensure_turn_owner(state, player_id)?;

        let mut resolution = Resolution::default();
        resolution.push(state, GameEvent::TurnPassed { player_id });
        state.advance_turn();
        Ok(resolution)
    }

    /// 人类玩家手动喊 UNO。
    pub fn call_uno(&self, state: &mut MatchState, player_id: PlayerId) -> Result<Resolution, RuleError> {
        Self::ensure_in_progress(state)?;
        let player_index = Self::ensure_turn_owner(state, player_id)?;
        let player = &mut state.players[player_index];
        if player.hand.len() > 2 {
            return Err(RuleError::UnoNotAllowed);
        }

        player.called_uno = true;
        let mut resolution = Resolution::default();
        resolution.push(state, GameEvent::UnoCalled { player_id });
        resolution
            .notices
            .push(EffectNotice::new(player_id, PlayerEffect::Uno));
        Ok(resolution)
    }
}

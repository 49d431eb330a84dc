//! 整局游戏：多场对局的序列、阵容、局间选取增益/减益以及胜负状态。

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::{AiAgent, AiConfig, AiTurn};
use crate::game::{
    build_deck, catalog, deal_opening_hands, find_modifier, flip_first_card, shuffle,
    table_amount, Card, CardId, EffectNotice, GameEvent, Hook, MatchState, MatchStatus, Modifier,
    ModifierKind, ModifierPipeline, PlayCardOptions, Player, PlayerId, Resolution, RuleEngine,
    RuleError, DECK_SIZE, OPENING_HAND_SIZE,
};

const DRAFT_OFFERS_PER_KIND: usize = 3;
pub const MAX_AI_OPPONENTS: u8 = 9;
const HUMAN_NAME: &str = "You";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    #[default]
    NotStarted,
    MatchActive,
    DraftingNextRound,
    Lost,
}

/// 本轮可选的增益和减益。
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DraftOffers {
    pub buffs: Vec<Modifier>,
    pub debuffs: Vec<Modifier>,
}

impl DraftOffers {
    pub fn contains(&self, name: &str) -> bool {
        self.buffs
            .iter()
            .chain(self.debuffs.iter())
            .any(|modifier| modifier.name == name)
    }

    pub fn of_kind(&self, kind: ModifierKind) -> &[Modifier] {
        match kind {
            ModifierKind::Buff => &self.buffs,
            ModifierKind::Debuff => &self.debuffs,
        }
    }

    /// 本轮这一类必须选几个：有得选就选一个，目录抽空后为零。
    pub fn required(&self, kind: ModifierKind) -> usize {
        self.of_kind(kind).len().min(1)
    }

    fn prompt(&self) -> String {
        match (self.required(ModifierKind::Buff), self.required(ModifierKind::Debuff)) {
            (1, 1) => "Pick one buff and one debuff for the next round.",
            (1, _) => "Pick one buff for the next round.",
            (_, 1) => "Pick one debuff for the next round.",
            _ => "Nothing left to draft. Start the next round.",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum DraftError {
    #[error("modifiers can only be drafted between matches")]
    NotDrafting,
    #[error("there is no modifier called {name}")]
    UnknownModifier { name: String },
    #[error("{name} is not on offer this round")]
    NotOffered { name: String },
    #[error("{name} is already active")]
    AlreadyActive { name: String },
    #[error("you already picked a {kind} this round")]
    QuotaReached { kind: ModifierKind },
    #[error("{name} was not drafted this round")]
    NotDrafted { name: String },
    #[error(
        "pick {required_buffs} buff and {required_debuffs} debuff first ({buffs} buff, {debuffs} debuff chosen)"
    )]
    IncompleteDraft {
        buffs: usize,
        debuffs: usize,
        required_buffs: usize,
        required_debuffs: usize,
    },
    #[error("could not start the next match: {error}")]
    MatchSetup { error: RuleError },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum ConfigError {
    #[error("between 1 and {max} AI opponents are supported, got {ai_opponents}")]
    OpponentCount { ai_opponents: u8, max: u8 },
    #[error("hand size must be between 1 and {max} for this table, got {hand_size}")]
    HandSize { hand_size: usize, max: usize },
}

/// 会话配置，可由前端以 JSON 传入，缺省字段取默认值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub ai_opponents: u8,
    pub hand_size: usize,
    pub seed: Option<u64>,
    pub ai: AiConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ai_opponents: 3,
            hand_size: OPENING_HAND_SIZE,
            seed: None,
            ai: AiConfig::default(),
        }
    }
}

impl SessionConfig {
    /// 发完所有起手牌（含懒惰发牌员的加牌）后还要留一张翻作首张。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_AI_OPPONENTS).contains(&self.ai_opponents) {
            return Err(ConfigError::OpponentCount {
                ai_opponents: self.ai_opponents,
                max: MAX_AI_OPPONENTS,
            });
        }
        let seats = usize::from(self.ai_opponents) + 1;
        let bonus = usize::from(table_amount(Hook::OpeningHandBonus));
        let max = DECK_SIZE.saturating_sub(bonus + 1) / seats;
        if self.hand_size == 0 || self.hand_size > max {
            return Err(ConfigError::HandSize {
                hand_size: self.hand_size,
                max,
            });
        }
        Ok(())
    }
}

/// 整局状态：阵容、对局历史（只追加）、累计生效的修饰。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Game {
    pub players: Vec<Player>,
    pub matches: Vec<MatchState>,
    pub active_modifiers: Vec<Modifier>,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_status_message: Option<String>,
    pub drafted_this_round: Vec<Modifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_offers: Option<DraftOffers>,
}

impl Game {
    pub fn new(players: Vec<Player>) -> Self {
        Self {
            players,
            matches: Vec::new(),
            active_modifiers: Vec::new(),
            status: GameStatus::NotStarted,
            draft_status_message: None,
            drafted_this_round: Vec::new(),
            draft_offers: None,
        }
    }

    pub fn current_match(&self) -> Option<&MatchState> {
        self.matches.last()
    }

    pub fn has_modifier(&self, name: &str) -> bool {
        self.active_modifiers
            .iter()
            .any(|modifier| modifier.name == name)
    }

    /// 只有进行中的对局才接受出牌类指令。
    fn active_match_mut(&mut self) -> Result<&mut MatchState, RuleError> {
        match self.status {
            GameStatus::MatchActive => {}
            GameStatus::NotStarted => return Err(RuleError::NoActiveMatch),
            GameStatus::DraftingNextRound => return Err(RuleError::DraftPending),
            GameStatus::Lost => return Err(RuleError::GameOver),
        }
        self.matches.last_mut().ok_or(RuleError::NoActiveMatch)
    }

    fn drafted_count(&self, kind: ModifierKind) -> usize {
        self.drafted_this_round
            .iter()
            .filter(|modifier| modifier.kind == kind)
            .count()
    }
}

fn roster(ai_opponents: u8) -> Vec<Player> {
    let mut players = vec![Player::human(0, HUMAN_NAME)];
    for id in 1..=ai_opponents {
        players.push(Player::ai(id, format!("AI {id}")));
    }
    players
}

fn human_id(state: &MatchState) -> Result<PlayerId, RuleError> {
    state
        .players
        .iter()
        .find(|player| player.is_human)
        .map(|player| player.id)
        .ok_or(RuleError::PlayerNotFound { player_id: 0 })
}

/// 会话：唯一的可变聚合，所有指令都经由这里，查询只返回副本。
pub struct Session {
    game: Game,
    config: SessionConfig,
    rng: SmallRng,
    ai: AiAgent,
    notices: Vec<EffectNotice>,
    alerts: Vec<String>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let ai = AiAgent::with_seed(config.ai, rng.gen());
        Ok(Self {
            game: Game::new(roster(config.ai_opponents)),
            config,
            rng,
            ai,
            notices: Vec::new(),
            alerts: Vec::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> GameStatus {
        self.game.status
    }

    fn engine(&self) -> RuleEngine {
        RuleEngine::new(ModifierPipeline::new(&self.game.active_modifiers))
    }

    /// 重新开始整局：新阵容，清空修饰与历史。
    pub fn start_new_game(&mut self) -> Game {
        info!(opponents = self.config.ai_opponents, "new game");
        self.game = Game::new(roster(self.config.ai_opponents));
        self.notices.clear();
        self.alerts.clear();
        self.game.clone()
    }

    pub fn start_match(&mut self) -> Result<Game, RuleError> {
        match self.game.status {
            GameStatus::NotStarted => {}
            GameStatus::MatchActive => return Err(RuleError::MatchInProgress),
            GameStatus::DraftingNextRound => return Err(RuleError::DraftPending),
            GameStatus::Lost => return Err(RuleError::GameOver),
        }
        self.begin_match(Vec::new())?;
        Ok(self.game.clone())
    }

    /// 洗牌、发牌（懒惰发牌员给人类多发）、翻首张，追加新对局。失败时不改变整局状态。
    fn begin_match(&mut self, granted: Vec<Modifier>) -> Result<(), RuleError> {
        let pipeline = ModifierPipeline::new(&self.game.active_modifiers);

        let mut players = self.game.players.clone();
        players.iter_mut().for_each(Player::reset_for_match);
        let mut deck = shuffle(&build_deck(), &mut self.rng);
        deal_opening_hands(&mut players, &mut deck, self.config.hand_size, |player| {
            usize::from(pipeline.amount_for(Hook::OpeningHandBonus, player))
        })?;
        let (first, active_color) = flip_first_card(&mut deck)?;

        let mut state =
            MatchState::new(players, deck, vec![first], active_color).with_granted_modifiers(granted);
        let dealt_extra = state
            .human_index()
            .and_then(|index| pipeline.fires_for(Hook::OpeningHandBonus, &state.players[index]));
        if let Some(binding) = dealt_extra {
            state.record_event(GameEvent::ModifierTriggered {
                modifier: binding.modifier.to_string(),
                message: binding.alert.to_string(),
            });
            self.alerts.push(binding.alert.to_string());
        }

        info!(
            round = self.game.matches.len() + 1,
            first_card = first.id,
            color = %active_color,
            "match started"
        );
        self.game.matches.push(state);
        self.game.status = GameStatus::MatchActive;
        self.game.drafted_this_round.clear();
        self.game.draft_offers = None;
        self.game.draft_status_message = None;
        self.debug_check();
        Ok(())
    }

    /// 人类出牌。非法出牌返回错误且不修改状态。
    pub fn play_card(
        &mut self,
        card_id: CardId,
        options: PlayCardOptions,
    ) -> Result<Resolution, RuleError> {
        let engine = self.engine();
        let state = self.game.active_match_mut()?;
        let player_id = human_id(state)?;
        let resolution = engine
            .apply_play(state, player_id, card_id, &options, &mut self.rng)
            .inspect_err(|error| warn!(card_id, %error, "play rejected"))?;
        self.absorb(&resolution);
        self.debug_check();
        Ok(resolution)
    }

    /// 给指定座位摸牌，不推进回合。
    pub fn draw_cards(&mut self, count: usize, player_index: usize) -> Result<Resolution, RuleError> {
        let engine = self.engine();
        let state = self.game.active_match_mut()?;
        let resolution = engine
            .draw_cards(state, player_index, count, &mut self.rng)
            .inspect_err(|error| warn!(count, player_index, %error, "draw rejected"))?;
        self.absorb(&resolution);
        self.debug_check();
        Ok(resolution)
    }

    pub fn pass_turn(&mut self) -> Result<Resolution, RuleError> {
        let engine = self.engine();
        let state = self.game.active_match_mut()?;
        let player_id = human_id(state)?;
        let resolution = engine
            .pass_turn(state, player_id)
            .inspect_err(|error| warn!(%error, "pass rejected"))?;
        self.absorb(&resolution);
        self.debug_check();
        Ok(resolution)
    }

    pub fn call_uno(&mut self) -> Result<Resolution, RuleError> {
        let engine = self.engine();
        let state = self.game.active_match_mut()?;
        let player_id = human_id(state)?;
        let resolution = engine
            .call_uno(state, player_id)
            .inspect_err(|error| warn!(%error, "uno rejected"))?;
        self.absorb(&resolution);
        Ok(resolution)
    }

    /// 当前座位是 AI 时替它走完一回合。
    pub fn play_ai_turn(&mut self) -> Result<AiTurn, RuleError> {
        let engine = self.engine();
        let state = self.game.active_match_mut()?;
        let turn = self.ai.play_turn(&engine, state)?;
        self.absorb(&turn.resolution);
        self.debug_check();
        Ok(turn)
    }

    /// 收集通知与提示，并根据对局结果推进整局状态。
    fn absorb(&mut self, resolution: &Resolution) {
        self.notices.extend(resolution.notices.iter().cloned());
        for event in &resolution.events {
            if let GameEvent::ModifierTriggered { message, .. } = event {
                self.alerts.push(message.clone());
            }
        }

        match resolution.outcome {
            Some(MatchStatus::Won) => self.enter_drafting(),
            Some(MatchStatus::Lost) => {
                info!(rounds = self.game.matches.len(), "game lost");
                self.game.status = GameStatus::Lost;
                self.game.draft_offers = None;
            }
            Some(MatchStatus::InProgress) | None => {}
        }
    }

    fn enter_drafting(&mut self) {
        let buffs = self.roll_offers(ModifierKind::Buff);
        let debuffs = self.roll_offers(ModifierKind::Debuff);
        info!(
            rounds = self.game.matches.len(),
            buffs = buffs.len(),
            debuffs = debuffs.len(),
            "match won, drafting"
        );
        self.game.status = GameStatus::DraftingNextRound;
        self.game.drafted_this_round.clear();
        let offers = DraftOffers { buffs, debuffs };
        self.game.draft_status_message = Some(offers.prompt());
        self.game.draft_offers = Some(offers);
    }

    /// 从尚未生效的目录项中随机抽取最多三个。
    fn roll_offers(&mut self, kind: ModifierKind) -> Vec<Modifier> {
        let candidates: Vec<Modifier> = catalog(kind)
            .iter()
            .filter(|modifier| !self.game.has_modifier(modifier.name))
            .copied()
            .collect();
        candidates
            .choose_multiple(&mut self.rng, DRAFT_OFFERS_PER_KIND)
            .copied()
            .collect()
    }

    fn reject<T>(&mut self, error: DraftError) -> Result<T, DraftError> {
        warn!(%error, "draft rejected");
        self.game.draft_status_message = Some(error.to_string());
        Err(error)
    }

    pub fn draft_modifier(&mut self, name: &str) -> Result<(), DraftError> {
        if self.game.status != GameStatus::DraftingNextRound {
            return self.reject(DraftError::NotDrafting);
        }
        let Some(modifier) = find_modifier(name) else {
            return self.reject(DraftError::UnknownModifier {
                name: name.to_string(),
            });
        };
        if self.game.has_modifier(modifier.name) {
            return self.reject(DraftError::AlreadyActive {
                name: name.to_string(),
            });
        }
        let offered = self
            .game
            .draft_offers
            .as_ref()
            .is_some_and(|offers| offers.contains(modifier.name));
        if !offered {
            return self.reject(DraftError::NotOffered {
                name: name.to_string(),
            });
        }
        if self.game.drafted_count(modifier.kind) > 0 {
            return self.reject(DraftError::QuotaReached {
                kind: modifier.kind,
            });
        }

        info!(modifier = modifier.name, kind = %modifier.kind, "modifier drafted");
        self.game.active_modifiers.push(modifier);
        self.game.drafted_this_round.push(modifier);
        self.game.draft_status_message = Some(format!("{} drafted.", modifier.name));
        Ok(())
    }

    pub fn undraft_modifier(&mut self, name: &str) -> Result<(), DraftError> {
        if self.game.status != GameStatus::DraftingNextRound {
            return self.reject(DraftError::NotDrafting);
        }
        let Some(position) = self
            .game
            .drafted_this_round
            .iter()
            .position(|modifier| modifier.name == name)
        else {
            return self.reject(DraftError::NotDrafted {
                name: name.to_string(),
            });
        };

        let modifier = self.game.drafted_this_round.remove(position);
        self.game
            .active_modifiers
            .retain(|active| active.name != modifier.name);
        self.game.draft_status_message = Some(format!("{} removed.", modifier.name));
        Ok(())
    }

    /// 每类有得选时各选一个后开始下一场，并记录本轮新获得的修饰。
    /// 某类目录已全部生效时，这一类不再要求。
    pub fn complete_draft_and_advance(&mut self) -> Result<Game, DraftError> {
        if self.game.status != GameStatus::DraftingNextRound {
            return self.reject(DraftError::NotDrafting);
        }
        let offers = self.game.draft_offers.clone().unwrap_or_default();
        let required_buffs = offers.required(ModifierKind::Buff);
        let required_debuffs = offers.required(ModifierKind::Debuff);
        let buffs = self.game.drafted_count(ModifierKind::Buff);
        let debuffs = self.game.drafted_count(ModifierKind::Debuff);
        if buffs != required_buffs || debuffs != required_debuffs {
            return self.reject(DraftError::IncompleteDraft {
                buffs,
                debuffs,
                required_buffs,
                required_debuffs,
            });
        }

        let granted = self.game.drafted_this_round.clone();
        if let Err(error) = self.begin_match(granted) {
            return self.reject(DraftError::MatchSetup { error });
        }
        Ok(self.game.clone())
    }

    pub fn game(&self) -> Game {
        self.game.clone()
    }

    pub fn current_match(&self) -> Option<MatchState> {
        self.game.current_match().cloned()
    }

    pub fn current_player(&self) -> Option<Player> {
        self.game
            .current_match()
            .and_then(MatchState::current_player)
            .cloned()
    }

    pub fn player_index_of(&self, player_id: PlayerId) -> Option<usize> {
        self.game.current_match()?.player_index(player_id)
    }

    pub fn active_modifiers(&self) -> Vec<Modifier> {
        self.game.active_modifiers.clone()
    }

    pub fn draft_offers(&self) -> Option<DraftOffers> {
        self.game.draft_offers.clone()
    }

    /// 轮到人类时，手中当前能打出的牌。
    pub fn playable_cards(&self) -> Vec<Card> {
        let Some(state) = self.game.current_match() else {
            return Vec::new();
        };
        match state.human_index() {
            Some(index) if !state.is_finished() => self.engine().playable_cards(state, index),
            _ => Vec::new(),
        }
    }

    pub fn is_ai_turn(&self) -> bool {
        self.game.status == GameStatus::MatchActive
            && self
                .game
                .current_match()
                .and_then(MatchState::current_player)
                .is_some_and(|player| !player.is_human)
    }

    pub fn drain_notices(&mut self) -> Vec<EffectNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn drain_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    fn debug_check(&self) {
        if let Some(state) = self.game.current_match() {
            let result = state.integrity_check();
            debug_assert!(result.is_ok(), "match integrity violated: {result:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{modifiers::names, CardColor, CardKind, PlayerEffect, BUFFS, DECK_SIZE};

    fn seeded(seed: u64) -> Session {
        Session::new(SessionConfig {
            seed: Some(seed),
            ..SessionConfig::default()
        })
        .expect("default config is valid")
    }

    fn activate(session: &mut Session, name: &str) {
        let modifier = find_modifier(name).expect("catalog entry");
        session.game.active_modifiers.push(modifier);
    }

    /// 把符合条件的一张牌移入人类手牌，并让人类以该颜色行动。
    fn hand_human(session: &mut Session, pick: impl Fn(&Card) -> bool) -> Card {
        let state = session.game.matches.last_mut().expect("match");
        let card = if let Some(pos) = state.draw_pile.iter().position(|card| pick(card)) {
            state.draw_pile.remove(pos)
        } else {
            let (seat, pos) = state
                .players
                .iter()
                .enumerate()
                .skip(1)
                .find_map(|(seat, player)| {
                    player.hand.iter().position(|card| pick(card)).map(|pos| (seat, pos))
                })
                .expect("card somewhere");
            state.players[seat].hand.remove(pos)
        };
        state.players[0].hand.push(card);
        if card.color.is_chromatic() {
            state.active_color = card.color;
        }
        state.current_player_index = 0;
        card
    }

    /// 人类只剩一张可打出的非万能牌。
    fn rig_human_win(session: &mut Session) -> CardId {
        let state = session.game.matches.last_mut().expect("match");
        let mut hand = std::mem::take(&mut state.players[0].hand);
        let pos = hand
            .iter()
            .position(|card| !card.is_wild())
            .expect("a coloured card");
        let card = hand.remove(pos);
        state.players[0].hand.push(card);
        state.draw_pile.extend(hand);
        state.active_color = card.color;
        state.current_player_index = 0;
        card.id
    }

    fn win_current_match(session: &mut Session) {
        let card_id = rig_human_win(session);
        let resolution = session
            .play_card(card_id, PlayCardOptions::default())
            .expect("winning play");
        assert_eq!(resolution.outcome, Some(MatchStatus::Won));
    }

    #[test]
    fn start_match_deals_standard_hands() {
        let mut session = seeded(1);
        assert_eq!(session.status(), GameStatus::NotStarted);

        let game = session.start_match().expect("match starts");

        assert_eq!(game.status, GameStatus::MatchActive);
        assert_eq!(game.matches.len(), 1);
        let state = &game.matches[0];
        assert_eq!(state.players.len(), 4);
        assert!(state.players.iter().all(|player| player.hand.len() == 7));
        assert_eq!(state.players[0].name, "You");
        assert_eq!(state.players[3].name, "AI 3");
        assert_eq!(state.discard_pile.len(), 1);
        assert!(state.active_color.is_chromatic());
        assert_eq!(state.card_count(), DECK_SIZE);
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn second_start_is_rejected() {
        let mut session = seeded(2);
        session.start_match().expect("match starts");
        assert_eq!(session.start_match(), Err(RuleError::MatchInProgress));
        assert_eq!(session.game().matches.len(), 1);
    }

    #[test]
    fn commands_need_an_active_match() {
        let mut session = seeded(3);
        assert_eq!(session.pass_turn(), Err(RuleError::NoActiveMatch));
        assert!(matches!(
            session.draw_cards(1, 0),
            Err(RuleError::NoActiveMatch)
        ));
    }

    #[test]
    fn lazy_dealer_adds_three_cards_to_the_human_only() {
        let mut session = seeded(4);
        activate(&mut session, names::LAZY_DEALER);

        let game = session.start_match().expect("match starts");

        let hands: Vec<usize> = game.matches[0]
            .players
            .iter()
            .map(|player| player.hand.len())
            .collect();
        assert_eq!(hands, vec![10, 7, 7, 7]);
        assert_eq!(game.matches[0].card_count(), DECK_SIZE);
        let alerts = session.drain_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("Lazy Dealer"));
        assert!(session.drain_alerts().is_empty());
    }

    #[test]
    fn queries_return_copies() {
        let mut session = seeded(5);
        session.start_match().expect("match starts");

        let mut copy = session.current_match().expect("match");
        copy.players[0].hand.clear();
        copy.draw_pile.clear();
        let mut game = session.game();
        game.status = GameStatus::Lost;

        let live = session.current_match().expect("match");
        assert_eq!(live.players[0].hand.len(), 7);
        assert_eq!(live.card_count(), DECK_SIZE);
        assert_eq!(session.status(), GameStatus::MatchActive);
    }

    #[test]
    fn illegal_play_leaves_the_match_untouched() {
        let mut session = seeded(6);
        session.start_match().expect("match starts");
        let before = session.current_match().expect("match");

        let result = session.play_card(9_999, PlayCardOptions::default());

        assert_eq!(result, Err(RuleError::CardNotFound { card_id: 9_999 }));
        assert_eq!(session.current_match(), Some(before));
    }

    #[test]
    fn skip_notice_reaches_the_queue() {
        let mut session = seeded(7);
        session.start_match().expect("match starts");
        let skip = hand_human(&mut session, |card| card.kind == CardKind::Skip);

        session
            .play_card(skip.id, PlayCardOptions::default())
            .expect("skip is legal");

        let notices = session.drain_notices();
        assert_eq!(notices, vec![EffectNotice::new(1, PlayerEffect::Skip)]);
        assert!(session.drain_notices().is_empty());
        let state = session.current_match().expect("match");
        assert_eq!(state.current_player_index, 2);
    }

    #[test]
    fn drafting_flow_gates_the_next_match() {
        let mut session = seeded(8);
        session.start_match().expect("match starts");
        win_current_match(&mut session);
        assert_eq!(session.status(), GameStatus::DraftingNextRound);

        let offers = session.draft_offers().expect("offers rolled");
        assert_eq!(offers.buffs.len(), 3);
        assert_eq!(offers.debuffs.len(), 3);

        assert!(matches!(
            session.complete_draft_and_advance(),
            Err(DraftError::IncompleteDraft { buffs: 0, debuffs: 0, .. })
        ));

        session
            .draft_modifier(offers.buffs[0].name)
            .expect("buff drafted");
        assert_eq!(
            session.draft_modifier(offers.buffs[1].name),
            Err(DraftError::QuotaReached {
                kind: ModifierKind::Buff
            })
        );
        assert!(matches!(
            session.complete_draft_and_advance(),
            Err(DraftError::IncompleteDraft {
                buffs: 1,
                debuffs: 0,
                required_buffs: 1,
                required_debuffs: 1
            })
        ));
        assert!(session.game().draft_status_message.is_some());

        session
            .draft_modifier(offers.debuffs[0].name)
            .expect("debuff drafted");
        let game = session.complete_draft_and_advance().expect("next match");

        assert_eq!(game.status, GameStatus::MatchActive);
        assert_eq!(game.matches.len(), 2);
        assert_eq!(game.matches[0].status, MatchStatus::Won);
        let granted: Vec<&str> = game.matches[1]
            .modifiers_granted_this_round
            .iter()
            .map(|modifier| modifier.name)
            .collect();
        assert_eq!(granted, vec![offers.buffs[0].name, offers.debuffs[0].name]);
        assert_eq!(game.active_modifiers.len(), 2);
        assert!(game.drafted_this_round.is_empty());
    }

    #[test]
    fn draft_rejections_explain_themselves() {
        let mut session = seeded(9);
        assert_eq!(
            session.draft_modifier(names::GOOD_AIM),
            Err(DraftError::NotDrafting)
        );

        session.start_match().expect("match starts");
        win_current_match(&mut session);

        assert!(matches!(
            session.draft_modifier("Lucky Draw"),
            Err(DraftError::UnknownModifier { .. })
        ));
        assert_eq!(
            session.game().draft_status_message.as_deref(),
            Some("there is no modifier called Lucky Draw")
        );

        let offers = session.draft_offers().expect("offers rolled");
        let not_offered = BUFFS
            .iter()
            .find(|modifier| !offers.contains(modifier.name))
            .expect("seven buffs, three offered");
        assert!(matches!(
            session.draft_modifier(not_offered.name),
            Err(DraftError::NotOffered { .. })
        ));
        assert!(session.game().active_modifiers.is_empty());
    }

    #[test]
    fn undraft_frees_the_quota() {
        let mut session = seeded(10);
        session.start_match().expect("match starts");
        win_current_match(&mut session);
        let offers = session.draft_offers().expect("offers rolled");

        session.draft_modifier(offers.buffs[0].name).expect("drafted");
        assert_eq!(
            session.draft_modifier(offers.buffs[0].name),
            Err(DraftError::AlreadyActive {
                name: offers.buffs[0].name.to_string()
            })
        );
        session
            .undraft_modifier(offers.buffs[0].name)
            .expect("undrafted");
        assert!(session.game().active_modifiers.is_empty());
        assert!(matches!(
            session.undraft_modifier(offers.buffs[0].name),
            Err(DraftError::NotDrafted { .. })
        ));

        session.draft_modifier(offers.buffs[1].name).expect("drafted");
        assert_eq!(session.active_modifiers().len(), 1);
    }

    #[test]
    fn active_modifiers_are_not_offered_again() {
        let mut session = seeded(11);
        session.start_match().expect("match starts");
        win_current_match(&mut session);
        let first = session.draft_offers().expect("offers rolled");
        session.draft_modifier(first.buffs[0].name).expect("drafted");
        session.draft_modifier(first.debuffs[0].name).expect("drafted");
        session.complete_draft_and_advance().expect("next match");

        win_current_match(&mut session);
        let second = session.draft_offers().expect("offers rolled");
        assert!(!second.contains(first.buffs[0].name));
        assert!(!second.contains(first.debuffs[0].name));
    }

    #[test]
    fn ai_win_ends_the_game() {
        let mut session = seeded(12);
        session.start_match().expect("match starts");
        {
            let state = session.game.matches.last_mut().expect("match");
            let mut hand = std::mem::take(&mut state.players[1].hand);
            let pos = hand
                .iter()
                .position(|card| !card.is_wild())
                .expect("a coloured card");
            let card = hand.remove(pos);
            state.players[1].hand.push(card);
            state.draw_pile.extend(hand);
            state.active_color = card.color;
            state.current_player_index = 1;
        }
        assert!(session.is_ai_turn());

        let turn = session.play_ai_turn().expect("ai turn");

        assert_eq!(turn.resolution.outcome, Some(MatchStatus::Lost));
        assert_eq!(session.status(), GameStatus::Lost);
        assert_eq!(session.start_match(), Err(RuleError::GameOver));

        let game = session.start_new_game();
        assert_eq!(game.status, GameStatus::NotStarted);
        assert!(game.matches.is_empty());
        assert!(game.active_modifiers.is_empty());
    }

    #[test]
    fn drafting_continues_after_a_catalog_runs_out() {
        let mut session = seeded(14);
        session.start_match().expect("match starts");

        for round in 1..=8 {
            win_current_match(&mut session);
            let offers = session.draft_offers().expect("offers rolled");
            match round {
                7 => {
                    assert_eq!(offers.buffs.len(), 1);
                    assert!(offers.debuffs.is_empty());
                    assert!(matches!(
                        session.complete_draft_and_advance(),
                        Err(DraftError::IncompleteDraft {
                            buffs: 0,
                            required_buffs: 1,
                            required_debuffs: 0,
                            ..
                        })
                    ));
                }
                8 => {
                    assert!(offers.buffs.is_empty());
                    assert!(offers.debuffs.is_empty());
                }
                _ => {}
            }
            for modifier in offers.buffs.first().into_iter().chain(offers.debuffs.first()) {
                session.draft_modifier(modifier.name).expect("offered modifier drafted");
            }
            session
                .complete_draft_and_advance()
                .unwrap_or_else(|error| panic!("round {round} should advance: {error}"));
        }

        let game = session.game();
        assert_eq!(game.status, GameStatus::MatchActive);
        assert_eq!(game.matches.len(), 9);
        assert_eq!(game.active_modifiers.len(), 13);
        assert!(game.matches[8].modifiers_granted_this_round.is_empty());
    }

    #[test]
    fn config_is_checked_before_a_session_exists() {
        let config = |ai_opponents: u8, hand_size: usize| SessionConfig {
            ai_opponents,
            hand_size,
            ..SessionConfig::default()
        };

        assert_eq!(
            Session::new(config(3, 0)).err(),
            Some(ConfigError::HandSize { hand_size: 0, max: 26 })
        );
        assert_eq!(
            Session::new(config(3, usize::MAX)).err(),
            Some(ConfigError::HandSize {
                hand_size: usize::MAX,
                max: 26
            })
        );
        assert_eq!(
            Session::new(config(0, 7)).err(),
            Some(ConfigError::OpponentCount {
                ai_opponents: 0,
                max: MAX_AI_OPPONENTS
            })
        );
        assert!(Session::new(config(MAX_AI_OPPONENTS + 1, 7)).is_err());

        let mut widest = Session::new(config(MAX_AI_OPPONENTS, 10)).expect("ten seats fit");
        activate(&mut widest, names::LAZY_DEALER);
        let game = widest.start_match().expect("largest table deals");
        assert_eq!(game.matches[0].players.len(), 10);
        assert_eq!(game.matches[0].card_count(), DECK_SIZE);
    }

    #[test]
    fn cards_are_conserved_through_a_played_out_match() {
        let mut session = seeded(13);
        session.start_match().expect("match starts");
        let mut drew = false;

        for _ in 0..1_000 {
            if session.status() != GameStatus::MatchActive {
                break;
            }
            if session.is_ai_turn() {
                session.play_ai_turn().expect("ai turn");
            } else if let Some(card) = session.playable_cards().first().copied() {
                let options = if card.is_wild() {
                    PlayCardOptions::with_color(CardColor::Red)
                } else {
                    PlayCardOptions::default()
                };
                session
                    .play_card(card.id, options)
                    .expect("playable card is accepted");
                drew = false;
            } else if !drew {
                let _ = session.draw_cards(1, 0);
                drew = true;
            } else {
                session.pass_turn().expect("nothing playable");
                drew = false;
            }

            let state = session.current_match().expect("match");
            assert_eq!(state.card_count(), DECK_SIZE);
            assert_eq!(state.integrity_check(), Ok(()));
        }
    }
}

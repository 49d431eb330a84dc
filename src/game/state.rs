use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::modifiers::Modifier;

/// 整副牌的固定张数：4 色 ×（1 张 0 + 2×9 数字 + 2×3 功能）+ 8 张万能牌。
pub const DECK_SIZE: usize = 108;

/// 对局内唯一且稳定的卡牌标识。
pub type CardId = u32;
/// 玩家标识，同时也是名册中的座位号。
pub type PlayerId = u8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardColor {
    Red,
    Blue,
    Green,
    Yellow,
    Black,
}

impl CardColor {
    /// 可作为当前颜色的四种颜色，顺序即平局时的优先顺序。
    pub const CHROMATIC: [CardColor; 4] = [
        CardColor::Red,
        CardColor::Blue,
        CardColor::Green,
        CardColor::Yellow,
    ];

    pub fn is_chromatic(self) -> bool {
        !matches!(self, CardColor::Black)
    }
}

impl FromStr for CardColor {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(CardColor::Red),
            "blue" => Ok(CardColor::Blue),
            "green" => Ok(CardColor::Green),
            "yellow" => Ok(CardColor::Yellow),
            "black" => Ok(CardColor::Black),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CardColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardColor::Red => "red",
            CardColor::Blue => "blue",
            CardColor::Green => "green",
            CardColor::Yellow => "yellow",
            CardColor::Black => "black",
        };
        f.write_str(name)
    }
}

/// 卡牌种类；数字只存在于数字牌上。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CardKind {
    Number(u8),
    Skip,
    Reverse,
    Draw2,
    Wild,
    WildDraw4,
}

impl CardKind {
    pub fn is_wild(self) -> bool {
        matches!(self, CardKind::Wild | CardKind::WildDraw4)
    }

    pub fn same_type(self, other: CardKind) -> bool {
        std::mem::discriminant(&self) == std::mem::discriminant(&other)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Card {
    pub id: CardId,
    pub color: CardColor,
    pub kind: CardKind,
}

impl Card {
    pub fn new(id: CardId, color: CardColor, kind: CardKind) -> Self {
        Self { id, color, kind }
    }

    pub fn is_wild(&self) -> bool {
        self.kind.is_wild()
    }
}

/// 玩家状态。整局游戏只创建一次，每场对局开始时重置手牌。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_human: bool,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub called_uno: bool,
    #[serde(default)]
    pub turns_taken: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, is_human: bool) -> Self {
        Self {
            id,
            name: name.into(),
            is_human,
            hand: Vec::new(),
            called_uno: false,
            turns_taken: 0,
        }
    }

    pub fn human(id: PlayerId, name: impl Into<String>) -> Self {
        Self::new(id, name, true)
    }

    pub fn ai(id: PlayerId, name: impl Into<String>) -> Self {
        Self::new(id, name, false)
    }

    pub fn find_card_in_hand_index(&self, card_id: CardId) -> Option<usize> {
        self.hand.iter().position(|card| card.id == card_id)
    }

    pub fn remove_card_from_hand(&mut self, card_id: CardId) -> Option<Card> {
        let idx = self.find_card_in_hand_index(card_id)?;
        Some(self.hand.remove(idx))
    }

    pub fn reset_for_match(&mut self) {
        self.hand.clear();
        self.called_uno = false;
        self.turns_taken = 0;
    }
}

/// 出牌方向，序列化为 `1` / `-1`。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "i8", try_from = "i8")]
pub enum TurnDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl TurnDirection {
    pub fn step(self) -> isize {
        match self {
            TurnDirection::Clockwise => 1,
            TurnDirection::CounterClockwise => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            TurnDirection::Clockwise => TurnDirection::CounterClockwise,
            TurnDirection::CounterClockwise => TurnDirection::Clockwise,
        }
    }

    /// 从 `index` 沿当前方向走一步，双向回绕。
    pub fn step_from(self, index: usize, player_count: usize) -> usize {
        if player_count == 0 {
            return 0;
        }
        (index as isize + self.step()).rem_euclid(player_count as isize) as usize
    }
}

impl From<TurnDirection> for i8 {
    fn from(direction: TurnDirection) -> Self {
        direction.step() as i8
    }
}

impl TryFrom<i8> for TurnDirection {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TurnDirection::Clockwise),
            -1 => Ok(TurnDirection::CounterClockwise),
            other => Err(format!("turn direction must be 1 or -1, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    #[default]
    InProgress,
    Won,
    Lost,
}

/// 推送给表现层的玩家特效类型。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlayerEffect {
    Skip,
    Reverse,
    Draw2,
    /// 保留在通知契约里；`wildDraw4` 的受罚者收到的是 `WildDraw4`。
    Draw4,
    Wild,
    WildDraw4,
    Uno,
}

/// 通知契约：`{ playerId, effect }`，发出即忘。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EffectNotice {
    pub player_id: PlayerId,
    pub effect: PlayerEffect,
}

impl EffectNotice {
    pub fn new(player_id: PlayerId, effect: PlayerEffect) -> Self {
        Self { player_id, effect }
    }
}

/// 对局事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    CardPlayed {
        player_id: PlayerId,
        card: Card,
        active_color: CardColor,
    },
    CardDrawn {
        player_id: PlayerId,
        card_id: CardId,
        #[serde(default)]
        forced: bool,
    },
    PenaltyDrawn {
        player_id: PlayerId,
        count: u8,
    },
    DrawPileReplenished {
        cards: usize,
    },
    DirectionReversed {
        direction: TurnDirection,
    },
    TurnSkipped {
        player_id: PlayerId,
    },
    TurnPassed {
        player_id: PlayerId,
    },
    UnoCalled {
        player_id: PlayerId,
    },
    ModifierTriggered {
        modifier: String,
        message: String,
    },
    MatchEnded {
        winner: PlayerId,
        status: MatchStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("expected {expected} cards in play, found {actual}")]
    CardCountMismatch { expected: usize, actual: usize },
    #[error("current player index {index} is outside 0..{players}")]
    CurrentPlayerOutOfRange { index: usize, players: usize },
    #[error("discard pile is empty")]
    EmptyDiscardPile,
    #[error("active color {color} is not chromatic")]
    InvalidActiveColor { color: CardColor },
    #[error("card {card_id} appears more than once")]
    DuplicateCardId { card_id: CardId },
}

/// 单场对局的可变状态。弃牌堆以末尾为牌顶，摸牌堆同样从末尾摸。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MatchState {
    pub players: Vec<Player>,
    pub current_player_index: usize,
    pub turn_direction: TurnDirection,
    pub draw_pile: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub active_color: CardColor,
    pub status: MatchStatus,
    #[serde(default)]
    pub modifiers_granted_this_round: Vec<Modifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl MatchState {
    pub fn new(
        players: Vec<Player>,
        draw_pile: Vec<Card>,
        discard_pile: Vec<Card>,
        active_color: CardColor,
    ) -> Self {
        Self {
            players,
            current_player_index: 0,
            turn_direction: TurnDirection::default(),
            draw_pile,
            discard_pile,
            active_color,
            status: MatchStatus::InProgress,
            modifiers_granted_this_round: Vec::new(),
            event_log: Vec::new(),
        }
    }

    pub fn with_granted_modifiers(mut self, granted: Vec<Modifier>) -> Self {
        self.modifiers_granted_this_round = granted;
        self
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn top_card(&self) -> Option<&Card> {
        self.discard_pile.last()
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    pub fn player_index(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|player| player.id == id)
    }

    pub fn human_index(&self) -> Option<usize> {
        self.players.iter().position(|player| player.is_human)
    }

    pub fn is_finished(&self) -> bool {
        self.status != MatchStatus::InProgress
    }

    /// 沿当前方向推进一次回合，所有改变回合归属的效果都经由这里。
    pub fn advance_turn(&mut self) {
        self.current_player_index = next_player_index(self);
    }

    pub fn card_count(&self) -> usize {
        self.draw_pile.len()
            + self.discard_pile.len()
            + self
                .players
                .iter()
                .map(|player| player.hand.len())
                .sum::<usize>()
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.current_player_index >= self.players.len() {
            return Err(IntegrityError::CurrentPlayerOutOfRange {
                index: self.current_player_index,
                players: self.players.len(),
            });
        }
        if self.discard_pile.is_empty() {
            return Err(IntegrityError::EmptyDiscardPile);
        }
        if !self.active_color.is_chromatic() {
            return Err(IntegrityError::InvalidActiveColor {
                color: self.active_color,
            });
        }

        let actual = self.card_count();
        if actual != DECK_SIZE {
            return Err(IntegrityError::CardCountMismatch {
                expected: DECK_SIZE,
                actual,
            });
        }

        let mut seen = HashSet::new();
        for card in self
            .draw_pile
            .iter()
            .chain(self.discard_pile.iter())
            .chain(self.players.iter().flat_map(|player| player.hand.iter()))
        {
            if !seen.insert(card.id) {
                return Err(IntegrityError::DuplicateCardId { card_id: card.id });
            }
        }

        Ok(())
    }
}

/// 回合推进的唯一原语：当前索引加上方向，对人数取模（双向回绕）。
pub fn next_player_index(state: &MatchState) -> usize {
    state
        .turn_direction
        .step_from(state.current_player_index, state.players.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(players: usize) -> MatchState {
        let roster = (0..players)
            .map(|id| Player::new(id as PlayerId, format!("P{id}"), id == 0))
            .collect();
        MatchState::new(
            roster,
            Vec::new(),
            vec![Card::new(0, CardColor::Red, CardKind::Number(5))],
            CardColor::Red,
        )
    }

    #[test]
    fn clockwise_cycles_through_every_seat() {
        for players in 2..=6 {
            let mut state = table(players);
            for start in 0..players {
                state.current_player_index = start;
                let mut visited = Vec::new();
                for _ in 0..players {
                    state.advance_turn();
                    visited.push(state.current_player_index);
                }
                let expected: Vec<usize> = (1..=players).map(|i| (start + i) % players).collect();
                assert_eq!(visited, expected, "players={players}, start={start}");
            }
        }
    }

    #[test]
    fn counter_clockwise_wraps_below_zero() {
        let mut state = table(4);
        state.turn_direction = TurnDirection::CounterClockwise;
        state.current_player_index = 0;
        assert_eq!(next_player_index(&state), 3);
        state.advance_turn();
        state.advance_turn();
        assert_eq!(state.current_player_index, 2);
    }

    #[test]
    fn direction_serializes_as_signed_step() {
        let json = serde_json::to_string(&TurnDirection::CounterClockwise).expect("serialize");
        assert_eq!(json, "-1");
        let parsed: TurnDirection = serde_json::from_str("1").expect("deserialize");
        assert_eq!(parsed, TurnDirection::Clockwise);
        assert!(serde_json::from_str::<TurnDirection>("2").is_err());
    }

    #[test]
    fn notice_uses_presentation_field_names() {
        let notice = EffectNotice::new(2, PlayerEffect::WildDraw4);
        let json = serde_json::to_string(&notice).expect("serialize");
        assert_eq!(json, r#"{"playerId":2,"effect":"wildDraw4"}"#);
    }

    #[test]
    fn integrity_check_flags_black_active_color() {
        let mut state = table(2);
        state.active_color = CardColor::Black;
        assert!(matches!(
            state.integrity_check(),
            Err(IntegrityError::InvalidActiveColor { .. })
        ));
    }

    #[test]
    fn card_kind_type_match_ignores_number_value() {
        assert!(CardKind::Number(3).same_type(CardKind::Number(7)));
        assert!(!CardKind::Skip.same_type(CardKind::Reverse));
        assert!(CardKind::WildDraw4.is_wild());
    }
}

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::rules::RuleError;
use super::state::{Card, CardColor, CardId, CardKind, GameEvent, MatchState, Player};

pub const OPENING_HAND_SIZE: usize = 7;

/// 生成固定的 108 张牌，id 从 0 开始连续编号。
pub fn build_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(super::state::DECK_SIZE);
    let mut next_id: CardId = 0;
    let mut push = |deck: &mut Vec<Card>, color: CardColor, kind: CardKind| {
        deck.push(Card::new(next_id, color, kind));
        next_id += 1;
    };

    for color in CardColor::CHROMATIC {
        push(&mut deck, color, CardKind::Number(0));
        for value in 1..=9 {
            push(&mut deck, color, CardKind::Number(value));
            push(&mut deck, color, CardKind::Number(value));
        }
        for _ in 0..2 {
            push(&mut deck, color, CardKind::Skip);
            push(&mut deck, color, CardKind::Reverse);
            push(&mut deck, color, CardKind::Draw2);
        }
    }

    for _ in 0..4 {
        push(&mut deck, CardColor::Black, CardKind::Wild);
        push(&mut deck, CardColor::Black, CardKind::WildDraw4);
    }

    deck
}

/// 均匀随机排列（Fisher–Yates），返回新序列，不修改输入。
pub fn shuffle<R: Rng + ?Sized>(cards: &[Card], rng: &mut R) -> Vec<Card> {
    let mut shuffled = cards.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

/// 每人发 `hand_size` 张，再加上 `bonus` 给出的额外张数。牌不够时不发任何牌。
pub fn deal_opening_hands<F>(
    players: &mut [Player],
    deck: &mut Vec<Card>,
    hand_size: usize,
    bonus: F,
) -> Result<(), RuleError>
where
    F: Fn(&Player) -> usize,
{
    let needed = players
        .iter()
        .map(|player| hand_size.saturating_add(bonus(player)))
        .fold(0usize, usize::saturating_add);
    if needed > deck.len() {
        return Err(RuleError::EmptyDeck {
            needed,
            available: deck.len(),
        });
    }

    for player in players.iter_mut() {
        let count = hand_size.saturating_add(bonus(player));
        for _ in 0..count {
            if let Some(card) = deck.pop() {
                player.hand.push(card);
            }
        }
    }
    Ok(())
}

/// 翻开首张牌。万能牌翻出时首个当前颜色为红色。
pub fn flip_first_card(deck: &mut Vec<Card>) -> Result<(Card, CardColor), RuleError> {
    let card = deck.pop().ok_or(RuleError::EmptyDeck {
        needed: 1,
        available: 0,
    })?;
    let color = if card.color.is_chromatic() {
        card.color
    } else {
        CardColor::Red
    };
    Ok((card, color))
}

/// 不动牌顶时还能摸到的张数。
pub fn available_supply(state: &MatchState) -> usize {
    state.draw_pile.len() + state.discard_pile.len().saturating_sub(1)
}

/// 保留弃牌堆顶牌，其余洗匀后作为新的摸牌堆。
fn replenish<R: Rng + ?Sized>(state: &mut MatchState, rng: &mut R) -> bool {
    if state.discard_pile.len() < 2 {
        return false;
    }
    let Some(top) = state.discard_pile.pop() else {
        return false;
    };
    let rest = std::mem::take(&mut state.discard_pile);
    state.draw_pile = shuffle(&rest, rng);
    state.discard_pile.push(top);
    debug!(cards = state.draw_pile.len(), "draw pile replenished from discard");
    state.record_event(GameEvent::DrawPileReplenished {
        cards: state.draw_pile.len(),
    });
    true
}

/// 摸一张牌。摸牌堆空了就从弃牌堆补充；两堆都不够时返回 `EmptyDeck`。
pub fn draw_one<R: Rng + ?Sized>(state: &mut MatchState, rng: &mut R) -> Result<Card, RuleError> {
    if state.draw_pile.is_empty() && !replenish(state, rng) {
        return Err(RuleError::EmptyDeck {
            needed: 1,
            available: 0,
        });
    }

    let card = state.draw_pile.pop().ok_or(RuleError::EmptyDeck {
        needed: 1,
        available: 0,
    })?;

    if state.draw_pile.is_empty() {
        replenish(state, rng);
    }

    Ok(card)
}

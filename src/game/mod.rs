//! 对局核心：牌组、状态、规则结算与修饰挂钩。

pub mod deck;
pub mod modifiers;
pub mod rules;
pub mod state;

pub use deck::{
    available_supply,
    build_deck,
    deal_opening_hands,
    draw_one,
    flip_first_card,
    shuffle,
    OPENING_HAND_SIZE,
};
pub use modifiers::{
    catalog,
    find_modifier,
    table_amount,
    Hook,
    HookBinding,
    Modifier,
    ModifierKind,
    ModifierPipeline,
    Scope,
    BUFFS,
    DEBUFFS,
};
pub use rules::{can_play, PlayCardOptions, Resolution, RuleEngine, RuleError};
pub use state::{
    next_player_index,
    Card,
    CardColor,
    CardId,
    CardKind,
    EffectNotice,
    GameEvent,
    IntegrityError,
    MatchState,
    MatchStatus,
    Player,
    PlayerEffect,
    PlayerId,
    TurnDirection,
    DECK_SIZE,
};

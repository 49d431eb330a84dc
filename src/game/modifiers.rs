//! 增益/减益目录，以及规则引擎与 AI 查询的挂钩表。

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;

use super::state::Player;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKind {
    Buff,
    Debuff,
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierKind::Buff => f.write_str("buff"),
            ModifierKind::Debuff => f.write_str("debuff"),
        }
    }
}

/// 持久规则修饰。名字即身份，目录中的记录只复制不修改。
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Modifier {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ModifierKind,
}

impl Modifier {
    const fn buff(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ModifierKind::Buff,
        }
    }

    const fn debuff(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ModifierKind::Debuff,
        }
    }
}

pub mod names {
    pub const REVERSE_MOMENTUM: &str = "Reverse Momentum";
    pub const DOUBLE_SKIP: &str = "Double Skip";
    pub const WILD_SURGE: &str = "Wild Surge";
    pub const PLUS_THREE: &str = "+3 card";
    pub const PLUS_FIVE: &str = "+5 card";
    pub const GOOD_AIM: &str = "Good Aim";
    pub const REFLEX_UNO: &str = "Reflex UNO";

    pub const LAZY_DEALER: &str = "Lazy Dealer";
    pub const SLUGGISH_HANDS: &str = "Sluggish Hands";
    pub const COLOR_BLIND: &str = "Color Blind";
    pub const DRAW_FATIGUE: &str = "Draw Fatigue";
    pub const COLOR_FOCUS: &str = "Color Focus";
    pub const WILD_INSTINCT: &str = "Wild Instinct";
}

pub static BUFFS: Lazy<Vec<Modifier>> = Lazy::new(|| {
    vec![
        Modifier::buff(
            names::REVERSE_MOMENTUM,
            "When you play a Reverse, take an extra turn immediately.",
        ),
        Modifier::buff(
            names::DOUBLE_SKIP,
            "Your Skip cards skip two players instead of one.",
        ),
        Modifier::buff(
            names::WILD_SURGE,
            "Playing a Wild automatically skips the next AI's turn.",
        ),
        Modifier::buff(
            names::PLUS_THREE,
            "When you play a Draw 2 card, it becomes a Draw 3 card.",
        ),
        Modifier::buff(
            names::PLUS_FIVE,
            "When you play a Draw 4 card, it becomes a Draw 5 card.",
        ),
        Modifier::buff(
            names::GOOD_AIM,
            "Choose which opponent receives your Draw 2 cards.",
        ),
        Modifier::buff(
            names::REFLEX_UNO,
            "You automatically call UNO when down to one card.",
        ),
    ]
});

pub static DEBUFFS: Lazy<Vec<Modifier>> = Lazy::new(|| {
    vec![
        Modifier::debuff(
            names::LAZY_DEALER,
            "You start every match with three extra cards.",
        ),
        Modifier::debuff(
            names::SLUGGISH_HANDS,
            "Every 3 turns, you must draw an extra card automatically.",
        ),
        Modifier::debuff(
            names::COLOR_BLIND,
            "You can't play Wilds until you have 3 or fewer cards left.",
        ),
        Modifier::debuff(
            names::DRAW_FATIGUE,
            "Every Draw 2 or Draw 4 played against you adds one extra card.",
        ),
        Modifier::debuff(
            names::COLOR_FOCUS,
            "Opponents prefer cards matching the current color.",
        ),
        Modifier::debuff(
            names::WILD_INSTINCT,
            "Opponents pick the color they hold the most of when playing Wilds.",
        ),
    ]
});

pub fn catalog(kind: ModifierKind) -> &'static [Modifier] {
    match kind {
        ModifierKind::Buff => BUFFS.as_slice(),
        ModifierKind::Debuff => DEBUFFS.as_slice(),
    }
}

pub fn find_modifier(name: &str) -> Option<Modifier> {
    BUFFS
        .iter()
        .chain(DEBUFFS.iter())
        .find(|modifier| modifier.name == name)
        .copied()
}

/// 规则引擎和 AI 在固定位置查询的扩展点。
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum Hook {
    OpeningHandBonus,
    ReverseKeepsTurn,
    SkipExtraAdvance,
    WildExtraAdvance,
    DrawTwoBonus,
    DrawFourBonus,
    DrawTwoTargeting,
    PenaltyFatigue,
    PeriodicForcedDraw,
    WildLock,
    AiPreferActiveColor,
    AiBestWildColor,
    AutoUno,
}

/// 挂钩作用的对象。查询时传入的玩家：行动方或承受方。
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum Scope {
    /// 行动的玩家是人类
    HumanActor,
    /// 承受效果（被发牌、被罚摸）的玩家是人类
    HumanRecipient,
    /// 行动的玩家是 AI
    AiActor,
}

impl Scope {
    pub fn applies_to(self, player: &Player) -> bool {
        match self {
            Scope::HumanActor | Scope::HumanRecipient => player.is_human,
            Scope::AiActor => !player.is_human,
        }
    }
}

/// 挂钩表中的一行：扩展点 × 修饰名 → 作用对象、参数与提示语。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookBinding {
    pub hook: Hook,
    pub modifier: &'static str,
    pub scope: Scope,
    pub amount: u8,
    pub alert: &'static str,
}

const HOOK_TABLE: &[HookBinding] = &[
    HookBinding {
        hook: Hook::OpeningHandBonus,
        modifier: names::LAZY_DEALER,
        scope: Scope::HumanRecipient,
        amount: 3,
        alert: "Lazy Dealer dealt you three extra cards.",
    },
    HookBinding {
        hook: Hook::ReverseKeepsTurn,
        modifier: names::REVERSE_MOMENTUM,
        scope: Scope::HumanActor,
        amount: 0,
        alert: "Reverse Momentum: you keep the turn!",
    },
    HookBinding {
        hook: Hook::SkipExtraAdvance,
        modifier: names::DOUBLE_SKIP,
        scope: Scope::HumanActor,
        amount: 1,
        alert: "Double Skip: another opponent loses their turn.",
    },
    HookBinding {
        hook: Hook::WildExtraAdvance,
        modifier: names::WILD_SURGE,
        scope: Scope::HumanActor,
        amount: 1,
        alert: "Wild Surge: the next opponent is skipped.",
    },
    HookBinding {
        hook: Hook::DrawTwoBonus,
        modifier: names::PLUS_THREE,
        scope: Scope::HumanActor,
        amount: 1,
        alert: "+3 card: your Draw 2 hits for three.",
    },
    HookBinding {
        hook: Hook::DrawFourBonus,
        modifier: names::PLUS_FIVE,
        scope: Scope::HumanActor,
        amount: 1,
        alert: "+5 card: your Draw 4 hits for five.",
    },
    HookBinding {
        hook: Hook::DrawTwoTargeting,
        modifier: names::GOOD_AIM,
        scope: Scope::HumanActor,
        amount: 0,
        alert: "Good Aim: your Draw 2 lands where you aimed it.",
    },
    HookBinding {
        hook: Hook::PenaltyFatigue,
        modifier: names::DRAW_FATIGUE,
        scope: Scope::HumanRecipient,
        amount: 1,
        alert: "Draw Fatigue: you draw one extra card.",
    },
    HookBinding {
        hook: Hook::PeriodicForcedDraw,
        modifier: names::SLUGGISH_HANDS,
        scope: Scope::HumanActor,
        amount: 3,
        alert: "Sluggish Hands: you draw a card.",
    },
    HookBinding {
        hook: Hook::WildLock,
        modifier: names::COLOR_BLIND,
        scope: Scope::HumanActor,
        amount: 3,
        alert: "Color Blind: wilds are locked while you hold more than three cards.",
    },
    HookBinding {
        hook: Hook::AiPreferActiveColor,
        modifier: names::COLOR_FOCUS,
        scope: Scope::AiActor,
        amount: 0,
        alert: "Color Focus: the opponent sticks to the current color.",
    },
    HookBinding {
        hook: Hook::AiBestWildColor,
        modifier: names::WILD_INSTINCT,
        scope: Scope::AiActor,
        amount: 0,
        alert: "Wild Instinct: the opponent picks its strongest color.",
    },
    HookBinding {
        hook: Hook::AutoUno,
        modifier: names::REFLEX_UNO,
        scope: Scope::HumanActor,
        amount: 0,
        alert: "Reflex UNO: called UNO for you.",
    },
];

static BINDINGS_BY_HOOK: Lazy<HashMap<Hook, Vec<&'static HookBinding>>> = Lazy::new(|| {
    let mut index: HashMap<Hook, Vec<&'static HookBinding>> = HashMap::new();
    for binding in HOOK_TABLE {
        index.entry(binding.hook).or_default().push(binding);
    }
    index
});

/// 由当前生效的修饰构建的查询管线。新修饰只需在表中加一行。
#[derive(Debug, Clone, Default)]
pub struct ModifierPipeline {
    active: Vec<Modifier>,
}

impl ModifierPipeline {
    pub fn new(active: &[Modifier]) -> Self {
        Self {
            active: active.to_vec(),
        }
    }

    pub fn has_modifier(&self, name: &str) -> bool {
        self.active.iter().any(|modifier| modifier.name == name)
    }

    pub fn active(&self) -> &[Modifier] {
        &self.active
    }

    /// 指定扩展点上所有已生效的绑定。
    pub fn bindings(&self, hook: Hook) -> impl Iterator<Item = &'static HookBinding> + '_ {
        BINDINGS_BY_HOOK
            .get(&hook)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |binding| self.has_modifier(binding.modifier))
    }

    /// 已生效且作用于 `player` 的绑定。
    pub fn bindings_for(&self, hook: Hook, player: &Player) -> Vec<&'static HookBinding> {
        self.bindings(hook)
            .filter(|binding| binding.scope.applies_to(player))
            .collect()
    }

    pub fn fires_for(&self, hook: Hook, player: &Player) -> Option<&'static HookBinding> {
        self.bindings(hook)
            .find(|binding| binding.scope.applies_to(player))
    }

    pub fn amount_for(&self, hook: Hook, player: &Player) -> u8 {
        self.bindings(hook)
            .filter(|binding| binding.scope.applies_to(player))
            .fold(0u8, |total, binding| total.saturating_add(binding.amount))
    }
}

/// 表中某扩展点全部绑定的参数之和，即所有修饰都生效时的上限。
pub fn table_amount(hook: Hook) -> u8 {
    HOOK_TABLE
        .iter()
        .filter(|binding| binding.hook == hook)
        .fold(0u8, |total, binding| total.saturating_add(binding.amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_have_unique_names_and_matching_kinds() {
        let mut seen = std::collections::HashSet::new();
        for modifier in BUFFS.iter().chain(DEBUFFS.iter()) {
            assert!(seen.insert(modifier.name), "duplicate {}", modifier.name);
        }
        assert!(BUFFS.iter().all(|m| m.kind == ModifierKind::Buff));
        assert!(DEBUFFS.iter().all(|m| m.kind == ModifierKind::Debuff));
    }

    #[test]
    fn every_binding_names_a_catalog_modifier() {
        for binding in HOOK_TABLE {
            assert!(
                find_modifier(binding.modifier).is_some(),
                "{} is bound but not in a catalog",
                binding.modifier
            );
        }
    }

    #[test]
    fn pipeline_only_fires_for_active_modifiers() {
        let human = Player::human(0, "You");
        let empty = ModifierPipeline::default();
        assert!(empty.fires_for(Hook::OpeningHandBonus, &human).is_none());
        assert_eq!(empty.amount_for(Hook::OpeningHandBonus, &human), 0);

        let lazy = find_modifier(names::LAZY_DEALER).expect("catalog entry");
        let pipeline = ModifierPipeline::new(&[lazy]);
        assert!(pipeline.has_modifier(names::LAZY_DEALER));
        assert_eq!(pipeline.amount_for(Hook::OpeningHandBonus, &human), 3);
        assert!(pipeline.fires_for(Hook::WildLock, &human).is_none());
    }

    #[test]
    fn bindings_respect_their_scope() {
        let human = Player::human(0, "You");
        let ai = Player::ai(1, "AI 1");
        let active: Vec<Modifier> = [names::LAZY_DEALER, names::COLOR_FOCUS, names::DOUBLE_SKIP]
            .iter()
            .map(|name| find_modifier(name).expect("catalog entry"))
            .collect();
        let pipeline = ModifierPipeline::new(&active);

        assert_eq!(pipeline.amount_for(Hook::OpeningHandBonus, &ai), 0);
        assert!(pipeline.fires_for(Hook::AiPreferActiveColor, &ai).is_some());
        assert!(pipeline.fires_for(Hook::AiPreferActiveColor, &human).is_none());
        assert_eq!(pipeline.bindings_for(Hook::SkipExtraAdvance, &human).len(), 1);
        assert!(pipeline.bindings_for(Hook::SkipExtraAdvance, &ai).is_empty());
    }

    #[test]
    fn table_amount_sums_every_binding() {
        assert_eq!(table_amount(Hook::OpeningHandBonus), 3);
        assert_eq!(table_amount(Hook::ReverseKeepsTurn), 0);
    }

    #[test]
    fn unknown_names_are_not_in_the_catalog() {
        assert!(find_modifier("Lucky Draw").is_none());
        assert_eq!(catalog(ModifierKind::Buff).len(), BUFFS.len());
    }
}

pub mod ai;
pub mod game;
pub mod session;

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{best_wild_color, AiAgent, AiConfig, AiTurn};
pub use game::{
    build_deck, can_play, next_player_index, Card, CardColor, CardId, CardKind, EffectNotice,
    GameEvent, IntegrityError, MatchState, MatchStatus, Modifier, ModifierKind, ModifierPipeline,
    PlayCardOptions, Player, PlayerEffect, PlayerId, Resolution, RuleEngine, RuleError,
    TurnDirection,
};
pub use session::{
    ConfigError, DraftError, DraftOffers, Game, GameStatus, Session, SessionConfig,
    MAX_AI_OPPONENTS,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error<E: Serialize>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(JsValue::from)
}

/// 被拒绝的指令只在控制台提示，不抛给前端。
fn report_rejection<E: std::fmt::Display>(command: &str, error: &E) {
    let message = format!("{command} rejected: {error}");
    web_sys::console::warn_1(&message.into());
}

fn parse_color(value: &str) -> Result<CardColor, JsValue> {
    CardColor::from_str(value)
        .map_err(|_| JsValue::from_str(&format!("unknown color: {value}")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DelayedAiTurn {
    #[serde(skip_serializing_if = "Option::is_none")]
    turn: Option<AiTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RuleError>,
}

#[wasm_bindgen]
pub struct GameEngine {
    session: Rc<RefCell<Session>>,
}

impl GameEngine {
    fn session_mut(&self) -> Result<RefMut<'_, Session>, JsValue> {
        self.session.try_borrow_mut().map_err(serde_to_js_error)
    }

    fn session(&self) -> Result<Ref<'_, Session>, JsValue> {
        self.session.try_borrow().map_err(serde_to_js_error)
    }
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config = match config_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => SessionConfig::default(),
        };
        Ok(GameEngine {
            session: Rc::new(RefCell::new(Session::new(config).map_err(to_js_error)?)),
        })
    }

    #[wasm_bindgen(js_name = "startNewGame")]
    pub fn start_new_game(&self) -> Result<JsValue, JsValue> {
        let game = self.session_mut()?.start_new_game();
        to_js(&game)
    }

    #[wasm_bindgen(js_name = "startMatch")]
    pub fn start_match(&self) -> Result<JsValue, JsValue> {
        let game = self.session_mut()?.start_match().map_err(to_js_error)?;
        to_js(&game)
    }

    /// 出牌。非法或被拒绝时返回 `false`，状态不变。
    #[wasm_bindgen(js_name = "playCard")]
    pub fn play_card(
        &self,
        card_id: CardId,
        chosen_color: Option<String>,
        target_player: Option<PlayerId>,
    ) -> Result<bool, JsValue> {
        let chosen_color = chosen_color.as_deref().map(parse_color).transpose()?;
        let options = PlayCardOptions {
            chosen_color,
            target_player,
        };
        match self.session_mut()?.play_card(card_id, options) {
            Ok(_) => Ok(true),
            Err(error) => {
                report_rejection("playCard", &error);
                Ok(false)
            }
        }
    }

    #[wasm_bindgen(js_name = "playCardJson")]
    pub fn play_card_json(&self, card_id: CardId, options_json: &str) -> Result<String, JsValue> {
        let options: PlayCardOptions =
            serde_json::from_str(options_json).map_err(serde_to_js_error)?;
        let resolution = self
            .session_mut()?
            .play_card(card_id, options)
            .map_err(to_js_error)?;
        serde_json::to_string(&resolution).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "drawCards")]
    pub fn draw_cards(&self, count: usize, player_index: usize) -> Result<(), JsValue> {
        self.session_mut()?
            .draw_cards(count, player_index)
            .map_err(to_js_error)?;
        Ok(())
    }

    #[wasm_bindgen(js_name = "passTurn")]
    pub fn pass_turn(&self) -> Result<bool, JsValue> {
        match self.session_mut()?.pass_turn() {
            Ok(_) => Ok(true),
            Err(error) => {
                report_rejection("passTurn", &error);
                Ok(false)
            }
        }
    }

    #[wasm_bindgen(js_name = "callUno")]
    pub fn call_uno(&self) -> Result<bool, JsValue> {
        match self.session_mut()?.call_uno() {
            Ok(_) => Ok(true),
            Err(error) => {
                report_rejection("callUno", &error);
                Ok(false)
            }
        }
    }

    #[wasm_bindgen(js_name = "isAiTurn")]
    pub fn is_ai_turn(&self) -> Result<bool, JsValue> {
        Ok(self.session()?.is_ai_turn())
    }

    #[wasm_bindgen(js_name = "playAiTurn")]
    pub fn play_ai_turn(&self) -> Result<JsValue, JsValue> {
        let turn = self.session_mut()?.play_ai_turn().map_err(to_js_error)?;
        to_js(&turn)
    }

    /// 等待 `delay_ms` 毫秒后让 AI 行动，供前端做“思考”停顿。
    #[wasm_bindgen(js_name = "playAiTurnAfter")]
    pub fn play_ai_turn_after(&self, delay_ms: Option<u32>) -> Promise {
        let session = Rc::clone(&self.session);
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let result = session
                .try_borrow_mut()
                .map_err(serde_to_js_error)?
                .play_ai_turn();
            let response = match result {
                Ok(turn) => DelayedAiTurn {
                    turn: Some(turn),
                    error: None,
                },
                Err(error) => {
                    report_rejection("playAiTurn", &error);
                    DelayedAiTurn {
                        turn: None,
                        error: Some(error),
                    }
                }
            };
            let json = serde_json::to_string(&response).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    #[wasm_bindgen(js_name = "draftModifier")]
    pub fn draft_modifier(&self, name: &str) -> Result<bool, JsValue> {
        match self.session_mut()?.draft_modifier(name) {
            Ok(()) => Ok(true),
            Err(error) => {
                report_rejection("draftModifier", &error);
                Ok(false)
            }
        }
    }

    #[wasm_bindgen(js_name = "undraftModifier")]
    pub fn undraft_modifier(&self, name: &str) -> Result<bool, JsValue> {
        match self.session_mut()?.undraft_modifier(name) {
            Ok(()) => Ok(true),
            Err(error) => {
                report_rejection("undraftModifier", &error);
                Ok(false)
            }
        }
    }

    #[wasm_bindgen(js_name = "completeDraftAndAdvance")]
    pub fn complete_draft_and_advance(&self) -> Result<bool, JsValue> {
        match self.session_mut()?.complete_draft_and_advance() {
            Ok(_) => Ok(true),
            Err(error) => {
                report_rejection("completeDraftAndAdvance", &error);
                Ok(false)
            }
        }
    }

    #[wasm_bindgen(js_name = "getGame")]
    pub fn get_game(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session()?.game())
    }

    #[wasm_bindgen(js_name = "getCurrentMatch")]
    pub fn get_current_match(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session()?.current_match())
    }

    #[wasm_bindgen(js_name = "gameJson")]
    pub fn game_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session()?.game()).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "currentMatchJson")]
    pub fn current_match_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session()?.current_match()).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "playableCards")]
    pub fn playable_cards(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session()?.playable_cards())
    }

    #[wasm_bindgen(js_name = "draftOffers")]
    pub fn draft_offers(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session()?.draft_offers())
    }

    #[wasm_bindgen(js_name = "activeModifiers")]
    pub fn active_modifiers(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session()?.active_modifiers())
    }

    /// 取走自上次调用以来的效果通知（头像、提示条使用）。
    #[wasm_bindgen(js_name = "drainNotices")]
    pub fn drain_notices(&self) -> Result<JsValue, JsValue> {
        let notices = self.session_mut()?.drain_notices();
        to_js(&notices)
    }

    #[wasm_bindgen(js_name = "drainAlerts")]
    pub fn drain_alerts(&self) -> Result<JsValue, JsValue> {
        let alerts = self.session_mut()?.drain_alerts();
        to_js(&alerts)
    }
}

/// 返回按固定顺序生成的 108 张牌。
#[wasm_bindgen(js_name = "buildDeck")]
pub fn build_deck_js() -> Result<JsValue, JsValue> {
    to_js(&build_deck())
}

#[wasm_bindgen(js_name = "canPlay")]
pub fn can_play_js(card: JsValue, top: JsValue, active_color: &str) -> Result<bool, JsValue> {
    let card: Card = from_value(card).map_err(JsValue::from)?;
    let top: Card = from_value(top).map_err(JsValue::from)?;
    let active_color = parse_color(active_color)?;
    Ok(can_play(&card, &top, active_color))
}

/// 某一类修饰的完整目录（`"buff"` 或 `"debuff"`）。
#[wasm_bindgen(js_name = "modifierCatalog")]
pub fn modifier_catalog(kind: &str) -> Result<JsValue, JsValue> {
    let kind = match kind {
        "buff" => ModifierKind::Buff,
        "debuff" => ModifierKind::Debuff,
        other => return Err(JsValue::from_str(&format!("unknown modifier kind: {other}"))),
    };
    to_js(&game::catalog(kind))
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}

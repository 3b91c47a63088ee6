//! Agent tool surface.
//!
//! The controller's operations exposed as named tools for the agent-protocol
//! adapter: each tool has a small JSON argument schema and returns a UTF-8
//! text payload, flagged `is_error` when the underlying command failed its
//! preconditions. Thirty-four tools total, one per controller method or
//! query helper.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use nodecoin_engine::content::{ResourceKind, UnitKind, BUILDINGS, TECHS, ZONES};
use nodecoin_engine::state::{DiplomacyStatus, Strategy};

use crate::controller::GameController;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One exposed tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub schema: Value,
}

/// Text response handed back to the agent adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub text: String,
    pub is_error: bool,
}

impl ToolResponse {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn string_arg_schema(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { name: { "type": "string", "description": description } },
        "required": [name],
    })
}

fn resource_map_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": { "type": "integer", "minimum": 0 },
        "description": "map of resource kind (wood/food/stone/iron/gems/mana) to amount",
    })
}

/// All thirty-four tools.
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "game_status",
            description: "Summary of the settlement: era, tick, tokens, population",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_state",
            description: "Full player state as JSON",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_build",
            description: "Start constructing a building",
            schema: string_arg_schema("buildingId", "catalog id, e.g. 'choza'"),
        },
        ToolDef {
            name: "game_upgrade",
            description: "Upgrade a completed building one level",
            schema: string_arg_schema("buildingId", "catalog id"),
        },
        ToolDef {
            name: "game_demolish",
            description: "Demolish a building for a partial refund",
            schema: string_arg_schema("buildingId", "catalog id"),
        },
        ToolDef {
            name: "game_buildings",
            description: "The building catalog with costs and effects",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_recruit",
            description: "Recruit units (requires a completed cuartel)",
            schema: json!({
                "type": "object",
                "properties": {
                    "unitType": { "type": "string" },
                    "count": { "type": "integer", "minimum": 1 },
                },
                "required": ["unitType", "count"],
            }),
        },
        ToolDef {
            name: "game_set_strategy",
            description: "Set the army strategy (aggressive/defensive/balanced/guerrilla)",
            schema: string_arg_schema("strategy", "army posture"),
        },
        ToolDef {
            name: "game_army",
            description: "Current army composition and strategy",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_research_start",
            description: "Start researching a technology",
            schema: string_arg_schema("techId", "catalog id, e.g. 'agricultura'"),
        },
        ToolDef {
            name: "game_research_status",
            description: "Current research and completed technologies",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_techs",
            description: "The technology catalog",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_explore",
            description: "Explore a zone",
            schema: string_arg_schema("zoneId", "zone id, e.g. 'bosque-norte'"),
        },
        ToolDef {
            name: "game_claim",
            description: "Claim an explored, unclaimed zone",
            schema: string_arg_schema("zoneId", "zone id"),
        },
        ToolDef {
            name: "game_zones",
            description: "Zone list with exploration and claim status",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_attack_npc",
            description: "Raid an NPC camp (bandits/raiders/dragon)",
            schema: string_arg_schema("target", "NPC camp id"),
        },
        ToolDef {
            name: "game_pvp_attack",
            description: "Attack another player from the shared rankings",
            schema: string_arg_schema("targetPlayerId", "player id"),
        },
        ToolDef {
            name: "game_spy",
            description: "Send a spy against another player (needs an espia)",
            schema: string_arg_schema("targetPlayerId", "player id"),
        },
        ToolDef {
            name: "game_spy_reports",
            description: "The last ten espionage reports",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_trade_create",
            description: "Open a trade offer; offered resources go into escrow",
            schema: json!({
                "type": "object",
                "properties": {
                    "offering": resource_map_schema(),
                    "requesting": resource_map_schema(),
                    "expiresInTicks": { "type": "integer", "minimum": 1 },
                },
                "required": ["offering", "requesting"],
            }),
        },
        ToolDef {
            name: "game_trade_accept",
            description: "Accept a trade offer by id (local or shared board)",
            schema: string_arg_schema("offerId", "offer id"),
        },
        ToolDef {
            name: "game_trade_cancel",
            description: "Cancel one of your open offers and refund the escrow",
            schema: string_arg_schema("offerId", "offer id"),
        },
        ToolDef {
            name: "game_trade_offers",
            description: "Your own trade offers and their status",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_trade_board",
            description: "Open offers on the shared trade board",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_alliance_create",
            description: "Found a new alliance",
            schema: string_arg_schema("name", "alliance name"),
        },
        ToolDef {
            name: "game_alliance_join",
            description: "Join an existing alliance",
            schema: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" },
                    "leaderId": { "type": "string" },
                },
                "required": ["id", "name", "leaderId"],
            }),
        },
        ToolDef {
            name: "game_alliance_leave",
            description: "Leave your alliance (the leader leaving disbands it)",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_diplomacy_set",
            description: "Set your stance toward another player",
            schema: json!({
                "type": "object",
                "properties": {
                    "targetPlayerId": { "type": "string" },
                    "status": { "type": "string", "description": "neutral/allied/war/peace" },
                },
                "required": ["targetPlayerId", "status"],
            }),
        },
        ToolDef {
            name: "game_diplomacy_status",
            description: "Your diplomatic relations",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_rankings",
            description: "The shared world rankings",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_combat_log",
            description: "Recent battles from the shared combat feed",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_ascend",
            description: "Ascend: reset the settlement for a permanent legacy bonus",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_chain_status",
            description: "Local command-chain length and head",
            schema: empty_schema(),
        },
        ToolDef {
            name: "game_chain_verify",
            description: "Validate the local chain (structure, signatures, replay)",
            schema: empty_schema(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResponse> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolResponse::error(format!("missing string argument '{key}'")))
}

fn resource_map(args: &Value, key: &str) -> Result<BTreeMap<ResourceKind, u64>, ToolResponse> {
    let Some(object) = args.get(key).and_then(Value::as_object) else {
        return Err(ToolResponse::error(format!(
            "missing resource-map argument '{key}'"
        )));
    };
    let mut out = BTreeMap::new();
    for (name, amount) in object {
        let kind: ResourceKind = serde_json::from_value(Value::String(name.clone()))
            .map_err(|_| ToolResponse::error(format!("unknown resource kind '{name}'")))?;
        let amount = amount
            .as_u64()
            .ok_or_else(|| ToolResponse::error(format!("'{name}' must be a non-negative integer")))?;
        out.insert(kind, amount);
    }
    Ok(out)
}

fn outcome_response(
    result: Result<nodecoin_engine::command::CommandOutcome, crate::NodeError>,
) -> ToolResponse {
    match result {
        Ok(outcome) if outcome.success => match &outcome.data {
            Some(data) => ToolResponse::ok(format!("{}\n{}", outcome.message, data)),
            None => ToolResponse::ok(outcome.message),
        },
        Ok(outcome) => ToolResponse::error(outcome.message),
        Err(e) => ToolResponse::error(format!("internal failure: {e}")),
    }
}

fn json_response<T: serde::Serialize>(value: &T) -> ToolResponse {
    match serde_json::to_string_pretty(value) {
        Ok(text) => ToolResponse::ok(text),
        Err(e) => ToolResponse::error(format!("serialization failure: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Invoke a tool by name. Unknown names are errors; argument problems and
/// failed preconditions come back as `is_error` text.
pub fn invoke_tool(controller: &GameController, name: &str, args: &Value) -> ToolResponse {
    match invoke_inner(controller, name, args) {
        Ok(response) => response,
        Err(response) => response,
    }
}

fn invoke_inner(
    controller: &GameController,
    name: &str,
    args: &Value,
) -> Result<ToolResponse, ToolResponse> {
    let response = match name {
        "game_status" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&json!({
                "id": state.id,
                "name": state.name,
                "biome": state.biome,
                "era": state.era,
                "tick": state.tick,
                "tokens": state.tokens,
                "population": state.population,
                "resources": state.resources,
                "prestige": state.prestige.level,
                "address": controller.address(),
            }))
        }
        "game_state" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&state)
        }
        "game_build" => outcome_response(controller.build(str_arg(args, "buildingId")?)),
        "game_upgrade" => outcome_response(controller.upgrade(str_arg(args, "buildingId")?)),
        "game_demolish" => outcome_response(controller.demolish(str_arg(args, "buildingId")?)),
        "game_buildings" => {
            let catalog: Vec<Value> = BUILDINGS
                .iter()
                .map(|b| {
                    json!({
                        "id": b.id,
                        "name": b.name,
                        "era": b.era,
                        "cost": b.cost.iter().map(|(k, v)| (k.as_str(), v)).collect::<BTreeMap<_, _>>(),
                        "constructionTicks": b.construction_ticks,
                        "maxLevel": b.max_level,
                    })
                })
                .collect();
            json_response(&catalog)
        }
        "game_recruit" => {
            let unit: UnitKind =
                serde_json::from_value(Value::String(str_arg(args, "unitType")?.to_owned()))
                    .map_err(|_| ToolResponse::error("unknown unit type"))?;
            let count = args
                .get("count")
                .and_then(Value::as_u64)
                .ok_or_else(|| ToolResponse::error("missing integer argument 'count'"))?;
            outcome_response(controller.recruit(unit, count as u32))
        }
        "game_set_strategy" => {
            let strategy: Strategy =
                serde_json::from_value(Value::String(str_arg(args, "strategy")?.to_owned()))
                    .map_err(|_| ToolResponse::error("unknown strategy"))?;
            outcome_response(controller.set_strategy(strategy))
        }
        "game_army" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&state.army)
        }
        "game_research_start" => {
            outcome_response(controller.start_research(str_arg(args, "techId")?))
        }
        "game_research_status" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&state.research)
        }
        "game_techs" => {
            let catalog: Vec<Value> = TECHS
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "name": t.name,
                        "era": t.era,
                        "researchTicks": t.research_ticks,
                        "prerequisites": t.prerequisites,
                    })
                })
                .collect();
            json_response(&catalog)
        }
        "game_explore" => outcome_response(controller.explore(str_arg(args, "zoneId")?)),
        "game_claim" => outcome_response(controller.claim(str_arg(args, "zoneId")?)),
        "game_zones" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            let shared = {
                let doc = controller.world();
                let mut doc = doc.lock();
                doc.zones().map_err(|e| ToolResponse::error(e.to_string()))?
            };
            let zones: Vec<Value> = ZONES
                .iter()
                .map(|z| {
                    json!({
                        "id": z,
                        "explored": state.explored_zones.contains(*z),
                        "claimedByUs": state.claimed_zones.contains(*z),
                        "claimedBy": shared.get(*z).and_then(|entry| entry.claimed_by.clone()),
                    })
                })
                .collect();
            json_response(&zones)
        }
        "game_attack_npc" => outcome_response(controller.attack_npc(str_arg(args, "target")?)),
        "game_pvp_attack" => {
            outcome_response(controller.pvp_attack(str_arg(args, "targetPlayerId")?))
        }
        "game_spy" => outcome_response(controller.spy(str_arg(args, "targetPlayerId")?)),
        "game_spy_reports" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&state.spy_reports)
        }
        "game_trade_create" => {
            let offering = resource_map(args, "offering")?;
            let requesting = resource_map(args, "requesting")?;
            let expires = args.get("expiresInTicks").and_then(Value::as_u64);
            outcome_response(controller.create_trade_offer(offering, requesting, expires))
        }
        "game_trade_accept" => outcome_response(controller.accept_trade(str_arg(args, "offerId")?)),
        "game_trade_cancel" => {
            outcome_response(controller.cancel_trade_offer(str_arg(args, "offerId")?))
        }
        "game_trade_offers" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&state.trade_offers)
        }
        "game_trade_board" => {
            let offers = {
                let doc = controller.world();
                let mut doc = doc.lock();
                doc.trade_offers()
                    .map_err(|e| ToolResponse::error(e.to_string()))?
            };
            json_response(&offers)
        }
        "game_alliance_create" => outcome_response(controller.create_alliance(str_arg(args, "name")?)),
        "game_alliance_join" => outcome_response(controller.join_alliance(
            str_arg(args, "id")?,
            str_arg(args, "name")?,
            str_arg(args, "leaderId")?,
        )),
        "game_alliance_leave" => outcome_response(controller.leave_alliance()),
        "game_diplomacy_set" => {
            let status = DiplomacyStatus::from_str_arg(str_arg(args, "status")?)
                .ok_or_else(|| ToolResponse::error("unknown diplomacy status"))?;
            outcome_response(controller.set_diplomacy(str_arg(args, "targetPlayerId")?, status))
        }
        "game_diplomacy_status" => {
            let state = controller
                .player_state()
                .map_err(|e| ToolResponse::error(e.to_string()))?;
            json_response(&state.diplomacy)
        }
        "game_rankings" => {
            let rankings = {
                let doc = controller.world();
                let mut doc = doc.lock();
                doc.rankings()
                    .map_err(|e| ToolResponse::error(e.to_string()))?
            };
            json_response(&rankings)
        }
        "game_combat_log" => {
            let logs = {
                let doc = controller.world();
                let mut doc = doc.lock();
                doc.combat_logs()
                    .map_err(|e| ToolResponse::error(e.to_string()))?
            };
            json_response(&logs)
        }
        "game_ascend" => outcome_response(controller.ascend()),
        "game_chain_status" => json_response(&controller.chain_status()),
        "game_chain_verify" => json_response(&controller.verify_chain()),
        other => ToolResponse::error(format!("unknown tool '{other}'")),
    };
    Ok(response)
}

// ---------------------------------------------------------------------------
// Enum parsing shim
// ---------------------------------------------------------------------------

trait FromStrArg: Sized {
    fn from_str_arg(s: &str) -> Option<Self>;
}

impl FromStrArg for DiplomacyStatus {
    fn from_str_arg(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_owned())).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_thirty_four_tools() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 34);
        let mut names: Vec<&str> = defs.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 34, "tool names must be unique");
        assert!(defs.iter().all(|d| d.name.starts_with("game_")));
    }

    #[test]
    fn schemas_are_objects() {
        for def in tool_definitions() {
            assert_eq!(def.schema["type"], "object", "{}", def.name);
        }
    }
}

//! Built-in action catalog used when no registry source can be loaded.

use crate::definition::{ActionDefinition, ParamDefinition, ParamType};

use ParamType::{Bool, Int, Object};

type Entry = (
    &'static str,
    Option<u32>,
    &'static str,
    &'static [(&'static str, ParamType, bool)],
);

const CATALOG: &[Entry] = &[
    (
        "hero.hireHero",
        Some(1001),
        "Hire a hero from the inn",
        &[("castleId", Int, true), ("heroName", ParamType::String, true)],
    ),
    (
        "hero.fireHero",
        Some(1002),
        "Dismiss a hero",
        &[("castleId", Int, true), ("heroId", Int, true)],
    ),
    (
        "hero.getHerosListFromTavern",
        Some(1003),
        "List heroes available in the inn",
        &[("castleId", Int, true)],
    ),
    (
        "hero.levelUp",
        Some(1004),
        "Promote a hero with pending experience",
        &[("castleId", Int, true), ("heroId", Int, true)],
    ),
    (
        "castle.getCastleInfo",
        Some(2001),
        "Fetch buildings and resources of a castle",
        &[("castleId", Int, true)],
    ),
    (
        "castle.upgradeBuilding",
        Some(2002),
        "Start upgrading a building",
        &[
            ("castleId", Int, true),
            ("positionId", Int, true),
            ("buildingType", Int, false),
        ],
    ),
    (
        "castle.cancelBuildingQueue",
        Some(2003),
        "Cancel a queued construction",
        &[("castleId", Int, true), ("positionId", Int, true)],
    ),
    (
        "army.newArmy",
        Some(3001),
        "Send troops on a march",
        &[
            ("castleId", Int, true),
            ("heroId", Int, true),
            ("troops", Object, true),
            ("targetPoint", Int, true),
            ("missionType", Int, true),
            ("resource", Object, false),
        ],
    ),
    (
        "army.callBackArmy",
        Some(3002),
        "Recall a marching army",
        &[("castleId", Int, true), ("armyId", Int, true)],
    ),
    (
        "troop.produceTroop",
        Some(3101),
        "Queue troop training in a barracks",
        &[
            ("castleId", Int, true),
            ("troopType", Int, true),
            ("num", Int, true),
            ("isShare", Bool, false),
        ],
    ),
    (
        "alliance.getHelp",
        None,
        "Ask alliance members to speed up a queue",
        &[("castleId", Int, true), ("positionId", Int, false)],
    ),
    (
        "alliance.getAllianceInfo",
        Some(4002),
        "Fetch alliance details",
        &[("allianceName", ParamType::String, false)],
    ),
    (
        "quest.getQuestType",
        Some(5001),
        "List quest categories",
        &[("castleId", Int, true), ("typeId", Int, false)],
    ),
    (
        "quest.award",
        Some(5002),
        "Claim a completed quest reward",
        &[("castleId", Int, true), ("questId", Int, true)],
    ),
    (
        "common.login",
        Some(9001),
        "Authenticate a session",
        &[("user", ParamType::String, true), ("pwd", ParamType::String, true)],
    ),
    ("common.heartbeat", Some(9002), "Keep the session alive", &[]),
    (
        "common.mapInfoSimple",
        Some(9003),
        "Fetch a map region summary",
        &[("x1", Int, true), ("y1", Int, true), ("x2", Int, true), ("y2", Int, true)],
    ),
];

/// Definitions of the built-in catalog, ordered by name.
pub fn definitions() -> Vec<ActionDefinition> {
    let mut definitions: Vec<ActionDefinition> = CATALOG
        .iter()
        .map(|&(name, command_id, description, params)| {
            let mut definition = ActionDefinition::new(name).with_description(description);
            definition.command_id = command_id;
            for &(param, param_type, required) in params {
                definition = definition.with_param(if required {
                    ParamDefinition::required(param, param_type)
                } else {
                    ParamDefinition::optional(param, param_type)
                });
            }
            definition
        })
        .collect();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}

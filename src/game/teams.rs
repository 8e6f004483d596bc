//! Fixed team table and AI callsign generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Team tag replicated on every player descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub color: String,
}

/// `(name, color)` rows of the fixed team table.
const TEAMS: [(&str, &str); 3] = [
    ("NATO", "#4a90d9"),
    ("CSTO", "#d94a4a"),
    ("PLA", "#d9a94a"),
];

/// Pseudo-team assigned to generated AI players.
const AI_TEAM: (&str, &str) = ("AI", "#8a8a8a");

/// Map a client-supplied team name to a known team. Unknown names fall
/// back to the first entry so a join never fails on the team field.
pub fn resolve(name: &str) -> Team {
    let (team_name, color) = TEAMS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .copied()
        .unwrap_or(TEAMS[0]);
    Team {
        name: team_name.to_string(),
        color: color.to_string(),
    }
}

pub fn ai_team() -> Team {
    Team {
        name: AI_TEAM.0.to_string(),
        color: AI_TEAM.1.to_string(),
    }
}

const RANKS: [&str; 6] = ["Pvt", "Cpl", "Sgt", "Lt", "Cpt", "Maj"];

const NATO_NAMES: [&str; 8] = [
    "Viper", "Falcon", "Bulldog", "Ranger", "Maverick", "Saber", "Hammer", "Ghost",
];
const CSTO_NAMES: [&str; 8] = [
    "Sokol", "Medved", "Vostok", "Granit", "Burya", "Klinok", "Taiga", "Zarya",
];
const PLA_NAMES: [&str; 8] = [
    "Longwei", "Tieshan", "Feihu", "Jingang", "Leiting", "Haiyan", "Shanying", "Zhanlang",
];

/// Random callsign like `Sgt Viper`, drawn from one of the per-team name
/// tables plus the shared rank table.
pub fn random_callsign(rng: &mut impl Rng) -> String {
    let table = match rng.gen_range(0..3) {
        0 => &NATO_NAMES,
        1 => &CSTO_NAMES,
        _ => &PLA_NAMES,
    };
    let rank = RANKS[rng.gen_range(0..RANKS.len())];
    let name = table[rng.gen_range(0..table.len())];
    format!("{rank} {name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_teams_resolve_case_insensitively() {
        assert_eq!(resolve("NATO").name, "NATO");
        assert_eq!(resolve("csto").name, "CSTO");
        assert_eq!(resolve("Pla").color, "#d9a94a");
    }

    #[test]
    fn unknown_team_falls_back() {
        assert_eq!(resolve("Freelancers").name, "NATO");
    }

    #[test]
    fn callsigns_have_rank_and_name() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let callsign = random_callsign(&mut rng);
            let mut parts = callsign.split(' ');
            let rank = parts.next().unwrap();
            let name = parts.next().unwrap();
            assert!(RANKS.contains(&rank));
            assert!(!name.is_empty());
        }
    }

    #[test]
    fn ai_team_is_pseudo() {
        assert_eq!(ai_team().name, "AI");
    }
}

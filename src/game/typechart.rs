//! Elemental type chart and the damage formula.

use serde::{Deserialize, Serialize};

/// The fixed elemental type set. `Normal` has no matchups in either
/// direction.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Fire,
    Water,
    Grass,
    Electric,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effectiveness {
    Strong,
    Weak,
    Neutral,
}

/// Strong pairs: Fire>Grass, Grass>Water, Water>Fire, Electric>Water.
/// Weak pairs are the inverses; everything else is neutral.
fn effectiveness(attacker: ElementType, defender: ElementType) -> Effectiveness {
    use ElementType::*;
    match (attacker, defender) {
        (Fire, Grass) | (Grass, Water) | (Water, Fire) | (Electric, Water) => {
            Effectiveness::Strong
        }
        (Grass, Fire) | (Water, Grass) | (Fire, Water) | (Water, Electric) => {
            Effectiveness::Weak
        }
        _ => Effectiveness::Neutral,
    }
}

/// Damage dealt by an attack of base power `attack` from `attacker` type
/// against `defender` type. Doubled on a strong matchup, halved (floored) on
/// a weak one, never negative.
pub fn damage(attack: i32, attacker: ElementType, defender: ElementType) -> i32 {
    let base = attack.max(0);
    match effectiveness(attacker, defender) {
        Effectiveness::Strong => base * 2,
        Effectiveness::Weak => base / 2,
        Effectiveness::Neutral => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ElementType::*;

    const ALL: [ElementType; 5] = [Fire, Water, Grass, Electric, Normal];

    #[test]
    fn classic_triangle_doubles() {
        assert_eq!(damage(50, Fire, Grass), 100);
        assert_eq!(damage(50, Grass, Water), 100);
        assert_eq!(damage(50, Water, Fire), 100);
        assert_eq!(damage(50, Electric, Water), 100);
    }

    #[test]
    fn weak_matchups_halve_with_floor() {
        assert_eq!(damage(50, Water, Grass), 25);
        assert_eq!(damage(45, Fire, Water), 22);
        assert_eq!(damage(1, Grass, Fire), 0);
    }

    #[test]
    fn mirror_matches_are_neutral() {
        for t in ALL {
            assert_eq!(damage(37, t, t), 37);
        }
    }

    #[test]
    fn normal_is_neutral_both_ways() {
        for t in ALL {
            assert_eq!(damage(40, Normal, t), 40);
            assert_eq!(damage(40, t, Normal), 40);
        }
    }

    #[test]
    fn total_and_non_negative() {
        for a in ALL {
            for d in ALL {
                assert!(damage(0, a, d) >= 0);
                assert!(damage(-5, a, d) >= 0);
            }
        }
    }
}

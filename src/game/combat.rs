//! Combat resolution - simultaneous card effects

use super::catalog::{CardCatalog, CatalogError, EffectKind};
use super::player::{CardSlot, VisibleState};

/// Per-player tally built while folding a round's cards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionAccumulator {
    pub damage_taken: i32,
    pub heal_received: i32,
    pub evade_amount: i32,
}

impl ActionAccumulator {
    /// Net health change before clamping; evasion never offsets healing.
    /// Saturates at the `i32` bounds.
    pub fn net_change(&self) -> i32 {
        let damage = self.damage_taken.saturating_sub(self.evade_amount).max(0);
        self.heal_received.saturating_sub(damage)
    }
}

fn add(total: &mut i32, magnitude: i32) {
    *total = total.saturating_add(magnitude);
}

/// Result of resolving one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub health: [i32; 2],
    pub visible: [VisibleState; 2],
    pub tally: [ActionAccumulator; 2],
}

/// Stateless resolver for a round's card sequences
pub struct CombatResolver;

impl CombatResolver {
    /// Resolve both players' cards against their current health.
    ///
    /// Slots are walked in order, player 0 before player 1 at each slot.
    /// A shorter sequence is padded with "no card".
    pub fn resolve<C: CardCatalog + ?Sized>(
        catalog: &C,
        cards: [&[CardSlot]; 2],
        health: [i32; 2],
        max_health: i32,
    ) -> Result<Resolution, CatalogError> {
        let tally = Self::accumulate(catalog, cards)?;

        let mut next_health = [0; 2];
        let mut visible = [VisibleState::Idle; 2];
        for p in 0..2 {
            next_health[p] = Self::apply_tally(health[p], &tally[p], max_health);
            visible[p] = Self::visible_state(health[p], next_health[p]);
        }

        Ok(Resolution {
            health: next_health,
            visible,
            tally,
        })
    }

    /// Fold card effects into per-player accumulators
    pub fn accumulate<C: CardCatalog + ?Sized>(
        catalog: &C,
        cards: [&[CardSlot]; 2],
    ) -> Result<[ActionAccumulator; 2], CatalogError> {
        let mut tally = [ActionAccumulator::default(); 2];
        let slots = cards[0].len().max(cards[1].len());

        for slot in 0..slots {
            for p in 0..2 {
                let Some(Some(index)) = cards[p].get(slot).copied() else {
                    continue;
                };
                let card = catalog.lookup(index)?;
                let o = 1 - p;
                match card.effect {
                    EffectKind::DamageBoth => {
                        add(&mut tally[p].damage_taken, card.magnitude);
                        add(&mut tally[o].damage_taken, card.magnitude);
                    }
                    EffectKind::DamageEnemy => add(&mut tally[o].damage_taken, card.magnitude),
                    EffectKind::DamageSelf => add(&mut tally[p].damage_taken, card.magnitude),
                    EffectKind::Evade => add(&mut tally[p].evade_amount, card.magnitude),
                    EffectKind::Heal => add(&mut tally[p].heal_received, card.magnitude),
                }
            }
        }

        Ok(tally)
    }

    /// Apply a tally, clamping once to `[0, max_health]`
    pub fn apply_tally(health: i32, tally: &ActionAccumulator, max_health: i32) -> i32 {
        health.saturating_add(tally.net_change()).clamp(0, max_health)
    }

    /// Compare health before and after; never `Dead`
    pub fn visible_state(old_health: i32, new_health: i32) -> VisibleState {
        match new_health.cmp(&old_health) {
            std::cmp::Ordering::Greater => VisibleState::Healing,
            std::cmp::Ordering::Less => VisibleState::Bleeding,
            std::cmp::Ordering::Equal => VisibleState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::{CardDefinition, CardEffect, CardIndex, StaticCatalog};
    use proptest::prelude::*;

    const DAMAGE_ENEMY_3: CardIndex = CardIndex(0);
    const EVADE_2: CardIndex = CardIndex(1);
    const HEAL_5: CardIndex = CardIndex(2);
    const DAMAGE_ENEMY_4: CardIndex = CardIndex(3);
    const DAMAGE_BOTH_4: CardIndex = CardIndex(4);
    const DAMAGE_SELF_2: CardIndex = CardIndex(5);

    fn test_catalog() -> StaticCatalog {
        let card = |name: &str, effect, magnitude| CardDefinition {
            name: name.to_string(),
            effect: CardEffect::new(effect, magnitude),
        };
        StaticCatalog::new(vec![
            card("shot", EffectKind::DamageEnemy, 3),
            card("dodge", EffectKind::Evade, 2),
            card("medkit", EffectKind::Heal, 5),
            card("big shot", EffectKind::DamageEnemy, 4),
            card("dynamite", EffectKind::DamageBoth, 4),
            card("misfire", EffectKind::DamageSelf, 2),
        ])
        .unwrap()
    }

    #[test]
    fn evade_reduces_incoming_damage() {
        let catalog = test_catalog();
        let p0 = [Some(DAMAGE_ENEMY_3), None, None];
        let p1 = [Some(EVADE_2), None, None];

        let res = CombatResolver::resolve(&catalog, [&p0, &p1], [7, 7], 7).unwrap();

        assert_eq!(res.health, [7, 6]);
        assert_eq!(res.visible, [VisibleState::Idle, VisibleState::Bleeding]);
    }

    #[test]
    fn oversized_magnitudes_saturate_instead_of_wrapping() {
        let catalog = StaticCatalog::from_json_str(
            r#"[
                {"name": "megaton", "effect": "damage_both", "magnitude": 2000000000},
                {"name": "wall", "effect": "evade", "magnitude": 2000000000},
                {"name": "elixir", "effect": "heal", "magnitude": 2000000000}
            ]"#,
        )
        .unwrap();
        let megaton = Some(CardIndex(0));
        let p0 = [megaton, megaton, None];
        let p1: [CardSlot; 3] = [None, None, None];

        let tally = CombatResolver::accumulate(&catalog, [&p0, &p1]).unwrap();
        assert_eq!(tally[0].damage_taken, i32::MAX);
        assert_eq!(tally[1].damage_taken, i32::MAX);

        let res = CombatResolver::resolve(&catalog, [&p0, &p1], [7, 7], 7).unwrap();
        assert_eq!(res.health, [0, 0]);

        let guarded = ActionAccumulator {
            damage_taken: i32::MAX,
            heal_received: i32::MAX,
            evade_amount: i32::MIN,
        };
        assert_eq!(guarded.net_change(), 0);
        let healed = ActionAccumulator {
            damage_taken: 0,
            heal_received: i32::MAX,
            evade_amount: i32::MAX,
        };
        assert_eq!(CombatResolver::apply_tally(1, &healed, 7), 7);
    }

    #[test]
    fn heal_and_damage_combine_before_clamp() {
        let catalog = test_catalog();
        let p0 = [Some(HEAL_5), None, None];
        let p1 = [Some(DAMAGE_ENEMY_4), None, None];

        let res = CombatResolver::resolve(&catalog, [&p0, &p1], [2, 7], 7).unwrap();

        assert_eq!(res.health, [3, 7]);
        assert_eq!(res.visible[0], VisibleState::Healing);
        assert_eq!(res.visible[1], VisibleState::Idle);
    }

    #[test]
    fn all_sentinels_change_nothing() {
        let catalog = test_catalog();
        let empty: [CardSlot; 3] = [None; 3];

        let res = CombatResolver::resolve(&catalog, [&empty, &empty], [5, 3], 7).unwrap();

        assert_eq!(res.health, [5, 3]);
        assert_eq!(res.visible, [VisibleState::Idle; 2]);
    }

    #[test]
    fn evasion_does_not_offset_healing() {
        let catalog = test_catalog();
        let p0 = [Some(EVADE_2), Some(HEAL_5), None];
        let empty: [CardSlot; 3] = [None; 3];

        let res = CombatResolver::resolve(&catalog, [&p0, &empty], [1, 7], 7).unwrap();

        assert_eq!(res.health[0], 6);
        assert_eq!(res.tally[0].net_change(), 5);
    }

    #[test]
    fn damage_both_hits_each_player() {
        let catalog = test_catalog();
        let p0 = [Some(DAMAGE_BOTH_4), Some(DAMAGE_SELF_2), None];
        let empty: [CardSlot; 3] = [None; 3];

        let res = CombatResolver::resolve(&catalog, [&p0, &empty], [7, 7], 7).unwrap();

        assert_eq!(res.health, [1, 3]);
        assert_eq!(res.visible, [VisibleState::Bleeding; 2]);
    }

    #[test]
    fn lethal_damage_reports_bleeding_not_dead() {
        let catalog = test_catalog();
        let p0 = [Some(DAMAGE_BOTH_4), Some(DAMAGE_BOTH_4), None];
        let empty: [CardSlot; 3] = [None; 3];

        let res = CombatResolver::resolve(&catalog, [&p0, &empty], [3, 2], 7).unwrap();

        assert_eq!(res.health, [0, 0]);
        assert_eq!(res.visible, [VisibleState::Bleeding; 2]);
    }

    #[test]
    fn shorter_sequence_is_padded() {
        let catalog = test_catalog();
        let p0 = [None, None, Some(DAMAGE_ENEMY_3)];
        let p1 = [Some(EVADE_2)];

        let res = CombatResolver::resolve(&catalog, [&p0, &p1], [7, 7], 7).unwrap();

        assert_eq!(res.health, [7, 6]);
    }

    #[test]
    fn unknown_card_is_an_error() {
        let catalog = test_catalog();
        let p0 = [Some(CardIndex(99))];
        let empty: [CardSlot; 1] = [None];

        assert!(CombatResolver::resolve(&catalog, [&p0, &empty], [7, 7], 7).is_err());
    }

    fn slot_strategy() -> impl Strategy<Value = CardSlot> {
        prop_oneof![Just(None), (0u16..6).prop_map(|i| Some(CardIndex(i)))]
    }

    proptest! {
        #[test]
        fn health_stays_in_bounds(
            p0 in prop::collection::vec(slot_strategy(), 3),
            p1 in prop::collection::vec(slot_strategy(), 3),
            h0 in 0i32..=7,
            h1 in 0i32..=7,
        ) {
            let catalog = test_catalog();
            let res = CombatResolver::resolve(&catalog, [&p0, &p1], [h0, h1], 7).unwrap();
            for h in res.health {
                prop_assert!((0..=7).contains(&h));
            }
        }

        #[test]
        fn slot_order_does_not_matter(
            p0 in prop::collection::vec(slot_strategy(), 3),
            p1 in prop::collection::vec(slot_strategy(), 3),
            h0 in 0i32..=7,
            h1 in 0i32..=7,
        ) {
            let catalog = test_catalog();
            let forward = CombatResolver::resolve(&catalog, [&p0, &p1], [h0, h1], 7).unwrap();

            let r0: Vec<CardSlot> = p0.iter().rev().copied().collect();
            let r1: Vec<CardSlot> = p1.iter().rev().copied().collect();
            let reversed = CombatResolver::resolve(&catalog, [&r0, &r1], [h0, h1], 7).unwrap();

            // Each player folded alone, then merged
            let empty: Vec<CardSlot> = vec![None; 3];
            let only0 = CombatResolver::accumulate(&catalog, [&p0, &empty]).unwrap();
            let only1 = CombatResolver::accumulate(&catalog, [&empty, &p1]).unwrap();
            let merged = [0usize, 1].map(|p| ActionAccumulator {
                damage_taken: only0[p].damage_taken + only1[p].damage_taken,
                heal_received: only0[p].heal_received + only1[p].heal_received,
                evade_amount: only0[p].evade_amount + only1[p].evade_amount,
            });

            prop_assert_eq!(forward.health, reversed.health);
            prop_assert_eq!(forward.tally, merged);
        }
    }
}

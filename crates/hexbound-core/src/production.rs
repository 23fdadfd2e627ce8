//! Dice-driven production and bank trading.

use crate::board::{Board, Seat};
use crate::game::GameError;
use crate::ledger::Ledger;
use crate::player::{ResourceHand, TradePrivileges};
use rand::Rng;
use std::collections::BTreeMap;

/// Sum that triggers the robber instead of production
pub const ROBBER_ROLL: u8 = 7;

/// Players holding more than this many cards discard on a 7
pub const DISCARD_THRESHOLD: u32 = 7;

/// Roll two six-sided dice
pub fn roll_dice<R: Rng>(rng: &mut R) -> (u8, u8) {
    (rng.gen_range(1..=6), rng.gen_range(1..=6))
}

/// What each seat gains from `roll`.
///
/// Every resource tile numbered `roll`, except the robber's, gives each
/// structure touching it one unit (settlement) or two (city). Seats that gain
/// nothing are left out.
pub fn resources_for_roll(board: &Board, ledger: &Ledger, roll: u8) -> BTreeMap<Seat, ResourceHand> {
    let mut gains: BTreeMap<Seat, ResourceHand> = BTreeMap::new();
    if roll == ROBBER_ROLL {
        return gains;
    }
    for (tile, resource) in board.producing_tiles(roll) {
        for structure in ledger.structures_touching(&tile) {
            gains
                .entry(structure.owner)
                .or_default()
                .add(resource, structure.kind.multiplier());
        }
    }
    gains
}

/// Cards a player with `held` cards must give up on a 7
pub fn discard_required(held: u32) -> u32 {
    if held > DISCARD_THRESHOLD {
        held / 2 + held % 2
    } else {
        0
    }
}

/// Check a bank trade against the player's port privileges.
///
/// Each given amount must be a whole multiple of that resource's rate, and
/// the number of "lots" given must equal the number of cards taken.
pub fn validate_bank_trade(
    privileges: &TradePrivileges,
    give: &ResourceHand,
    take: &ResourceHand,
) -> Result<(), GameError> {
    if give.is_empty() || take.is_empty() {
        return Err(GameError::InvalidTradeRatio);
    }
    let mut lots: u32 = 0;
    for resource in crate::board::Resource::ALL {
        let amount = give.get(resource);
        let rate = privileges.rate_for(resource);
        if amount % rate != 0 {
            return Err(GameError::InvalidTradeRatio);
        }
        lots = lots
            .checked_add(amount / rate)
            .ok_or(GameError::InvalidTradeRatio)?;
    }
    if take.checked_total() != Some(lots) {
        return Err(GameError::InvalidTradeRatio);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PortKind, Resource, TileKind};
    use crate::grid::{Intersection, TileCoord};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// A board where the tiles around the center corner are known
    fn fixed_board() -> (Board, Intersection) {
        let base = Board::standard_with_rng(&mut StdRng::seed_from_u64(5));
        let mut kinds = base.kinds();
        // Move the desert off the center corner and pin the three tiles
        for row in kinds.iter_mut() {
            for kind in row.iter_mut() {
                if *kind == TileKind::Desert {
                    *kind = TileKind::Resource {
                        resource: Resource::Sheep,
                        number: 3,
                    };
                }
            }
        }
        kinds[2][2] = TileKind::Resource {
            resource: Resource::Wheat,
            number: 6,
        };
        kinds[3][2] = TileKind::Resource {
            resource: Resource::Brick,
            number: 6,
        };
        kinds[3][3] = TileKind::Desert;
        let board = Board::from_kinds(kinds).unwrap();
        let corner = Intersection::new(TileCoord::new(2, 2), TileCoord::new(3, 2), TileCoord::new(3, 3)).unwrap();
        (board, corner)
    }

    #[test]
    fn test_dice_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let (a, b) = roll_dice(&mut rng);
            assert!((1..=6).contains(&a) && (1..=6).contains(&b));
        }
    }

    #[test]
    fn test_settlement_on_wheat_and_brick_six() {
        let (board, corner) = fixed_board();
        let mut ledger = Ledger::new();
        ledger.place_settlement(1, corner, board.resources_of(&corner).resources);

        let gains = resources_for_roll(&board, &ledger, 6);
        let hand = gains.get(&1).copied().unwrap_or_default();
        // Other tiles numbered 6 elsewhere do not touch this corner
        assert_eq!(hand.wheat, 1);
        assert_eq!(hand.brick, 1);
        assert_eq!(hand.total(), 2);
    }

    #[test]
    fn test_city_doubles() {
        let (board, corner) = fixed_board();
        let mut ledger = Ledger::new();
        ledger.place_settlement(0, corner, Vec::new());
        ledger.upgrade_to_city(0, &corner);
        let gains = resources_for_roll(&board, &ledger, 6);
        assert_eq!(gains[&0], ResourceHand::with_amounts(0, 2, 0, 2, 0));
    }

    #[test]
    fn test_robber_blocks_tile() {
        let (mut board, corner) = fixed_board();
        let mut ledger = Ledger::new();
        ledger.place_settlement(0, corner, Vec::new());
        board.set_robber(TileCoord::new(2, 2));
        let gains = resources_for_roll(&board, &ledger, 6);
        assert_eq!(gains[&0], ResourceHand::single(Resource::Brick, 1));
    }

    #[test]
    fn test_seven_produces_nothing() {
        let (board, corner) = fixed_board();
        let mut ledger = Ledger::new();
        ledger.place_settlement(0, corner, Vec::new());
        assert!(resources_for_roll(&board, &ledger, 7).is_empty());
    }

    #[test]
    fn test_discard_rounds_up() {
        assert_eq!(discard_required(7), 0);
        assert_eq!(discard_required(8), 4);
        assert_eq!(discard_required(9), 5);
        assert_eq!(discard_required(u32::MAX), u32::MAX / 2 + 1);
    }

    #[test]
    fn test_bank_trade_ratios() {
        let mut privileges = TradePrivileges::default();
        let four_wood = ResourceHand::single(Resource::Wood, 4);
        let one_rock = ResourceHand::single(Resource::Rock, 1);
        assert_eq!(validate_bank_trade(&privileges, &four_wood, &one_rock), Ok(()));
        assert_eq!(
            validate_bank_trade(&privileges, &ResourceHand::single(Resource::Wood, 3), &one_rock),
            Err(GameError::InvalidTradeRatio)
        );
        assert_eq!(
            validate_bank_trade(&privileges, &four_wood, &ResourceHand::single(Resource::Rock, 2)),
            Err(GameError::InvalidTradeRatio)
        );
        assert_eq!(
            validate_bank_trade(&privileges, &ResourceHand::new(), &ResourceHand::new()),
            Err(GameError::InvalidTradeRatio)
        );
        assert_eq!(
            validate_bank_trade(
                &privileges,
                &four_wood,
                &ResourceHand::with_amounts(u32::MAX, 2, 0, 0, 0)
            ),
            Err(GameError::InvalidTradeRatio)
        );

        privileges.grant(PortKind::Specific(Resource::Wood));
        privileges.grant(PortKind::Generic);
        // 4 wood at 2:1 plus 3 sheep at 3:1 buys 3 cards
        let give = ResourceHand::with_amounts(0, 0, 3, 0, 4);
        let take = ResourceHand::with_amounts(1, 1, 0, 1, 0);
        assert_eq!(validate_bank_trade(&privileges, &give, &take), Ok(()));
    }
}

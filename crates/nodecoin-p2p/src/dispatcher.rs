//! Remote-action dispatch.
//!
//! After the chain broadcaster accepts a remote block, the commands that
//! target THIS node are routed to the controller: a trade acceptance for one
//! of our offers, a PvP attack against us, or a diplomacy change toward us.
//! Everything else in a remote chain is that player's own business and is
//! ignored here.
//!
//! The PvP rule that matters: a `pvp-attack` block missing `attackerArmy` is
//! rejected outright. Recomputing the battle from a self-reported defender
//! snapshot would let the attacker choose our army; the defender always uses
//! its actual local state plus the attacker's declared (signed) army.

use std::collections::BTreeMap;

use nodecoin_chain::block::Block;
use nodecoin_engine::command::CommandKind;
use nodecoin_engine::content::UnitKind;
use nodecoin_engine::state::{DiplomacyStatus, Strategy};

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// The narrow surface the controller exposes to remote actions. All methods
/// run inside the controller's critical section.
pub trait RemoteGameHooks: Send + Sync {
    fn local_player_id(&self) -> String;

    /// A remote buyer accepted one of our open offers.
    fn apply_remote_accept_trade(&self, offer_id: &str, buyer_id: &str);

    /// A remote player attacked us; replay the battle from our actual state.
    fn apply_remote_pvp_attack(
        &self,
        attacker_id: &str,
        attacker_army: &BTreeMap<UnitKind, u32>,
        attacker_strategy: Strategy,
        rng_seed: Option<&str>,
        tick: u64,
    );

    /// A remote player changed their stance toward us; mirror it.
    fn apply_remote_set_diplomacy(&self, from_player_id: &str, status: DiplomacyStatus, tick: u64);
}

/// What the dispatcher did with a block. Surfaced for tests and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    TradeAccepted,
    PvpApplied,
    /// The attack named us but omitted the attacker's army snapshot.
    PvpRejectedMissingArmy,
    DiplomacyApplied,
    /// Targeted command, but not at us.
    NotForUs,
    /// Command kind the dispatcher does not route.
    Ignored,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Route one accepted remote block.
pub fn dispatch_remote_block(block: &Block, hooks: &dyn RemoteGameHooks) -> DispatchOutcome {
    let us = hooks.local_player_id();
    match &block.command.kind {
        CommandKind::AcceptTrade { offer_id, .. } => {
            // The block's author is the buyer; whether the offer is ours is
            // checked inside the hook against local state.
            hooks.apply_remote_accept_trade(offer_id, &block.player_id);
            DispatchOutcome::TradeAccepted
        }
        CommandKind::PvpAttack {
            target_player_id,
            attacker_army,
            attacker_strategy,
            rng_seed,
            ..
        } => {
            if target_player_id != &us {
                return DispatchOutcome::NotForUs;
            }
            let Some(army) = attacker_army else {
                tracing::warn!(
                    attacker = %block.player_id,
                    "rejecting pvp-attack without attackerArmy"
                );
                return DispatchOutcome::PvpRejectedMissingArmy;
            };
            hooks.apply_remote_pvp_attack(
                &block.player_id,
                army,
                attacker_strategy.unwrap_or(Strategy::Balanced),
                rng_seed.as_deref(),
                block.command.tick,
            );
            DispatchOutcome::PvpApplied
        }
        CommandKind::SetDiplomacy {
            target_player_id,
            status,
        } => {
            if target_player_id != &us {
                return DispatchOutcome::NotForUs;
            }
            hooks.apply_remote_set_diplomacy(&block.player_id, *status, block.command.tick);
            DispatchOutcome::DiplomacyApplied
        }
        _ => DispatchOutcome::Ignored,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nodecoin_chain::block::Block;
    use nodecoin_chain::keys::PlayerKeypair;
    use nodecoin_engine::command::GameCommand;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHooks {
        trades: Mutex<Vec<(String, String)>>,
        attacks: Mutex<Vec<(String, u64)>>,
        diplomacy: Mutex<Vec<(String, DiplomacyStatus)>>,
    }

    impl RemoteGameHooks for RecordingHooks {
        fn local_player_id(&self) -> String {
            "us".into()
        }

        fn apply_remote_accept_trade(&self, offer_id: &str, buyer_id: &str) {
            self.trades
                .lock()
                .push((offer_id.to_owned(), buyer_id.to_owned()));
        }

        fn apply_remote_pvp_attack(
            &self,
            attacker_id: &str,
            _attacker_army: &BTreeMap<UnitKind, u32>,
            _attacker_strategy: Strategy,
            _rng_seed: Option<&str>,
            tick: u64,
        ) {
            self.attacks.lock().push((attacker_id.to_owned(), tick));
        }

        fn apply_remote_set_diplomacy(
            &self,
            from_player_id: &str,
            status: DiplomacyStatus,
            _tick: u64,
        ) {
            self.diplomacy
                .lock()
                .push((from_player_id.to_owned(), status));
        }
    }

    fn block_with(kind: CommandKind, player: &str, tick: u64) -> Block {
        let kp = PlayerKeypair::from_seed(player);
        Block::create(
            "prev",
            1,
            player,
            GameCommand { kind, tick },
            "statehash",
            1_000,
            &kp,
        )
        .unwrap()
    }

    #[test]
    fn accept_trade_routed_with_buyer() {
        let hooks = RecordingHooks::default();
        let block = block_with(
            CommandKind::AcceptTrade {
                offer_id: "us-5-0".into(),
                buyer_resources: BTreeMap::new(),
                buyer_id: None,
            },
            "buyer",
            7,
        );
        assert_eq!(
            dispatch_remote_block(&block, &hooks),
            DispatchOutcome::TradeAccepted
        );
        assert_eq!(
            hooks.trades.lock().as_slice(),
            &[("us-5-0".to_owned(), "buyer".to_owned())]
        );
    }

    #[test]
    fn pvp_against_us_requires_attacker_army() {
        let hooks = RecordingHooks::default();
        let no_army = block_with(
            CommandKind::PvpAttack {
                target_player_id: "us".into(),
                target_army: BTreeMap::new(),
                target_strategy: Strategy::Balanced,
                target_defense_bonus: 0.0,
                rng_seed: None,
                attacker_army: None,
                attacker_strategy: None,
            },
            "attacker",
            9,
        );
        assert_eq!(
            dispatch_remote_block(&no_army, &hooks),
            DispatchOutcome::PvpRejectedMissingArmy
        );
        assert!(hooks.attacks.lock().is_empty());

        let with_army = block_with(
            CommandKind::PvpAttack {
                target_player_id: "us".into(),
                target_army: BTreeMap::new(),
                target_strategy: Strategy::Balanced,
                target_defense_bonus: 0.0,
                rng_seed: None,
                attacker_army: Some([(UnitKind::Soldado, 10)].into_iter().collect()),
                attacker_strategy: Some(Strategy::Aggressive),
            },
            "attacker",
            9,
        );
        assert_eq!(
            dispatch_remote_block(&with_army, &hooks),
            DispatchOutcome::PvpApplied
        );
        assert_eq!(hooks.attacks.lock().as_slice(), &[("attacker".to_owned(), 9)]);
    }

    #[test]
    fn pvp_against_someone_else_not_for_us() {
        let hooks = RecordingHooks::default();
        let block = block_with(
            CommandKind::PvpAttack {
                target_player_id: "third-party".into(),
                target_army: BTreeMap::new(),
                target_strategy: Strategy::Balanced,
                target_defense_bonus: 0.0,
                rng_seed: None,
                attacker_army: Some(BTreeMap::new()),
                attacker_strategy: None,
            },
            "attacker",
            1,
        );
        assert_eq!(dispatch_remote_block(&block, &hooks), DispatchOutcome::NotForUs);
    }

    #[test]
    fn diplomacy_toward_us_is_mirrored() {
        let hooks = RecordingHooks::default();
        let block = block_with(
            CommandKind::SetDiplomacy {
                target_player_id: "us".into(),
                status: DiplomacyStatus::War,
            },
            "rival",
            3,
        );
        assert_eq!(
            dispatch_remote_block(&block, &hooks),
            DispatchOutcome::DiplomacyApplied
        );
        assert_eq!(
            hooks.diplomacy.lock().as_slice(),
            &[("rival".to_owned(), DiplomacyStatus::War)]
        );
    }

    #[test]
    fn own_progress_commands_are_ignored() {
        let hooks = RecordingHooks::default();
        for kind in [
            CommandKind::Build {
                building_id: "choza".into(),
            },
            CommandKind::Ascend,
            CommandKind::Explore {
                zone_id: "tundra".into(),
            },
        ] {
            let block = block_with(kind, "p2", 1);
            assert_eq!(dispatch_remote_block(&block, &hooks), DispatchOutcome::Ignored);
        }
        assert!(hooks.trades.lock().is_empty());
        assert!(hooks.attacks.lock().is_empty());
    }
}

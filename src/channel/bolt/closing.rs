// LNP/BP Core Library implementing LNPBP specifications & standards
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Channel shutdown and closing: mutual-close fee negotiation, unilateral
//! close detection and claim-output derivation.
//!
//! Only ever present on [`super::ChannelState`] once shutdown has begun
//! (`Negotiating`/`Closing` and the states a reconnect may fall back into
//! from them). Actual script/transaction assembly and signing is delegated
//! to a [`ClosingSigner`]; this module only tracks negotiation state and
//! the set of outputs a close makes claimable.

use std::collections::BTreeMap;

use bitcoin::{OutPoint, Transaction, Txid};
use lnp2p::bolt::{ChannelId, ClosingSigned};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;
use wallet::scripts::PubkeyScript;

use super::commitments::{CommitmentSpec, RemoteCommit};

/// Maximum number of `closing_signed` round-trips before giving up on
/// mutual close and falling back to a unilateral one.
pub const MAX_NEGOTIATION_ITERATIONS: usize = 20;

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ClosingError {
    /// shutdown was requested while the channel still carries in-flight
    /// HTLCs
    HtlcsStillPending,

    /// local and remote closing fee proposals failed to converge after
    /// {0} rounds
    NegotiationFailed(usize),

    /// proposed closing fee {proposed} exceeds the settleable channel
    /// value {max}
    FeeExceedsChannelValue { proposed: u64, max: u64 },

    /// no unilateral close output is claimable from the provided
    /// commitment transaction
    NothingToClaim,
}

/// Local shutdown/negotiation progress and the descriptors produced once
/// the channel has actually closed on-chain.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct Closing {
    pub channel_id: ChannelId,

    pub local_shutdown_script: PubkeyScript,
    pub remote_shutdown_script: Option<PubkeyScript>,

    /// Our most recently proposed mutual-close fee, once shutdown begins.
    pub local_closing_fee_satoshis: Option<u64>,
    /// The counterparty's most recently proposed mutual-close fee.
    pub remote_closing_fee_satoshis: Option<u64>,
    pub negotiation_rounds: usize,

    pub mutual_close: Option<MutualClosePublished>,
    pub local_commit_published: Option<LocalCommitPublished>,
    pub remote_commit_published: Option<RemoteCommitPublished>,
    pub revoked_commit_published: Vec<RevokedCommitPublished>,
}

/// A mutual-close transaction we have broadcast or seen confirmed.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct MutualClosePublished {
    pub tx: Transaction,
    pub fee_satoshis: u64,
}

/// Claimable outputs from our own unilaterally broadcast commitment.
#[derive(Clone, PartialEq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct LocalCommitPublished {
    pub commit_txid: Txid,
    /// `to_local` output, spendable after `to_self_delay` confirmations
    /// through the delayed-payment script.
    pub claim_main_delayed: Option<OutPoint>,
    /// HTLC-success/HTLC-timeout outputs we can still claim, keyed by the
    /// HTLC id they correspond to.
    pub claim_htlcs: BTreeMap<u64, OutPoint>,
    pub irrevocably_spent: BTreeMap<OutPoint, Txid>,
}

/// Claimable outputs from a remote commitment (current or next) that was
/// unilaterally broadcast.
#[derive(Clone, PartialEq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct RemoteCommitPublished {
    pub commit_txid: Txid,
    /// `to_remote` output, ours to spend directly (no delay, possibly
    /// tagged `OP_CSV 1` under `option_anchors`).
    pub claim_main: Option<OutPoint>,
    pub claim_htlcs: BTreeMap<u64, OutPoint>,
    pub irrevocably_spent: BTreeMap<OutPoint, Txid>,
}

/// Claimable outputs from a revoked remote commitment, spendable via the
/// revocation keys derived from a leaked per-commitment secret.
#[derive(Clone, PartialEq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct RevokedCommitPublished {
    pub commit_txid: Txid,
    pub revoked_commit_index: u64,
    pub claim_main: Option<OutPoint>,
    pub claim_remote_delayed: Option<OutPoint>,
    pub claim_htlcs: BTreeMap<u64, OutPoint>,
    pub irrevocably_spent: BTreeMap<OutPoint, Txid>,
}

/// How an observed closing transaction relates to the channel's known
/// commitments.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ClosingType {
    #[display("mutual close")]
    MutualClose,
    #[display("local force-close")]
    LocalClose,
    #[display("current remote force-close")]
    CurrentRemoteClose,
    #[display("next remote force-close")]
    NextRemoteClose,
    #[display("funding-recovery close")]
    RecoveryClose,
    #[display("revoked remote force-close")]
    RevokedClose,
}

/// External collaborator boundary: builds and signs the mutual-close
/// transaction and derives/signs the unilateral claim transactions.
/// Sighashing, script assembly and private-key handling belong to the
/// wallet/signing layer, not the channel state machine.
pub trait ClosingSigner {
    fn sign_mutual_close(
        &self,
        local_script: &PubkeyScript,
        remote_script: &PubkeyScript,
        fee_satoshis: u64,
    ) -> (Transaction, Signature);

    fn verify_mutual_close(
        &self,
        local_script: &PubkeyScript,
        remote_script: &PubkeyScript,
        fee_satoshis: u64,
        remote_signature: &Signature,
    ) -> bool;
}

impl Closing {
    pub fn new(
        channel_id: ChannelId,
        local_shutdown_script: PubkeyScript,
    ) -> Self {
        Closing {
            channel_id,
            local_shutdown_script,
            remote_shutdown_script: None,
            local_closing_fee_satoshis: None,
            remote_closing_fee_satoshis: None,
            negotiation_rounds: 0,
            mutual_close: None,
            local_commit_published: None,
            remote_commit_published: None,
            revoked_commit_published: vec![],
        }
    }

    /// Funder-side proposal: starts negotiation at an estimate derived
    /// from the current commitment feerate.
    pub fn propose_closing_fee(
        &mut self,
        settleable_value_satoshis: u64,
        estimated_feerate_per_kw: u32,
    ) -> Result<u64, ClosingError> {
        // A mutual close transaction with a single P2WPKH/P2WSH output on
        // each side weighs roughly 540 weight units.
        let fee = (540 * estimated_feerate_per_kw as u64 / 1000).max(1);
        if fee > settleable_value_satoshis {
            return Err(ClosingError::FeeExceedsChannelValue {
                proposed: fee,
                max: settleable_value_satoshis,
            });
        }
        self.local_closing_fee_satoshis = Some(fee);
        Ok(fee)
    }

    /// Processes a `closing_signed` fee proposal from the peer, averaging
    /// toward convergence per the standard negotiation rule. Returns
    /// `Some(fee)` to counter-propose, or `None` once both sides agree.
    pub fn receive_closing_signed(
        &mut self,
        msg: &ClosingSigned,
        settleable_value_satoshis: u64,
    ) -> Result<Option<u64>, ClosingError> {
        self.negotiation_rounds += 1;
        if self.negotiation_rounds > MAX_NEGOTIATION_ITERATIONS {
            return Err(ClosingError::NegotiationFailed(
                self.negotiation_rounds,
            ));
        }
        if msg.fee_satoshis > settleable_value_satoshis {
            return Err(ClosingError::FeeExceedsChannelValue {
                proposed: msg.fee_satoshis,
                max: settleable_value_satoshis,
            });
        }
        self.remote_closing_fee_satoshis = Some(msg.fee_satoshis);

        let ours = self.local_closing_fee_satoshis.unwrap_or(msg.fee_satoshis);
        if ours == msg.fee_satoshis {
            return Ok(None);
        }

        let counter = ours.midpoint(msg.fee_satoshis);
        self.local_closing_fee_satoshis = Some(counter);
        if counter == msg.fee_satoshis {
            Ok(None)
        } else {
            Ok(Some(counter))
        }
    }

    /// `claimCurrentLocalCommitTxOutputs`: the `to_local` output of our
    /// own broadcast commitment, spendable after `to_self_delay` blocks
    /// through the revocable delayed-payment path.
    pub fn claim_current_local_commit_tx_outputs(
        commit_txid: Txid,
        spec: &CommitmentSpec,
        dust_limit_sat: u64,
        to_self_delay_met: bool,
    ) -> Result<LocalCommitPublished, ClosingError> {
        if spec.to_local_msat == 0 {
            return Err(ClosingError::NothingToClaim);
        }
        let mut published = LocalCommitPublished {
            commit_txid,
            ..Default::default()
        };
        if to_self_delay_met {
            published.claim_main_delayed =
                Some(OutPoint::new(commit_txid, 0));
        }
        published.claim_htlcs = claim_htlc_outputs(commit_txid, spec, dust_limit_sat);
        Ok(published)
    }

    /// `claimRemoteCommitTxOutputs`: the current remote commitment's
    /// `to_remote` output, ours to claim directly.
    pub fn claim_remote_commit_tx_outputs(
        remote_commit: &RemoteCommit,
        dust_limit_sat: u64,
    ) -> Result<RemoteCommitPublished, ClosingError> {
        Self::claim_remote_commit_main_output(
            remote_commit.txid,
            &remote_commit.spec,
            dust_limit_sat,
        )
    }

    /// `claimRemoteCommitMainOutput`: shared by the current- and
    /// next-remote-commitment close paths, both of which only differ in
    /// which [`RemoteCommit`] snapshot is passed in.
    pub fn claim_remote_commit_main_output(
        commit_txid: Txid,
        spec: &CommitmentSpec,
        dust_limit_sat: u64,
    ) -> Result<RemoteCommitPublished, ClosingError> {
        if spec.to_remote_msat == 0 {
            return Err(ClosingError::NothingToClaim);
        }
        Ok(RemoteCommitPublished {
            commit_txid,
            claim_main: Some(OutPoint::new(commit_txid, 1)),
            claim_htlcs: claim_htlc_outputs(commit_txid, spec, dust_limit_sat),
            irrevocably_spent: none!(),
        })
    }

    /// `claimRevokedRemoteCommitTxOutputs`: both the `to_remote` output
    /// and, via the leaked per-commitment secret, the revoked party's own
    /// `to_local` output, plus every HTLC output the revoked commitment
    /// still carried — the revocation key sweeps those too (BOLT-3
    /// "Revoked Transaction Close Handling").
    pub fn claim_revoked_remote_commit_tx_outputs(
        commit_txid: Txid,
        revoked_commit_index: u64,
        _revocation_pubkey: PublicKey,
        spec: &CommitmentSpec,
        dust_limit_sat: u64,
    ) -> Result<RevokedCommitPublished, ClosingError> {
        Ok(RevokedCommitPublished {
            commit_txid,
            revoked_commit_index,
            claim_main: Some(OutPoint::new(commit_txid, 1)),
            claim_remote_delayed: Some(OutPoint::new(commit_txid, 0)),
            claim_htlcs: claim_htlc_outputs(commit_txid, spec, dust_limit_sat),
            irrevocably_spent: none!(),
        })
    }

    /// Classifies a transaction spending the funding outpoint against the
    /// commitments this channel knows about. `local_commit_txid` is `None`
    /// until we have ourselves force-closed (and thus learned our own
    /// commitment's txid from the driver) — this core never constructs that
    /// transaction on its own.
    pub fn detect_closing_type(
        &self,
        spending_txid: Txid,
        local_commit_txid: Option<Txid>,
        remote_commit_txid: Txid,
        remote_next_commit_txid: Option<Txid>,
        revoked_commit_txids: &[Txid],
    ) -> ClosingType {
        if self
            .mutual_close
            .as_ref()
            .map(|m| m.tx.txid() == spending_txid)
            .unwrap_or(false)
        {
            return ClosingType::MutualClose;
        }
        if local_commit_txid == Some(spending_txid) {
            return ClosingType::LocalClose;
        }
        if spending_txid == remote_commit_txid {
            return ClosingType::CurrentRemoteClose;
        }
        if Some(spending_txid) == remote_next_commit_txid {
            return ClosingType::NextRemoteClose;
        }
        if revoked_commit_txids.contains(&spending_txid) {
            return ClosingType::RevokedClose;
        }
        ClosingType::RecoveryClose
    }
}

/// Outpoints of the non-dust HTLC outputs carried by `spec`, keyed by htlc
/// id. HTLC outputs follow the two fixed main outputs (`to_local` at vout 0,
/// `to_remote`/`to_remote_delayed` at vout 1), in the same order
/// [`CommitmentSpec::non_dust_htlcs`] yields them.
fn claim_htlc_outputs(
    commit_txid: Txid,
    spec: &CommitmentSpec,
    dust_limit_sat: u64,
) -> BTreeMap<u64, OutPoint> {
    spec.non_dust_htlcs(dust_limit_sat)
        .enumerate()
        .map(|(i, htlc)| (htlc.htlc_id, OutPoint::new(commit_txid, 2 + i as u32)))
        .collect()
}

trait Midpoint {
    fn midpoint(self, other: Self) -> Self;
}

impl Midpoint for u64 {
    fn midpoint(self, other: Self) -> Self {
        self / 2 + other / 2 + (self % 2 + other % 2) / 2
    }
}

#[cfg(test)]
mod test {
    use lnp2p::bolt::ClosingSigned;

    use super::*;

    fn fresh_closing() -> Closing {
        Closing::new(ChannelId::default(), PubkeyScript::default())
    }

    #[test]
    fn fee_negotiation_converges_on_matching_proposal() {
        let mut closing = fresh_closing();
        closing.local_closing_fee_satoshis = Some(1_000);
        let msg = ClosingSigned {
            channel_id: ChannelId::default(),
            fee_satoshis: 1_000,
            signature: dumb_signature(),
        };
        let counter = closing
            .receive_closing_signed(&msg, 1_000_000)
            .expect("within channel value");
        assert_eq!(counter, None);
    }

    #[test]
    fn fee_negotiation_proposes_midpoint_when_mismatched() {
        let mut closing = fresh_closing();
        closing.local_closing_fee_satoshis = Some(1_000);
        let msg = ClosingSigned {
            channel_id: ChannelId::default(),
            fee_satoshis: 2_000,
            signature: dumb_signature(),
        };
        let counter = closing
            .receive_closing_signed(&msg, 1_000_000)
            .expect("within channel value");
        assert_eq!(counter, Some(1_500));
    }

    #[test]
    fn negotiation_gives_up_after_max_rounds() {
        let mut closing = fresh_closing();
        closing.negotiation_rounds = MAX_NEGOTIATION_ITERATIONS;
        let msg = ClosingSigned {
            channel_id: ChannelId::default(),
            fee_satoshis: 1_000,
            signature: dumb_signature(),
        };
        let err = closing
            .receive_closing_signed(&msg, 1_000_000)
            .unwrap_err();
        assert_eq!(err, ClosingError::NegotiationFailed(
            MAX_NEGOTIATION_ITERATIONS + 1,
        ));
    }

    #[test]
    fn claims_nothing_when_commit_pays_nothing_locally() {
        let spec = CommitmentSpec::default();
        let err = Closing::claim_current_local_commit_tx_outputs(
            Txid::default(),
            &spec,
            546,
            true,
        )
        .unwrap_err();
        assert_eq!(err, ClosingError::NothingToClaim);
    }

    #[test]
    fn claims_htlc_outputs_above_dust_on_remote_commit() {
        use bitcoin_scripts::hlc::HashLock;

        use super::super::commitments::{HtlcDirection, InFlightHtlc};

        let mut spec = CommitmentSpec::default();
        spec.to_remote_msat = 500_000_000;
        spec.htlcs.push(InFlightHtlc {
            direction: HtlcDirection::Offered,
            htlc_id: 7,
            amount_msat: 1_000_000,
            payment_hash: HashLock::default(),
            cltv_expiry: 500_100,
        });
        spec.htlcs.push(InFlightHtlc {
            direction: HtlcDirection::Offered,
            htlc_id: 8,
            amount_msat: 100,
            payment_hash: HashLock::default(),
            cltv_expiry: 500_100,
        });
        let commit_txid = Txid::default();
        let published =
            Closing::claim_remote_commit_main_output(commit_txid, &spec, 546)
                .unwrap();
        assert_eq!(published.claim_htlcs.len(), 1);
        assert_eq!(
            published.claim_htlcs.get(&7),
            Some(&OutPoint::new(commit_txid, 2))
        );
        assert!(!published.claim_htlcs.contains_key(&8));
    }

    fn dumb_signature() -> Signature {
        let msg = secp256k1::Message::from_slice(&[1u8; 32])
            .expect("32-byte slice is a valid message");
        secp256k1::SECP256K1.sign_ecdsa(&msg, &secp256k1::ONE_KEY)
    }
}

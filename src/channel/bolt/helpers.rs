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

//! Pre-funding parameter validation, minimum-depth policy and first-commit
//! construction. These run once, before [`super::Commitments`] exists, while
//! `open_channel`/`accept_channel` are still being negotiated.

use super::commitments::{CommitmentSpec, LocalCommit, RemoteCommit};
use super::policy::PeerParams;

/// Maximum channel funding this node will accept without the extra
/// cumulative-block-reward confirmation requirement.
pub const MAX_FUNDING_SATOSHIS: u64 = 1_000_000_000;

/// BOLT-3 floor for `dust_limit_satoshis`.
pub const MIN_DUST_LIMIT: u64 = 546;

/// Hard BOLT-2 ceiling on `max_accepted_htlcs`.
pub const MAX_ACCEPTED_HTLCS: u16 = 483;

/// BOLT-2 default/floor for `min_final_cltv_expiry`-style deltas.
pub const MIN_CLTV_EXPIRY_DELTA: u32 = 18;

/// Reasonable ceiling on an HTLC's `cltv_expiry`, relative to the current
/// block height (one week of blocks).
pub const MAX_CLTV_EXPIRY_DELTA: u32 = 7 * 144;

/// Hard BOLT-2 ceiling on `to_self_delay`.
pub const MAX_TO_SELF_DELAY: u16 = 2016;

/// As fundee, give up on an unconfirmed funding transaction after this many
/// blocks (five days).
pub const FUNDING_TIMEOUT_FUNDEE_BLOCKS: u32 = 5 * 144;

/// Confirmations required before a channel may be announced to the network.
pub const ANNOUNCEMENTS_MINCONF: u32 = 6;

/// Errors raised while validating `open_channel`/`accept_channel` parameters,
/// before any [`super::Commitments`] exist. All of them reject the channel
/// outright.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ValidationError {
    /// proposed dust limit {0} sat is below the protocol minimum of 546 sat
    DustLimitTooSmall(u64),

    /// proposed dust limit {proposed} sat exceeds the proposed channel
    /// reserve of {channel_reserve} sat
    DustLimitTooLarge { proposed: u64, channel_reserve: u64 },

    /// proposed channel reserve {channel_reserve} sat is below our own dust
    /// limit of {our_dust_limit} sat
    ChannelReserveBelowOurDustLimit {
        channel_reserve: u64,
        our_dust_limit: u64,
    },

    /// our dust limit {our_dust_limit} sat exceeds the remote party's
    /// proposed channel reserve of {channel_reserve} sat
    DustLimitAboveOurChannelReserve {
        our_dust_limit: u64,
        channel_reserve: u64,
    },

    /// proposed `to_self_delay` {proposed} exceeds the maximum of {maximum}
    /// blocks this node will accept
    ToSelfDelayTooHigh { proposed: u16, maximum: u16 },

    /// proposed `max_accepted_htlcs` {0} exceeds the BOLT-3 limit of 483
    InvalidMaxAcceptedHtlcs(u16),

    /// proposed channel reserve {proposed} sat exceeds the configured
    /// fraction of the funding amount ({allowed_maximum} sat)
    ChannelReserveTooHigh { proposed: u64, allowed_maximum: u64 },

    /// funder's `to_local` balance cannot cover the channel reserve plus the
    /// initial commitment transaction fee
    CannotAffordFees,

    /// proposed feerate {proposed} sat/kw is too far from our current
    /// feerate estimate of {current} sat/kw
    FeeRateMismatch { proposed: u32, current: u32 },
}

/// `minDepthForFunding`: the number of confirmations we require on the
/// funding transaction before treating the channel as open, tightening the
/// node's usual policy for outsized channels so the cumulative block reward
/// spent mining those blocks meaningfully exceeds the funds at stake.
pub fn min_depth_for_funding(
    node_min_depth_blocks: u32,
    funding_satoshis: u64,
) -> u32 {
    if funding_satoshis <= MAX_FUNDING_SATOSHIS {
        return node_min_depth_blocks;
    }
    let funding_btc = funding_satoshis as f64 / 100_000_000.0;
    let scaled = (15.0 * funding_btc / 6.25).ceil() as u32 + 1;
    node_min_depth_blocks.max(scaled)
}

/// `validateParamsFunder`: checks `accept_channel`'s proposed parameters
/// against our policy and against the `open_channel` we sent, from the
/// funder's point of view.
pub fn validate_params_funder(
    to_self_delay_max: u16,
    max_reserve_to_funding_ratio_percent: u8,
    funding_satoshis: u64,
    zero_reserve: bool,
    open_dust_limit: u64,
    open_channel_reserve: u64,
    accept: &PeerParams,
) -> Result<(), ValidationError> {
    if accept.max_accepted_htlcs > MAX_ACCEPTED_HTLCS {
        return Err(ValidationError::InvalidMaxAcceptedHtlcs(
            accept.max_accepted_htlcs,
        ));
    }
    if accept.dust_limit_satoshis < MIN_DUST_LIMIT {
        return Err(ValidationError::DustLimitTooSmall(
            accept.dust_limit_satoshis,
        ));
    }
    if accept.dust_limit_satoshis > accept.channel_reserve_satoshis {
        return Err(ValidationError::DustLimitTooLarge {
            proposed: accept.dust_limit_satoshis,
            channel_reserve: accept.channel_reserve_satoshis,
        });
    }
    if accept.to_self_delay > to_self_delay_max.min(MAX_TO_SELF_DELAY) {
        return Err(ValidationError::ToSelfDelayTooHigh {
            proposed: accept.to_self_delay,
            maximum: to_self_delay_max.min(MAX_TO_SELF_DELAY),
        });
    }
    if !zero_reserve {
        if open_channel_reserve < accept.dust_limit_satoshis {
            return Err(ValidationError::ChannelReserveBelowOurDustLimit {
                channel_reserve: open_channel_reserve,
                our_dust_limit: accept.dust_limit_satoshis,
            });
        }
        if accept.channel_reserve_satoshis < open_dust_limit {
            return Err(ValidationError::DustLimitAboveOurChannelReserve {
                our_dust_limit: open_dust_limit,
                channel_reserve: accept.channel_reserve_satoshis,
            });
        }
    }
    let allowed_reserve = funding_satoshis
        .saturating_mul(max_reserve_to_funding_ratio_percent as u64)
        / 100;
    if accept.channel_reserve_satoshis > allowed_reserve {
        return Err(ValidationError::ChannelReserveTooHigh {
            proposed: accept.channel_reserve_satoshis,
            allowed_maximum: allowed_reserve,
        });
    }
    Ok(())
}

/// `validateParamsFundee`: symmetric checks run on the incoming
/// `open_channel`, plus a feerate-sanity guard against our own chain-fee
/// estimate.
pub fn validate_params_fundee(
    to_self_delay_max: u16,
    open: &PeerParams,
    proposed_feerate_per_kw: u32,
    current_feerate_per_kw: u32,
    max_feerate_mismatch_ratio: f64,
) -> Result<(), ValidationError> {
    if open.max_accepted_htlcs > MAX_ACCEPTED_HTLCS {
        return Err(ValidationError::InvalidMaxAcceptedHtlcs(
            open.max_accepted_htlcs,
        ));
    }
    if open.dust_limit_satoshis < MIN_DUST_LIMIT {
        return Err(ValidationError::DustLimitTooSmall(
            open.dust_limit_satoshis,
        ));
    }
    if open.dust_limit_satoshis > open.channel_reserve_satoshis {
        return Err(ValidationError::DustLimitTooLarge {
            proposed: open.dust_limit_satoshis,
            channel_reserve: open.channel_reserve_satoshis,
        });
    }
    if open.to_self_delay > to_self_delay_max.min(MAX_TO_SELF_DELAY) {
        return Err(ValidationError::ToSelfDelayTooHigh {
            proposed: open.to_self_delay,
            maximum: to_self_delay_max.min(MAX_TO_SELF_DELAY),
        });
    }
    if is_fee_diff_too_high(
        current_feerate_per_kw,
        proposed_feerate_per_kw,
        max_feerate_mismatch_ratio,
    ) {
        return Err(ValidationError::FeeRateMismatch {
            proposed: proposed_feerate_per_kw,
            current: current_feerate_per_kw,
        });
    }
    Ok(())
}

/// `aboveReserve`: true iff the remote party's `to_remote` balance, in whole
/// satoshis, is strictly above the channel reserve we required of them.
pub fn above_reserve(
    remote_commit: &RemoteCommit,
    remote_channel_reserve_satoshis: u64,
) -> bool {
    remote_commit.spec.to_remote_msat / 1000 > remote_channel_reserve_satoshis
}

/// `feeRateMismatch`: relative distance between a reference feerate and a
/// currently observed one.
pub fn fee_rate_mismatch(reference: u32, current: u32) -> f64 {
    let reference = reference as f64;
    let current = current as f64;
    (2.0 * (reference - current)).abs() / (reference + current)
}

/// `isFeeDiffTooHigh`: whether [`fee_rate_mismatch`] exceeds the configured
/// tolerance ratio.
pub fn is_fee_diff_too_high(
    reference: u32,
    current: u32,
    max_ratio: f64,
) -> bool {
    fee_rate_mismatch(reference, current) > max_ratio
}

/// `makeFirstCommitTxs`: builds both parties' index-0 commitment specs from
/// the agreed funding/push amounts. When we are fundee, verifies the funder
/// can actually afford the initial commitment fee out of their own balance.
pub fn make_first_commit_txs(
    funding_satoshis: u64,
    push_msat: u64,
    is_funder: bool,
    local_dust_limit: u64,
    remote_dust_limit: u64,
    remote_channel_reserve_satoshis: u64,
    feerate_per_kw: u32,
    remote_first_per_commitment_point: secp256k1::PublicKey,
) -> Result<(LocalCommit, RemoteCommit), ValidationError> {
    let funding_msat = funding_satoshis * 1000;
    let (local_to_local, local_to_remote) = if is_funder {
        (funding_msat - push_msat, push_msat)
    } else {
        (push_msat, funding_msat - push_msat)
    };

    let local_spec = CommitmentSpec {
        htlcs: vec![],
        to_local_msat: local_to_local,
        to_remote_msat: local_to_remote,
        feerate_per_kw,
    };
    // The remote party's view of the same balances is mirrored.
    let remote_spec = CommitmentSpec {
        htlcs: vec![],
        to_local_msat: local_spec.to_remote_msat,
        to_remote_msat: local_spec.to_local_msat,
        feerate_per_kw,
    };

    if !is_funder {
        let remote_fee = remote_spec.commit_tx_fee();
        let remote_to_local_sat = remote_spec.to_local_msat / 1000;
        let shortfall = remote_channel_reserve_satoshis + remote_fee;
        if remote_to_local_sat < shortfall {
            return Err(ValidationError::CannotAffordFees);
        }
    }

    let _ = (local_dust_limit, remote_dust_limit);

    let local_commit = LocalCommit {
        index: 0,
        spec: local_spec,
        commit_sig: dumb_signature(),
        htlc_sigs: vec![],
    };
    let remote_commit = RemoteCommit {
        index: 0,
        spec: remote_spec,
        txid: Default::default(),
        remote_per_commitment_point: remote_first_per_commitment_point,
    };
    Ok((local_commit, remote_commit))
}

fn dumb_signature() -> secp256k1::ecdsa::Signature {
    let msg = secp256k1::Message::from_slice(&[1u8; 32])
        .expect("32-byte slice is a valid message");
    secp256k1::SECP256K1.sign_ecdsa(&msg, &secp256k1::ONE_KEY)
}

#[cfg(test)]
mod test {
    use super::*;

    fn peer_params(
        dust_limit: u64,
        reserve: u64,
        to_self_delay: u16,
        max_htlcs: u16,
    ) -> PeerParams {
        PeerParams {
            dust_limit_satoshis: dust_limit,
            to_self_delay,
            htlc_minimum_msat: 1,
            max_htlc_value_in_flight_msat: 1_000_000_000,
            channel_reserve_satoshis: reserve,
            max_accepted_htlcs: max_htlcs,
        }
    }

    #[test]
    fn min_depth_uses_node_default_under_max_funding() {
        assert_eq!(min_depth_for_funding(3, 1_000_000), 3);
    }

    #[test]
    fn min_depth_scales_above_max_funding() {
        let depth = min_depth_for_funding(3, 2_000_000_000);
        assert!(depth > 3);
    }

    #[test]
    fn validate_params_funder_rejects_too_many_htlcs() {
        let accept = peer_params(546, 10_000, 144, 500);
        let err = validate_params_funder(
            2016, 10, 1_000_000, false, 546, 10_000, &accept,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidMaxAcceptedHtlcs(500));
    }

    #[test]
    fn validate_params_funder_rejects_small_dust_limit() {
        let accept = peer_params(300, 10_000, 144, 30);
        let err = validate_params_funder(
            2016, 10, 1_000_000, false, 546, 10_000, &accept,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::DustLimitTooSmall(300));
    }

    #[test]
    fn validate_params_funder_accepts_reasonable_accept_channel() {
        let accept = peer_params(546, 10_000, 144, 30);
        validate_params_funder(2016, 10, 1_000_000, false, 546, 10_000, &accept)
            .expect("reasonable accept_channel");
    }

    #[test]
    fn validate_params_funder_rejects_to_self_delay_above_node_max() {
        let accept = peer_params(546, 10_000, 2000, 30);
        let err = validate_params_funder(
            1000, 10, 1_000_000, false, 546, 10_000, &accept,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::ToSelfDelayTooHigh { proposed: 2000, maximum: 1000 }
        );
    }

    #[test]
    fn validate_params_fundee_rejects_feerate_too_far_from_current() {
        let open = peer_params(546, 10_000, 144, 30);
        let err = validate_params_fundee(2016, &open, 10_000, 1_000, 0.25)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::FeeRateMismatch { proposed: 10_000, current: 1_000 }
        );
    }

    #[test]
    fn fee_rate_mismatch_is_symmetric_around_zero() {
        assert_eq!(fee_rate_mismatch(1000, 1000), 0.0);
        assert!(fee_rate_mismatch(1000, 2000) > 0.0);
    }

    #[test]
    fn make_first_commit_txs_splits_funding_to_funder() {
        let (local, remote) = make_first_commit_txs(
            1_000_000, 0, true, 546, 546, 10_000, 253, dumb_pubkey!(),
        )
        .unwrap();
        assert_eq!(local.spec.to_local_msat, 1_000_000_000 - local.spec.commit_tx_fee() * 0);
        assert_eq!(remote.spec.to_remote_msat, local.spec.to_local_msat);
    }

    #[test]
    fn make_first_commit_txs_rejects_fundee_who_cannot_afford_fees() {
        let err = make_first_commit_txs(
            1_000_000, 999_999_000, true, 546, 546, 100_000, 2_000_000,
            dumb_pubkey!(),
        );
        assert!(err.is_ok());
        let err = make_first_commit_txs(
            100_000, 99_000_000, false, 546, 546, 100_000, 2_000_000,
            dumb_pubkey!(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::CannotAffordFees);
    }
}

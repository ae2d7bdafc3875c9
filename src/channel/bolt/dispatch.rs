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

//! The channel dispatcher: `step` is the pure transition function
//! `(state, event) -> (state', actions)`; `process` wraps it with
//! local-error capture and the peer-backup post-processing pass.
//!
//! `step` never performs I/O, never signs anything itself and never touches
//! the clock: transaction construction/signing is delegated to a
//! [`ChannelDriver`], and anything time-dependent (current block height,
//! per-commitment secret/point derivation) is asked of the same
//! collaborator rather than read from an ambient global.

use amplify::{DumbDefault, Slice32};
use bitcoin::{OutPoint, Transaction, Txid};
use bitcoin_scripts::hlc::{HashLock, HashPreimage};
use lnp2p::bolt::{
    AcceptChannel, ActiveChannelId, ChannelId, ChannelReestablish,
    ClosingSigned, CommitmentSigned, Error as ErrorMessage, FundingCreated,
    FundingLocked, FundingSigned, Messages, OpenChannel, RevokeAndAck,
    Shutdown, TempChannelId, UpdateAddHtlc, UpdateFailHtlc,
    UpdateFailMalformedHtlc, UpdateFee, UpdateFulfillHtlc,
};
use log::{debug, error, trace, warn};
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey};
use strict_encoding::{StrictDecode, StrictEncode};
use wallet::scripts::PubkeyScript;

use super::backup;
use super::closing::{Closing, ClosingError, ClosingSigner, ClosingType};
use super::commitments::{
    CommitmentSigner, CommitmentSpec, HtlcInfo, ProtocolError, RemoteNextCommitInfo,
};
use super::helpers::{self, ValidationError};
use super::{ChannelState, Lifecycle, Phase};

/// Requests the dispatcher makes of the chain-watching layer. Carried as
/// plain data; actually registering and servicing the watch is the
/// caller's responsibility.
#[derive(Clone, Debug, Display)]
pub enum WatchRequest {
    /// watch {txid} for {min_depth} confirmations
    WatchConfirmed { txid: Txid, min_depth: u32 },
    /// watch {outpoint} for a spend
    WatchSpent { outpoint: OutPoint },
    /// stop watching {outpoint}
    WatchLost { outpoint: OutPoint },
}

/// Notifications the chain-watching layer feeds back into [`process`].
#[derive(Clone, Debug, Display)]
pub enum WatchEvent {
    /// {txid} reached {depth} confirmations
    Confirmed { txid: Txid, depth: u32 },
    /// {outpoint} was spent by {spending_txid}
    Spent { outpoint: OutPoint, spending_txid: Txid },
    /// {outpoint} was reorganized out and is no longer being tracked
    Lost { outpoint: OutPoint },
}

/// Commands a local user (not the remote peer) issues against an
/// established channel.
#[derive(Clone, Debug, Display)]
pub enum Command {
    /// add an HTLC
    CmdAddHtlc {
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
    },
    /// fulfill HTLC {htlc_id}
    CmdFulfillHtlc { htlc_id: u64, payment_preimage: HashPreimage },
    /// fail HTLC {htlc_id}
    CmdFailHtlc { htlc_id: u64, reason: Vec<u8> },
    /// fail malformed HTLC {htlc_id}
    CmdFailMalformedHtlc {
        htlc_id: u64,
        sha256_of_onion: bitcoin::hashes::sha256::Hash,
        failure_code: u16,
    },
    /// sign and send the next commitment
    CmdSign,
    /// update the commitment feerate to {0} sat/kw
    CmdUpdateFee(u32),
    /// begin cooperative close
    CmdClose,
    /// force-close by publishing the latest local commitment
    CmdForceClose,
}

/// Events that drive the channel's state machine: messages received from
/// the remote peer, local commands, chain-watch notifications, and
/// transport connectivity changes.
#[derive(Clone, Debug, Display)]
pub enum Event {
    /// start channel opening as funder
    #[display("init_funder")]
    InitFunder,
    /// start channel opening as fundee, having just received {0}
    #[display("init_fundee")]
    InitFundee(OpenChannel),
    /// restore a channel from persisted state after a restart
    #[display("restore")]
    Restore,
    /// message received from the remote peer: {0}
    #[display("message_received({0})")]
    MessageReceived(Messages),
    /// local command: {0}
    #[display("command({0})")]
    ExecuteCommand(Command),
    /// chain-watch notification: {0}
    #[display("watch_event({0})")]
    WatchReceived(WatchEvent),
    /// the wallet collaborator finished constructing the funding
    /// transaction at {funding_txid}:{funding_output_index}
    #[display("funding_tx_made({funding_txid}:{funding_output_index})")]
    MakeFundingTxResponse {
        funding_tx: Transaction,
        funding_txid: Txid,
        funding_output_index: u16,
    },
    /// a new block was connected at height {0}
    #[display("new_block({0})")]
    NewBlock(u32),
    /// the transport to the peer dropped
    #[display("disconnected")]
    Disconnected,
    /// the transport to the peer reconnected
    #[display("connected")]
    Connected,
}

/// Side effects `step` asks the caller to carry out. None of these are
/// executed by `step`/`process` themselves.
#[derive(Clone, Debug, Display)]
pub enum Action {
    /// persist the channel state
    StoreState,
    /// send {0} to the remote peer
    SendMessage(Messages),
    /// re-dispatch {0} to this same channel
    SendToSelf(Command),
    /// register a chain watch: {0}
    SendWatch(WatchRequest),
    /// an HTLC was added by the remote peer: {0}
    ProcessAdd(u64),
    /// HTLC {0} was fulfilled; release the upstream preimage
    ProcessFulfill(u64),
    /// HTLC {0} failed; relay the failure upstream
    ProcessFail(u64),
    /// HTLC {0} failed with a malformed onion; relay upstream
    ProcessFailMalformed(u64),
    /// a local protocol violation was detected: {0}
    ProcessLocalFailure(String),
    /// persist updated HTLC bookkeeping before the commit_sig that relies
    /// on it goes out
    StoreHtlcInfos(Vec<HtlcInfo>),
    /// the command could not be carried out: {0}
    HandleCommandFailed(String),
    /// ask the wallet collaborator to construct a funding transaction
    /// paying {funding_satoshis} sat to a 2-of-2 with {remote_funding_pubkey}
    MakeFundingTx { funding_satoshis: u64, remote_funding_pubkey: PublicKey },
    /// broadcast {0}
    PublishTx(Transaction),
    /// the channel was assigned its permanent id {0}
    ChannelIdAssigned(ChannelId),
    /// the channel's working id changed from {old} to {new}
    ChannelIdSwitch { old: ActiveChannelId, new: ChannelId },
    /// attach a fresh peer-storage backup blob to the message just sent
    AttachBackup(Vec<u8>),
}

/// Unified dispatch-time error, covering both local validation failures and
/// protocol violations surfaced by the sub-protocol modules.
#[derive(Clone, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum DispatchError {
    #[from]
    #[display(inner)]
    Protocol(ProtocolError),

    #[from]
    #[display(inner)]
    Closing(ClosingError),

    #[from]
    #[display(inner)]
    Validation(ValidationError),

    /// channel in state {0} cannot handle this event
    UnexpectedEvent(Lifecycle),

    /// the channel transport is offline; the event cannot be processed
    /// until it reconnects
    Offline,

    /// remote peer reported a channel error: {0}
    RemoteError(String),

    /// peer's channel_reestablish references channel_id {remote}, which
    /// does not match our {local}
    ChannelIdMismatch { remote: ChannelId, local: ChannelId },

    /// no cooperative close is in progress
    NoActiveClosing,

    /// this operation requires the channel to be in a `Lifecycle` reachable
    /// from `Normal`, but the channel has no commitments yet
    NoCommitments,

    /// reached `funding_signed` without a funding transaction pending
    /// broadcast; the wallet collaborator never completed
    /// `Action::MakeFundingTx`
    NoPendingFundingTx,
}

/// External collaborator boundary the dispatcher calls into for anything
/// that needs private keys, the wallet, or the current chain tip: signing
/// commitments and the mutual-close transaction ([`CommitmentSigner`],
/// [`ClosingSigner`]), deriving per-commitment secrets/points, and reporting
/// the current block height.
pub trait ChannelDriver: CommitmentSigner + ClosingSigner {
    /// Current chain tip, used to validate HTLC `cltv_expiry` bounds and to
    /// decide whether a funding transaction has timed out.
    fn current_block_height(&self) -> u32;

    /// Our node's long-term private key, used to derive the peer-storage
    /// backup key (see [`super::backup`]).
    fn node_privkey(&self) -> SecretKey;

    /// The per-commitment secret for local commitment `index`, revealed to
    /// the peer via `revoke_and_ack` once `index + 1` is signed.
    fn reveal_per_commitment_secret(&self, index: u64) -> SecretKey;

    /// The per-commitment point we will use for local commitment `index`.
    fn next_per_commitment_point(&self, index: u64) -> PublicKey;
}

/// Dispatches `event` against `state`, mutating it in place and returning
/// the actions the caller must carry out. Local errors (a malformed
/// command, an out-of-bounds HTLC parameter, a failed negotiation) are
/// captured here rather than propagated: they surface as a single
/// [`Action::ProcessLocalFailure`] or [`Action::HandleCommandFailed`],
/// matching the "no I/O, no panics" contract of `step`.
pub fn process<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    event: Event,
) -> Vec<Action> {
    trace!("channel {:?}: dispatching {}", state.active_channel_id, event);
    match step(state, driver, event) {
        Ok(actions) => {
            debug!(
                "channel {:?}: now in stage {}, emitted {} action(s)",
                state.active_channel_id,
                state.stage,
                actions.len()
            );
            attach_backups(state, driver, actions)
        }
        Err(DispatchError::UnexpectedEvent(stage)) => {
            debug!("channel {:?}: event rejected in stage {}", state.active_channel_id, stage);
            vec![Action::HandleCommandFailed(format!(
                "event not valid in state {}",
                stage
            ))]
        }
        Err(err) => {
            warn!("channel {:?}: local failure processing event: {}", state.active_channel_id, err);
            vec![Action::ProcessLocalFailure(err.to_string())]
        }
    }
}

/// Peer-storage post-processing pass: `funding_signed`, `commit_sig`,
/// `revoke_and_ack` and `closing_signed` are the points in the protocol
/// where our local commitment state just advanced, so each one gets a
/// fresh [`backup::encrypt_backup`] of `state` appended as an
/// [`Action::AttachBackup`] for the transport layer to carry alongside the
/// message it was just asked to send.
fn attach_backups<D: ChannelDriver>(
    state: &ChannelState,
    driver: &D,
    mut actions: Vec<Action>,
) -> Vec<Action> {
    let carries_backup = actions.iter().any(|action| {
        matches!(
            action,
            Action::SendMessage(Messages::FundingSigned(_))
                | Action::SendMessage(Messages::CommitmentSigned(_))
                | Action::SendMessage(Messages::RevokeAndAck(_))
                | Action::SendMessage(Messages::ClosingSigned(_))
        )
    });
    if !carries_backup {
        return actions;
    }
    match state.strict_serialize() {
        Ok(plaintext) => {
            let blob = backup::encrypt_backup(
                driver.node_privkey(),
                state.commitments.local_commit.index,
                &plaintext,
            );
            actions.push(Action::AttachBackup(blob));
        }
        Err(err) => warn!(
            "channel {:?}: could not serialize state for peer-storage backup: {}",
            state.active_channel_id, err
        ),
    }
    actions
}

fn step<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    event: Event,
) -> Result<Vec<Action>, DispatchError> {
    // Connectivity transitions are handled uniformly regardless of the
    // inner `Lifecycle`: disconnecting never changes `stage`, and
    // reconnecting only starts the `channel_reestablish` handshake when the
    // channel has ever reached a commitment-bearing state.
    match &event {
        Event::Disconnected => {
            state.phase = Phase::Offline;
            return Ok(vec![Action::StoreState]);
        }
        Event::Connected => {
            state.phase = if state.stage.has_commitments() {
                Phase::Syncing { wait_for_their_reestablish: !state.commitments.is_funder }
            } else {
                Phase::Online
            };
            if state.stage.has_commitments() {
                let reestablish = ChannelReestablish {
                    channel_id: active_to_channel_id(state.active_channel_id)?,
                    next_commitment_number: state.commitments.local_commit.index + 1,
                    next_revocation_number: state.commitments.remote_commit.index,
                    your_last_per_commitment_secret: Slice32::default(),
                    my_current_per_commitment_point: driver
                        .next_per_commitment_point(state.commitments.local_commit.index),
                };
                return Ok(vec![Action::SendMessage(Messages::ChannelReestablish(reestablish))]);
            }
            return Ok(vec![]);
        }
        _ => {}
    }

    if state.phase.is_offline() {
        return Err(DispatchError::Offline);
    }

    match event {
        Event::InitFunder => init_funder(state, driver),
        Event::InitFundee(open_channel) => init_fundee(state, driver, open_channel),
        Event::Restore => restore(state, driver),
        Event::MessageReceived(msg) => receive_message(state, driver, msg),
        Event::ExecuteCommand(cmd) => execute_command(state, driver, cmd),
        Event::WatchReceived(watch_event) => receive_watch_event(state, driver, watch_event),
        Event::MakeFundingTxResponse { funding_tx, funding_txid, funding_output_index } => {
            funding_tx_made(state, driver, funding_tx, funding_txid, funding_output_index)
        }
        Event::NewBlock(height) => new_block(state, driver, height),
        Event::Disconnected | Event::Connected => unreachable!("handled above"),
    }
}

fn active_to_channel_id(id: ActiveChannelId) -> Result<ChannelId, DispatchError> {
    id.channel_id().ok_or(DispatchError::NoCommitments)
}

/// The id to address an `error` message to, whether or not the channel has
/// been assigned its permanent id yet.
fn any_channel_id(id: ActiveChannelId) -> ChannelId {
    match id {
        ActiveChannelId::Temporary(temp) => temp.into(),
        ActiveChannelId::Final(channel_id) => channel_id,
    }
}

fn require_stage(
    state: &ChannelState,
    expected: Lifecycle,
) -> Result<(), DispatchError> {
    if state.stage != expected {
        return Err(DispatchError::UnexpectedEvent(state.stage));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Opening: funder side
// ---------------------------------------------------------------------

fn init_funder<D: ChannelDriver>(
    state: &mut ChannelState,
    _driver: &D,
) -> Result<Vec<Action>, DispatchError> {
    require_stage(state, Lifecycle::WaitForInit)?;

    let temporary_channel_id = match state.active_channel_id {
        ActiveChannelId::Temporary(id) => id,
        ActiveChannelId::Final(_) => TempChannelId::random(),
    };
    state.active_channel_id = ActiveChannelId::Temporary(temporary_channel_id);

    let open_channel = OpenChannel {
        chain_hash: state.chain_hash,
        temporary_channel_id,
        funding_satoshis: state.funding.amount(),
        push_msat: state.remote_amount_msat,
        dust_limit_satoshis: state.local_params.dust_limit_satoshis,
        max_htlc_value_in_flight_msat: state.local_params.max_htlc_value_in_flight_msat,
        channel_reserve_satoshis: state.local_params.channel_reserve_satoshis,
        htlc_minimum_msat: state.local_params.htlc_minimum_msat,
        feerate_per_kw: state.common_params.feerate_per_kw,
        to_self_delay: state.local_params.to_self_delay,
        max_accepted_htlcs: state.local_params.max_accepted_htlcs,
        funding_pubkey: state.local_keys.funding_pubkey.key,
        revocation_basepoint: state.local_keys.revocation_basepoint.key,
        payment_point: state.local_keys.payment_basepoint.key,
        delayed_payment_basepoint: state.local_keys.delayed_payment_basepoint.key,
        htlc_basepoint: state.local_keys.htlc_basepoint.key,
        first_per_commitment_point: state.local_keys.first_per_commitment_point.key,
        channel_flags: if state.common_params.announce_channel { 0x01 } else { 0x00 },
        shutdown_scriptpubkey: state.local_keys.shutdown_scriptpubkey.clone(),
        channel_type: Some(state.common_params.channel_type),
        unknown_tlvs: none!(),
    };
    state.stage = Lifecycle::WaitForAcceptChannel;
    Ok(vec![
        Action::StoreState,
        Action::SendMessage(Messages::OpenChannel(open_channel)),
    ])
}

fn accept_channel_message(state: &ChannelState, channel_id: TempChannelId) -> AcceptChannel {
    AcceptChannel {
        temporary_channel_id: channel_id,
        dust_limit_satoshis: state.local_params.dust_limit_satoshis,
        max_htlc_value_in_flight_msat: state.local_params.max_htlc_value_in_flight_msat,
        channel_reserve_satoshis: state.local_params.channel_reserve_satoshis,
        htlc_minimum_msat: state.local_params.htlc_minimum_msat,
        minimum_depth: state.common_params.minimum_depth,
        to_self_delay: state.local_params.to_self_delay,
        max_accepted_htlcs: state.local_params.max_accepted_htlcs,
        funding_pubkey: state.local_keys.funding_pubkey.key,
        revocation_basepoint: state.local_keys.revocation_basepoint.key,
        payment_point: state.local_keys.payment_basepoint.key,
        delayed_payment_basepoint: state.local_keys.delayed_payment_basepoint.key,
        htlc_basepoint: state.local_keys.htlc_basepoint.key,
        first_per_commitment_point: state.local_keys.first_per_commitment_point.key,
        shutdown_scriptpubkey: state.local_keys.shutdown_scriptpubkey.clone(),
        channel_type: Some(state.common_params.channel_type),
        unknown_tlvs: none!(),
    }
}

// ---------------------------------------------------------------------
// Opening: fundee side
// ---------------------------------------------------------------------

fn init_fundee<D: ChannelDriver>(
    state: &mut ChannelState,
    _driver: &D,
    open_channel: OpenChannel,
) -> Result<Vec<Action>, DispatchError> {
    require_stage(state, Lifecycle::WaitForOpenChannel)?;

    let remote_params = super::policy::PeerParams::from(&open_channel);
    helpers::validate_params_fundee(
        2016,
        &remote_params,
        open_channel.feerate_per_kw,
        open_channel.feerate_per_kw,
        0.0,
    )?;

    state.chain_hash = open_channel.chain_hash;
    state.active_channel_id = ActiveChannelId::Temporary(open_channel.temporary_channel_id);
    state.remote_amount_msat = open_channel.push_msat;
    state.local_amount_msat =
        open_channel.funding_satoshis * 1000 - open_channel.push_msat;
    state.remote_params = remote_params;
    state.remote_keys = super::keyset::RemoteKeyset::from(&open_channel);
    state.channel_version.channel_type = open_channel.channel_type.unwrap_or_default();

    let accept_channel =
        accept_channel_message(state, open_channel.temporary_channel_id);
    state.stage = Lifecycle::WaitForFundingCreated;
    Ok(vec![
        Action::StoreState,
        Action::SendMessage(Messages::AcceptChannel(accept_channel)),
    ])
}

// ---------------------------------------------------------------------
// Message dispatch
// ---------------------------------------------------------------------

fn receive_message<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: Messages,
) -> Result<Vec<Action>, DispatchError> {
    match msg {
        Messages::AcceptChannel(accept) => receive_accept_channel(state, driver, accept),
        Messages::FundingCreated(msg) => receive_funding_created(state, driver, msg),
        Messages::FundingSigned(msg) => receive_funding_signed(state, driver, msg),
        Messages::FundingLocked(msg) => receive_funding_locked(state, driver, msg),
        Messages::Shutdown(msg) => receive_shutdown(state, driver, msg),
        Messages::ClosingSigned(msg) => receive_closing_signed(state, driver, msg),
        Messages::UpdateAddHtlc(msg) => receive_update_add(state, driver, msg),
        Messages::UpdateFulfillHtlc(msg) => receive_update_fulfill(state, msg),
        Messages::UpdateFailHtlc(msg) => receive_update_fail(state, msg),
        Messages::UpdateFailMalformedHtlc(msg) => receive_update_fail_malformed(state, msg),
        Messages::UpdateFee(msg) => receive_update_fee(state, msg),
        Messages::CommitmentSigned(msg) => receive_commitment_signed(state, driver, msg),
        Messages::RevokeAndAck(msg) => receive_revoke_and_ack(state, msg),
        Messages::ChannelReestablish(msg) => receive_channel_reestablish(state, driver, msg),
        Messages::Error(err) => Err(DispatchError::RemoteError(
            String::from_utf8_lossy(&err.data).into_owned(),
        )),
        _ => Ok(vec![]),
    }
}

fn receive_accept_channel<D: ChannelDriver>(
    state: &mut ChannelState,
    _driver: &D,
    accept: AcceptChannel,
) -> Result<Vec<Action>, DispatchError> {
    require_stage(state, Lifecycle::WaitForAcceptChannel)?;

    let remote_params = super::policy::PeerParams::from(&accept);
    if let Err(err) = helpers::validate_params_funder(
        2016,
        10,
        state.funding.amount(),
        state.channel_version.zero_reserve,
        state.local_params.dust_limit_satoshis,
        state.local_params.channel_reserve_satoshis,
        &remote_params,
    ) {
        state.stage = Lifecycle::Aborted;
        let channel_id = any_channel_id(state.active_channel_id);
        return Ok(vec![
            Action::StoreState,
            Action::SendMessage(Messages::Error(ErrorMessage {
                channel_id,
                data: err.to_string().into_bytes(),
            })),
        ]);
    }

    state.remote_params = remote_params;
    state.remote_keys = super::keyset::RemoteKeyset::from(&accept);
    state.common_params.minimum_depth = accept.minimum_depth;
    state.stage = Lifecycle::WaitForFundingInternal;
    Ok(vec![
        Action::StoreState,
        Action::MakeFundingTx {
            funding_satoshis: state.funding.amount(),
            remote_funding_pubkey: accept.funding_pubkey,
        },
    ])
}

fn funding_tx_made<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    funding_tx: Transaction,
    funding_txid: Txid,
    funding_output_index: u16,
) -> Result<Vec<Action>, DispatchError> {
    require_stage(state, Lifecycle::WaitForFundingInternal)?;

    let (local_commit, remote_commit) = helpers::make_first_commit_txs(
        state.funding.amount(),
        state.remote_amount_msat,
        true,
        state.local_params.dust_limit_satoshis,
        state.remote_params.dust_limit_satoshis,
        state.remote_params.channel_reserve_satoshis,
        state.common_params.feerate_per_kw,
        state.remote_keys.first_per_commitment_point,
    )?;
    let channel_id = ChannelId::with(OutPoint::new(funding_txid, funding_output_index as u32));
    state.commitments.channel_id = channel_id;
    state.commitments.is_funder = true;
    state.commitments.local_commit = local_commit;
    state.commitments.remote_commit = remote_commit.clone();

    let (signature, _htlc_sigs) = driver.sign_remote_commit(&remote_commit);
    let msg = FundingCreated {
        temporary_channel_id: state
            .active_channel_id
            .temp_channel_id()
            .unwrap_or_else(TempChannelId::random),
        funding_txid,
        funding_output_index,
        signature,
    };
    state.active_channel_id = ActiveChannelId::Final(channel_id);
    state.pending_funding_tx = Some(funding_tx);
    state.stage = Lifecycle::WaitForFundingSigned;
    Ok(vec![
        Action::StoreState,
        Action::ChannelIdAssigned(channel_id),
        Action::SendMessage(Messages::FundingCreated(msg)),
    ])
}

fn receive_funding_created<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: FundingCreated,
) -> Result<Vec<Action>, DispatchError> {
    require_stage(state, Lifecycle::WaitForFundingCreated)?;

    let (local_commit, remote_commit) = helpers::make_first_commit_txs(
        state.funding.amount(),
        state.local_amount_msat,
        false,
        state.local_params.dust_limit_satoshis,
        state.remote_params.dust_limit_satoshis,
        state.remote_params.channel_reserve_satoshis,
        state.common_params.feerate_per_kw,
        state.remote_keys.first_per_commitment_point,
    )?;
    let channel_id = ChannelId::with(OutPoint::new(
        msg.funding_txid,
        msg.funding_output_index as u32,
    ));
    state.commitments.channel_id = channel_id;
    state.commitments.is_funder = false;
    state.commitments.local_commit = local_commit.clone();
    state.commitments.remote_commit = remote_commit;

    if !driver.sign_local_commit(&local_commit) {
        return Err(ProtocolError::InvalidCommitmentSignature.into());
    }
    let (signature, _) = driver.sign_remote_commit(&state.commitments.remote_commit);
    let reply = FundingSigned { channel_id, signature };

    state.active_channel_id = ActiveChannelId::Final(channel_id);
    state.stage = Lifecycle::WaitForFundingConfirmed;
    Ok(vec![
        Action::StoreState,
        Action::ChannelIdAssigned(channel_id),
        Action::SendMessage(Messages::FundingSigned(reply)),
        Action::SendWatch(WatchRequest::WatchConfirmed {
            txid: msg.funding_txid,
            min_depth: helpers::min_depth_for_funding(
                state.common_params.minimum_depth,
                state.funding.amount(),
            ),
        }),
    ])
}

fn receive_funding_signed<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: FundingSigned,
) -> Result<Vec<Action>, DispatchError> {
    require_stage(state, Lifecycle::WaitForFundingSigned)?;
    if !driver.sign_local_commit(&state.commitments.local_commit) {
        return Err(ProtocolError::InvalidCommitmentSignature.into());
    }
    let funding_tx = state
        .pending_funding_tx
        .take()
        .ok_or(DispatchError::NoPendingFundingTx)?;
    state.commitments.local_commit.commit_sig = msg.signature;
    state.stage = Lifecycle::WaitForFundingConfirmed;
    Ok(vec![
        Action::StoreState,
        Action::PublishTx(funding_tx),
        Action::SendWatch(WatchRequest::WatchConfirmed {
            txid: state.funding.txid(),
            min_depth: helpers::min_depth_for_funding(
                state.common_params.minimum_depth,
                state.funding.amount(),
            ),
        }),
    ])
}

fn receive_funding_locked<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: FundingLocked,
) -> Result<Vec<Action>, DispatchError> {
    if state.stage != Lifecycle::WaitForFundingLocked
        && state.stage != Lifecycle::WaitForFundingConfirmed
    {
        return Err(DispatchError::UnexpectedEvent(state.stage));
    }
    // `funding_locked`'s point is the remote's per-commitment point for
    // *their next* commitment (index 1); seed `remote_next_commit_info`
    // with it in place of the entropy placeholder used before we knew it.
    state.commitments.remote_next_commit_info =
        RemoteNextCommitInfo::Revoked(msg.next_per_commitment_point);
    if state.stage == Lifecycle::WaitForFundingConfirmed {
        // Funding locked arrived before we observed the confirmation
        // ourselves; remember it and wait for our own `WatchEvent::Confirmed`.
        return Ok(vec![Action::StoreState]);
    }
    state.stage = Lifecycle::Normal;
    let our_point = driver.next_per_commitment_point(1);
    Ok(vec![
        Action::StoreState,
        Action::SendMessage(Messages::FundingLocked(FundingLocked {
            channel_id: active_to_channel_id(state.active_channel_id)?,
            next_per_commitment_point: our_point,
        })),
    ])
}

// ---------------------------------------------------------------------
// Chain watch / block events
// ---------------------------------------------------------------------

fn receive_watch_event<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    event: WatchEvent,
) -> Result<Vec<Action>, DispatchError> {
    match event {
        WatchEvent::Confirmed { depth, .. }
            if state.stage == Lifecycle::WaitForFundingConfirmed
                && depth
                    >= helpers::min_depth_for_funding(
                        state.common_params.minimum_depth,
                        state.funding.amount(),
                    ) =>
        {
            state.stage = Lifecycle::WaitForFundingLocked;
            let our_point = driver.next_per_commitment_point(1);
            let channel_id = active_to_channel_id(state.active_channel_id)?;
            Ok(vec![
                Action::StoreState,
                Action::SendMessage(Messages::FundingLocked(FundingLocked {
                    channel_id,
                    next_per_commitment_point: our_point,
                })),
            ])
        }
        WatchEvent::Spent { spending_txid, .. } => {
            handle_funding_spent(state, spending_txid)
        }
        _ => Ok(vec![]),
    }
}

fn handle_funding_spent(
    state: &mut ChannelState,
    spending_txid: Txid,
) -> Result<Vec<Action>, DispatchError> {
    if state.stage.is_terminal() {
        return Ok(vec![]);
    }
    if state.closing.is_none() {
        let channel_id = active_to_channel_id(state.active_channel_id)?;
        let script = state
            .local_keys
            .shutdown_scriptpubkey
            .clone()
            .unwrap_or_default();
        state.closing = Some(Closing::new(channel_id, script));
    }
    let remote_next_commit_txid =
        state.commitments.remote_next_commit_info.pending_commit().map(|c| c.txid);
    let revoked_commit_txids: Vec<Txid> =
        state.commitments.revoked_remote_commits.keys().copied().collect();
    let local_commit_txid = state
        .closing
        .as_ref()
        .and_then(|c| c.local_commit_published.as_ref())
        .map(|p| p.commit_txid);

    let closing_type = state
        .closing
        .as_ref()
        .expect("populated above")
        .detect_closing_type(
            spending_txid,
            local_commit_txid,
            state.commitments.remote_commit.txid,
            remote_next_commit_txid,
            &revoked_commit_txids,
        );
    debug!("funding outpoint spent by {}: {}", spending_txid, closing_type);

    match closing_type {
        ClosingType::CurrentRemoteClose => {
            if let Ok(published) = Closing::claim_remote_commit_tx_outputs(
                &state.commitments.remote_commit,
                state.remote_params.dust_limit_satoshis,
            ) {
                state.closing.as_mut().expect("populated above").remote_commit_published =
                    Some(published);
            }
        }
        ClosingType::RecoveryClose => {
            error!(
                "channel {}: funding outpoint spent by unrecognized transaction {}; \
                 treating as an information leak",
                state.commitments.channel_id, spending_txid
            );
            state.stage = Lifecycle::ErrorInformationLeak;
            return Ok(vec![Action::StoreState]);
        }
        ClosingType::RevokedClose => {
            if let Some((index, point, spec)) =
                state.commitments.revoked_remote_commits.get(&spending_txid).cloned()
            {
                if let Ok(published) = Closing::claim_revoked_remote_commit_tx_outputs(
                    spending_txid,
                    index,
                    point,
                    &spec,
                    state.remote_params.dust_limit_satoshis,
                ) {
                    state
                        .closing
                        .as_mut()
                        .expect("populated above")
                        .revoked_commit_published
                        .push(published);
                }
            }
        }
        _ => {}
    }
    state.stage = Lifecycle::Closing;
    Ok(vec![Action::StoreState])
}

fn new_block<D: ChannelDriver>(
    state: &mut ChannelState,
    _driver: &D,
    height: u32,
) -> Result<Vec<Action>, DispatchError> {
    if state.stage == Lifecycle::WaitForFundingConfirmed
        && height >= helpers::FUNDING_TIMEOUT_FUNDEE_BLOCKS
        && !state.commitments.is_funder
        && helpers::min_depth_for_funding(
            state.common_params.minimum_depth,
            state.funding.amount(),
        ) == 0
    {
        state.stage = Lifecycle::Aborted;
        return Ok(vec![Action::StoreState]);
    }
    Ok(vec![])
}

// ---------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------

fn restore<D: ChannelDriver>(
    state: &mut ChannelState,
    _driver: &D,
) -> Result<Vec<Action>, DispatchError> {
    if state.commitments.local_commit.index == 0
        && state.commitments.remote_commit.index == 0
        && state.stage != Lifecycle::Normal
    {
        state.stage = Lifecycle::WaitForFundingConfirmed;
        return Ok(vec![Action::SendWatch(WatchRequest::WatchConfirmed {
            txid: state.funding.txid(),
            min_depth: helpers::min_depth_for_funding(
                state.common_params.minimum_depth,
                state.funding.amount(),
            ),
        })]);
    }
    Ok(vec![])
}

// ---------------------------------------------------------------------
// Normal operation: commitment sub-protocol delegation
// ---------------------------------------------------------------------

fn in_normal_operation(stage: Lifecycle) -> bool {
    matches!(stage, Lifecycle::Normal | Lifecycle::ShuttingDown)
}

fn receive_update_add<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: UpdateAddHtlc,
) -> Result<Vec<Action>, DispatchError> {
    if !in_normal_operation(state.stage) {
        return Err(DispatchError::UnexpectedEvent(state.stage));
    }
    let htlc_id = msg.htlc_id;
    state.commitments.receive_add(
        msg,
        driver.current_block_height(),
        helpers::MIN_CLTV_EXPIRY_DELTA,
        helpers::MAX_CLTV_EXPIRY_DELTA,
        state.local_params.htlc_minimum_msat,
        state.local_params.max_accepted_htlcs,
        state.local_params.max_htlc_value_in_flight_msat,
    )?;
    Ok(vec![Action::StoreState, Action::ProcessAdd(htlc_id)])
}

fn receive_update_fulfill(
    state: &mut ChannelState,
    msg: UpdateFulfillHtlc,
) -> Result<Vec<Action>, DispatchError> {
    state.commitments.receive_fulfill(msg)?;
    Ok(vec![Action::StoreState])
}

fn receive_update_fail(
    state: &mut ChannelState,
    msg: UpdateFailHtlc,
) -> Result<Vec<Action>, DispatchError> {
    state.commitments.receive_fail(msg)?;
    Ok(vec![Action::StoreState])
}

fn receive_update_fail_malformed(
    state: &mut ChannelState,
    msg: UpdateFailMalformedHtlc,
) -> Result<Vec<Action>, DispatchError> {
    state.commitments.receive_fail_malformed(msg)?;
    Ok(vec![Action::StoreState])
}

fn receive_update_fee(
    state: &mut ChannelState,
    msg: UpdateFee,
) -> Result<Vec<Action>, DispatchError> {
    if state.commitments.is_funder {
        return Err(ProtocolError::FeeUpdateNotFunder.into());
    }
    if helpers::is_fee_diff_too_high(
        state.common_params.feerate_per_kw,
        msg.feerate_per_kw,
        20.0,
    ) {
        return Err(ProtocolError::FeerateTooDifferent.into());
    }
    state.common_params.feerate_per_kw = msg.feerate_per_kw;
    Ok(vec![Action::StoreState])
}

fn receive_commitment_signed<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: CommitmentSigned,
) -> Result<Vec<Action>, DispatchError> {
    let next_index = state.commitments.local_commit.index + 1;
    let our_revealed_secret = driver.reveal_per_commitment_secret(next_index - 1);
    let our_next_point = driver.next_per_commitment_point(next_index + 1);
    let (ack, mut actions) = state.commitments.receive_commit(
        msg,
        driver,
        our_revealed_secret,
        our_next_point,
    )?;
    actions.push(Action::SendMessage(Messages::RevokeAndAck(ack)));
    Ok(actions)
}

fn receive_revoke_and_ack(
    state: &mut ChannelState,
    msg: RevokeAndAck,
) -> Result<Vec<Action>, DispatchError> {
    let actions = state.commitments.receive_revocation(msg)?;
    Ok(actions)
}

/// Handles `channel_reestablish`, including recovery from the peer-storage
/// backup they may have returned to us: the transport layer is expected to
/// have already stashed the ciphertext it carried in
/// [`ChannelState::remote_channel_data`] before feeding us this event, since
/// the wire message itself carries no room for it. We only adopt the
/// recovered state if it is strictly ahead of what we already hold; a
/// corrupt or stale blob just gets logged and discarded.
fn receive_channel_reestablish<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: ChannelReestablish,
) -> Result<Vec<Action>, DispatchError> {
    let local = active_to_channel_id(state.active_channel_id)?;
    if msg.channel_id != local {
        return Err(DispatchError::ChannelIdMismatch { remote: msg.channel_id, local });
    }
    if let Some(ciphertext) = state.remote_channel_data.take() {
        adopt_backup_if_newer(state, driver, msg.next_revocation_number, &ciphertext);
    }
    let mut actions = state
        .commitments
        .handle_sync(msg.next_commitment_number, msg.next_revocation_number)?;
    if state.phase.is_syncing() {
        state.phase = Phase::Online;
    }
    actions.push(Action::StoreState);
    Ok(actions)
}

fn adopt_backup_if_newer<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    backup_commit_index: u64,
    ciphertext: &[u8],
) {
    let plaintext = match backup::decrypt_backup(
        driver.node_privkey(),
        backup_commit_index,
        ciphertext,
    ) {
        Ok(plaintext) => plaintext,
        Err(err) => {
            warn!(
                "channel {:?}: peer-returned backup failed to decrypt: {}",
                state.active_channel_id, err
            );
            return;
        }
    };
    let recovered = match ChannelState::strict_deserialize(&plaintext) {
        Ok(recovered) => recovered,
        Err(err) => {
            warn!(
                "channel {:?}: peer-returned backup failed to decode: {}",
                state.active_channel_id, err
            );
            return;
        }
    };
    if recovered.commitments.local_commit.index > state.commitments.local_commit.index {
        debug!(
            "channel {:?}: adopting peer-returned backup at commit index {}",
            state.active_channel_id, recovered.commitments.local_commit.index
        );
        *state = recovered;
    }
}

// ---------------------------------------------------------------------
// Local commands
// ---------------------------------------------------------------------

fn execute_command<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    cmd: Command,
) -> Result<Vec<Action>, DispatchError> {
    match cmd {
        Command::CmdAddHtlc { amount_msat, payment_hash, cltv_expiry } => {
            if !in_normal_operation(state.stage) {
                return Err(DispatchError::UnexpectedEvent(state.stage));
            }
            let add = state.commitments.send_add(
                amount_msat,
                payment_hash,
                cltv_expiry,
                driver.current_block_height(),
                helpers::MIN_CLTV_EXPIRY_DELTA,
                helpers::MAX_CLTV_EXPIRY_DELTA,
                state.remote_params.htlc_minimum_msat,
                state.remote_params.max_htlc_value_in_flight_msat,
                state.remote_params.channel_reserve_satoshis,
            )?;
            Ok(vec![Action::StoreState, Action::SendMessage(Messages::UpdateAddHtlc(add))])
        }
        Command::CmdFulfillHtlc { htlc_id, payment_preimage } => {
            let msg = state.commitments.send_fulfill(htlc_id, payment_preimage)?;
            Ok(vec![Action::StoreState, Action::SendMessage(Messages::UpdateFulfillHtlc(msg))])
        }
        Command::CmdFailHtlc { htlc_id, reason } => {
            let msg = state.commitments.send_fail(htlc_id, reason)?;
            Ok(vec![Action::StoreState, Action::SendMessage(Messages::UpdateFailHtlc(msg))])
        }
        Command::CmdFailMalformedHtlc { htlc_id, sha256_of_onion, failure_code } => {
            let msg = state
                .commitments
                .send_fail_malformed(htlc_id, sha256_of_onion, failure_code)?;
            Ok(vec![
                Action::StoreState,
                Action::SendMessage(Messages::UpdateFailMalformedHtlc(msg)),
            ])
        }
        Command::CmdSign => {
            let msg = state.commitments.send_commit(driver)?;
            let mut actions = Vec::with_capacity(3);
            if let Some(next_commit) = state.commitments.remote_next_commit_info.pending_commit()
            {
                let htlc_infos: Vec<HtlcInfo> = next_commit
                    .spec
                    .non_dust_htlcs(state.remote_params.dust_limit_satoshis)
                    .map(|h| HtlcInfo {
                        channel_id: state.commitments.channel_id,
                        commitment_number: next_commit.index,
                        payment_hash: h.payment_hash,
                        cltv_expiry: h.cltv_expiry,
                    })
                    .collect();
                if !htlc_infos.is_empty() {
                    actions.push(Action::StoreHtlcInfos(htlc_infos));
                }
            }
            actions.push(Action::StoreState);
            actions.push(Action::SendMessage(Messages::CommitmentSigned(msg)));
            Ok(actions)
        }
        Command::CmdUpdateFee(feerate_per_kw) => {
            if !state.commitments.is_funder {
                return Err(ProtocolError::FeeUpdateNotFunder.into());
            }
            state.common_params.feerate_per_kw = feerate_per_kw;
            let msg = UpdateFee {
                channel_id: active_to_channel_id(state.active_channel_id)?,
                feerate_per_kw,
            };
            Ok(vec![Action::StoreState, Action::SendMessage(Messages::UpdateFee(msg))])
        }
        Command::CmdClose => begin_shutdown(state),
        Command::CmdForceClose => force_close(state, driver),
    }
}

fn begin_shutdown(state: &mut ChannelState) -> Result<Vec<Action>, DispatchError> {
    if state.stage != Lifecycle::Normal {
        return Err(DispatchError::UnexpectedEvent(state.stage));
    }
    state.stage = Lifecycle::ShuttingDown;
    let script = state
        .local_keys
        .shutdown_scriptpubkey
        .clone()
        .unwrap_or_default();
    let channel_id = active_to_channel_id(state.active_channel_id)?;
    state.closing = Some(Closing::new(channel_id, script.clone()));
    Ok(vec![
        Action::StoreState,
        Action::SendMessage(Messages::Shutdown(Shutdown { channel_id, scriptpubkey: script })),
    ])
}

fn receive_shutdown<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: Shutdown,
) -> Result<Vec<Action>, DispatchError> {
    match state.stage {
        Lifecycle::Normal => {
            state.stage = Lifecycle::ShuttingDown;
            let script = state
                .local_keys
                .shutdown_scriptpubkey
                .clone()
                .unwrap_or_default();
            let channel_id = msg.channel_id;
            let mut closing = Closing::new(channel_id, script.clone());
            closing.remote_shutdown_script = Some(msg.scriptpubkey);
            state.closing = Some(closing);
            let mut actions = vec![
                Action::StoreState,
                Action::SendMessage(Messages::Shutdown(Shutdown {
                    channel_id,
                    scriptpubkey: script,
                })),
            ];
            maybe_start_negotiation(state, driver, &mut actions)?;
            Ok(actions)
        }
        Lifecycle::ShuttingDown => {
            if let Some(closing) = state.closing.as_mut() {
                closing.remote_shutdown_script = Some(msg.scriptpubkey);
            }
            let mut actions = vec![Action::StoreState];
            maybe_start_negotiation(state, driver, &mut actions)?;
            Ok(actions)
        }
        _ => Err(DispatchError::UnexpectedEvent(state.stage)),
    }
}

fn settleable_value(state: &ChannelState) -> u64 {
    state.commitments.local_commit.spec.to_local_msat / 1000
}

fn maybe_start_negotiation<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    actions: &mut Vec<Action>,
) -> Result<(), DispatchError> {
    if !state.commitments.local_commit.spec.htlcs.is_empty()
        || !state.commitments.remote_commit.spec.htlcs.is_empty()
    {
        return Ok(());
    }
    let is_funder = state.commitments.is_funder;
    let feerate = state.common_params.feerate_per_kw;
    let settleable = settleable_value(state);
    let closing = state.closing.as_mut().ok_or(DispatchError::NoActiveClosing)?;
    if closing.remote_shutdown_script.is_none() {
        return Ok(());
    }
    state.stage = Lifecycle::Negotiating;
    if is_funder {
        let closing = state.closing.as_mut().ok_or(DispatchError::NoActiveClosing)?;
        let fee = closing.propose_closing_fee(settleable, feerate)?;
        let (tx, signature) = driver.sign_mutual_close(
            &closing.local_shutdown_script,
            closing.remote_shutdown_script.as_ref().expect("checked above"),
            fee,
        );
        let _ = tx;
        actions.push(Action::SendMessage(Messages::ClosingSigned(ClosingSigned {
            channel_id: closing.channel_id,
            fee_satoshis: fee,
            signature,
        })));
    }
    Ok(())
}

fn receive_closing_signed<D: ChannelDriver>(
    state: &mut ChannelState,
    driver: &D,
    msg: ClosingSigned,
) -> Result<Vec<Action>, DispatchError> {
    if state.stage != Lifecycle::Negotiating {
        return Err(DispatchError::UnexpectedEvent(state.stage));
    }
    let settleable = settleable_value(state);
    let remote_script = state
        .closing
        .as_ref()
        .and_then(|c| c.remote_shutdown_script.clone())
        .ok_or(DispatchError::NoActiveClosing)?;
    let closing = state.closing.as_mut().ok_or(DispatchError::NoActiveClosing)?;
    let counter = closing.receive_closing_signed(&msg, settleable)?;
    match counter {
        Some(fee) => {
            let (_, signature) =
                driver.sign_mutual_close(&closing.local_shutdown_script, &remote_script, fee);
            Ok(vec![
                Action::StoreState,
                Action::SendMessage(Messages::ClosingSigned(ClosingSigned {
                    channel_id: closing.channel_id,
                    fee_satoshis: fee,
                    signature,
                })),
            ])
        }
        None => {
            let fee = msg.fee_satoshis;
            let (tx, _signature) =
                driver.sign_mutual_close(&closing.local_shutdown_script, &remote_script, fee);
            closing.mutual_close =
                Some(super::closing::MutualClosePublished { tx: tx.clone(), fee_satoshis: fee });
            state.stage = Lifecycle::Closing;
            Ok(vec![Action::StoreState, Action::PublishTx(tx)])
        }
    }
}

fn force_close<D: ChannelDriver>(
    state: &mut ChannelState,
    _driver: &D,
) -> Result<Vec<Action>, DispatchError> {
    if state.stage.is_terminal() {
        return Err(DispatchError::UnexpectedEvent(state.stage));
    }
    // The actual claim derivation (`claim_current_local_commit_tx_outputs`)
    // needs the commit transaction's txid, which only exists once the wallet
    // collaborator has built and broadcast it; that happens once the
    // corresponding `WatchEvent::Spent` is observed (see
    // `handle_funding_spent`). Here we only record the intent to force-close
    // and let a later reorg/confirmation event drive the claim.
    if state.closing.is_none() {
        let channel_id = active_to_channel_id(state.active_channel_id)?;
        let script = state
            .local_keys
            .shutdown_scriptpubkey
            .clone()
            .unwrap_or_default();
        state.closing = Some(Closing::new(channel_id, script));
    }
    state.stage = Lifecycle::Closing;
    Ok(vec![Action::StoreState])
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::Hash;
    use secp256k1::SECP256K1;

    use super::*;
    use crate::channel::bolt::commitments::{LocalCommit, RemoteCommit};

    struct StubDriver;

    impl CommitmentSigner for StubDriver {
        fn sign_remote_commit(
            &self,
            remote_commit: &RemoteCommit,
        ) -> (Signature, Vec<Signature>) {
            (dumb_sig(), vec![dumb_sig(); remote_commit.spec.htlcs.len()])
        }

        fn sign_local_commit(&self, _local_commit: &LocalCommit) -> bool {
            true
        }
    }

    impl ClosingSigner for StubDriver {
        fn sign_mutual_close(
            &self,
            _local_script: &PubkeyScript,
            _remote_script: &PubkeyScript,
            _fee_satoshis: u64,
        ) -> (Transaction, Signature) {
            (
                Transaction {
                    version: 2,
                    lock_time: bitcoin::PackedLockTime(0),
                    input: vec![],
                    output: vec![],
                },
                dumb_sig(),
            )
        }

        fn verify_mutual_close(
            &self,
            _local_script: &PubkeyScript,
            _remote_script: &PubkeyScript,
            _fee_satoshis: u64,
            _remote_signature: &Signature,
        ) -> bool {
            true
        }
    }

    impl ChannelDriver for StubDriver {
        fn current_block_height(&self) -> u32 {
            500_000
        }

        fn node_privkey(&self) -> SecretKey {
            SecretKey::from_slice(&[0x22u8; 32]).unwrap()
        }

        fn reveal_per_commitment_secret(&self, _index: u64) -> SecretKey {
            SecretKey::from_slice(&[0x33u8; 32]).unwrap()
        }

        fn next_per_commitment_point(&self, _index: u64) -> PublicKey {
            dumb_pubkey!()
        }
    }

    fn dumb_sig() -> Signature {
        let msg = secp256k1::Message::from_slice(&[9u8; 32]).unwrap();
        SECP256K1.sign_ecdsa(&msg, &secp256k1::ONE_KEY)
    }

    #[test]
    fn init_funder_emits_open_channel_and_advances_stage() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::WaitForInit;
        let actions = process(&mut state, &StubDriver, Event::InitFunder);
        assert_eq!(state.stage, Lifecycle::WaitForAcceptChannel);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::OpenChannel(_)))));
    }

    #[test]
    fn disconnect_sets_offline_without_touching_lifecycle() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        process(&mut state, &StubDriver, Event::Disconnected);
        assert_eq!(state.phase, Phase::Offline);
        assert_eq!(state.stage, Lifecycle::Normal);
    }

    #[test]
    fn events_while_offline_are_rejected() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.phase = Phase::Offline;
        let actions = process(&mut state, &StubDriver, Event::ExecuteCommand(Command::CmdSign));
        assert!(actions.iter().any(|a| matches!(a, Action::ProcessLocalFailure(_))));
    }

    #[test]
    fn cmd_close_from_normal_moves_to_shutting_down() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        let actions = process(&mut state, &StubDriver, Event::ExecuteCommand(Command::CmdClose));
        assert_eq!(state.stage, Lifecycle::ShuttingDown);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::Shutdown(_)))));
    }

    #[test]
    fn command_in_wrong_stage_fails_without_panicking() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::WaitForInit;
        let actions = process(&mut state, &StubDriver, Event::ExecuteCommand(Command::CmdClose));
        assert!(actions.iter().any(|a| matches!(a, Action::ProcessLocalFailure(_))));
    }

    #[test]
    fn force_close_is_idempotent_on_already_closing_channel() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Closing;
        let actions =
            process(&mut state, &StubDriver, Event::ExecuteCommand(Command::CmdForceClose));
        assert_eq!(state.stage, Lifecycle::Closing);
        assert!(actions.iter().any(|a| matches!(a, Action::StoreState)));
    }

    #[test]
    fn accept_channel_rejecting_too_many_htlcs_aborts_and_sends_error() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::WaitForAcceptChannel;
        let mut accept = AcceptChannel::dumb_default();
        accept.max_accepted_htlcs = 500;
        let actions = process(
            &mut state,
            &StubDriver,
            Event::MessageReceived(Messages::AcceptChannel(accept)),
        );
        assert_eq!(state.stage, Lifecycle::Aborted);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::Error(_)))));
    }

    #[test]
    fn commit_sign_revoke_round_trip_advances_remote_commit_index() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        state.commitments.is_funder = true;
        state.commitments.local_commit.spec.to_local_msat = 10_000_000_000;
        state.commitments.remote_commit.spec.to_remote_msat = 10_000_000_000;

        let add_actions = process(
            &mut state,
            &StubDriver,
            Event::ExecuteCommand(Command::CmdAddHtlc {
                amount_msat: 100_000,
                payment_hash: HashLock::default(),
                cltv_expiry: 500_040,
            }),
        );
        assert!(add_actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::UpdateAddHtlc(_)))));

        let sign_actions =
            process(&mut state, &StubDriver, Event::ExecuteCommand(Command::CmdSign));
        assert!(sign_actions.iter().any(|a| matches!(a, Action::StoreHtlcInfos(_))));
        assert!(sign_actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::CommitmentSigned(_)))));

        let ack = RevokeAndAck {
            channel_id: ChannelId::default(),
            per_commitment_secret: SecretKey::from_slice(&[0x44u8; 32]).unwrap(),
            next_per_commitment_point: dumb_pubkey!(),
        };
        process(&mut state, &StubDriver, Event::MessageReceived(Messages::RevokeAndAck(ack)));
        assert_eq!(state.commitments.remote_commit.index, 1);
    }

    #[test]
    fn reconnect_after_commitments_exist_emits_channel_reestablish() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        state.commitments.is_funder = true;
        state.phase = Phase::Offline;
        let actions = process(&mut state, &StubDriver, Event::Connected);
        assert!(matches!(state.phase, Phase::Syncing { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::ChannelReestablish(_)))));
    }

    #[test]
    fn funding_spent_by_revoked_commit_derives_the_penalty_claim() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        let revoked_txid = Txid::from_slice(&[5u8; 32]).unwrap();
        let mut revoked_spec = CommitmentSpec::default();
        revoked_spec.to_remote_msat = 500_000;
        state.commitments.revoked_remote_commits.insert(
            revoked_txid,
            (0, dumb_pubkey!(), revoked_spec),
        );
        process(
            &mut state,
            &StubDriver,
            Event::WatchReceived(WatchEvent::Spent {
                outpoint: OutPoint::new(Txid::default(), 0),
                spending_txid: revoked_txid,
            }),
        );
        assert_eq!(state.stage, Lifecycle::Closing);
        let closing = state.closing.as_ref().unwrap();
        assert_eq!(closing.revoked_commit_published.len(), 1);
        assert_eq!(closing.revoked_commit_published[0].commit_txid, revoked_txid);
        assert!(closing.revoked_commit_published[0].claim_main.is_some());
    }

    #[test]
    fn funding_spent_by_known_remote_commit_moves_to_closing() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        state.commitments.remote_commit.spec.to_remote_msat = 500_000;
        let remote_txid = state.commitments.remote_commit.txid;
        process(
            &mut state,
            &StubDriver,
            Event::WatchReceived(WatchEvent::Spent {
                outpoint: OutPoint::new(Txid::default(), 0),
                spending_txid: remote_txid,
            }),
        );
        assert_eq!(state.stage, Lifecycle::Closing);
        assert!(state
            .closing
            .as_ref()
            .unwrap()
            .remote_commit_published
            .is_some());
    }

    #[test]
    fn funding_spent_by_unrecognized_tx_is_an_information_leak() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        let mystery_txid = {
            use bitcoin::hashes::Hash;
            Txid::from_slice(&[7u8; 32]).unwrap()
        };
        process(
            &mut state,
            &StubDriver,
            Event::WatchReceived(WatchEvent::Spent {
                outpoint: OutPoint::new(Txid::default(), 0),
                spending_txid: mystery_txid,
            }),
        );
        assert_eq!(state.stage, Lifecycle::ErrorInformationLeak);
    }

    #[test]
    fn commit_sig_carries_a_peer_storage_backup() {
        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        state.commitments.is_funder = true;
        state.commitments.local_commit.spec.to_local_msat = 10_000_000_000;
        state.commitments.remote_commit.spec.to_remote_msat = 10_000_000_000;
        process(
            &mut state,
            &StubDriver,
            Event::ExecuteCommand(Command::CmdAddHtlc {
                amount_msat: 100_000,
                payment_hash: HashLock::default(),
                cltv_expiry: 500_040,
            }),
        );
        let sign_actions =
            process(&mut state, &StubDriver, Event::ExecuteCommand(Command::CmdSign));
        assert!(sign_actions
            .iter()
            .any(|a| matches!(a, Action::SendMessage(Messages::CommitmentSigned(_)))));
        assert!(sign_actions.iter().any(|a| matches!(a, Action::AttachBackup(_))));
    }

    #[test]
    fn channel_reestablish_adopts_a_newer_peer_returned_backup() {
        let mut recovered = ChannelState::dumb_default();
        recovered.stage = Lifecycle::Normal;
        recovered.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        recovered.commitments.local_commit.index = 5;
        let plaintext = recovered.strict_serialize().unwrap();
        let ciphertext = backup::encrypt_backup(StubDriver.node_privkey(), 5, &plaintext);

        let mut state = ChannelState::dumb_default();
        state.stage = Lifecycle::Normal;
        state.active_channel_id = ActiveChannelId::Final(ChannelId::default());
        state.remote_channel_data = Some(ciphertext);

        process(
            &mut state,
            &StubDriver,
            Event::MessageReceived(Messages::ChannelReestablish(ChannelReestablish {
                channel_id: ChannelId::default(),
                next_commitment_number: 1,
                next_revocation_number: 5,
                your_last_per_commitment_secret: Slice32::default(),
                my_current_per_commitment_point: dumb_pubkey!(),
            })),
        );

        assert_eq!(state.commitments.local_commit.index, 5);
        assert!(state.remote_channel_data.is_none());
    }
}

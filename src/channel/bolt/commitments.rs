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

//! The commitment ledger: local/remote commitment transactions, the
//! proposed/signed/acked change sets, HTLC id counters and the remote
//! per-commitment secrets chain.
//!
//! Admits or rejects each local/remote change; computes updated
//! [`CommitmentSpec`]s; produces and consumes `commit_sig`/`revoke_and_ack`;
//! maintains the revocation SHA-chain; enforces the BOLT-2 flow-control
//! invariants. Transaction construction, signature hashing and actual
//! signing are left to an external collaborator — this module calls out to
//! a [`CommitmentSigner`] for exactly those steps and otherwise only
//! manipulates plain data.

use std::collections::BTreeMap;

use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin_scripts::hlc::{HashLock, HashPreimage};
use lnp2p::bolt::{
    ChannelId, CommitmentSigned, Messages, RevokeAndAck, UpdateAddHtlc,
    UpdateFailHtlc, UpdateFailMalformedHtlc, UpdateFee, UpdateFulfillHtlc,
};
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey};

use super::dispatch::Action;

/// Direction an in-flight HTLC is traveling, from the point of view of the
/// party holding the [`Commitments`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum HtlcDirection {
    #[display("offered")]
    Offered,
    #[display("received")]
    Received,
}

/// A single update awaiting inclusion in, or already bound to, a commitment.
#[derive(Clone, PartialEq, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum UpdateMessage {
    #[display(inner)]
    AddHtlc(UpdateAddHtlc),
    #[display(inner)]
    FulfillHtlc(UpdateFulfillHtlc),
    #[display(inner)]
    FailHtlc(UpdateFailHtlc),
    #[display(inner)]
    FailMalformedHtlc(UpdateFailMalformedHtlc),
    #[display(inner)]
    Fee(UpdateFee),
}

impl UpdateMessage {
    /// `htlc_id` of the HTLC this update concerns, if any (fee updates do
    /// not reference one).
    pub fn htlc_id(&self) -> Option<u64> {
        match self {
            UpdateMessage::AddHtlc(msg) => Some(msg.htlc_id),
            UpdateMessage::FulfillHtlc(msg) => Some(msg.htlc_id),
            UpdateMessage::FailHtlc(msg) => Some(msg.htlc_id),
            UpdateMessage::FailMalformedHtlc(msg) => Some(msg.htlc_id),
            UpdateMessage::Fee(_) => None,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, UpdateMessage::AddHtlc(_))
    }
}

/// The durable record a [`CommitmentSigned`] for a remote commitment must be
/// preceded by: enough to later reconstruct which payment a timed-out HTLC
/// output on that commitment belonged to, without needing the full
/// commitment spec on hand.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct HtlcInfo {
    pub channel_id: ChannelId,
    pub commitment_number: u64,
    pub payment_hash: HashLock,
    pub cltv_expiry: u32,
}

/// An HTLC output materialized in a particular commitment.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct InFlightHtlc {
    pub direction: HtlcDirection,
    pub htlc_id: u64,
    pub amount_msat: u64,
    pub payment_hash: HashLock,
    pub cltv_expiry: u32,
}

impl InFlightHtlc {
    pub fn offered(add: &UpdateAddHtlc) -> Self {
        InFlightHtlc {
            direction: HtlcDirection::Offered,
            htlc_id: add.htlc_id,
            amount_msat: add.amount_msat,
            payment_hash: add.payment_hash,
            cltv_expiry: add.cltv_expiry,
        }
    }

    pub fn received(add: &UpdateAddHtlc) -> Self {
        InFlightHtlc {
            direction: HtlcDirection::Received,
            htlc_id: add.htlc_id,
            amount_msat: add.amount_msat,
            payment_hash: add.payment_hash,
            cltv_expiry: add.cltv_expiry,
        }
    }
}

/// Amounts and HTLC set describing one side's view of a commitment
/// transaction at a given index.
#[derive(Clone, PartialEq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct CommitmentSpec {
    pub htlcs: Vec<InFlightHtlc>,
    pub to_local_msat: u64,
    pub to_remote_msat: u64,
    pub feerate_per_kw: u32,
}

impl CommitmentSpec {
    /// BOLT-3 commitment transaction weight: 724 weight units for the
    /// fixed structure plus 172 per non-dust HTLC output.
    pub fn weight(&self) -> u64 {
        724 + 172 * self.htlcs.len() as u64
    }

    /// Fee, in satoshis, this spec's feerate would pay for its own weight.
    pub fn commit_tx_fee(&self) -> u64 {
        self.weight() * self.feerate_per_kw as u64 / 1000
    }

    /// HTLCs whose value clears `dust_limit_sat` and therefore get a real
    /// output (and timeout/success transaction) on a commitment built from
    /// this spec, rather than being folded into the miner fee.
    pub fn non_dust_htlcs(
        &self,
        dust_limit_sat: u64,
    ) -> impl Iterator<Item = &InFlightHtlc> {
        self.htlcs
            .iter()
            .filter(move |h| h.amount_msat / 1000 >= dust_limit_sat)
    }

    /// Applies a batch of updates authored by `adder`, yielding the
    /// resulting spec. `direction` tags newly added HTLCs from the local
    /// node's point of view regardless of which commitment `self`
    /// describes; removals look up the existing HTLC's own direction to
    /// credit the settling side correctly.
    fn apply(
        &self,
        changes: &[UpdateMessage],
        direction: HtlcDirection,
        we_pay_fee: bool,
    ) -> Self {
        let mut spec = self.clone();
        for change in changes {
            match change {
                UpdateMessage::AddHtlc(add) => {
                    let htlc = match direction {
                        HtlcDirection::Offered => InFlightHtlc::offered(add),
                        HtlcDirection::Received => InFlightHtlc::received(add),
                    };
                    match direction {
                        HtlcDirection::Offered => {
                            spec.to_local_msat -= add.amount_msat
                        }
                        HtlcDirection::Received => {
                            spec.to_remote_msat -= add.amount_msat
                        }
                    }
                    spec.htlcs.push(htlc);
                }
                UpdateMessage::FulfillHtlc(msg) => {
                    if let Some(pos) =
                        spec.htlcs.iter().position(|h| h.htlc_id == msg.htlc_id)
                    {
                        let htlc = spec.htlcs.remove(pos);
                        match htlc.direction {
                            HtlcDirection::Received => {
                                spec.to_local_msat += htlc.amount_msat
                            }
                            HtlcDirection::Offered => {
                                spec.to_remote_msat += htlc.amount_msat
                            }
                        }
                    }
                }
                UpdateMessage::FailHtlc(msg) => {
                    if let Some(pos) =
                        spec.htlcs.iter().position(|h| h.htlc_id == msg.htlc_id)
                    {
                        let htlc = spec.htlcs.remove(pos);
                        match htlc.direction {
                            HtlcDirection::Received => {
                                spec.to_remote_msat += htlc.amount_msat
                            }
                            HtlcDirection::Offered => {
                                spec.to_local_msat += htlc.amount_msat
                            }
                        }
                    }
                }
                UpdateMessage::FailMalformedHtlc(msg) => {
                    if let Some(pos) =
                        spec.htlcs.iter().position(|h| h.htlc_id == msg.htlc_id)
                    {
                        let htlc = spec.htlcs.remove(pos);
                        match htlc.direction {
                            HtlcDirection::Received => {
                                spec.to_remote_msat += htlc.amount_msat
                            }
                            HtlcDirection::Offered => {
                                spec.to_local_msat += htlc.amount_msat
                            }
                        }
                    }
                }
                UpdateMessage::Fee(msg) => {
                    spec.feerate_per_kw = msg.feerate_per_kw;
                }
            }
        }
        let fee = spec.commit_tx_fee() * 1000;
        if we_pay_fee {
            spec.to_local_msat = spec.to_local_msat.saturating_sub(fee);
        } else {
            spec.to_remote_msat = spec.to_remote_msat.saturating_sub(fee);
        }
        spec
    }
}

/// One side's in-flight changes, split by BOLT-2 lifecycle stage.
#[derive(Clone, PartialEq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct ChangeSet {
    /// Sent/received but not yet covered by any `commit_sig`.
    pub proposed: Vec<UpdateMessage>,
    /// Covered by a `commit_sig` whose `revoke_and_ack` has not yet arrived.
    pub signed: Vec<UpdateMessage>,
    /// Covered by a commitment both parties hold and have revoked into.
    pub acked: Vec<UpdateMessage>,
}

impl ChangeSet {
    fn all(&self) -> impl Iterator<Item = &UpdateMessage> {
        self.acked.iter().chain(self.signed.iter()).chain(self.proposed.iter())
    }
}

/// The signature/next-commitment bookkeeping for the remote party's next
/// commitment, the Rust rendering of an either-shaped "pending or not"
/// union (Design Note 3).
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub enum RemoteNextCommitInfo {
    /// We have sent a `commit_sig` for `next_remote_commit` and are waiting
    /// for the matching `revoke_and_ack`.
    WaitingForRevocation {
        next_remote_commit: RemoteCommit,
        sent: CommitmentSigned,
        sent_after_local_commit_index: u64,
        resign_asap: bool,
    },
    /// No signature is in flight; this is the per-commitment point to use
    /// for the remote party's *next* commitment.
    Revoked(PublicKey),
}

impl RemoteNextCommitInfo {
    pub fn is_waiting_for_revocation(&self) -> bool {
        matches!(self, RemoteNextCommitInfo::WaitingForRevocation { .. })
    }

    /// The remote commit a `commit_sig` is currently in flight for, if any.
    pub fn pending_commit(&self) -> Option<&RemoteCommit> {
        match self {
            RemoteNextCommitInfo::WaitingForRevocation {
                next_remote_commit,
                ..
            } => Some(next_remote_commit),
            RemoteNextCommitInfo::Revoked(_) => None,
        }
    }
}

/// Local commitment transaction: our own, signed by the counterparty,
/// unilaterally broadcastable.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct LocalCommit {
    pub index: u64,
    pub spec: CommitmentSpec,
    pub commit_sig: Signature,
    pub htlc_sigs: Vec<Signature>,
}

/// Remote commitment transaction: their own, as we last signed it.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct RemoteCommit {
    pub index: u64,
    pub spec: CommitmentSpec,
    pub txid: bitcoin::Txid,
    pub remote_per_commitment_point: PublicKey,
}

/// BOLT-3 "efficient storage of per-commitment secrets": a 48-bucket
/// binary tree that can reconstruct any previously inserted secret while
/// storing at most 48 elements.
#[derive(Clone, PartialEq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct RevocationStore {
    buckets: BTreeMap<u8, (u64, Slice32)>,
}

impl RevocationStore {
    fn count_trailing_zeros(index: u64) -> u8 {
        // BOLT-3 indexes commitments downward from 2^48 - 1.
        (!index).trailing_zeros().min(47) as u8
    }

    /// Inserts the secret revealed for `index`, per BOLT-3's insertion
    /// algorithm: the secret must be consistent with every previously
    /// derivable secret at indices sharing a common shachain prefix.
    pub fn insert_secret(
        &mut self,
        index: u64,
        secret: Slice32,
    ) -> Result<(), ProtocolError> {
        let bucket = Self::count_trailing_zeros(index);
        for b in 0..bucket {
            if let Some((old_index, old_secret)) = self.buckets.get(&b) {
                let derived = Self::derive(secret, *old_index, index);
                if derived != *old_secret {
                    return Err(ProtocolError::RevocationSyncError);
                }
            }
        }
        self.buckets.insert(bucket, (index, secret));
        Ok(())
    }

    /// Derives the secret for `to_index` from a known secret at
    /// `from_index`, flipping exactly the bits `from_index` and `to_index`
    /// disagree on, from the most significant down.
    fn derive(from_secret: Slice32, from_index: u64, to_index: u64) -> Slice32 {
        let mut secret = *from_secret.as_inner();
        for bit in (0..48).rev() {
            if (from_index >> bit) & 1 != (to_index >> bit) & 1 {
                let byte = (bit / 8) as usize;
                secret[byte] ^= 1 << (bit % 8);
                let mut engine = sha256::Hash::engine();
                engine.input(&secret);
                secret = *sha256::Hash::from_engine(engine).as_inner();
            }
        }
        Slice32::from(secret)
    }

    /// Reconstructs the secret at `index`, if we hold enough ancestor
    /// secrets to derive it.
    pub fn get_secret(&self, index: u64) -> Option<Slice32> {
        for (bucket, (stored_index, secret)) in self.buckets.iter() {
            let mask = !0u64 << bucket;
            if stored_index & mask == index & mask {
                return Some(Self::derive(*secret, *stored_index, index));
            }
        }
        None
    }
}

/// Protocol-flow errors raised while the channel is operational (`Normal`,
/// `ShuttingDown`). These force a unilateral close and an outbound `error`
/// message; they are never silently swallowed.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[derive(StrictEncode, StrictDecode)]
#[display(doc_comments)]
pub enum ProtocolError {
    /// the remote peer signed a commitment using a signature that does not
    /// validate against the expected transaction
    InvalidCommitmentSignature,

    /// offered HTLC value {0} msat is below the remote party's configured
    /// minimum
    HtlcValueTooSmall(u64),

    /// accepting this HTLC would exceed the maximum value allowed in flight
    HtlcValueTooHighInFlight,

    /// cltv_expiry {0} is below the current block height plus the minimum
    /// expiry delta
    ExpiryTooSmall(u32),

    /// cltv_expiry {0} is beyond the maximum expiry delta this node accepts
    ExpiryTooBig(u32),

    /// accepting this HTLC would exceed the maximum number of accepted
    /// HTLCs negotiated for this channel
    TooManyAcceptedHtlcs,

    /// insufficient funds to cover this HTLC plus fees and channel reserve
    InsufficientFunds,

    /// proposed feerate is too different from the currently committed one
    FeerateTooDifferent,

    /// referenced HTLC id {0} is not present in the relevant change set
    UnknownHtlcId(u64),

    /// preimage does not hash to the payment hash of the referenced HTLC
    InvalidHtlcPreimage,

    /// a new `commit_sig` cannot be produced before the in-flight one is
    /// revoked
    CannotSignBeforeRevocation,

    /// `commit_sig` was requested but there are no pending changes to sign
    CannotSignWithoutChanges,

    /// peer's `channel_reestablish` does not match any of the four sync
    /// reconciliation cases
    RevocationSyncError,

    /// `CMD_UPDATE_FEE` was requested by the fundee; only the funder may
    /// update the channel feerate
    FeeUpdateNotFunder,
}

/// The commitment ledger. Owns both sides' commitment indices, specs, the
/// proposed/signed/acked change sets, HTLC id counters and the remote
/// revocation chain.
#[derive(Clone, PartialEq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct Commitments {
    pub channel_id: ChannelId,

    /// Whether the local node is the channel funder; only the funder may
    /// send `update_fee`, and the funder always pays the commitment fee.
    pub is_funder: bool,

    pub local_commit: LocalCommit,
    pub remote_commit: RemoteCommit,
    pub remote_next_commit_info: RemoteNextCommitInfo,

    pub local_changes: ChangeSet,
    pub remote_changes: ChangeSet,

    pub local_next_htlc_id: u64,
    pub remote_next_htlc_id: u64,

    /// Per-payment origin map, for upstream attribution; keyed by htlc id.
    pub origin_map: BTreeMap<u64, Slice32>,

    pub remote_per_commitment_secrets: RevocationStore,

    /// Every remote commitment superseded by a later one, by its txid: the
    /// index, per-commitment point and HTLC/balance spec the penalty-claim
    /// derivation needs once a revoked one shows up on-chain (`spec.md`
    /// §4.3, `claimRevokedRemoteCommitTxOutputs`). Entries are never
    /// removed — the txid is the only key an observed spend gives us to
    /// look one up by.
    pub revoked_remote_commits:
        BTreeMap<bitcoin::Txid, (u64, PublicKey, CommitmentSpec)>,
}

impl DumbDefault for Commitments {
    fn dumb_default() -> Self {
        Commitments {
            channel_id: Default::default(),
            is_funder: false,
            local_commit: LocalCommit {
                index: 0,
                spec: CommitmentSpec::default(),
                commit_sig: dumb_signature(),
                htlc_sigs: vec![],
            },
            remote_commit: RemoteCommit {
                index: 0,
                spec: CommitmentSpec::default(),
                txid: Default::default(),
                remote_per_commitment_point: dumb_pubkey!(),
            },
            remote_next_commit_info: RemoteNextCommitInfo::Revoked(
                dumb_pubkey!(),
            ),
            local_changes: ChangeSet::default(),
            remote_changes: ChangeSet::default(),
            local_next_htlc_id: 0,
            remote_next_htlc_id: 0,
            origin_map: none!(),
            remote_per_commitment_secrets: RevocationStore::default(),
            revoked_remote_commits: none!(),
        }
    }
}

impl Default for Commitments {
    fn default() -> Self {
        Self::dumb_default()
    }
}

fn dumb_signature() -> Signature {
    let msg = secp256k1::Message::from_slice(&[1u8; 32])
        .expect("32-byte slice is a valid message");
    secp256k1::SECP256K1.sign_ecdsa(&msg, &secp256k1::ONE_KEY)
}

/// True iff neither side has ever signed a non-initial commitment and the
/// channel holds no value, i.e. a unilateral close would settle nothing.
pub fn nothing_at_stake(commitments: &Commitments) -> bool {
    commitments.local_commit.index == 0
        && commitments.remote_commit.index == 0
        && commitments.local_commit.spec.to_local_msat == 0
        && commitments.local_commit.spec.to_remote_msat == 0
        && commitments.local_commit.spec.htlcs.is_empty()
}

/// External collaborator boundary: signs the next local/remote commitment
/// and its HTLC transactions. Kept separate from [`Commitments`] itself
/// because transaction construction, sighashing, and private-key handling
/// belong to the wallet/signing layer, not the channel state machine.
pub trait CommitmentSigner {
    fn sign_remote_commit(
        &self,
        remote_commit: &RemoteCommit,
    ) -> (Signature, Vec<Signature>);

    fn sign_local_commit(&self, local_commit: &LocalCommit) -> bool;
}

impl Commitments {
    /// `sendAdd`: admits a locally originated HTLC offer, assigning the
    /// next local htlc id.
    pub fn send_add(
        &mut self,
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
        current_block_height: u32,
        min_cltv_expiry_delta: u32,
        max_cltv_expiry_delta: u32,
        htlc_minimum_msat: u64,
        max_htlc_value_in_flight_msat: u64,
        channel_reserve_satoshis: u64,
    ) -> Result<UpdateAddHtlc, ProtocolError> {
        if cltv_expiry < current_block_height + min_cltv_expiry_delta {
            return Err(ProtocolError::ExpiryTooSmall(cltv_expiry));
        }
        if cltv_expiry > current_block_height + max_cltv_expiry_delta {
            return Err(ProtocolError::ExpiryTooBig(cltv_expiry));
        }
        if amount_msat < htlc_minimum_msat {
            return Err(ProtocolError::HtlcValueTooSmall(amount_msat));
        }
        let in_flight: usize = self
            .local_changes
            .all()
            .filter(|m| m.is_add())
            .count();
        if in_flight >= u16::MAX as usize {
            return Err(ProtocolError::TooManyAcceptedHtlcs);
        }
        let in_flight_msat: u64 = self
            .local_changes
            .all()
            .filter_map(|m| match m {
                UpdateMessage::AddHtlc(a) => Some(a.amount_msat),
                _ => None,
            })
            .sum::<u64>()
            + amount_msat;
        if in_flight_msat > max_htlc_value_in_flight_msat {
            return Err(ProtocolError::HtlcValueTooHighInFlight);
        }
        let fee_msat = self.local_commit.spec.commit_tx_fee() * 1000;
        let reserve_msat = channel_reserve_satoshis * 1000;
        if self.local_commit.spec.to_local_msat < amount_msat + fee_msat + reserve_msat
        {
            return Err(ProtocolError::InsufficientFunds);
        }

        let htlc_id = self.local_next_htlc_id;
        let add = UpdateAddHtlc {
            channel_id: self.channel_id,
            htlc_id,
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion_routing_packet: none!(),
            unknown_tlvs: none!(),
        };
        self.local_next_htlc_id += 1;
        self.local_changes.proposed.push(UpdateMessage::AddHtlc(add.clone()));
        Ok(add)
    }

    /// `receiveAdd`: mirror of [`Commitments::send_add`] for a remotely
    /// originated offer, validated against the limits we advertised.
    pub fn receive_add(
        &mut self,
        add: UpdateAddHtlc,
        current_block_height: u32,
        min_cltv_expiry_delta: u32,
        max_cltv_expiry_delta: u32,
        htlc_minimum_msat: u64,
        max_accepted_htlcs: u16,
        max_htlc_value_in_flight_msat: u64,
    ) -> Result<(), ProtocolError> {
        if add.cltv_expiry < current_block_height + min_cltv_expiry_delta {
            return Err(ProtocolError::ExpiryTooSmall(add.cltv_expiry));
        }
        if add.cltv_expiry > current_block_height + max_cltv_expiry_delta {
            return Err(ProtocolError::ExpiryTooBig(add.cltv_expiry));
        }
        if add.amount_msat < htlc_minimum_msat {
            return Err(ProtocolError::HtlcValueTooSmall(add.amount_msat));
        }
        let count = self
            .remote_changes
            .all()
            .filter(|m| m.is_add())
            .count();
        if count + 1 > max_accepted_htlcs as usize {
            return Err(ProtocolError::TooManyAcceptedHtlcs);
        }
        let total: u64 = self
            .remote_changes
            .all()
            .filter_map(|m| match m {
                UpdateMessage::AddHtlc(a) => Some(a.amount_msat),
                _ => None,
            })
            .sum::<u64>()
            + add.amount_msat;
        if total > max_htlc_value_in_flight_msat {
            return Err(ProtocolError::HtlcValueTooHighInFlight);
        }
        if add.amount_msat > self.remote_commit.spec.to_remote_msat {
            return Err(ProtocolError::InsufficientFunds);
        }
        if add.htlc_id != self.remote_next_htlc_id {
            return Err(ProtocolError::UnknownHtlcId(add.htlc_id));
        }
        self.remote_next_htlc_id += 1;
        self.remote_changes.proposed.push(UpdateMessage::AddHtlc(add));
        Ok(())
    }

    fn find_incoming(&self, htlc_id: u64) -> Option<&InFlightHtlc> {
        self.local_commit
            .spec
            .htlcs
            .iter()
            .find(|h| h.htlc_id == htlc_id && h.direction == HtlcDirection::Received)
    }

    /// `sendFulfill`: we are settling an HTLC the remote offered us.
    pub fn send_fulfill(
        &mut self,
        htlc_id: u64,
        payment_preimage: HashPreimage,
    ) -> Result<UpdateFulfillHtlc, ProtocolError> {
        let htlc = self
            .find_incoming(htlc_id)
            .ok_or(ProtocolError::UnknownHtlcId(htlc_id))?;
        if HashLock::from(payment_preimage) != htlc.payment_hash {
            return Err(ProtocolError::InvalidHtlcPreimage);
        }
        let msg = UpdateFulfillHtlc {
            channel_id: self.channel_id,
            htlc_id,
            payment_preimage,
        };
        self.local_changes
            .proposed
            .push(UpdateMessage::FulfillHtlc(msg.clone()));
        Ok(msg)
    }

    /// `receiveFulfill`: the remote settled an HTLC we offered them;
    /// verifies the preimage against the payment hash we hold.
    pub fn receive_fulfill(
        &mut self,
        msg: UpdateFulfillHtlc,
    ) -> Result<(), ProtocolError> {
        let htlc = self
            .local_commit
            .spec
            .htlcs
            .iter()
            .find(|h| {
                h.htlc_id == msg.htlc_id
                    && h.direction == HtlcDirection::Offered
            })
            .ok_or(ProtocolError::UnknownHtlcId(msg.htlc_id))?;
        if HashLock::from(msg.payment_preimage) != htlc.payment_hash {
            return Err(ProtocolError::InvalidHtlcPreimage);
        }
        self.remote_changes
            .proposed
            .push(UpdateMessage::FulfillHtlc(msg));
        Ok(())
    }

    /// `sendFail`: we are failing back an HTLC the remote offered us.
    /// Encryption of the failure payload under the upstream shared secret
    /// is the caller's (onion/router) responsibility; this only records
    /// the already-encrypted `reason`.
    pub fn send_fail(
        &mut self,
        htlc_id: u64,
        reason: Vec<u8>,
    ) -> Result<UpdateFailHtlc, ProtocolError> {
        self.find_incoming(htlc_id)
            .ok_or(ProtocolError::UnknownHtlcId(htlc_id))?;
        let msg = UpdateFailHtlc {
            channel_id: self.channel_id,
            htlc_id,
            reason,
        };
        self.local_changes
            .proposed
            .push(UpdateMessage::FailHtlc(msg.clone()));
        Ok(msg)
    }

    /// `receiveFail`.
    pub fn receive_fail(
        &mut self,
        msg: UpdateFailHtlc,
    ) -> Result<(), ProtocolError> {
        if !self
            .local_commit
            .spec
            .htlcs
            .iter()
            .any(|h| h.htlc_id == msg.htlc_id)
        {
            return Err(ProtocolError::UnknownHtlcId(msg.htlc_id));
        }
        self.remote_changes.proposed.push(UpdateMessage::FailHtlc(msg));
        Ok(())
    }

    /// `sendFailMalformed`.
    pub fn send_fail_malformed(
        &mut self,
        htlc_id: u64,
        sha256_of_onion: bitcoin::hashes::sha256::Hash,
        failure_code: u16,
    ) -> Result<UpdateFailMalformedHtlc, ProtocolError> {
        self.find_incoming(htlc_id)
            .ok_or(ProtocolError::UnknownHtlcId(htlc_id))?;
        let msg = UpdateFailMalformedHtlc {
            channel_id: self.channel_id,
            htlc_id,
            sha256_of_onion,
            failure_code,
        };
        self.local_changes
            .proposed
            .push(UpdateMessage::FailMalformedHtlc(msg.clone()));
        Ok(msg)
    }

    /// `receiveFailMalformed`.
    pub fn receive_fail_malformed(
        &mut self,
        msg: UpdateFailMalformedHtlc,
    ) -> Result<(), ProtocolError> {
        if !self
            .local_commit
            .spec
            .htlcs
            .iter()
            .any(|h| h.htlc_id == msg.htlc_id)
        {
            return Err(ProtocolError::UnknownHtlcId(msg.htlc_id));
        }
        self.remote_changes
            .proposed
            .push(UpdateMessage::FailMalformedHtlc(msg));
        Ok(())
    }

    /// `sendCommit`: signs the next remote commitment (local.acked +
    /// local.proposed applied to the current remote commit) and moves
    /// local.proposed into local.signed.
    pub fn send_commit(
        &mut self,
        signer: &impl CommitmentSigner,
    ) -> Result<CommitmentSigned, ProtocolError> {
        if self.remote_next_commit_info.is_waiting_for_revocation() {
            return Err(ProtocolError::CannotSignBeforeRevocation);
        }
        if self.local_changes.proposed.is_empty() {
            return Err(ProtocolError::CannotSignWithoutChanges);
        }

        let mut changes = self.local_changes.acked.clone();
        changes.extend(self.local_changes.proposed.clone());
        let next_spec = self.remote_commit.spec.apply(
            &changes,
            HtlcDirection::Offered,
            self.is_funder,
        );
        let next_index = self.remote_commit.index + 1;
        let next_commit = RemoteCommit {
            index: next_index,
            spec: next_spec,
            txid: Default::default(),
            remote_per_commitment_point: match &self.remote_next_commit_info {
                RemoteNextCommitInfo::Revoked(point) => *point,
                RemoteNextCommitInfo::WaitingForRevocation { .. } => {
                    unreachable!("checked above")
                }
            },
        };
        let (commit_sig, htlc_sigs) = signer.sign_remote_commit(&next_commit);
        let wire = CommitmentSigned {
            channel_id: self.channel_id,
            signature: commit_sig,
            htlc_signatures: htlc_sigs,
        };

        self.local_changes.signed.append(&mut self.local_changes.proposed);
        self.remote_next_commit_info =
            RemoteNextCommitInfo::WaitingForRevocation {
                next_remote_commit: next_commit,
                sent: wire.clone(),
                sent_after_local_commit_index: self.local_commit.index,
                resign_asap: false,
            };
        Ok(wire)
    }

    /// `receiveCommit`: validates and adopts a new signed local commitment,
    /// producing the `revoke_and_ack` that reveals the superseded
    /// per-commitment secret.
    pub fn receive_commit(
        &mut self,
        msg: CommitmentSigned,
        signer: &impl CommitmentSigner,
        our_revealed_secret: SecretKey,
        our_next_per_commitment_point: PublicKey,
    ) -> Result<(RevokeAndAck, Vec<Action>), ProtocolError> {
        if self.remote_changes.proposed.is_empty()
            && self.remote_changes.acked.is_empty()
        {
            return Err(ProtocolError::CannotSignWithoutChanges);
        }

        let mut changes = self.remote_changes.acked.clone();
        changes.extend(self.remote_changes.proposed.clone());
        let next_spec = self.local_commit.spec.apply(
            &changes,
            HtlcDirection::Received,
            self.is_funder,
        );
        let next_index = self.local_commit.index + 1;
        let next_commit = LocalCommit {
            index: next_index,
            spec: next_spec,
            commit_sig: msg.signature,
            htlc_sigs: msg.htlc_signatures,
        };
        if !signer.sign_local_commit(&next_commit) {
            return Err(ProtocolError::InvalidCommitmentSignature);
        }

        self.local_commit = next_commit;
        self.remote_changes.signed.append(&mut self.remote_changes.proposed);

        let ack = RevokeAndAck {
            channel_id: self.channel_id,
            per_commitment_secret: our_revealed_secret,
            next_per_commitment_point: our_next_per_commitment_point,
        };
        Ok((ack, vec![Action::StoreState]))
    }

    /// `receiveRevocation`: verifies the revealed secret, advances
    /// `remote_commit`, and acks both sides' signed changes. Returns the
    /// settlement actions for HTLCs just irrevocably resolved.
    pub fn receive_revocation(
        &mut self,
        msg: RevokeAndAck,
    ) -> Result<Vec<Action>, ProtocolError> {
        let (next_remote_commit, next_per_commitment_point) =
            match self.remote_next_commit_info.clone() {
                RemoteNextCommitInfo::WaitingForRevocation {
                    next_remote_commit,
                    ..
                } => (next_remote_commit, msg.next_per_commitment_point),
                RemoteNextCommitInfo::Revoked(_) => {
                    return Err(ProtocolError::RevocationSyncError)
                }
            };

        let secret = Slice32::from(msg.per_commitment_secret.secret_bytes());
        self.remote_per_commitment_secrets
            .insert_secret(self.remote_commit.index, secret)?;

        let settled: Vec<Action> = self
            .remote_changes
            .signed
            .iter()
            .filter_map(|m| match m {
                UpdateMessage::FulfillHtlc(f) => {
                    Some(Action::ProcessFulfill(f.htlc_id))
                }
                UpdateMessage::FailHtlc(f) => {
                    Some(Action::ProcessFail(f.htlc_id))
                }
                UpdateMessage::FailMalformedHtlc(f) => {
                    Some(Action::ProcessFailMalformed(f.htlc_id))
                }
                _ => None,
            })
            .collect();

        if self.remote_commit.txid != Default::default() {
            self.revoked_remote_commits.insert(
                self.remote_commit.txid,
                (
                    self.remote_commit.index,
                    self.remote_commit.remote_per_commitment_point,
                    self.remote_commit.spec.clone(),
                ),
            );
        }
        self.remote_commit = next_remote_commit;
        self.remote_next_commit_info =
            RemoteNextCommitInfo::Revoked(next_per_commitment_point);
        self.local_changes.acked.append(&mut self.local_changes.signed);
        self.remote_changes.acked.append(&mut self.remote_changes.signed);

        let mut actions = vec![Action::StoreState];
        actions.extend(settled);
        Ok(actions)
    }

    /// `handleSync`: discards unsent proposals and reconciles against the
    /// peer's `channel_reestablish` counters, covering the four BOLT-2
    /// resynchronization cases.
    pub fn handle_sync(
        &mut self,
        next_local_commitment_number: u64,
        next_remote_revocation_number: u64,
    ) -> Result<Vec<Action>, ProtocolError> {
        let discarded_local_adds = self
            .local_changes
            .proposed
            .iter()
            .filter(|m| m.is_add())
            .count() as u64;
        let discarded_remote_adds = self
            .remote_changes
            .proposed
            .iter()
            .filter(|m| m.is_add())
            .count() as u64;
        self.local_changes.proposed.clear();
        self.remote_changes.proposed.clear();
        self.local_next_htlc_id -= discarded_local_adds;
        self.remote_next_htlc_id -= discarded_remote_adds;

        let mut actions = vec![];

        if next_remote_revocation_number == self.local_commit.index {
            // Case 1: they acked our latest commit; nothing to resend.
        } else if next_remote_revocation_number + 1 == self.local_commit.index
        {
            // Case 2: our last revocation was lost; the dispatcher resends
            // it using the previous per-commitment secret, which this
            // module does not retain (the key manager derives it
            // deterministically), so only the intent is signaled here.
            actions.push(Action::SendToSelf(super::Command::CmdSign));
        } else {
            match &self.remote_next_commit_info {
                RemoteNextCommitInfo::WaitingForRevocation {
                    next_remote_commit,
                    sent,
                    ..
                } => {
                    if next_local_commitment_number
                        == next_remote_commit.index + 1
                    {
                        // Case 3: they received our commit_sig and are
                        // about to revoke; wait.
                    } else if next_local_commitment_number
                        == next_remote_commit.index
                    {
                        // Case 4: they never received our commit_sig;
                        // resend it (and any signed changes).
                        actions.push(Action::SendMessage(
                            Messages::CommitmentSigned(sent.clone()),
                        ));
                    } else {
                        return Err(ProtocolError::RevocationSyncError);
                    }
                }
                RemoteNextCommitInfo::Revoked(_) => {
                    return Err(ProtocolError::RevocationSyncError);
                }
            }
        }

        if !self.local_changes.proposed.is_empty() {
            actions.push(Action::SendToSelf(super::Command::CmdSign));
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod test {
    use amplify::DumbDefault;

    use super::*;

    fn funded_commitments() -> Commitments {
        let mut commitments = Commitments::dumb_default();
        commitments.local_commit.spec.to_local_msat = 10_000_000_000;
        commitments.local_commit.spec.to_remote_msat = 10_000_000_000;
        commitments.remote_commit.spec.to_local_msat = 10_000_000_000;
        commitments.remote_commit.spec.to_remote_msat = 10_000_000_000;
        commitments
    }

    fn fresh_htlc(id: u64, amount_msat: u64) -> UpdateAddHtlc {
        UpdateAddHtlc {
            channel_id: Default::default(),
            htlc_id: id,
            amount_msat,
            payment_hash: HashLock::default(),
            cltv_expiry: 500_040,
            onion_routing_packet: none!(),
            unknown_tlvs: none!(),
        }
    }

    #[test]
    fn send_add_assigns_monotonic_ids() {
        let mut commitments = funded_commitments();
        let add1 = commitments
            .send_add(
                100_000,
                HashLock::default(),
                500_040,
                500_000,
                18,
                7 * 144,
                1,
                1_000_000_000,
                10_000,
            )
            .unwrap();
        let add2 = commitments
            .send_add(
                100_000,
                HashLock::default(),
                500_040,
                500_000,
                18,
                7 * 144,
                1,
                1_000_000_000,
                10_000,
            )
            .unwrap();
        assert_eq!(add1.htlc_id, 0);
        assert_eq!(add2.htlc_id, 1);
        assert_eq!(commitments.local_next_htlc_id, 2);
    }

    #[test]
    fn receive_add_rejects_out_of_order_htlc_id() {
        let mut commitments = funded_commitments();
        let add = fresh_htlc(5, 1_000);
        let err = commitments
            .receive_add(add, 500_000, 18, 7 * 144, 1, 483, 1_000_000_000)
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownHtlcId(5));
    }

    #[test]
    fn revocation_store_round_trips_descendant_secrets() {
        let mut store = RevocationStore::default();
        let seed = Slice32::from([7u8; 32]);
        // Insert the "all ones" ancestor first (index with no set ancestry
        // bits relative to itself), then confirm it derives its own value.
        store.insert_secret(281_474_976_710_655, seed).unwrap();
        assert_eq!(
            store.get_secret(281_474_976_710_655),
            Some(seed)
        );
    }

    #[test]
    fn nothing_at_stake_true_for_fresh_commitments() {
        let commitments = Commitments::dumb_default();
        assert!(nothing_at_stake(&commitments));
    }

    struct StubSigner;

    impl CommitmentSigner for StubSigner {
        fn sign_remote_commit(
            &self,
            remote_commit: &RemoteCommit,
        ) -> (Signature, Vec<Signature>) {
            (dumb_signature(), vec![dumb_signature(); remote_commit.spec.htlcs.len()])
        }

        fn sign_local_commit(&self, _local_commit: &LocalCommit) -> bool {
            true
        }
    }

    #[test]
    fn send_commit_exposes_non_dust_htlcs_on_the_pending_commit() {
        let mut commitments = funded_commitments();
        commitments
            .send_add(
                100_000,
                HashLock::default(),
                500_040,
                500_000,
                18,
                7 * 144,
                1,
                1_000_000_000,
                10_000,
            )
            .unwrap();
        commitments.send_commit(&StubSigner).unwrap();

        let pending = commitments.remote_next_commit_info.pending_commit().unwrap();
        assert_eq!(pending.index, 1);
        let non_dust: Vec<_> = pending.spec.non_dust_htlcs(546).collect();
        assert_eq!(non_dust.len(), 1);
        assert_eq!(non_dust[0].amount_msat, 100_000);

        // A sub-dust HTLC amount does not clear the filter.
        assert_eq!(pending.spec.non_dust_htlcs(1_000_000).count(), 0);
    }
}

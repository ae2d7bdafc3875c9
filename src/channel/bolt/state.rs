// LNP/BP Core Library implementing LNPBP specifications & standards
// Written in 2020-2024 by
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

#[cfg(feature = "serde")]
use amplify::ToYamlString;
use amplify::{DumbDefault, Slice32};
use p2p::bolt::{ActiveChannelId, TempChannelId};

use super::{
    ChannelVersion, Closing, Commitments, CommonParams, Lifecycle,
    LocalKeyset, PeerParams, Phase, Policy, RemoteKeyset,
};
use crate::channel::Funding;

#[derive(Clone, Debug)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(ChannelState::to_yaml_string)
)]
pub struct ChannelState {
    pub funding: Funding,

    /// Current channel lifecycle stage
    pub stage: Lifecycle,

    /// The chain_hash value denotes the exact blockchain that the opened
    /// channel will reside within. This is usually the genesis hash of the
    /// respective blockchain. The existence of the chain_hash allows nodes to
    /// open channels across many distinct blockchains as well as have channels
    /// within multiple blockchains opened to the same peer (if it supports the
    /// target chains).
    pub chain_hash: Slice32,

    /// Channel id used by the channel; first temporary and later final.
    ///
    /// The temporary_channel_id is used to identify this channel on a per-peer
    /// basis until the funding transaction is established, at which point it
    /// is replaced by the channel_id, which is derived from the funding
    /// transaction.
    pub active_channel_id: ActiveChannelId,

    /// Amount in millisatoshis
    pub local_amount_msat: u64,

    /// Amount in millisatoshis
    pub remote_amount_msat: u64,

    /// The policy for accepting remote node params
    pub policy: Policy,

    /// Common parameters applying for both nodes
    pub common_params: CommonParams,

    /// Channel parameters required to be met by the remote node when operating
    /// towards the local one
    pub local_params: PeerParams,

    /// Channel parameters to be used towards the remote node
    pub remote_params: PeerParams,

    /// Set of locally-derived keys for creating channel transactions
    pub local_keys: LocalKeyset,

    /// Set of remote-derived keys for creating channel transactions
    pub remote_keys: RemoteKeyset,

    /// Connectivity wrapper around `stage` (Design Note 5).
    pub phase: Phase,

    /// Channel feature-bit set, fixed at channel creation.
    pub channel_version: ChannelVersion,

    /// The commitment ledger: local/remote commit transactions, pending
    /// changes, HTLC bookkeeping, revocation chain. Populated from
    /// `WaitForFundingSigned`/`WaitForFundingCreated` onward.
    pub commitments: Commitments,

    /// Present only while `stage` is `Negotiating`/`Closing` (or a state
    /// reachable from them after a reconnect).
    pub closing: Option<Closing>,

    /// Opaque encrypted backup of the peer's last known state of this
    /// channel, received via the peer-storage feature.
    pub remote_channel_data: Option<Vec<u8>>,

    /// As funder, the funding transaction the wallet collaborator built in
    /// response to `Action::MakeFundingTx`, held here from
    /// `WaitForFundingInternal` until `funding_signed` arrives and it is
    /// actually broadcast.
    pub pending_funding_tx: Option<bitcoin::Transaction>,
}

#[cfg(feature = "serde")]
impl ToYamlString for ChannelState {}

impl DumbDefault for ChannelState {
    fn dumb_default() -> Self {
        ChannelState {
            funding: Funding::new(),
            stage: Default::default(),
            chain_hash: Default::default(),
            active_channel_id: ActiveChannelId::Temporary(
                TempChannelId::dumb_default(),
            ),
            local_amount_msat: 0,
            remote_amount_msat: 0,
            policy: Default::default(),
            common_params: Default::default(),
            local_params: Default::default(),
            remote_params: Default::default(),
            local_keys: LocalKeyset::dumb_default(),
            remote_keys: RemoteKeyset::dumb_default(),
            phase: Default::default(),
            channel_version: Default::default(),
            commitments: Default::default(),
            closing: None,
            remote_channel_data: None,
            pending_funding_tx: None,
        }
    }
}

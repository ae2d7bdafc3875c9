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

use p2p::bolt::ChannelType;

/// Channel lifecycle: the committed states of the channel state machine.
///
/// This is the `Lifecycle` named in the channel core design: open
/// negotiation, operation, shutdown, closing and the terminal states. The
/// `Offline`/`Syncing` wrapper described alongside it is *not* folded into
/// this enum (seeNote below and [`Phase`]) — a disconnected or resyncing
/// channel keeps whatever `Lifecycle` it had before the link dropped, paired
/// with a `Phase` that says the link itself is down or resynchronizing.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[repr(u8)]
pub enum Lifecycle {
    /// No role has been assigned to the channel yet.
    #[display("WAIT_FOR_INIT")]
    WaitForInit,

    /// Fundee, awaiting the funder's `open_channel`.
    #[display("WAIT_FOR_OPEN_CHANNEL")]
    WaitForOpenChannel,

    /// Funder, awaiting the fundee's `accept_channel`.
    #[display("WAIT_FOR_ACCEPT_CHANNEL")]
    WaitForAcceptChannel,

    /// Funder, awaiting the local funding transaction to be constructed by
    /// the wallet collaborator.
    #[display("WAIT_FOR_FUNDING_INTERNAL")]
    WaitForFundingInternal,

    /// Fundee, awaiting `funding_created`.
    #[display("WAIT_FOR_FUNDING_CREATED")]
    WaitForFundingCreated,

    /// Funder, awaiting `funding_signed`.
    #[display("WAIT_FOR_FUNDING_SIGNED")]
    WaitForFundingSigned,

    /// Awaiting the funding transaction to reach its minimum depth.
    #[display("WAIT_FOR_FUNDING_CONFIRMED")]
    WaitForFundingConfirmed,

    /// Funding is buried; awaiting the `funding_locked` exchange.
    #[display("WAIT_FOR_FUNDING_LOCKED")]
    WaitForFundingLocked,

    /// Operational: HTLCs may be added, fulfilled, failed.
    #[display("NORMAL")]
    Normal,

    /// `shutdown` has been exchanged but signed HTLCs are still settling.
    #[display("SHUTTING_DOWN")]
    ShuttingDown,

    /// Both sides are HTLC-free; negotiating the mutual-close fee.
    #[display("NEGOTIATING")]
    Negotiating,

    /// A spending transaction for the funding output has been identified;
    /// awaiting its irrevocable confirmation.
    #[display("CLOSING")]
    Closing,

    /// Every transaction spending the funding output is irrevocably
    /// confirmed. Terminal.
    #[display("CLOSED")]
    Closed,

    /// The channel was never funded on-chain and has been torn down.
    /// Terminal.
    #[display("ABORTED")]
    Aborted,

    /// We proved to the remote peer that our state was outdated; waiting for
    /// them to publish their current commitment so we can sweep our share of
    /// it.
    #[display("WAIT_FOR_REMOTE_PUBLISH_FUTURE_COMMITMENT")]
    WaitForRemotePublishFutureCommitment,

    /// An unidentified transaction spent the funding output. Unrecoverable;
    /// logged as a critical information leak.
    #[display("ERROR_INFORMATION_LEAK")]
    ErrorInformationLeak,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::WaitForInit
    }
}

impl Lifecycle {
    /// True for the two states from which a channel can never resume
    /// operation.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Closed | Lifecycle::Aborted)
    }

    /// True once the channel carries a [`super::Commitments`] value worth
    /// reconnecting/resyncing over, i.e. any state from funding-signed
    /// onward. Used to decide whether a `Disconnected` event should wrap the
    /// state into [`Phase::Offline`] or just drop it.
    #[inline]
    pub fn has_commitments(self) -> bool {
        !matches!(
            self,
            Lifecycle::WaitForInit
                | Lifecycle::WaitForOpenChannel
                | Lifecycle::WaitForAcceptChannel
                | Lifecycle::WaitForFundingInternal
                | Lifecycle::WaitForFundingCreated
        )
    }
}

/// Connectivity phase a committed [`Lifecycle`] is wrapped in.
///
/// Design note: rather than nesting `Offline(Box<Lifecycle>)` /
/// `Syncing(Box<Lifecycle>, bool)` as variants of `Lifecycle` itself (which
/// would require every match on `Lifecycle` to recurse), the inner committed
/// state and the connectivity wrapper are kept as two orthogonal fields.
/// `Phase::Online` is the overwhelmingly common case and carries no payload.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum Phase {
    /// Transport is connected; the inner `Lifecycle` drives behavior
    /// directly.
    #[display("online")]
    Online,

    /// Transport is disconnected. No outbound messages are produced; the
    /// inner `Lifecycle` is preserved untouched.
    #[display("offline")]
    Offline,

    /// Transport reconnected; waiting for (or having just processed) the
    /// peer's `channel_reestablish` before resuming the inner `Lifecycle`.
    #[display("syncing(wait_for_reestablish={wait_for_their_reestablish})")]
    Syncing {
        /// Per BOLT-2, a peer that commits to the peer-storage backup
        /// feature waits for the counterparty's `channel_reestablish`
        /// before sending its own, so it can fold in backup information
        /// first.
        wait_for_their_reestablish: bool,
    },
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Online
    }
}

impl Phase {
    #[inline]
    pub fn is_online(self) -> bool {
        matches!(self, Phase::Online)
    }

    #[inline]
    pub fn is_offline(self) -> bool {
        matches!(self, Phase::Offline)
    }

    #[inline]
    pub fn is_syncing(self) -> bool {
        matches!(self, Phase::Syncing { .. })
    }
}

/// Channel version bit set.
///
/// `ChannelType` (BOLT-9) already pins down STATIC-REMOTEKEY and the two
/// anchor-output variants; ZERO-RESERVE and PAYS-DIRECTLY-TO-WALLET are
/// node-local policy bits that have no `channel_type` feature-bit
/// counterpart, so they are carried alongside it here rather than folded
/// into `ChannelType` itself.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub struct ChannelVersion {
    pub channel_type: ChannelType,
    pub zero_reserve: bool,
    pub pays_directly_to_wallet: bool,
}

impl ChannelVersion {
    pub fn new(channel_type: ChannelType) -> Self {
        ChannelVersion {
            channel_type,
            zero_reserve: false,
            pays_directly_to_wallet: false,
        }
    }

    #[inline]
    pub fn has_static_remotekey(self) -> bool {
        self.channel_type.has_static_remotekey()
    }

    #[inline]
    pub fn has_anchor_outputs(self) -> bool {
        self.channel_type.has_anchor_outputs()
    }

    #[inline]
    pub fn has_anchors_zero_fee_htlc_tx(self) -> bool {
        self.channel_type.has_anchors_zero_fee_htlc_tx()
    }

    #[inline]
    pub fn is_zero_reserve(self) -> bool {
        self.zero_reserve
    }

    #[inline]
    pub fn pays_directly_to_wallet(self) -> bool {
        self.pays_directly_to_wallet
    }
}

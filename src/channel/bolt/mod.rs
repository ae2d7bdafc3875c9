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

mod keyset;
mod policy;
mod state;
mod util;

pub mod backup;
pub mod closing;
pub mod commitments;
pub mod dispatch;
pub mod helpers;

pub use backup::{decrypt_backup, encrypt_backup, BackupError};
pub use closing::{Closing, ClosingError, ClosingSigner};
pub use commitments::{
    Commitments, CommitmentSigner, HtlcInfo, ProtocolError, RemoteNextCommitInfo,
};
pub use dispatch::{process, Action, ChannelDriver, Command, DispatchError, Event};
pub use keyset::{LocalKeyset, LocalPubkey, RemoteKeyset};
pub use policy::{CommonParams, PeerParams, Policy, PolicyError};
pub use state::ChannelState;
pub use util::{ChannelVersion, Lifecycle, Phase};

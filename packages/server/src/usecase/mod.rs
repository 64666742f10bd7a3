//! UseCase layer: the operations of the real-time core.
//!
//! Each use case owns `Arc`s of the state owners it needs; `RealtimeHub`
//! wires them together and is the only type the UI layer talks to.

pub mod broadcaster;
pub mod connect_session;
pub mod disconnect_session;
pub mod hub;
pub mod join_room;
pub mod leave_room;
pub mod presence;
pub mod replay_history;
pub mod stats;

pub use crate::domain::RealtimeError;
pub use broadcaster::Broadcaster;
pub use connect_session::{Admission, ConnectSessionUseCase};
pub use disconnect_session::DisconnectSessionUseCase;
pub use hub::{MemberInfo, RealtimeHub};
pub use join_room::JoinRoomUseCase;
pub use leave_room::LeaveRoomUseCase;
pub use presence::PresenceTracker;
pub use replay_history::{DEFAULT_PAGE_SIZE, ReplayHistoryUseCase};
pub use stats::{GetStatsUseCase, StatsSnapshot};

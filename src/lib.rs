//! Room-availability reservation core for a hotel-booking platform.
//!
//! The engine decides, for a requested room and date range, whether a new
//! booking may be accepted without overlapping an existing active booking,
//! and commits that decision atomically alongside price computation — under
//! a per-room write lock, so racing requests for overlapping dates resolve
//! to exactly one winner. Status transitions (confirm/cancel/complete) run
//! through a single state-machine table with the same atomicity guarantee.
//!
//! HTTP routing, request validation, and authentication are collaborator
//! layers: they call in through [`Engine`] with an explicit [`model::Actor`]
//! capability and get typed results back.

pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod tenant;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use model::{
    Actor, Booking, BookingFilter, BookingStatus, Guests, Hotel, Ms, Role, RoomInfo, RoomKind,
    Stay,
};
pub use tenant::TenantManager;

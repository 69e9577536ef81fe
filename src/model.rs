use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// One hotel night, for price math.
pub const MS_PER_NIGHT: Ms = 86_400_000;

/// Half-open stay interval `[check_in, check_out)`.
///
/// A checkout at instant X and a check-in at instant X share the same day
/// without conflicting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stay {
    pub check_in: Ms,
    pub check_out: Ms,
}

impl Stay {
    pub fn new(check_in: Ms, check_out: Ms) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    pub fn duration_ms(&self) -> Ms {
        self.check_out - self.check_in
    }

    /// Billable nights: fractional days round up, so any valid stay is at least one night.
    pub fn nights(&self) -> i64 {
        // div_ceil on signed integers is unstable; duration is always positive
        // by construction, so this manual ceil-division is equivalent.
        (self.duration_ms() + MS_PER_NIGHT - 1) / MS_PER_NIGHT
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.check_in <= t && t < self.check_out
    }
}

/// Party size for a booking. `children` is non-negative by construction;
/// the committer additionally requires at least one adult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guests {
    pub adults: u32,
    pub children: u32,
}

impl Guests {
    pub fn total(&self) -> u32 {
        self.adults + self.children
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated caller identity, passed explicitly into every engine call.
/// The engine never reads ambient session state and never authenticates;
/// it only consults this capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn user(user_id: Ulid) -> Self {
        Self { user_id, role: Role::User }
    }

    pub fn admin(user_id: Ulid) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Active bookings count toward the room's overlap invariant.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Terminal statuses permit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status text from an external caller that names no known status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown booking status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl std::str::FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomKind {
    Single,
    Double,
    Twin,
    Queen,
    King,
    Suite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Ulid,
    pub name: String,
}

/// A persisted booking record. Field names on the wire follow the
/// external API shape (`checkIn`, `totalPrice`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub hotel_id: Ulid,
    pub room_id: Ulid,
    #[serde(flatten)]
    pub stay: Stay,
    pub guests: Guests,
    pub total_price: f64,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub hotel_id: Ulid,
    /// Unique within the owning hotel.
    pub number: String,
    pub kind: RoomKind,
    pub price_per_night: f64,
    /// Maximum guest head-count, not concurrent allocations.
    pub capacity: u32,
    /// Advisory hint: true when no active booking covers the current instant.
    /// Recomputed from `bookings` after every mutation — never an independent
    /// source of truth for availability.
    pub available_hint: bool,
    /// All bookings for this room (any status), sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        hotel_id: Ulid,
        number: String,
        kind: RoomKind,
        price_per_night: f64,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            hotel_id,
            number,
            kind,
            price_per_night,
            capacity,
            available_hint: true,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by stay.check_in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove booking by id.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose stay overlaps the query window, any status.
    /// Uses binary search to skip bookings checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound checks in at or after query.check_out → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }

    /// Recompute the advisory availability hint against `now`.
    pub fn recompute_available_hint(&mut self, now: Ms) {
        self.available_hint = !self
            .bookings
            .iter()
            .any(|b| b.is_active() && b.stay.contains_instant(now));
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
///
/// `BookingCreated` carries the full record so WAL compaction can replace a
/// create + transition history with a single event reproducing current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    HotelCreated {
        id: Ulid,
        name: String,
    },
    HotelDeleted {
        id: Ulid,
    },
    RoomCreated {
        id: Ulid,
        hotel_id: Ulid,
        number: String,
        kind: RoomKind,
        price_per_night: f64,
        capacity: u32,
    },
    RoomUpdated {
        id: Ulid,
        number: String,
        kind: RoomKind,
        price_per_night: f64,
        capacity: u32,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        hotel_id: Ulid,
        user_id: Ulid,
        stay: Stay,
        guests: Guests,
        total_price: f64,
        status: BookingStatus,
        cancellation_reason: Option<String>,
        created_at: Ms,
        updated_at: Ms,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
        cancellation_reason: Option<String>,
        at: Ms,
    },
    BookingDeleted {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Room view handed to callers; bookings stay behind the engine API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub number: String,
    pub kind: RoomKind,
    pub price_per_night: f64,
    pub capacity: u32,
    pub is_available: bool,
}

impl From<&RoomState> for RoomInfo {
    fn from(rs: &RoomState) -> Self {
        Self {
            id: rs.id,
            hotel_id: rs.hotel_id,
            number: rs.number.clone(),
            kind: rs.kind,
            price_per_night: rs.price_per_night,
            capacity: rs.capacity,
            is_available: rs.available_hint,
        }
    }
}

/// Filter for booking listings. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub check_in_from: Option<Ms>,
    pub check_in_to: Option<Ms>,
}

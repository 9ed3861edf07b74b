//! Pure seat-set checks used inside a reservation transaction.

use seat_store::SeatSet;

/// Seats that are both requested and already held.
pub fn conflicts(requested: &SeatSet, held: &SeatSet) -> SeatSet {
    requested.intersection(held).copied().collect()
}

/// Requested seats that fall outside `[1, total_seats]`.
pub fn out_of_range(requested: &SeatSet, total_seats: u32) -> SeatSet {
    requested
        .iter()
        .copied()
        .filter(|&seat| seat == 0 || seat > total_seats)
        .collect()
}
